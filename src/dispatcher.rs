//! Webhook entry point: provider classification, verification, rule resolution and launch

use axum::http::{HeaderMap, StatusCode, header::USER_AGENT};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{DeployError, Result};
use crate::job::DeployJob;
use crate::provider::{DeployEvent, Provider, bitbucket, github};
use crate::resolver::resolve;
use crate::runner::DeployRunner;
use crate::signature::{self, VerificationResult};

/// What happened to a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A deploy command was launched.
    Deployed { job_id: String, branch: String },
    NoMatchingRule { branch: String },
    /// The event was understood but carries no branch to deploy.
    EmptyBranch,
    /// Not a deploy-triggering event type.
    Ignored,
    /// GitHub's hook installation check.
    Pinged,
    Unrecognized,
    Unauthorized,
    /// The payload could not be interpreted.
    Failed,
}

impl DispatchOutcome {
    /// Only authentication failures are reported to the sender.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchOutcome::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::OK,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            DispatchOutcome::Unauthorized => "Unauthorized",
            _ => "OK",
        }
    }
}

pub struct Dispatcher {
    settings: Arc<Settings>,
    runner: Arc<dyn DeployRunner>,
}

impl Dispatcher {
    pub fn new(settings: Arc<Settings>, runner: Arc<dyn DeployRunner>) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handles one delivery. Never fails: errors are logged and folded into the outcome.
    pub fn handle(&self, headers: &HeaderMap, body: &[u8]) -> DispatchOutcome {
        let user_agent = header_str(headers, USER_AGENT.as_str());
        let provider = Provider::classify(user_agent);
        let delivery_id = delivery_id(provider, headers);
        debug!("Delivery {} classified as {}", delivery_id, provider);

        match self.process(provider, headers, body, &delivery_id) {
            Ok(outcome) => outcome,
            Err(DeployError::AuthenticationFailure(reason)) => {
                warn!("Delivery {} rejected: {}", delivery_id, reason);
                DispatchOutcome::Unauthorized
            }
            Err(DeployError::UnrecognizedProvider(agent)) => {
                debug!(
                    "Delivery {} from unrecognized sender '{}', skipping.",
                    delivery_id, agent
                );
                DispatchOutcome::Unrecognized
            }
            Err(e) => {
                error!("Delivery {} could not be processed: {}", delivery_id, e);
                DispatchOutcome::Failed
            }
        }
    }

    fn process(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        body: &[u8],
        delivery_id: &str,
    ) -> Result<DispatchOutcome> {
        let event = match provider {
            Provider::GitHub => {
                self.verify_github(headers, body)?;

                let event_type = header_str(headers, github::EVENT_HEADER);
                if event_type == github::PING_EVENT {
                    info!("Delivery {} - GitHub ping received, hook is set up.", delivery_id);
                    return Ok(DispatchOutcome::Pinged);
                }
                github::parse(event_type, body)?
            }
            Provider::Bitbucket => {
                let event_key = header_str(headers, bitbucket::EVENT_HEADER);
                bitbucket::parse(event_key, body)?
            }
            Provider::Unknown => {
                return Err(DeployError::UnrecognizedProvider(
                    header_str(headers, USER_AGENT.as_str()).to_string(),
                ));
            }
        };

        let Some(event) = event else {
            info!(
                "Delivery {} - {} event is not a deploy trigger, skipping.",
                delivery_id, provider
            );
            return Ok(DispatchOutcome::Ignored);
        };

        Ok(self.deploy(event, delivery_id))
    }

    /// Checks `X-Hub-Signature-256` when GitHub sent it, `X-Hub-Signature` otherwise.
    fn verify_github(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        let secret = self.settings.secret();
        let result = match headers.get(github::SIGNATURE_256_HEADER) {
            Some(_) => signature::verify_sha256(
                secret,
                header_str(headers, github::SIGNATURE_256_HEADER),
                body,
            ),
            None => signature::verify(secret, header_str(headers, github::SIGNATURE_HEADER), body),
        };

        if result == VerificationResult::NotRequired {
            debug!("No secret configured, skipping signature check");
        }
        if result.is_accepted() {
            Ok(())
        } else {
            Err(DeployError::AuthenticationFailure(
                "signature does not match the configured secret".to_string(),
            ))
        }
    }

    fn deploy(&self, event: DeployEvent, delivery_id: &str) -> DispatchOutcome {
        if event.branch.is_empty() {
            info!(
                "Delivery {} - {} event has no branch name, skipping.",
                delivery_id, event.trigger
            );
            return DispatchOutcome::EmptyBranch;
        }

        let Some(command) = resolve(&event.branch, &self.settings) else {
            info!(
                "Delivery {} - Got a {} event in branch '{}', no rule matches.",
                delivery_id, event.trigger, event.branch
            );
            return DispatchOutcome::NoMatchingRule {
                branch: event.branch,
            };
        };

        let job = DeployJob::new(event.branch.clone(), event.trigger, command.to_string());
        let job_id = job.id.clone();
        info!(
            "Delivery {} - Got a {} event in branch '{}', created job {}",
            delivery_id, event.trigger, event.branch, job_id
        );
        self.runner.launch(job);

        DispatchOutcome::Deployed {
            job_id,
            branch: event.branch,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn delivery_id(provider: Provider, headers: &HeaderMap) -> String {
    let supplied = match provider {
        Provider::GitHub => header_str(headers, github::DELIVERY_HEADER),
        Provider::Bitbucket => header_str(headers, bitbucket::REQUEST_ID_HEADER),
        Provider::Unknown => "",
    };
    if supplied.is_empty() {
        Uuid::now_v7().to_string()
    } else {
        supplied.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegacyRule;
    use crate::resolver::{BranchMatcher, BranchRule};
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        jobs: Mutex<Vec<DeployJob>>,
    }

    impl RecordingRunner {
        fn commands(&self) -> Vec<String> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .map(|j| j.command.clone())
                .collect()
        }
    }

    impl DeployRunner for RecordingRunner {
        fn launch(&self, job: DeployJob) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    fn settings(secret: Option<&str>) -> Settings {
        Settings {
            legacy_rule: Some(LegacyRule {
                branch_ref: "refs/heads/release".to_string(),
                deploy_command: "legacy-deploy".to_string(),
            }),
            rules: vec![
                BranchRule {
                    matcher: BranchMatcher::ExactName("release".to_string()),
                    deploy_command: "multi-release".to_string(),
                },
                BranchRule {
                    matcher: BranchMatcher::ExactName("develop".to_string()),
                    deploy_command: "deploy-develop".to_string(),
                },
                BranchRule {
                    matcher: BranchMatcher::pattern("^feature/.*").unwrap(),
                    deploy_command: "deploy-feature".to_string(),
                },
            ],
            secret: secret.map(str::to_string),
            ..Settings::for_tests()
        }
    }

    fn dispatcher(secret: Option<&str>) -> (Dispatcher, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = Dispatcher::new(Arc::new(settings(secret)), runner.clone());
        (dispatcher, runner)
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn github_push(reference: &str) -> Vec<u8> {
        json!({"ref": reference, "after": "0d1a26e6"}).to_string().into_bytes()
    }

    #[test]
    fn test_github_push_deploys_matching_rule() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        let outcome = dispatcher.handle(&h, &github_push("refs/heads/feature/x"));
        assert!(matches!(
            outcome,
            DispatchOutcome::Deployed { ref branch, .. } if branch == "feature/x"
        ));
        assert_eq!(outcome.status(), StatusCode::OK);
        assert_eq!(runner.commands(), vec!["deploy-feature"]);
    }

    #[test]
    fn test_legacy_rule_wins_over_multi_rule() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        dispatcher.handle(&h, &github_push("refs/heads/release"));
        assert_eq!(runner.commands(), vec!["legacy-deploy"]);
    }

    #[test]
    fn test_valid_sha1_signature_is_accepted() {
        let (dispatcher, runner) = dispatcher(Some("topsecret"));
        let body = github_push("refs/heads/develop");
        let sig = signature::sign_sha1("topsecret", &body);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
            ("x-hub-signature", sig.as_str()),
        ]);
        let outcome = dispatcher.handle(&h, &body);
        assert!(matches!(outcome, DispatchOutcome::Deployed { .. }));
        assert_eq!(runner.commands(), vec!["deploy-develop"]);
    }

    #[test]
    fn test_sha256_signature_is_preferred() {
        let (dispatcher, runner) = dispatcher(Some("topsecret"));
        let body = github_push("refs/heads/develop");
        let sig = signature::sign_sha256("topsecret", &body);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
            ("x-hub-signature", "sha1=0000"),
            ("x-hub-signature-256", sig.as_str()),
        ]);
        assert!(matches!(
            dispatcher.handle(&h, &body),
            DispatchOutcome::Deployed { .. }
        ));
        assert_eq!(runner.commands().len(), 1);
    }

    #[test]
    fn test_bad_signature_is_unauthorized_and_does_not_deploy() {
        let (dispatcher, runner) = dispatcher(Some("topsecret"));
        let body = github_push("refs/heads/develop");
        let sig = signature::sign_sha1("wrong", &body);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
            ("x-hub-signature", sig.as_str()),
        ]);
        let outcome = dispatcher.handle(&h, &body);
        assert_eq!(outcome, DispatchOutcome::Unauthorized);
        assert_eq!(outcome.status(), StatusCode::UNAUTHORIZED);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_missing_signature_is_unauthorized_when_secret_set() {
        let (dispatcher, runner) = dispatcher(Some("topsecret"));
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        let outcome = dispatcher.handle(&h, &github_push("refs/heads/develop"));
        assert_eq!(outcome, DispatchOutcome::Unauthorized);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_signature_checked_before_parsing() {
        let (dispatcher, _) = dispatcher(Some("topsecret"));
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        assert_eq!(
            dispatcher.handle(&h, b"not json"),
            DispatchOutcome::Unauthorized
        );
    }

    #[test]
    fn test_github_ref_without_heads_prefix_does_not_deploy() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        let outcome = dispatcher.handle(&h, &github_push("refs/tags/release"));
        assert_eq!(outcome, DispatchOutcome::EmptyBranch);
        assert_eq!(outcome.status(), StatusCode::OK);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_github_non_push_event_is_ignored() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "issues"),
        ]);
        assert_eq!(
            dispatcher.handle(&h, &github_push("refs/heads/develop")),
            DispatchOutcome::Ignored
        );
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_github_ping() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "ping"),
        ]);
        assert_eq!(
            dispatcher.handle(&h, b"{\"zen\": \"Keep it logically awesome.\"}"),
            DispatchOutcome::Pinged
        );
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_malformed_payload_is_ok_without_deploy() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        let outcome = dispatcher.handle(&h, b"{{{");
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(outcome.status(), StatusCode::OK);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_unrecognized_provider_is_ok_without_deploy() {
        let (dispatcher, runner) = dispatcher(Some("topsecret"));
        let h = headers(&[("user-agent", "curl/8.5.0"), ("x-github-event", "push")]);
        let outcome = dispatcher.handle(&h, &github_push("refs/heads/develop"));
        assert_eq!(outcome, DispatchOutcome::Unrecognized);
        assert_eq!(outcome.status(), StatusCode::OK);
        assert!(runner.commands().is_empty());

        let outcome = dispatcher.handle(&HeaderMap::new(), b"");
        assert_eq!(outcome, DispatchOutcome::Unrecognized);
    }

    #[test]
    fn test_no_matching_rule() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "GitHub-Hookshot/044aadd"),
            ("x-github-event", "push"),
        ]);
        assert_eq!(
            dispatcher.handle(&h, &github_push("refs/heads/hotfix")),
            DispatchOutcome::NoMatchingRule {
                branch: "hotfix".to_string()
            }
        );
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_bitbucket_tag_push_does_not_deploy() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "Bitbucket-Webhooks/2.0"),
            ("x-event-key", "repo:push"),
        ]);
        let body = json!({"push": {"changes": [{"new": {"type": "tag", "name": "develop"}}]}});
        let outcome = dispatcher.handle(&h, body.to_string().as_bytes());
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_bitbucket_merged_pull_request_deploys_once() {
        let (dispatcher, runner) = dispatcher(None);
        let h = headers(&[
            ("user-agent", "Bitbucket-Webhooks/2.0"),
            ("x-event-key", "pullrequest:fulfilled"),
            ("x-request-uuid", "4b4f1c2e-9d1a-4a8e-bb3a-1d2e3f4a5b6c"),
        ]);
        let body = json!({"pullrequest": {"destination": {"branch": {"name": "develop"}}}});
        let outcome = dispatcher.handle(&h, body.to_string().as_bytes());
        assert!(matches!(outcome, DispatchOutcome::Deployed { .. }));
        assert_eq!(runner.commands(), vec!["deploy-develop"]);
        assert_eq!(
            runner.jobs.lock().unwrap()[0].trigger,
            crate::provider::TriggerKind::MergedPullRequest
        );
    }

    #[test]
    fn test_bitbucket_is_not_signature_checked() {
        let (dispatcher, runner) = dispatcher(Some("topsecret"));
        let h = headers(&[
            ("user-agent", "Bitbucket-Webhooks/2.0"),
            ("x-event-key", "repo:push"),
        ]);
        let body = json!({"push": {"changes": [{"new": {"type": "branch", "name": "develop"}}]}});
        let outcome = dispatcher.handle(&h, body.to_string().as_bytes());
        assert!(matches!(outcome, DispatchOutcome::Deployed { .. }));
        assert_eq!(runner.commands(), vec!["deploy-develop"]);
    }

    #[test]
    fn test_delivery_id_prefers_provider_header() {
        let h = headers(&[("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")]);
        assert_eq!(
            delivery_id(Provider::GitHub, &h),
            "72d3162e-cc78-11e3-81ab-4c9367dc0958"
        );
        assert!(!delivery_id(Provider::Unknown, &h).is_empty());
        assert_ne!(
            delivery_id(Provider::Unknown, &h),
            "72d3162e-cc78-11e3-81ab-4c9367dc0958"
        );
    }
}
