//! Provider classification and the normalized deploy event

pub mod bitbucket;
pub mod github;

use serde::Serialize;

pub const GITHUB_AGENT_PREFIX: &str = "GitHub-Hookshot";
pub const BITBUCKET_AGENT_PREFIX: &str = "Bitbucket-Webhooks";

/// Which hosting provider sent a request, judged from its `User-Agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GitHub,
    Bitbucket,
    Unknown,
}

impl Provider {
    /// Providers append version suffixes (`GitHub-Hookshot/4f2a1c0`), so this is a
    /// case-sensitive prefix match.
    pub fn classify(user_agent: &str) -> Self {
        if user_agent.starts_with(GITHUB_AGENT_PREFIX) {
            Provider::GitHub
        } else if user_agent.starts_with(BITBUCKET_AGENT_PREFIX) {
            Provider::Bitbucket
        } else {
            Provider::Unknown
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::GitHub => write!(f, "github"),
            Provider::Bitbucket => write!(f, "bitbucket"),
            Provider::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    MergedPullRequest,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Push => write!(f, "push"),
            TriggerKind::MergedPullRequest => write!(f, "merged pull request"),
        }
    }
}

/// A provider-independent notification that `branch` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployEvent {
    /// Plain branch name, without `refs/heads/`. Empty when the payload had none.
    pub branch: String,
    pub trigger: TriggerKind,
}

impl DeployEvent {
    pub fn new(branch: impl Into<String>, trigger: TriggerKind) -> Self {
        Self {
            branch: branch.into(),
            trigger,
        }
    }
}

/// Reads a string at `path` inside a JSON value, treating anything missing or
/// non-string as absent.
pub(crate) fn str_at<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |node, key| node.get(key))
        .and_then(|v| v.as_str())
}
