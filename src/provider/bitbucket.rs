//! Bitbucket push and merged pull request payloads

use super::{DeployEvent, TriggerKind, str_at};
use crate::error::Result;

pub const EVENT_HEADER: &str = "X-Event-Key";
pub const REQUEST_ID_HEADER: &str = "X-Request-UUID";

pub const PUSH_EVENT: &str = "repo:push";
pub const PULL_REQUEST_FULFILLED_EVENT: &str = "pullrequest:fulfilled";

/// Turns a Bitbucket delivery into a deploy event.
///
/// `repo:push` uses the first change's new target and yields nothing unless that target is
/// a branch. `pullrequest:fulfilled` uses the destination branch. Other keys yield nothing.
pub fn parse(event_key: &str, body: &[u8]) -> Result<Option<DeployEvent>> {
    match event_key {
        PUSH_EVENT => {
            let payload: serde_json::Value = serde_json::from_slice(body)?;
            // `new` is null when the push deleted the branch
            let Some(new_target) = payload
                .get("push")
                .and_then(|p| p.get("changes"))
                .and_then(|c| c.get(0))
                .and_then(|change| change.get("new"))
                .filter(|n| !n.is_null())
            else {
                return Ok(None);
            };

            if str_at(new_target, &["type"]) != Some("branch") {
                return Ok(None);
            }
            let branch = str_at(new_target, &["name"]).unwrap_or("");
            Ok(Some(DeployEvent::new(branch, TriggerKind::Push)))
        }
        PULL_REQUEST_FULFILLED_EVENT => {
            let payload: serde_json::Value = serde_json::from_slice(body)?;
            let branch =
                str_at(&payload, &["pullrequest", "destination", "branch", "name"]).unwrap_or("");
            Ok(Some(DeployEvent::new(
                branch,
                TriggerKind::MergedPullRequest,
            )))
        }
        _ => Ok(None),
    }
}
