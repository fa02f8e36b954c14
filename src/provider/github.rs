//! GitHub push payloads

use super::{DeployEvent, TriggerKind, str_at};
use crate::error::Result;
use crate::resolver::branch_name_from_ref;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
pub const SIGNATURE_256_HEADER: &str = "X-Hub-Signature-256";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

pub const PUSH_EVENT: &str = "push";
pub const PING_EVENT: &str = "ping";

/// Turns a GitHub delivery into a deploy event.
///
/// Only `push` events produce one. The body must already have passed signature
/// verification. A `ref` outside `refs/heads/` (tags, notes) gives an empty branch.
pub fn parse(event_type: &str, body: &[u8]) -> Result<Option<DeployEvent>> {
    if event_type != PUSH_EVENT {
        return Ok(None);
    }

    let payload: serde_json::Value = serde_json::from_slice(body)?;
    let branch = str_at(&payload, &["ref"])
        .map(branch_name_from_ref)
        .unwrap_or("");

    Ok(Some(DeployEvent::new(branch, TriggerKind::Push)))
}
