use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::provider::TriggerKind;

/// A deploy command resolved for one webhook delivery, ready to hand to a runner
#[derive(Debug, Clone, Serialize)]
pub struct DeployJob {
    pub id: String,
    pub branch: String,
    pub trigger: TriggerKind,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

impl DeployJob {
    pub fn new(branch: String, trigger: TriggerKind, command: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            branch,
            trigger,
            command,
            created_at: Utc::now(),
        }
    }
}
