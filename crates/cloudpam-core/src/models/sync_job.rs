use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution of a collector for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub account_id: u64,
    pub status: SyncJobStatus,
    pub started_at: jiff::Timestamp,
    #[serde(default)]
    pub finished_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub found: u64,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Running,
    Completed,
    Failed,
}
