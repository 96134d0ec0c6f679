//! S3 key/path conventions.
//!
//! Pure string functions — no AWS SDK dependency. These define the canonical
//! layout of objects in the CloudPAM bucket: one JSON object per entity,
//! listable by prefix.

use uuid::Uuid;

pub const POOLS_PREFIX: &str = "pools/";

pub fn pool(id: u64) -> String {
    format!("pools/{id}.json")
}

pub const ACCOUNTS_PREFIX: &str = "accounts/";

pub fn account(id: u64) -> String {
    format!("accounts/{id}.json")
}

pub fn resources_prefix(account_id: u64) -> String {
    format!("resources/{account_id}/")
}

pub fn resource(account_id: u64, id: Uuid) -> String {
    format!("resources/{account_id}/{id}.json")
}

pub fn sync_jobs_prefix(account_id: u64) -> String {
    format!("sync_jobs/{account_id}/")
}

pub fn sync_job(account_id: u64, id: Uuid) -> String {
    format!("sync_jobs/{account_id}/{id}.json")
}

pub const RECOMMENDATIONS_PREFIX: &str = "recommendations/";

pub fn recommendation(id: &str) -> String {
    format!("recommendations/{id}.json")
}

pub const BOOTSTRAP_TOKENS_PREFIX: &str = "bootstrap_tokens/";

pub fn bootstrap_token(id: Uuid) -> String {
    format!("bootstrap_tokens/{id}.json")
}

/// Monotonic id counters, one JSON object per entity kind that needs a
/// numeric id (pools, accounts).
pub fn id_counter(kind: &str) -> String {
    format!("_counters/{kind}.json")
}
