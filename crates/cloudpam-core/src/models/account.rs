use serde::{Deserialize, Serialize};

/// An external cloud tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    /// Stable key, e.g. `aws:123456789012`. Unique among live accounts.
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}
