use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fact observed in a cloud account during a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredResource {
    pub id: Uuid,
    pub account_id: u64,
    /// Provider-native id, stable across syncs. `(account_id, resource_id)`
    /// is the natural key.
    pub resource_id: String,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub discovered_at: jiff::Timestamp,
    pub last_seen_at: jiff::Timestamp,
    pub status: ResourceStatus,
    #[serde(default)]
    pub pool_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Vpc,
    Subnet,
    ElasticIp,
    NetworkInterface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Active,
    Stale,
    Deleted,
}
