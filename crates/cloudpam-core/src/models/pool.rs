use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A logical slice of address space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: u64,
    pub name: String,
    /// Masked CIDR text, e.g. `10.0.0.0/24`.
    pub cidr: String,
    pub parent_id: Option<u64>,
    pub account_id: Option<u64>,
    #[serde(default)]
    pub pool_type: PoolType,
    #[serde(default)]
    pub status: PoolStatus,
    #[serde(default)]
    pub source: PoolSource,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Supernet,
    Region,
    Environment,
    Vpc,
    Subnet,
}

impl Default for PoolType {
    fn default() -> Self {
        Self::Subnet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Planned,
    Active,
    Deprecated,
}

impl Default for PoolStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSource {
    Manual,
    Discovered,
}

impl Default for PoolSource {
    fn default() -> Self {
        Self::Manual
    }
}

/// A pool annotated with the utilization statistics computed by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolWithStats {
    #[serde(flatten)]
    pub pool: Pool,
    pub stats: PoolUtilization,
    pub children: Vec<PoolWithStats>,
}

/// The per-pool utilization computed from direct children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolUtilization {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub utilization_pct: f64,
    pub child_count: usize,
    pub direct_children: usize,
}
