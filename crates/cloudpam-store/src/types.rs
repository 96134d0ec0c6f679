use std::collections::HashMap;

use cloudpam_core::models::pool::{PoolSource, PoolStatus, PoolType};
use cloudpam_core::models::recommendation::{RecommendationPriority, RecommendationStatus, RecommendationType};
use cloudpam_core::models::resource::ResourceType;

/// Input to `Store::create_pool`.
#[derive(Debug, Clone, Default)]
pub struct CreatePool {
    pub name: String,
    pub cidr: String,
    pub parent_id: Option<u64>,
    pub account_id: Option<u64>,
    pub pool_type: PoolType,
    pub status: PoolStatus,
    pub source: PoolSource,
    pub description: String,
    pub tags: HashMap<String, String>,
}

/// Partial update to a pool's own fields (`Store::update_pool`). `None`
/// means "leave unchanged". `parent_id` may be set to `Some(None)` to clear
/// the parent (move to root).
#[derive(Debug, Clone, Default)]
pub struct PoolPatch {
    pub name: Option<String>,
    pub cidr: Option<String>,
    pub parent_id: Option<Option<u64>>,
    pub pool_type: Option<PoolType>,
    pub status: Option<PoolStatus>,
}

/// Input to `Store::create_account`.
#[derive(Debug, Clone, Default)]
pub struct CreateAccount {
    pub key: String,
    pub name: String,
    pub provider: Option<String>,
    pub external_id: Option<String>,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub tier: Option<String>,
    pub environment: Option<String>,
    pub regions: Vec<String>,
}

/// Partial update to an account (`Store::update_account`).
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub provider: Option<Option<String>>,
    pub external_id: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub platform: Option<Option<String>>,
    pub tier: Option<Option<String>>,
    pub environment: Option<Option<String>>,
    pub regions: Option<Vec<String>>,
}

/// Filter applied to `Store::list_resources`.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub resource_type: Option<ResourceType>,
    pub status: Option<cloudpam_core::models::resource::ResourceStatus>,
}

/// Filter applied to `Store::list_recommendations`.
#[derive(Debug, Clone, Default)]
pub struct RecommendationFilter {
    pub pool_id: Option<u64>,
    pub status: Option<RecommendationStatus>,
    pub rec_type: Option<RecommendationType>,
}

/// Offset/limit pagination. `limit == 0` means "no limit".
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn all() -> Self {
        Self { offset: 0, limit: 0 }
    }

    pub fn apply<T>(&self, mut items: Vec<T>) -> PagedResult<T> {
        let total = items.len();
        if self.offset >= items.len() {
            return PagedResult { items: Vec::new(), total };
        }
        items.drain(..self.offset);
        if self.limit > 0 && items.len() > self.limit {
            items.truncate(self.limit);
        }
        PagedResult { items, total }
    }
}

#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Input to `Store::create_recommendation`. The engine (not the store)
/// assigns `id`, `status`, `created_at`/`updated_at`.
#[derive(Debug, Clone)]
pub struct CreateRecommendation {
    pub id: String,
    pub pool_id: u64,
    pub rec_type: RecommendationType,
    pub priority: RecommendationPriority,
    pub score: u32,
    pub suggested_cidr: Option<String>,
    pub rule_id: Option<String>,
    pub title: String,
    pub description: String,
}

/// Input to `Store::create_sync_job`.
#[derive(Debug, Clone)]
pub struct CreateSyncJob {
    pub account_id: u64,
}

/// Partial update to a sync job (`Store::update_sync_job`).
#[derive(Debug, Clone, Default)]
pub struct SyncJobPatch {
    pub status: Option<cloudpam_core::models::sync_job::SyncJobStatus>,
    pub finished_at: Option<jiff::Timestamp>,
    pub found: Option<u64>,
    pub created: Option<u64>,
    pub updated: Option<u64>,
    pub deleted: Option<u64>,
    pub error_message: Option<Option<String>>,
}
