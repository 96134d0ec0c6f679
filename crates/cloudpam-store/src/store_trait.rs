use async_trait::async_trait;
use cloudpam_core::models::pool::{Pool, PoolUtilization, PoolWithStats};
use cloudpam_core::models::resource::DiscoveredResource;
use cloudpam_core::models::sync_job::SyncJob;
use cloudpam_core::models::{Account, Recommendation};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::StoreError;
use crate::types::{
    AccountPatch, CreateAccount, CreatePool, CreateRecommendation, CreateSyncJob, Page,
    PagedResult, PoolPatch, RecommendationFilter, ResourceFilter, SyncJobPatch,
};
use cloudpam_core::models::recommendation::RecommendationStatus;

/// The storage abstraction the planning and allocation engine depends on.
/// Two implementations exist behind this one interface: a
/// pure in-memory reference (`MemoryStore`, authoritative for tests) and a
/// transactional S3-backed store (`S3Store`).
///
/// Every operation is context-cancellable: the first argument after
/// explicit parameters is always a [`CancelToken`], checked at entry and
/// after every suspension point.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Pools ---------------------------------------------------------

    async fn list_pools(&self, cancel: &CancelToken) -> Result<Vec<Pool>, StoreError>;

    async fn create_pool(
        &self,
        input: CreatePool,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError>;

    async fn get_pool(&self, id: u64, cancel: &CancelToken) -> Result<Pool, StoreError>;

    async fn update_pool(
        &self,
        id: u64,
        patch: PoolPatch,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError>;

    async fn update_pool_account(
        &self,
        id: u64,
        account_id: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError>;

    async fn update_pool_meta(
        &self,
        id: u64,
        description: Option<String>,
        tags: Option<std::collections::HashMap<String, String>>,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError>;

    /// Fails with *conflict* if the pool has live children.
    async fn delete_pool(&self, id: u64, cancel: &CancelToken) -> Result<(), StoreError>;

    /// Soft-deletes the pool and the transitive closure of its children.
    /// Returns the ids removed. Atomic: visible entirely or not at all.
    async fn delete_pool_cascade(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>, StoreError>;

    async fn get_children(&self, id: u64, cancel: &CancelToken) -> Result<Vec<Pool>, StoreError>;

    /// All roots, or the subtree rooted at `root`, each node carrying
    /// computed stats.
    async fn get_hierarchy(
        &self,
        root: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Vec<PoolWithStats>, StoreError>;

    async fn get_pool_with_stats(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<PoolWithStats, StoreError>;

    async fn calculate_pool_utilization(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<PoolUtilization, StoreError>;

    // -- Accounts --------------------------------------------------------

    async fn list_accounts(&self, cancel: &CancelToken) -> Result<Vec<Account>, StoreError>;

    async fn create_account(
        &self,
        input: CreateAccount,
        cancel: &CancelToken,
    ) -> Result<Account, StoreError>;

    async fn get_account(&self, id: u64, cancel: &CancelToken) -> Result<Account, StoreError>;

    async fn update_account(
        &self,
        id: u64,
        patch: AccountPatch,
        cancel: &CancelToken,
    ) -> Result<Account, StoreError>;

    /// Fails with *conflict* if any live pool references this account.
    async fn delete_account(&self, id: u64, cancel: &CancelToken) -> Result<(), StoreError>;

    /// Soft-deletes the account and every pool in the union of pools it
    /// owns plus their transitive descendants. Atomic.
    async fn delete_account_cascade(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>, StoreError>;

    // -- Discovered resources ---------------------------------------------

    async fn list_resources(
        &self,
        account_id: u64,
        filter: ResourceFilter,
        page: Page,
        cancel: &CancelToken,
    ) -> Result<PagedResult<DiscoveredResource>, StoreError>;

    async fn get_resource(
        &self,
        id: Uuid,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError>;

    /// Upsert by `(account_id, resource_id)`. Preserves the existing `id`
    /// and `pool_id` (operator approval) and the existing `discovered_at`
    /// when the incoming record doesn't carry one.
    async fn upsert_resource(
        &self,
        input: DiscoveredResource,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError>;

    /// Flips every `active` resource for the account with
    /// `last_seen_at < before` to `stale`. Returns the count flipped.
    async fn mark_stale_resources(
        &self,
        account_id: u64,
        before: jiff::Timestamp,
        cancel: &CancelToken,
    ) -> Result<u64, StoreError>;

    async fn link_resource(
        &self,
        id: Uuid,
        pool_id: u64,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError>;

    async fn unlink_resource(
        &self,
        id: Uuid,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError>;

    async fn delete_resource(&self, id: Uuid, cancel: &CancelToken) -> Result<(), StoreError>;

    // -- Sync jobs ---------------------------------------------------------

    async fn create_sync_job(
        &self,
        input: CreateSyncJob,
        cancel: &CancelToken,
    ) -> Result<SyncJob, StoreError>;

    async fn update_sync_job(
        &self,
        id: Uuid,
        patch: SyncJobPatch,
        cancel: &CancelToken,
    ) -> Result<SyncJob, StoreError>;

    async fn get_sync_job(&self, id: Uuid, cancel: &CancelToken) -> Result<SyncJob, StoreError>;

    async fn list_sync_jobs(
        &self,
        account_id: u64,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<SyncJob>, StoreError>;

    // -- Recommendations -----------------------------------------------

    async fn create_recommendation(
        &self,
        input: CreateRecommendation,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError>;

    async fn get_recommendation(
        &self,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError>;

    async fn list_recommendations(
        &self,
        filter: RecommendationFilter,
        page: Page,
        cancel: &CancelToken,
    ) -> Result<PagedResult<Recommendation>, StoreError>;

    async fn update_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        dismiss_reason: Option<String>,
        applied_pool_id: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError>;

    /// Deletes every `pending` recommendation for `pool_id`. Returns the
    /// count removed. The regeneration-idempotence invariant
    /// depends on this running before a `Generate` call writes new ones.
    async fn delete_pending_for_pool(
        &self,
        pool_id: u64,
        cancel: &CancelToken,
    ) -> Result<u64, StoreError>;
}
