//! Pure in-memory reference store — authoritative for tests.
//!
//! A single `tokio::sync::RwLock` guards all maps: every read acquires
//! shared, every write acquires exclusive. This is the simplest correct
//! design for this concurrency model and is what `cloudpam-analysis`,
//! `cloudpam-recommend`, and `cloudpam-discovery` are tested against.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use cloudpam_core::cidr::Cidr;
use cloudpam_core::models::pool::{Pool, PoolUtilization, PoolWithStats};
use cloudpam_core::models::recommendation::RecommendationStatus;
use cloudpam_core::models::resource::{DiscoveredResource, ResourceStatus};
use cloudpam_core::models::sync_job::SyncJobStatus;
use cloudpam_core::models::{Account, Recommendation, SyncJob};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::StoreError;
use crate::store_trait::Store;
use crate::types::{
    AccountPatch, CreateAccount, CreatePool, CreateRecommendation, CreateSyncJob, Page,
    PagedResult, PoolPatch, RecommendationFilter, ResourceFilter, SyncJobPatch,
};

/// Pool CIDRs must have a prefix length in `8..=30` on create and on any
/// `cidr` patch.
const MIN_POOL_PREFIX: u8 = 8;
const MAX_POOL_PREFIX: u8 = 30;

fn validate_pool_prefix(prefix: &Cidr) -> Result<(), StoreError> {
    if !(MIN_POOL_PREFIX..=MAX_POOL_PREFIX).contains(&prefix.prefix_len()) {
        return Err(StoreError::Validation(format!(
            "cidr prefix length {} outside allowed range {MIN_POOL_PREFIX}..={MAX_POOL_PREFIX}",
            prefix.prefix_len()
        )));
    }
    Ok(())
}

struct PoolRecord {
    pool: Pool,
    deleted_at: Option<jiff::Timestamp>,
}

struct AccountRecord {
    account: Account,
    deleted_at: Option<jiff::Timestamp>,
}

#[derive(Default)]
struct Inner {
    pools: HashMap<u64, PoolRecord>,
    next_pool_id: u64,
    accounts: HashMap<u64, AccountRecord>,
    next_account_id: u64,
    resources: HashMap<Uuid, DiscoveredResource>,
    sync_jobs: HashMap<Uuid, SyncJob>,
    recommendations: HashMap<String, Recommendation>,
}

/// Pure in-memory implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_pool<'a>(inner: &'a Inner, id: u64) -> Result<&'a PoolRecord, StoreError> {
    inner
        .pools
        .get(&id)
        .filter(|r| r.deleted_at.is_none())
        .ok_or_else(|| StoreError::not_found("pool", id.to_string()))
}

fn live_account<'a>(inner: &'a Inner, id: u64) -> Result<&'a AccountRecord, StoreError> {
    inner
        .accounts
        .get(&id)
        .filter(|r| r.deleted_at.is_none())
        .ok_or_else(|| StoreError::not_found("account", id.to_string()))
}

fn direct_children(inner: &Inner, id: u64) -> Vec<Pool> {
    inner
        .pools
        .values()
        .filter(|r| r.deleted_at.is_none() && r.pool.parent_id == Some(id))
        .map(|r| r.pool.clone())
        .collect()
}

/// Transitive descendant ids of `id` (not including `id` itself), via live
/// parent edges.
fn descendant_ids(inner: &Inner, id: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut frontier = vec![id];
    while let Some(cur) = frontier.pop() {
        for child in direct_children(inner, cur) {
            out.push(child.id);
            frontier.push(child.id);
        }
    }
    out
}

fn utilization_for(inner: &Inner, pool: &Pool) -> Result<PoolUtilization, StoreError> {
    let prefix = Cidr::parse(&pool.cidr)
        .map_err(|e| StoreError::Backend(format!("stored pool has invalid cidr: {e}")))?;
    let total = prefix.address_count();
    let children = direct_children(inner, pool.id);
    let mut used: u64 = 0;
    for child in &children {
        if let Ok(child_prefix) = Cidr::parse(&child.cidr) {
            used = used.saturating_add(child_prefix.address_count());
        }
    }
    let available = total.saturating_sub(used);
    let utilization_pct = if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    };
    Ok(PoolUtilization {
        total,
        used,
        available,
        utilization_pct,
        child_count: descendant_ids(inner, pool.id).len(),
        direct_children: children.len(),
    })
}

fn pool_with_stats_deep(inner: &Inner, pool: &Pool) -> Result<PoolWithStats, StoreError> {
    let stats = utilization_for(inner, pool)?;
    let mut children = Vec::new();
    for child in direct_children(inner, pool.id) {
        children.push(pool_with_stats_deep(inner, &child)?);
    }
    Ok(PoolWithStats {
        pool: pool.clone(),
        stats,
        children,
    })
}

fn pool_with_stats_shallow(inner: &Inner, pool: &Pool) -> Result<PoolWithStats, StoreError> {
    let stats = utilization_for(inner, pool)?;
    let mut children = Vec::new();
    for child in direct_children(inner, pool.id) {
        let child_stats = utilization_for(inner, &child)?;
        children.push(PoolWithStats {
            pool: child,
            stats: child_stats,
            children: Vec::new(),
        });
    }
    Ok(PoolWithStats {
        pool: pool.clone(),
        stats,
        children,
    })
}

fn check_cidr_unique(
    inner: &Inner,
    normalized_cidr: &str,
    parent_id: Option<u64>,
    exclude_id: Option<u64>,
) -> Result<(), StoreError> {
    let clash = inner.pools.values().any(|r| {
        r.deleted_at.is_none()
            && Some(r.pool.id) != exclude_id
            && r.pool.cidr == normalized_cidr
            && r.pool.parent_id == parent_id
    });
    if clash {
        Err(StoreError::Conflict(format!(
            "a live pool with cidr {normalized_cidr} already exists under this parent"
        )))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_pools(&self, cancel: &CancelToken) -> Result<Vec<Pool>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .pools
            .values()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| r.pool.clone())
            .collect())
    }

    async fn create_pool(
        &self,
        input: CreatePool,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        if input.name.trim().is_empty() {
            return Err(StoreError::Validation("name must not be empty".into()));
        }
        if input.cidr.trim().is_empty() {
            return Err(StoreError::Validation("cidr must not be empty".into()));
        }
        let prefix = Cidr::parse(&input.cidr)
            .map_err(|e| StoreError::Validation(format!("invalid cidr: {e}")))?;
        validate_pool_prefix(&prefix)?;
        let normalized = prefix.to_string();

        let mut inner = self.inner.write().await;

        if let Some(pid) = input.parent_id {
            live_pool(&inner, pid)?;
        }
        if let Some(aid) = input.account_id {
            live_account(&inner, aid)?;
        }
        check_cidr_unique(&inner, &normalized, input.parent_id, None)?;

        let id = inner.next_pool_id;
        inner.next_pool_id += 1;
        let now = jiff::Timestamp::now();
        let pool = Pool {
            id,
            name: input.name,
            cidr: normalized,
            parent_id: input.parent_id,
            account_id: input.account_id,
            pool_type: input.pool_type,
            status: input.status,
            source: input.source,
            description: input.description,
            tags: input.tags,
            created_at: now,
            updated_at: now,
        };
        inner.pools.insert(
            id,
            PoolRecord {
                pool: pool.clone(),
                deleted_at: None,
            },
        );
        info!(pool_id = id, cidr = %pool.cidr, "created pool");
        Ok(pool)
    }

    async fn get_pool(&self, id: u64, cancel: &CancelToken) -> Result<Pool, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        Ok(live_pool(&inner, id)?.pool.clone())
    }

    async fn update_pool(
        &self,
        id: u64,
        patch: PoolPatch,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_pool(&inner, id)?;

        let new_cidr = match &patch.cidr {
            Some(cidr_str) => {
                let prefix = Cidr::parse(cidr_str)
                    .map_err(|e| StoreError::Validation(format!("invalid cidr: {e}")))?;
                validate_pool_prefix(&prefix)?;
                Some(prefix.to_string())
            }
            None => None,
        };

        let new_parent = match patch.parent_id {
            Some(Some(new_pid)) => {
                if new_pid == id {
                    return Err(StoreError::Conflict("pool cannot parent itself".into()));
                }
                live_pool(&inner, new_pid)?;
                // cycle check: walk up from new_pid, reject if id appears
                let mut cursor = Some(new_pid);
                while let Some(cur) = cursor {
                    if cur == id {
                        return Err(StoreError::Conflict(
                            "reparenting would create a cycle".into(),
                        ));
                    }
                    cursor = inner.pools.get(&cur).and_then(|r| r.pool.parent_id);
                }
                Some(Some(new_pid))
            }
            Some(None) => Some(None),
            None => None,
        };

        let effective_cidr = new_cidr
            .clone()
            .unwrap_or_else(|| inner.pools[&id].pool.cidr.clone());
        let effective_parent = match new_parent {
            Some(p) => p,
            None => inner.pools[&id].pool.parent_id,
        };
        check_cidr_unique(&inner, &effective_cidr, effective_parent, Some(id))?;

        let record = inner.pools.get_mut(&id).expect("checked live above");
        if let Some(name) = patch.name {
            record.pool.name = name;
        }
        if let Some(cidr) = new_cidr {
            record.pool.cidr = cidr;
        }
        if let Some(parent) = new_parent {
            record.pool.parent_id = parent;
        }
        if let Some(pool_type) = patch.pool_type {
            record.pool.pool_type = pool_type;
        }
        if let Some(status) = patch.status {
            record.pool.status = status;
        }
        record.pool.updated_at = jiff::Timestamp::now();
        Ok(record.pool.clone())
    }

    async fn update_pool_account(
        &self,
        id: u64,
        account_id: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_pool(&inner, id)?;
        if let Some(aid) = account_id {
            live_account(&inner, aid)?;
        }
        let record = inner.pools.get_mut(&id).expect("checked live above");
        record.pool.account_id = account_id;
        record.pool.updated_at = jiff::Timestamp::now();
        Ok(record.pool.clone())
    }

    async fn update_pool_meta(
        &self,
        id: u64,
        description: Option<String>,
        tags: Option<HashMap<String, String>>,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_pool(&inner, id)?;
        let record = inner.pools.get_mut(&id).expect("checked live above");
        if let Some(description) = description {
            record.pool.description = description;
        }
        if let Some(tags) = tags {
            record.pool.tags = tags;
        }
        record.pool.updated_at = jiff::Timestamp::now();
        Ok(record.pool.clone())
    }

    async fn delete_pool(&self, id: u64, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_pool(&inner, id)?;
        if !direct_children(&inner, id).is_empty() {
            return Err(StoreError::Conflict(format!(
                "pool {id} has live children"
            )));
        }
        inner.pools.get_mut(&id).unwrap().deleted_at = Some(jiff::Timestamp::now());
        info!(pool_id = id, "deleted pool");
        Ok(())
    }

    async fn delete_pool_cascade(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_pool(&inner, id)?;
        let mut removed = descendant_ids(&inner, id);
        removed.push(id);
        let now = jiff::Timestamp::now();
        for pid in &removed {
            if let Some(record) = inner.pools.get_mut(pid) {
                record.deleted_at = Some(now);
            }
        }
        info!(pool_id = id, removed = removed.len(), "cascaded pool delete");
        Ok(removed)
    }

    async fn get_children(&self, id: u64, cancel: &CancelToken) -> Result<Vec<Pool>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        live_pool(&inner, id)?;
        Ok(direct_children(&inner, id))
    }

    async fn get_hierarchy(
        &self,
        root: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Vec<PoolWithStats>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        match root {
            Some(id) => {
                let pool = live_pool(&inner, id)?.pool.clone();
                Ok(vec![pool_with_stats_deep(&inner, &pool)?])
            }
            None => {
                let roots: Vec<Pool> = inner
                    .pools
                    .values()
                    .filter(|r| r.deleted_at.is_none() && r.pool.parent_id.is_none())
                    .map(|r| r.pool.clone())
                    .collect();
                roots
                    .iter()
                    .map(|p| pool_with_stats_deep(&inner, p))
                    .collect()
            }
        }
    }

    async fn get_pool_with_stats(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<PoolWithStats, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        let pool = live_pool(&inner, id)?.pool.clone();
        pool_with_stats_shallow(&inner, &pool)
    }

    async fn calculate_pool_utilization(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<PoolUtilization, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        let pool = live_pool(&inner, id)?.pool.clone();
        utilization_for(&inner, &pool)
    }

    // -- Accounts --------------------------------------------------------

    async fn list_accounts(&self, cancel: &CancelToken) -> Result<Vec<Account>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| r.account.clone())
            .collect())
    }

    async fn create_account(
        &self,
        input: CreateAccount,
        cancel: &CancelToken,
    ) -> Result<Account, StoreError> {
        cancel.check()?;
        if input.key.trim().is_empty() {
            return Err(StoreError::Validation("key must not be empty".into()));
        }
        let mut inner = self.inner.write().await;
        let clash = inner
            .accounts
            .values()
            .any(|r| r.deleted_at.is_none() && r.account.key == input.key);
        if clash {
            return Err(StoreError::Conflict(format!(
                "a live account with key {} already exists",
                input.key
            )));
        }
        let id = inner.next_account_id;
        inner.next_account_id += 1;
        let now = jiff::Timestamp::now();
        let account = Account {
            id,
            key: input.key,
            name: input.name,
            provider: input.provider,
            external_id: input.external_id,
            description: input.description,
            platform: input.platform,
            tier: input.tier,
            environment: input.environment,
            regions: input.regions,
            created_at: now,
            updated_at: now,
        };
        inner.accounts.insert(
            id,
            AccountRecord {
                account: account.clone(),
                deleted_at: None,
            },
        );
        Ok(account)
    }

    async fn get_account(&self, id: u64, cancel: &CancelToken) -> Result<Account, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        Ok(live_account(&inner, id)?.account.clone())
    }

    async fn update_account(
        &self,
        id: u64,
        patch: AccountPatch,
        cancel: &CancelToken,
    ) -> Result<Account, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_account(&inner, id)?;
        let record = inner.accounts.get_mut(&id).expect("checked live above");
        if let Some(name) = patch.name {
            record.account.name = name;
        }
        if let Some(provider) = patch.provider {
            record.account.provider = provider;
        }
        if let Some(external_id) = patch.external_id {
            record.account.external_id = external_id;
        }
        if let Some(description) = patch.description {
            record.account.description = description;
        }
        if let Some(platform) = patch.platform {
            record.account.platform = platform;
        }
        if let Some(tier) = patch.tier {
            record.account.tier = tier;
        }
        if let Some(environment) = patch.environment {
            record.account.environment = environment;
        }
        if let Some(regions) = patch.regions {
            record.account.regions = regions;
        }
        record.account.updated_at = jiff::Timestamp::now();
        Ok(record.account.clone())
    }

    async fn delete_account(&self, id: u64, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_account(&inner, id)?;
        let referenced = inner
            .pools
            .values()
            .any(|r| r.deleted_at.is_none() && r.pool.account_id == Some(id));
        if referenced {
            return Err(StoreError::Conflict(format!(
                "account {id} is referenced by a live pool"
            )));
        }
        inner.accounts.get_mut(&id).unwrap().deleted_at = Some(jiff::Timestamp::now());
        Ok(())
    }

    async fn delete_account_cascade(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_account(&inner, id)?;

        let owned: Vec<u64> = inner
            .pools
            .values()
            .filter(|r| r.deleted_at.is_none() && r.pool.account_id == Some(id))
            .map(|r| r.pool.id)
            .collect();

        let mut removed: HashSet<u64> = HashSet::new();
        for pid in owned {
            removed.insert(pid);
            for d in descendant_ids(&inner, pid) {
                removed.insert(d);
            }
        }

        let now = jiff::Timestamp::now();
        for pid in &removed {
            if let Some(record) = inner.pools.get_mut(pid) {
                record.deleted_at = Some(now);
            }
        }
        inner.accounts.get_mut(&id).unwrap().deleted_at = Some(now);

        info!(account_id = id, removed = removed.len(), "cascaded account delete");
        Ok(removed.into_iter().collect())
    }

    // -- Discovered resources ---------------------------------------------

    async fn list_resources(
        &self,
        account_id: u64,
        filter: ResourceFilter,
        page: Page,
        cancel: &CancelToken,
    ) -> Result<PagedResult<DiscoveredResource>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        let mut items: Vec<DiscoveredResource> = inner
            .resources
            .values()
            .filter(|r| r.account_id == account_id)
            .filter(|r| filter.resource_type.is_none_or(|t| t == r.resource_type))
            .filter(|r| filter.status.is_none_or(|s| s == r.status))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(page.apply(items))
    }

    async fn get_resource(
        &self,
        id: Uuid,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        inner
            .resources
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("resource", id.to_string()))
    }

    async fn upsert_resource(
        &self,
        mut input: DiscoveredResource,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let existing_id = inner
            .resources
            .values()
            .find(|r| r.account_id == input.account_id && r.resource_id == input.resource_id)
            .map(|r| r.id);

        if let Some(existing_id) = existing_id {
            let existing = inner.resources.get(&existing_id).unwrap().clone();
            input.id = existing.id;
            input.pool_id = existing.pool_id;
            input.discovered_at = existing.discovered_at;
        }

        inner.resources.insert(input.id, input.clone());
        Ok(input)
    }

    async fn mark_stale_resources(
        &self,
        account_id: u64,
        before: jiff::Timestamp,
        cancel: &CancelToken,
    ) -> Result<u64, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let mut count = 0u64;
        for r in inner.resources.values_mut() {
            if r.account_id == account_id && r.status == ResourceStatus::Active && r.last_seen_at < before {
                r.status = ResourceStatus::Stale;
                count += 1;
            }
        }
        if count > 0 {
            warn!(account_id, count, "aged discovered resources out to stale");
        }
        Ok(count)
    }

    async fn link_resource(
        &self,
        id: Uuid,
        pool_id: u64,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        live_pool(&inner, pool_id)?;
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("resource", id.to_string()))?;
        resource.pool_id = Some(pool_id);
        Ok(resource.clone())
    }

    async fn unlink_resource(
        &self,
        id: Uuid,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("resource", id.to_string()))?;
        resource.pool_id = None;
        Ok(resource.clone())
    }

    async fn delete_resource(&self, id: Uuid, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        inner
            .resources
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("resource", id.to_string()))?;
        Ok(())
    }

    // -- Sync jobs ---------------------------------------------------------

    async fn create_sync_job(
        &self,
        input: CreateSyncJob,
        cancel: &CancelToken,
    ) -> Result<SyncJob, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let id = Uuid::new_v4();
        let job = SyncJob {
            id,
            account_id: input.account_id,
            status: SyncJobStatus::Running,
            started_at: jiff::Timestamp::now(),
            finished_at: None,
            found: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            error_message: None,
        };
        inner.sync_jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn update_sync_job(
        &self,
        id: Uuid,
        patch: SyncJobPatch,
        cancel: &CancelToken,
    ) -> Result<SyncJob, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let job = inner
            .sync_jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("sync_job", id.to_string()))?;
        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(finished_at) = patch.finished_at {
            job.finished_at = Some(finished_at);
        }
        if let Some(found) = patch.found {
            job.found = found;
        }
        if let Some(created) = patch.created {
            job.created = created;
        }
        if let Some(updated) = patch.updated {
            job.updated = updated;
        }
        if let Some(deleted) = patch.deleted {
            job.deleted = deleted;
        }
        if let Some(error_message) = patch.error_message {
            job.error_message = error_message;
        }
        Ok(job.clone())
    }

    async fn get_sync_job(&self, id: Uuid, cancel: &CancelToken) -> Result<SyncJob, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        inner
            .sync_jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("sync_job", id.to_string()))
    }

    async fn list_sync_jobs(
        &self,
        account_id: u64,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<SyncJob>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        let mut jobs: Vec<SyncJob> = inner
            .sync_jobs
            .values()
            .filter(|j| j.account_id == account_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if limit > 0 {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    // -- Recommendations -----------------------------------------------

    async fn create_recommendation(
        &self,
        input: CreateRecommendation,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let now = jiff::Timestamp::now();
        let rec = Recommendation {
            id: input.id,
            pool_id: input.pool_id,
            rec_type: input.rec_type,
            status: RecommendationStatus::Pending,
            priority: input.priority,
            score: input.score,
            suggested_cidr: input.suggested_cidr,
            rule_id: input.rule_id,
            title: input.title,
            description: input.description,
            applied_pool_id: None,
            dismiss_reason: None,
            created_at: now,
            updated_at: now,
        };
        inner.recommendations.insert(rec.id.clone(), rec.clone());
        Ok(rec)
    }

    async fn get_recommendation(
        &self,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        inner
            .recommendations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("recommendation", id.to_string()))
    }

    async fn list_recommendations(
        &self,
        filter: RecommendationFilter,
        page: Page,
        cancel: &CancelToken,
    ) -> Result<PagedResult<Recommendation>, StoreError> {
        cancel.check()?;
        let inner = self.inner.read().await;
        let mut items: Vec<Recommendation> = inner
            .recommendations
            .values()
            .filter(|r| filter.pool_id.is_none_or(|p| p == r.pool_id))
            .filter(|r| filter.status.is_none_or(|s| s == r.status))
            .filter(|r| filter.rec_type.is_none_or(|t| t == r.rec_type))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(page.apply(items))
    }

    async fn update_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        dismiss_reason: Option<String>,
        applied_pool_id: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let rec = inner
            .recommendations
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("recommendation", id.to_string()))?;
        if rec.status != RecommendationStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "recommendation {id} is not pending"
            )));
        }
        rec.status = status;
        if dismiss_reason.is_some() {
            rec.dismiss_reason = dismiss_reason;
        }
        if applied_pool_id.is_some() {
            rec.applied_pool_id = applied_pool_id;
        }
        rec.updated_at = jiff::Timestamp::now();
        Ok(rec.clone())
    }

    async fn delete_pending_for_pool(
        &self,
        pool_id: u64,
        cancel: &CancelToken,
    ) -> Result<u64, StoreError> {
        cancel.check()?;
        let mut inner = self.inner.write().await;
        let to_remove: Vec<String> = inner
            .recommendations
            .values()
            .filter(|r| r.pool_id == pool_id && r.status == RecommendationStatus::Pending)
            .map(|r| r.id.clone())
            .collect();
        let count = to_remove.len() as u64;
        for id in to_remove {
            inner.recommendations.remove(&id);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreatePool, PoolPatch};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    fn pool(cidr: &str, parent_id: Option<u64>) -> CreatePool {
        CreatePool {
            name: "test".into(),
            cidr: cidr.into(),
            parent_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_pool_rejects_empty_name_or_cidr() {
        let store = MemoryStore::new();
        let empty_name = CreatePool {
            name: String::new(),
            cidr: "10.0.0.0/24".into(),
            ..Default::default()
        };
        let err = store.create_pool(empty_name, &cancel()).await.unwrap_err();
        assert!(err.is_validation());

        let empty_cidr = CreatePool {
            name: "x".into(),
            cidr: String::new(),
            ..Default::default()
        };
        let err = store.create_pool(empty_cidr, &cancel()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn create_pool_rejects_prefix_outside_8_to_30() {
        let store = MemoryStore::new();
        let too_broad = store
            .create_pool(pool("10.0.0.0/1", None), &cancel())
            .await
            .unwrap_err();
        assert!(too_broad.is_validation());

        let too_narrow = store
            .create_pool(pool("10.0.0.0/31", None), &cancel())
            .await
            .unwrap_err();
        assert!(too_narrow.is_validation());

        let edges_ok = store.create_pool(pool("10.0.0.0/8", None), &cancel()).await;
        assert!(edges_ok.is_ok());
    }

    #[tokio::test]
    async fn update_pool_rejects_cidr_patch_outside_8_to_30() {
        let store = MemoryStore::new();
        let created = store
            .create_pool(pool("10.0.0.0/24", None), &cancel())
            .await
            .unwrap();

        let err = store
            .update_pool(
                created.id,
                PoolPatch {
                    cidr: Some("10.0.0.0/31".into()),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn delete_pool_with_live_child_conflicts_cascade_succeeds() {
        let store = MemoryStore::new();
        let parent = store
            .create_pool(pool("10.0.0.0/16", None), &cancel())
            .await
            .unwrap();
        let child = store
            .create_pool(pool("10.0.0.0/24", Some(parent.id)), &cancel())
            .await
            .unwrap();

        let err = store.delete_pool(parent.id, &cancel()).await.unwrap_err();
        assert!(err.is_conflict());

        let removed = store
            .delete_pool_cascade(parent.id, &cancel())
            .await
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&parent.id));
        assert!(removed.contains(&child.id));

        assert!(store.get_pool(parent.id, &cancel()).await.is_err());
        assert!(store.get_pool(child.id, &cancel()).await.is_err());
    }

    #[tokio::test]
    async fn soft_deleted_cidr_can_be_reused() {
        let store = MemoryStore::new();
        let first = store
            .create_pool(pool("10.0.0.0/24", None), &cancel())
            .await
            .unwrap();
        store.delete_pool(first.id, &cancel()).await.unwrap();

        let second = store
            .create_pool(pool("10.0.0.0/24", None), &cancel())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let listed = store.list_pools(&cancel()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn delete_account_cascade_leaves_unrelated_pools_intact() {
        let store = MemoryStore::new();
        let account = store
            .create_account(
                CreateAccount {
                    key: "aws:123".into(),
                    name: "a".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();
        let owned = store
            .create_pool(
                CreatePool {
                    account_id: Some(account.id),
                    ..pool("10.0.0.0/16", None)
                },
                &cancel(),
            )
            .await
            .unwrap();
        let owned_child = store
            .create_pool(pool("10.0.0.0/24", Some(owned.id)), &cancel())
            .await
            .unwrap();
        let unrelated = store
            .create_pool(pool("10.1.0.0/24", None), &cancel())
            .await
            .unwrap();

        let err = store.delete_account(account.id, &cancel()).await.unwrap_err();
        assert!(err.is_conflict());

        let removed = store
            .delete_account_cascade(account.id, &cancel())
            .await
            .unwrap();
        assert!(removed.contains(&owned.id));
        assert!(removed.contains(&owned_child.id));
        assert!(!removed.contains(&unrelated.id));

        assert!(store.get_account(account.id, &cancel()).await.is_err());
        assert!(store.get_pool(unrelated.id, &cancel()).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_creates_yield_distinct_ids() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .create_pool(pool(&format!("10.{i}.0.0/24"), None), &CancelToken::never())
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for h in handles {
            let p = h.await.unwrap();
            ids.insert(p.id);
        }
        assert_eq!(ids.len(), 32);
    }

    #[tokio::test]
    async fn upsert_preserves_id_and_pool_id() {
        use cloudpam_core::models::resource::ResourceType;

        let store = MemoryStore::new();
        let parent = store
            .create_pool(pool("10.0.0.0/16", None), &cancel())
            .await
            .unwrap();

        let now = jiff::Timestamp::now();
        let first = DiscoveredResource {
            id: Uuid::new_v4(),
            account_id: 1,
            resource_id: "vpc-abc".into(),
            resource_type: ResourceType::Vpc,
            cidr: Some("10.0.0.0/16".into()),
            region: Some("us-east-1".into()),
            name: None,
            discovered_at: now,
            last_seen_at: now,
            status: ResourceStatus::Active,
            pool_id: None,
        };
        let created = store.upsert_resource(first, &cancel()).await.unwrap();
        store
            .link_resource(created.id, parent.id, &cancel())
            .await
            .unwrap();

        let later = now + std::time::Duration::from_secs(60);
        let second = DiscoveredResource {
            id: Uuid::new_v4(),
            pool_id: None,
            last_seen_at: later,
            ..{
                let mut r = store.get_resource(created.id, &cancel()).await.unwrap();
                r.last_seen_at = later;
                r
            }
        };
        let upserted = store.upsert_resource(second, &cancel()).await.unwrap();

        assert_eq!(upserted.id, created.id);
        assert_eq!(upserted.pool_id, Some(parent.id));
        assert_eq!(upserted.discovered_at, now);
    }

    #[tokio::test]
    async fn mark_stale_flips_only_expired_active_resources() {
        use cloudpam_core::models::resource::ResourceType;

        let store = MemoryStore::new();
        let t0 = jiff::Timestamp::now();
        let stale_cutoff = t0 + std::time::Duration::from_secs(100);

        let make = |resource_id: &str, last_seen_at: jiff::Timestamp| DiscoveredResource {
            id: Uuid::new_v4(),
            account_id: 7,
            resource_id: resource_id.into(),
            resource_type: ResourceType::Subnet,
            cidr: None,
            region: None,
            name: None,
            discovered_at: t0,
            last_seen_at,
            status: ResourceStatus::Active,
            pool_id: None,
        };

        store
            .upsert_resource(make("r1", t0), &cancel())
            .await
            .unwrap();
        store
            .upsert_resource(make("r2", t0 + std::time::Duration::from_secs(200)), &cancel())
            .await
            .unwrap();

        let flipped = store
            .mark_stale_resources(7, stale_cutoff, &cancel())
            .await
            .unwrap();
        assert_eq!(flipped, 1);

        let resources = store
            .list_resources(7, ResourceFilter::default(), Page::all(), &cancel())
            .await
            .unwrap();
        let stale_count = resources
            .items
            .iter()
            .filter(|r| r.status == ResourceStatus::Stale)
            .count();
        assert_eq!(stale_count, 1);
    }
}
