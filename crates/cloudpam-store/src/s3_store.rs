//! Transactional S3-backed [`Store`] implementation.
//!
//! One JSON object per entity (key layout in
//! `cloudpam_core::s3_keys`). Mutations use ETag `If-Match`/`If-None-Match`
//! preconditions (see `objects.rs`) with a bounded retry loop on conflict —
//! this gives per-object atomicity but, unlike `MemoryStore`, cascade
//! operations that touch several objects are NOT atomic across objects:
//! a crash mid-cascade can leave a partially soft-deleted subtree. Callers
//! that need strict cross-object atomicity should prefer `MemoryStore` or
//! retry the cascade call, which is safe since every step is idempotent.

use std::collections::HashMap;

use aws_sdk_s3::Client;
use async_trait::async_trait;
use cloudpam_core::cidr::Cidr;
use cloudpam_core::models::pool::{Pool, PoolUtilization, PoolWithStats};
use cloudpam_core::models::recommendation::RecommendationStatus;
use cloudpam_core::models::resource::{DiscoveredResource, ResourceStatus};
use cloudpam_core::models::sync_job::SyncJobStatus;
use cloudpam_core::models::{Account, Recommendation, SyncJob};
use cloudpam_core::s3_keys;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::StoreError;
use crate::objects;
use crate::state::{load_state, save_state, save_state_if_match};
use crate::store_trait::Store;
use crate::types::{
    AccountPatch, CreateAccount, CreatePool, CreateRecommendation, CreateSyncJob, Page,
    PagedResult, PoolPatch, RecommendationFilter, ResourceFilter, SyncJobPatch,
};

const MAX_RETRIES: u32 = 8;

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

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPool {
    #[serde(flatten)]
    pool: Pool,
    deleted_at: Option<jiff::Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    #[serde(flatten)]
    account: Account,
    deleted_at: Option<jiff::Timestamp>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdCounter {
    next: u64,
}

/// S3-backed implementation of [`Store`].
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn next_id(&self, kind: &str) -> Result<u64, StoreError> {
        let key = s3_keys::id_counter(kind);
        for _ in 0..MAX_RETRIES {
            let (counter, etag): (IdCounter, String) =
                match load_state::<IdCounter>(&self.client, &self.bucket, &key).await {
                    Ok(pair) => pair,
                    Err(crate::error::ObjectError::NotFound { .. }) => {
                        let initial = IdCounter { next: 1 };
                        match objects::put_object_if_absent(
                            &self.client,
                            &self.bucket,
                            &key,
                            serde_json::to_vec(&initial)?,
                        )
                        .await
                        {
                            Ok(_) => continue,
                            Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    Err(e) => return Err(e.into()),
                };
            let issued = counter.next;
            let bumped = IdCounter { next: issued + 1 };
            match save_state_if_match(&self.client, &self.bucket, &key, &bumped, &etag).await {
                Ok(_) => return Ok(issued),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Backend(format!(
            "exhausted retries allocating id for {kind}"
        )))
    }

    async fn list_all_pools(&self) -> Result<Vec<StoredPool>, StoreError> {
        let keys = objects::list_objects(&self.client, &self.bucket, s3_keys::POOLS_PREFIX)
            .await
            .map_err(StoreError::from)?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let (stored, _etag) = load_state::<StoredPool>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
            out.push(stored);
        }
        Ok(out)
    }

    async fn list_all_accounts(&self) -> Result<Vec<StoredAccount>, StoreError> {
        let keys = objects::list_objects(&self.client, &self.bucket, s3_keys::ACCOUNTS_PREFIX)
            .await
            .map_err(StoreError::from)?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let (stored, _etag) = load_state::<StoredAccount>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
            out.push(stored);
        }
        Ok(out)
    }

    async fn load_live_pool(&self, id: u64) -> Result<(StoredPool, String), StoreError> {
        let key = s3_keys::pool(id);
        let (stored, etag) = load_state::<StoredPool>(&self.client, &self.bucket, &key)
            .await
            .map_err(StoreError::from)?;
        if stored.deleted_at.is_some() {
            return Err(StoreError::not_found("pool", id.to_string()));
        }
        Ok((stored, etag))
    }

    async fn load_live_account(&self, id: u64) -> Result<(StoredAccount, String), StoreError> {
        let key = s3_keys::account(id);
        let (stored, etag) = load_state::<StoredAccount>(&self.client, &self.bucket, &key)
            .await
            .map_err(StoreError::from)?;
        if stored.deleted_at.is_some() {
            return Err(StoreError::not_found("account", id.to_string()));
        }
        Ok((stored, etag))
    }

    async fn direct_children(&self, id: u64) -> Result<Vec<Pool>, StoreError> {
        Ok(self
            .list_all_pools()
            .await?
            .into_iter()
            .filter(|r| r.deleted_at.is_none() && r.pool.parent_id == Some(id))
            .map(|r| r.pool)
            .collect())
    }

    async fn descendant_ids(&self, id: u64) -> Result<Vec<u64>, StoreError> {
        let all = self.list_all_pools().await?;
        let mut out = Vec::new();
        let mut frontier = vec![id];
        while let Some(cur) = frontier.pop() {
            for r in &all {
                if r.deleted_at.is_none() && r.pool.parent_id == Some(cur) {
                    out.push(r.pool.id);
                    frontier.push(r.pool.id);
                }
            }
        }
        Ok(out)
    }

    async fn utilization_for(&self, pool: &Pool) -> Result<PoolUtilization, StoreError> {
        let prefix = Cidr::parse(&pool.cidr)
            .map_err(|e| StoreError::Backend(format!("stored pool has invalid cidr: {e}")))?;
        let total = prefix.address_count();
        let children = self.direct_children(pool.id).await?;
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
            child_count: self.descendant_ids(pool.id).await?.len(),
            direct_children: children.len(),
        })
    }

    async fn pool_with_stats_deep(&self, pool: &Pool) -> Result<PoolWithStats, StoreError> {
        let stats = self.utilization_for(pool).await?;
        let mut children = Vec::new();
        for child in self.direct_children(pool.id).await? {
            children.push(Box::pin(self.pool_with_stats_deep(&child)).await?);
        }
        Ok(PoolWithStats {
            pool: pool.clone(),
            stats,
            children,
        })
    }

    async fn check_cidr_unique(
        &self,
        normalized_cidr: &str,
        parent_id: Option<u64>,
        exclude_id: Option<u64>,
    ) -> Result<(), StoreError> {
        let clash = self.list_all_pools().await?.into_iter().any(|r| {
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
}

#[async_trait]
impl Store for S3Store {
    async fn list_pools(&self, cancel: &CancelToken) -> Result<Vec<Pool>, StoreError> {
        cancel.check()?;
        Ok(self
            .list_all_pools()
            .await?
            .into_iter()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| r.pool)
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

        if let Some(pid) = input.parent_id {
            self.load_live_pool(pid).await?;
        }
        if let Some(aid) = input.account_id {
            self.load_live_account(aid).await?;
        }
        self.check_cidr_unique(&normalized, input.parent_id, None)
            .await?;

        let id = self.next_id("pool").await?;
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
        let stored = StoredPool {
            pool: pool.clone(),
            deleted_at: None,
        };
        save_state(&self.client, &self.bucket, &s3_keys::pool(id), &stored)
            .await
            .map_err(StoreError::from)?;
        Ok(pool)
    }

    async fn get_pool(&self, id: u64, cancel: &CancelToken) -> Result<Pool, StoreError> {
        cancel.check()?;
        Ok(self.load_live_pool(id).await?.0.pool)
    }

    async fn update_pool(
        &self,
        id: u64,
        patch: PoolPatch,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_pool(id).await?;

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
                    self.load_live_pool(new_pid).await?;
                    let mut cursor = Some(new_pid);
                    while let Some(cur) = cursor {
                        if cur == id {
                            return Err(StoreError::Conflict(
                                "reparenting would create a cycle".into(),
                            ));
                        }
                        cursor = self.load_live_pool(cur).await.ok().and_then(|(s, _)| s.pool.parent_id);
                    }
                    Some(Some(new_pid))
                }
                Some(None) => Some(None),
                None => None,
            };

            let effective_cidr = new_cidr.clone().unwrap_or_else(|| stored.pool.cidr.clone());
            let effective_parent = match new_parent {
                Some(p) => p,
                None => stored.pool.parent_id,
            };
            self.check_cidr_unique(&effective_cidr, effective_parent, Some(id))
                .await?;

            if let Some(name) = patch.name.clone() {
                stored.pool.name = name;
            }
            if let Some(cidr) = new_cidr {
                stored.pool.cidr = cidr;
            }
            if let Some(parent) = new_parent {
                stored.pool.parent_id = parent;
            }
            if let Some(pool_type) = patch.pool_type {
                stored.pool.pool_type = pool_type;
            }
            if let Some(status) = patch.status {
                stored.pool.status = status;
            }
            stored.pool.updated_at = jiff::Timestamp::now();

            match save_state_if_match(&self.client, &self.bucket, &s3_keys::pool(id), &stored, &etag)
                .await
            {
                Ok(_) => return Ok(stored.pool),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries updating pool {id}"
        )))
    }

    async fn update_pool_account(
        &self,
        id: u64,
        account_id: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        if let Some(aid) = account_id {
            self.load_live_account(aid).await?;
        }
        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_pool(id).await?;
            stored.pool.account_id = account_id;
            stored.pool.updated_at = jiff::Timestamp::now();
            match save_state_if_match(&self.client, &self.bucket, &s3_keys::pool(id), &stored, &etag)
                .await
            {
                Ok(_) => return Ok(stored.pool),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries updating pool {id}"
        )))
    }

    async fn update_pool_meta(
        &self,
        id: u64,
        description: Option<String>,
        tags: Option<HashMap<String, String>>,
        cancel: &CancelToken,
    ) -> Result<Pool, StoreError> {
        cancel.check()?;
        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_pool(id).await?;
            if let Some(description) = description.clone() {
                stored.pool.description = description;
            }
            if let Some(tags) = tags.clone() {
                stored.pool.tags = tags;
            }
            stored.pool.updated_at = jiff::Timestamp::now();
            match save_state_if_match(&self.client, &self.bucket, &s3_keys::pool(id), &stored, &etag)
                .await
            {
                Ok(_) => return Ok(stored.pool),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries updating pool {id}"
        )))
    }

    async fn delete_pool(&self, id: u64, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_pool(id).await?;
            if !self.direct_children(id).await?.is_empty() {
                return Err(StoreError::Conflict(format!("pool {id} has live children")));
            }
            stored.deleted_at = Some(jiff::Timestamp::now());
            match save_state_if_match(&self.client, &self.bucket, &s3_keys::pool(id), &stored, &etag)
                .await
            {
                Ok(_) => return Ok(()),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries deleting pool {id}"
        )))
    }

    async fn delete_pool_cascade(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>, StoreError> {
        cancel.check()?;
        self.load_live_pool(id).await?;
        let mut removed = self.descendant_ids(id).await?;
        removed.push(id);
        let now = jiff::Timestamp::now();
        for pid in &removed {
            for _ in 0..MAX_RETRIES {
                let key = s3_keys::pool(*pid);
                let (mut stored, etag) = match load_state::<StoredPool>(&self.client, &self.bucket, &key)
                    .await
                {
                    Ok(pair) => pair,
                    Err(e) => return Err(e.into()),
                };
                if stored.deleted_at.is_some() {
                    break;
                }
                stored.deleted_at = Some(now);
                match save_state_if_match(&self.client, &self.bucket, &key, &stored, &etag).await {
                    Ok(_) => break,
                    Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }

    async fn get_children(&self, id: u64, cancel: &CancelToken) -> Result<Vec<Pool>, StoreError> {
        cancel.check()?;
        self.load_live_pool(id).await?;
        self.direct_children(id).await
    }

    async fn get_hierarchy(
        &self,
        root: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<Vec<PoolWithStats>, StoreError> {
        cancel.check()?;
        match root {
            Some(id) => {
                let pool = self.load_live_pool(id).await?.0.pool;
                Ok(vec![self.pool_with_stats_deep(&pool).await?])
            }
            None => {
                let roots: Vec<Pool> = self
                    .list_all_pools()
                    .await?
                    .into_iter()
                    .filter(|r| r.deleted_at.is_none() && r.pool.parent_id.is_none())
                    .map(|r| r.pool)
                    .collect();
                let mut out = Vec::with_capacity(roots.len());
                for pool in &roots {
                    out.push(self.pool_with_stats_deep(pool).await?);
                }
                Ok(out)
            }
        }
    }

    async fn get_pool_with_stats(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<PoolWithStats, StoreError> {
        cancel.check()?;
        let pool = self.load_live_pool(id).await?.0.pool;
        let stats = self.utilization_for(&pool).await?;
        let mut children = Vec::new();
        for child in self.direct_children(pool.id).await? {
            let child_stats = self.utilization_for(&child).await?;
            children.push(PoolWithStats {
                pool: child,
                stats: child_stats,
                children: Vec::new(),
            });
        }
        Ok(PoolWithStats {
            pool,
            stats,
            children,
        })
    }

    async fn calculate_pool_utilization(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<PoolUtilization, StoreError> {
        cancel.check()?;
        let pool = self.load_live_pool(id).await?.0.pool;
        self.utilization_for(&pool).await
    }

    // -- Accounts --------------------------------------------------------

    async fn list_accounts(&self, cancel: &CancelToken) -> Result<Vec<Account>, StoreError> {
        cancel.check()?;
        Ok(self
            .list_all_accounts()
            .await?
            .into_iter()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| r.account)
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
        let clash = self
            .list_all_accounts()
            .await?
            .into_iter()
            .any(|r| r.deleted_at.is_none() && r.account.key == input.key);
        if clash {
            return Err(StoreError::Conflict(format!(
                "a live account with key {} already exists",
                input.key
            )));
        }
        let id = self.next_id("account").await?;
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
        let stored = StoredAccount {
            account: account.clone(),
            deleted_at: None,
        };
        save_state(&self.client, &self.bucket, &s3_keys::account(id), &stored)
            .await
            .map_err(StoreError::from)?;
        Ok(account)
    }

    async fn get_account(&self, id: u64, cancel: &CancelToken) -> Result<Account, StoreError> {
        cancel.check()?;
        Ok(self.load_live_account(id).await?.0.account)
    }

    async fn update_account(
        &self,
        id: u64,
        patch: AccountPatch,
        cancel: &CancelToken,
    ) -> Result<Account, StoreError> {
        cancel.check()?;
        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_account(id).await?;
            if let Some(name) = patch.name.clone() {
                stored.account.name = name;
            }
            if let Some(provider) = patch.provider.clone() {
                stored.account.provider = provider;
            }
            if let Some(external_id) = patch.external_id.clone() {
                stored.account.external_id = external_id;
            }
            if let Some(description) = patch.description.clone() {
                stored.account.description = description;
            }
            if let Some(platform) = patch.platform.clone() {
                stored.account.platform = platform;
            }
            if let Some(tier) = patch.tier.clone() {
                stored.account.tier = tier;
            }
            if let Some(environment) = patch.environment.clone() {
                stored.account.environment = environment;
            }
            if let Some(regions) = patch.regions.clone() {
                stored.account.regions = regions;
            }
            stored.account.updated_at = jiff::Timestamp::now();
            match save_state_if_match(
                &self.client,
                &self.bucket,
                &s3_keys::account(id),
                &stored,
                &etag,
            )
            .await
            {
                Ok(_) => return Ok(stored.account),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries updating account {id}"
        )))
    }

    async fn delete_account(&self, id: u64, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_account(id).await?;
            let referenced = self
                .list_all_pools()
                .await?
                .into_iter()
                .any(|r| r.deleted_at.is_none() && r.pool.account_id == Some(id));
            if referenced {
                return Err(StoreError::Conflict(format!(
                    "account {id} is referenced by a live pool"
                )));
            }
            stored.deleted_at = Some(jiff::Timestamp::now());
            match save_state_if_match(
                &self.client,
                &self.bucket,
                &s3_keys::account(id),
                &stored,
                &etag,
            )
            .await
            {
                Ok(_) => return Ok(()),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries deleting account {id}"
        )))
    }

    async fn delete_account_cascade(
        &self,
        id: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>, StoreError> {
        cancel.check()?;
        self.load_live_account(id).await?;

        let owned: Vec<u64> = self
            .list_all_pools()
            .await?
            .into_iter()
            .filter(|r| r.deleted_at.is_none() && r.pool.account_id == Some(id))
            .map(|r| r.pool.id)
            .collect();

        let mut removed = std::collections::HashSet::new();
        for pid in owned {
            removed.insert(pid);
            for d in self.descendant_ids(pid).await? {
                removed.insert(d);
            }
        }

        let now = jiff::Timestamp::now();
        for pid in &removed {
            for _ in 0..MAX_RETRIES {
                let key = s3_keys::pool(*pid);
                let (mut stored, etag) = match load_state::<StoredPool>(&self.client, &self.bucket, &key)
                    .await
                {
                    Ok(pair) => pair,
                    Err(e) => return Err(e.into()),
                };
                if stored.deleted_at.is_some() {
                    break;
                }
                stored.deleted_at = Some(now);
                match save_state_if_match(&self.client, &self.bucket, &key, &stored, &etag).await {
                    Ok(_) => break,
                    Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        for _ in 0..MAX_RETRIES {
            let (mut stored, etag) = self.load_live_account(id).await?;
            stored.deleted_at = Some(now);
            match save_state_if_match(
                &self.client,
                &self.bucket,
                &s3_keys::account(id),
                &stored,
                &etag,
            )
            .await
            {
                Ok(_) => break,
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

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
        let keys = objects::list_objects(
            &self.client,
            &self.bucket,
            &s3_keys::resources_prefix(account_id),
        )
        .await
        .map_err(StoreError::from)?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let (resource, _etag) =
                load_state::<DiscoveredResource>(&self.client, &self.bucket, &key)
                    .await
                    .map_err(StoreError::from)?;
            if filter.resource_type.is_none_or(|t| t == resource.resource_type)
                && filter.status.is_none_or(|s| s == resource.status)
            {
                items.push(resource);
            }
        }
        items.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(page.apply(items))
    }

    async fn get_resource(
        &self,
        id: Uuid,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        // Resources are keyed by (account_id, id); without the account_id we
        // have to scan. Callers on the hot path know the account_id and
        // should prefer `list_resources` + local lookup.
        let keys = objects::list_objects(&self.client, &self.bucket, "resources/")
            .await
            .map_err(StoreError::from)?;
        for key in keys {
            if key.ends_with(&format!("/{id}.json")) {
                let (resource, _etag) =
                    load_state::<DiscoveredResource>(&self.client, &self.bucket, &key)
                        .await
                        .map_err(StoreError::from)?;
                return Ok(resource);
            }
        }
        Err(StoreError::not_found("resource", id.to_string()))
    }

    async fn upsert_resource(
        &self,
        mut input: DiscoveredResource,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        let keys = objects::list_objects(
            &self.client,
            &self.bucket,
            &s3_keys::resources_prefix(input.account_id),
        )
        .await
        .map_err(StoreError::from)?;

        let mut existing = None;
        for key in keys {
            let (resource, etag) =
                load_state::<DiscoveredResource>(&self.client, &self.bucket, &key)
                    .await
                    .map_err(StoreError::from)?;
            if resource.resource_id == input.resource_id {
                existing = Some((resource, etag));
                break;
            }
        }

        if let Some((existing, _etag)) = existing {
            input.id = existing.id;
            input.pool_id = existing.pool_id;
            input.discovered_at = existing.discovered_at;
        }

        let key = s3_keys::resource(input.account_id, input.id);
        save_state(&self.client, &self.bucket, &key, &input)
            .await
            .map_err(StoreError::from)?;
        Ok(input)
    }

    async fn mark_stale_resources(
        &self,
        account_id: u64,
        before: jiff::Timestamp,
        cancel: &CancelToken,
    ) -> Result<u64, StoreError> {
        cancel.check()?;
        let keys = objects::list_objects(
            &self.client,
            &self.bucket,
            &s3_keys::resources_prefix(account_id),
        )
        .await
        .map_err(StoreError::from)?;
        let mut count = 0u64;
        for key in keys {
            for _ in 0..MAX_RETRIES {
                let (mut resource, etag) =
                    load_state::<DiscoveredResource>(&self.client, &self.bucket, &key)
                        .await
                        .map_err(StoreError::from)?;
                if resource.status != ResourceStatus::Active || resource.last_seen_at >= before {
                    break;
                }
                resource.status = ResourceStatus::Stale;
                match save_state_if_match(&self.client, &self.bucket, &key, &resource, &etag).await
                {
                    Ok(_) => {
                        count += 1;
                        break;
                    }
                    Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
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
        self.load_live_pool(pool_id).await?;
        let resource = self.get_resource(id, cancel).await?;
        let key = s3_keys::resource(resource.account_id, id);
        for _ in 0..MAX_RETRIES {
            let (mut resource, etag) =
                load_state::<DiscoveredResource>(&self.client, &self.bucket, &key)
                    .await
                    .map_err(StoreError::from)?;
            resource.pool_id = Some(pool_id);
            match save_state_if_match(&self.client, &self.bucket, &key, &resource, &etag).await {
                Ok(_) => return Ok(resource),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries linking resource {id}"
        )))
    }

    async fn unlink_resource(
        &self,
        id: Uuid,
        cancel: &CancelToken,
    ) -> Result<DiscoveredResource, StoreError> {
        cancel.check()?;
        let resource = self.get_resource(id, cancel).await?;
        let key = s3_keys::resource(resource.account_id, id);
        for _ in 0..MAX_RETRIES {
            let (mut resource, etag) =
                load_state::<DiscoveredResource>(&self.client, &self.bucket, &key)
                    .await
                    .map_err(StoreError::from)?;
            resource.pool_id = None;
            match save_state_if_match(&self.client, &self.bucket, &key, &resource, &etag).await {
                Ok(_) => return Ok(resource),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries unlinking resource {id}"
        )))
    }

    async fn delete_resource(&self, id: Uuid, cancel: &CancelToken) -> Result<(), StoreError> {
        cancel.check()?;
        let resource = self.get_resource(id, cancel).await?;
        let key = s3_keys::resource(resource.account_id, id);
        objects::delete_object(&self.client, &self.bucket, &key)
            .await
            .map_err(StoreError::from)
    }

    // -- Sync jobs ---------------------------------------------------------

    async fn create_sync_job(
        &self,
        input: CreateSyncJob,
        cancel: &CancelToken,
    ) -> Result<SyncJob, StoreError> {
        cancel.check()?;
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
        let key = s3_keys::sync_job(input.account_id, id);
        save_state(&self.client, &self.bucket, &key, &job)
            .await
            .map_err(StoreError::from)?;
        Ok(job)
    }

    async fn update_sync_job(
        &self,
        id: Uuid,
        patch: SyncJobPatch,
        cancel: &CancelToken,
    ) -> Result<SyncJob, StoreError> {
        cancel.check()?;
        let job = self.get_sync_job(id, cancel).await?;
        let key = s3_keys::sync_job(job.account_id, id);
        for _ in 0..MAX_RETRIES {
            let (mut job, etag) = load_state::<SyncJob>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
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
            if let Some(error_message) = patch.error_message.clone() {
                job.error_message = error_message;
            }
            match save_state_if_match(&self.client, &self.bucket, &key, &job, &etag).await {
                Ok(_) => return Ok(job),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries updating sync job {id}"
        )))
    }

    async fn get_sync_job(&self, id: Uuid, cancel: &CancelToken) -> Result<SyncJob, StoreError> {
        cancel.check()?;
        let keys = objects::list_objects(&self.client, &self.bucket, "sync_jobs/")
            .await
            .map_err(StoreError::from)?;
        for key in keys {
            if key.ends_with(&format!("/{id}.json")) {
                let (job, _etag) = load_state::<SyncJob>(&self.client, &self.bucket, &key)
                    .await
                    .map_err(StoreError::from)?;
                return Ok(job);
            }
        }
        Err(StoreError::not_found("sync_job", id.to_string()))
    }

    async fn list_sync_jobs(
        &self,
        account_id: u64,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<SyncJob>, StoreError> {
        cancel.check()?;
        let keys = objects::list_objects(
            &self.client,
            &self.bucket,
            &s3_keys::sync_jobs_prefix(account_id),
        )
        .await
        .map_err(StoreError::from)?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            let (job, _etag) = load_state::<SyncJob>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
            jobs.push(job);
        }
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
        let key = s3_keys::recommendation(&rec.id);
        save_state(&self.client, &self.bucket, &key, &rec)
            .await
            .map_err(StoreError::from)?;
        Ok(rec)
    }

    async fn get_recommendation(
        &self,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Recommendation, StoreError> {
        cancel.check()?;
        let key = s3_keys::recommendation(id);
        let (rec, _etag) = load_state::<Recommendation>(&self.client, &self.bucket, &key)
            .await
            .map_err(StoreError::from)?;
        Ok(rec)
    }

    async fn list_recommendations(
        &self,
        filter: RecommendationFilter,
        page: Page,
        cancel: &CancelToken,
    ) -> Result<PagedResult<Recommendation>, StoreError> {
        cancel.check()?;
        let keys = objects::list_objects(
            &self.client,
            &self.bucket,
            s3_keys::RECOMMENDATIONS_PREFIX,
        )
        .await
        .map_err(StoreError::from)?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let (rec, _etag) = load_state::<Recommendation>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
            if filter.pool_id.is_none_or(|p| p == rec.pool_id)
                && filter.status.is_none_or(|s| s == rec.status)
                && filter.rec_type.is_none_or(|t| t == rec.rec_type)
            {
                items.push(rec);
            }
        }
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
        let key = s3_keys::recommendation(id);
        for _ in 0..MAX_RETRIES {
            let (mut rec, etag) = load_state::<Recommendation>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
            if rec.status != RecommendationStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "recommendation {id} is not pending"
                )));
            }
            rec.status = status;
            if dismiss_reason.is_some() {
                rec.dismiss_reason = dismiss_reason.clone();
            }
            if applied_pool_id.is_some() {
                rec.applied_pool_id = applied_pool_id;
            }
            rec.updated_at = jiff::Timestamp::now();
            match save_state_if_match(&self.client, &self.bucket, &key, &rec, &etag).await {
                Ok(_) => return Ok(rec),
                Err(crate::error::ObjectError::PreconditionFailed { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!(
            "exhausted retries updating recommendation {id}"
        )))
    }

    async fn delete_pending_for_pool(
        &self,
        pool_id: u64,
        cancel: &CancelToken,
    ) -> Result<u64, StoreError> {
        cancel.check()?;
        let keys = objects::list_objects(
            &self.client,
            &self.bucket,
            s3_keys::RECOMMENDATIONS_PREFIX,
        )
        .await
        .map_err(StoreError::from)?;
        let mut count = 0u64;
        for key in keys {
            let (rec, _etag) = load_state::<Recommendation>(&self.client, &self.bucket, &key)
                .await
                .map_err(StoreError::from)?;
            if rec.pool_id == pool_id && rec.status == RecommendationStatus::Pending {
                objects::delete_object(&self.client, &self.bucket, &key)
                    .await
                    .map_err(StoreError::from)?;
                count += 1;
            }
        }
        Ok(count)
    }
}
