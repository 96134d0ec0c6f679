//! The sync-run state machine: invoke a collector, reconcile
//! its output into the resource table, age out what it no longer reports.

use std::collections::HashSet;

use cloudpam_store::types::{CreateSyncJob, Page, ResourceFilter, SyncJobPatch};
use cloudpam_store::{CancelToken, Store};
use cloudpam_core::models::sync_job::{SyncJob, SyncJobStatus};
use tracing::{info, warn};

use crate::collector::Collector;
use crate::error::DiscoveryError;

/// Run one sync pass for `account_id` across `regions`.
///
/// 1. Creates a `running` sync job.
/// 2. Invokes the collector; every returned resource is upserted by
///    `(account_id, resource_id)`.
/// 3. Calls `MarkStaleResources(account_id, started_at)` so any resource not
///    re-observed in this pass ages out.
/// 4. Finalizes the job as `completed` or `failed`.
///
/// Collector failures never propagate to the caller: they are recorded in
/// the job's `error_message` and the job still completes in a terminal
/// state.
pub async fn run_sync(
    store: &dyn Store,
    collector: &dyn Collector,
    account_id: u64,
    regions: &[String],
    cancel: &CancelToken,
) -> Result<SyncJob, DiscoveryError> {
    let job = store
        .create_sync_job(CreateSyncJob { account_id }, cancel)
        .await
        .map_err(|e| DiscoveryError::store(format!("create sync job for account {account_id}"), e))?;
    let started_at = job.started_at;

    let existing_ids: HashSet<String> = store
        .list_resources(account_id, ResourceFilter::default(), Page::all(), cancel)
        .await
        .map_err(|e| DiscoveryError::store(format!("list resources for account {account_id}"), e))?
        .items
        .into_iter()
        .map(|r| r.resource_id)
        .collect();

    let patch = match collector.collect(account_id, regions, None, cancel).await {
        Ok(resources) => {
            let mut found = 0u64;
            let mut created = 0u64;
            let mut updated = 0u64;
            for resource in resources {
                found += 1;
                if existing_ids.contains(&resource.resource_id) {
                    updated += 1;
                } else {
                    created += 1;
                }
                store
                    .upsert_resource(resource, cancel)
                    .await
                    .map_err(|e| DiscoveryError::store(format!("upsert resource for account {account_id}"), e))?;
            }

            let aged_out = store
                .mark_stale_resources(account_id, started_at, cancel)
                .await
                .map_err(|e| DiscoveryError::store(format!("age out stale resources for account {account_id}"), e))?;

            info!(account_id, found, created, updated, aged_out, "sync run completed");
            SyncJobPatch {
                status: Some(SyncJobStatus::Completed),
                finished_at: Some(jiff_now(cancel)?),
                found: Some(found),
                created: Some(created),
                updated: Some(updated),
                deleted: Some(aged_out),
                error_message: None,
            }
        }
        Err(e) => {
            warn!(account_id, error = %e, "collector failed, sync job marked failed");
            SyncJobPatch {
                status: Some(SyncJobStatus::Failed),
                finished_at: Some(jiff_now(cancel)?),
                error_message: Some(Some(e.0)),
                ..Default::default()
            }
        }
    };

    store
        .update_sync_job(job.id, patch, cancel)
        .await
        .map_err(|e| DiscoveryError::store(format!("finalize sync job {}", job.id), e))
}

fn jiff_now(cancel: &CancelToken) -> Result<jiff::Timestamp, DiscoveryError> {
    cancel
        .check()
        .map(|_| jiff::Timestamp::now())
        .map_err(|e| DiscoveryError::store("check cancellation before finalizing sync job", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloudpam_core::models::resource::{DiscoveredResource, ResourceStatus, ResourceType};
    use cloudpam_store::MemoryStore;
    use uuid::Uuid;

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    fn resource(account_id: u64, resource_id: &str) -> DiscoveredResource {
        let now = jiff::Timestamp::now();
        DiscoveredResource {
            id: Uuid::new_v4(),
            account_id,
            resource_id: resource_id.to_string(),
            resource_type: ResourceType::Vpc,
            cidr: Some("10.0.0.0/16".into()),
            region: Some("us-east-1".into()),
            name: None,
            discovered_at: now,
            last_seen_at: now,
            status: ResourceStatus::Active,
            pool_id: None,
        }
    }

    struct StaticCollector(Vec<DiscoveredResource>);

    #[async_trait]
    impl Collector for StaticCollector {
        async fn collect(
            &self,
            _account_id: u64,
            _regions: &[String],
            _since: Option<jiff::Timestamp>,
            _cancel: &CancelToken,
        ) -> Result<Vec<DiscoveredResource>, crate::collector::CollectorError> {
            Ok(self.0.clone())
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl Collector for FailingCollector {
        async fn collect(
            &self,
            _account_id: u64,
            _regions: &[String],
            _since: Option<jiff::Timestamp>,
            _cancel: &CancelToken,
        ) -> Result<Vec<DiscoveredResource>, crate::collector::CollectorError> {
            Err(crate::collector::CollectorError::new("upstream API timed out"))
        }
    }

    #[tokio::test]
    async fn first_sync_counts_everything_as_created() {
        let store = MemoryStore::new();
        let collector = StaticCollector(vec![resource(1, "vpc-a"), resource(1, "vpc-b")]);

        let job = run_sync(&store, &collector, 1, &[], &cancel()).await.unwrap();
        assert_eq!(job.status, SyncJobStatus::Completed);
        assert_eq!(job.found, 2);
        assert_eq!(job.created, 2);
        assert_eq!(job.updated, 0);
    }

    #[tokio::test]
    async fn resources_absent_from_a_later_sync_age_out_as_stale() {
        let store = MemoryStore::new();
        let first = StaticCollector(vec![resource(1, "vpc-a"), resource(1, "vpc-b")]);
        run_sync(&store, &first, 1, &[], &cancel()).await.unwrap();

        let second = StaticCollector(vec![resource(1, "vpc-a")]);
        let job = run_sync(&store, &second, 1, &[], &cancel()).await.unwrap();
        assert_eq!(job.found, 1);
        assert_eq!(job.updated, 1);
        assert_eq!(job.deleted, 1);

        let listed = store
            .list_resources(1, ResourceFilter::default(), Page::all(), &cancel())
            .await
            .unwrap();
        let vpc_b = listed.items.iter().find(|r| r.resource_id == "vpc-b").unwrap();
        assert_eq!(vpc_b.status, ResourceStatus::Stale);
    }

    #[tokio::test]
    async fn collector_failure_marks_job_failed_without_propagating() {
        let store = MemoryStore::new();
        let job = run_sync(&store, &FailingCollector, 1, &[], &cancel()).await.unwrap();
        assert_eq!(job.status, SyncJobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("upstream API timed out"));
    }
}
