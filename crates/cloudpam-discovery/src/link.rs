//! Operator-gated linking of a discovered resource to a managed pool.
//!
//! The reconciliation path never assigns `pool_id` itself — only an
//! explicit `Link` call does, and `upsert_resource` preserves whatever
//! `pool_id` is already on record across re-observation.

use cloudpam_core::models::resource::DiscoveredResource;
use cloudpam_store::{CancelToken, Store};
use uuid::Uuid;

use crate::error::DiscoveryError;

pub async fn link(
    store: &dyn Store,
    id: Uuid,
    pool_id: u64,
    cancel: &CancelToken,
) -> Result<DiscoveredResource, DiscoveryError> {
    store
        .link_resource(id, pool_id, cancel)
        .await
        .map_err(|e| DiscoveryError::store(format!("link resource {id} to pool {pool_id}"), e))
}

pub async fn unlink(
    store: &dyn Store,
    id: Uuid,
    cancel: &CancelToken,
) -> Result<DiscoveredResource, DiscoveryError> {
    store
        .unlink_resource(id, cancel)
        .await
        .map_err(|e| DiscoveryError::store(format!("unlink resource {id}"), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpam_core::models::resource::{ResourceStatus, ResourceType};
    use cloudpam_store::{types::CreatePool, MemoryStore};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    #[tokio::test]
    async fn link_then_unlink_round_trips_pool_id() {
        let store = MemoryStore::new();
        let pool = store
            .create_pool(
                CreatePool {
                    name: "parent".into(),
                    cidr: "10.0.0.0/16".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();
        let now = jiff::Timestamp::now();
        let resource = store
            .upsert_resource(
                DiscoveredResource {
                    id: Uuid::new_v4(),
                    account_id: 1,
                    resource_id: "vpc-a".into(),
                    resource_type: ResourceType::Vpc,
                    cidr: Some("10.0.0.0/16".into()),
                    region: None,
                    name: None,
                    discovered_at: now,
                    last_seen_at: now,
                    status: ResourceStatus::Active,
                    pool_id: None,
                },
                &cancel(),
            )
            .await
            .unwrap();

        let linked = link(&store, resource.id, pool.id, &cancel()).await.unwrap();
        assert_eq!(linked.pool_id, Some(pool.id));

        let unlinked = unlink(&store, resource.id, &cancel()).await.unwrap();
        assert_eq!(unlinked.pool_id, None);
    }
}
