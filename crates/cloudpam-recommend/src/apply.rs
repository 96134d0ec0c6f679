//! `Apply`/`Dismiss` — the recommendation approval state machine.

use cloudpam_core::models::pool::PoolSource;
use cloudpam_core::models::recommendation::{Recommendation, RecommendationStatus, RecommendationType};
use cloudpam_store::types::CreatePool;
use cloudpam_store::{CancelToken, Store, StoreError};
use tracing::info;

use crate::error::RecommendError;

/// Operator-supplied detail for `Apply` on an allocation recommendation.
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    pub account_id: Option<u64>,
    pub name: Option<String>,
}

/// `Apply(id, req)` — refuses with *conflict* unless the recommendation is
/// `pending`. For `allocation` recommendations, creates a child pool under
/// `rec.pool_id` with `cidr = suggested_cidr` and records its id as
/// `applied_pool_id`; for `compliance` recommendations, no pool is created —
/// applying just acknowledges the violation. Transitions to `applied`.
pub async fn apply(
    store: &dyn Store,
    id: &str,
    req: ApplyRequest,
    cancel: &CancelToken,
) -> Result<Recommendation, RecommendError> {
    let rec = store
        .get_recommendation(id, cancel)
        .await
        .map_err(|e| RecommendError::store(format!("get recommendation {id}"), e))?;
    if rec.status != RecommendationStatus::Pending {
        return Err(RecommendError::store(
            format!("apply recommendation {id}"),
            StoreError::Conflict(format!("recommendation {id} is not pending")),
        ));
    }

    let applied_pool_id = if rec.rec_type == RecommendationType::Allocation {
        let cidr = rec.suggested_cidr.clone().ok_or_else(|| {
            RecommendError::store(
                format!("apply recommendation {id}"),
                StoreError::Validation("allocation recommendation has no suggested_cidr".into()),
            )
        })?;
        let name = req
            .name
            .clone()
            .unwrap_or_else(|| format!("Allocation {cidr}"));
        let pool = store
            .create_pool(
                CreatePool {
                    name,
                    cidr,
                    parent_id: Some(rec.pool_id),
                    account_id: req.account_id,
                    source: PoolSource::Manual,
                    ..Default::default()
                },
                cancel,
            )
            .await
            .map_err(|e| RecommendError::store("create pool for applied recommendation", e))?;
        Some(pool.id)
    } else {
        None
    };

    let updated = store
        .update_recommendation_status(
            id,
            RecommendationStatus::Applied,
            None,
            applied_pool_id,
            cancel,
        )
        .await
        .map_err(|e| RecommendError::store(format!("apply recommendation {id}"), e))?;

    info!(recommendation_id = id, applied_pool_id = ?applied_pool_id, "applied recommendation");
    Ok(updated)
}

/// `Dismiss(id, reason)` — same pre-condition as `Apply`; transitions to
/// `dismissed` and stores the reason.
pub async fn dismiss(
    store: &dyn Store,
    id: &str,
    reason: Option<String>,
    cancel: &CancelToken,
) -> Result<Recommendation, RecommendError> {
    let updated = store
        .update_recommendation_status(id, RecommendationStatus::Dismissed, reason, None, cancel)
        .await
        .map_err(|e| RecommendError::store(format!("dismiss recommendation {id}"), e))?;
    info!(recommendation_id = id, "dismissed recommendation");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use cloudpam_store::{types::CreatePool as StoreCreatePool, MemoryStore};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    #[tokio::test]
    async fn apply_allocation_creates_child_pool_and_records_it() {
        let store = MemoryStore::new();
        let parent = store
            .create_pool(
                StoreCreatePool {
                    name: "parent".into(),
                    cidr: "10.0.0.0/24".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();
        let recs = generate(&store, parent.id, &cancel()).await.unwrap();
        let allocation = recs
            .iter()
            .find(|r| r.rec_type == RecommendationType::Allocation)
            .unwrap();

        let applied = apply(&store, &allocation.id, ApplyRequest::default(), &cancel())
            .await
            .unwrap();
        assert_eq!(applied.status, RecommendationStatus::Applied);
        let applied_pool_id = applied.applied_pool_id.unwrap();
        let pool = store.get_pool(applied_pool_id, &cancel()).await.unwrap();
        assert_eq!(pool.cidr, allocation.suggested_cidr.clone().unwrap());
        assert_eq!(pool.parent_id, Some(parent.id));
    }

    #[tokio::test]
    async fn applying_twice_conflicts() {
        let store = MemoryStore::new();
        let parent = store
            .create_pool(
                StoreCreatePool {
                    name: "parent".into(),
                    cidr: "10.0.0.0/24".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();
        let recs = generate(&store, parent.id, &cancel()).await.unwrap();
        let allocation = recs
            .iter()
            .find(|r| r.rec_type == RecommendationType::Allocation)
            .unwrap();

        apply(&store, &allocation.id, ApplyRequest::default(), &cancel())
            .await
            .unwrap();
        let err = apply(&store, &allocation.id, ApplyRequest::default(), &cancel())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
