//! `resolvePools` — the shared working-set resolution every analysis
//! operation builds on.

use std::collections::HashSet;

use cloudpam_core::models::pool::Pool;
use cloudpam_store::{CancelToken, Store};

use crate::error::AnalysisError;

/// Resolve the working pool set for an analysis operation.
///
/// An empty `pool_ids` means "all live pools". Otherwise every id must
/// refer to a live pool — unknown ids fail with *not-found*. When
/// `include_children` is set, the direct children of every resolved pool
/// are added too, de-duplicated by id.
pub async fn resolve_pools(
    store: &dyn Store,
    pool_ids: &[u64],
    include_children: bool,
    cancel: &CancelToken,
) -> Result<Vec<Pool>, AnalysisError> {
    let mut resolved: Vec<Pool> = if pool_ids.is_empty() {
        store
            .list_pools(cancel)
            .await
            .map_err(|e| AnalysisError::store("list pools", e))?
    } else {
        let mut out = Vec::with_capacity(pool_ids.len());
        for &id in pool_ids {
            let pool = store
                .get_pool(id, cancel)
                .await
                .map_err(|e| AnalysisError::store(format!("get pool {id}"), e))?;
            out.push(pool);
        }
        out
    };

    if include_children {
        let mut seen: HashSet<u64> = resolved.iter().map(|p| p.id).collect();
        let parents: Vec<u64> = resolved.iter().map(|p| p.id).collect();
        for parent_id in parents {
            let children = store
                .get_children(parent_id, cancel)
                .await
                .map_err(|e| AnalysisError::store(format!("get children of pool {parent_id}"), e))?;
            for child in children {
                if seen.insert(child.id) {
                    resolved.push(child);
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpam_store::{types::CreatePool, MemoryStore};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    #[tokio::test]
    async fn empty_ids_means_all_live_pools() {
        let store = MemoryStore::new();
        store
            .create_pool(
                CreatePool {
                    name: "a".into(),
                    cidr: "10.0.0.0/24".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();
        store
            .create_pool(
                CreatePool {
                    name: "b".into(),
                    cidr: "10.0.1.0/24".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let resolved = resolve_pools(&store, &[], false, &cancel()).await.unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[tokio::test]
    async fn unknown_id_fails_not_found() {
        let store = MemoryStore::new();
        let err = resolve_pools(&store, &[999], false, &cancel())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn include_children_expands_and_dedupes() {
        let store = MemoryStore::new();
        let parent = store
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
        let child = store
            .create_pool(
                CreatePool {
                    name: "child".into(),
                    cidr: "10.0.0.0/24".into(),
                    parent_id: Some(parent.id),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let resolved = resolve_pools(&store, &[parent.id, child.id], true, &cancel())
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
    }
}
