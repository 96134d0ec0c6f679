//! Gap analysis — free-space decomposition inside a parent pool.

use cloudpam_core::cidr::{range_to_cidrs, Cidr};
use cloudpam_core::models::pool::PoolUtilization;
use cloudpam_store::{CancelToken, Store};
use tracing::warn;

use crate::error::AnalysisError;

/// A direct child of the analyzed pool, carrying its own utilization.
#[derive(Debug, Clone)]
pub struct AllocatedBlock {
    pub pool_id: u64,
    pub name: String,
    pub cidr: String,
    pub utilization: PoolUtilization,
}

/// A canonical free block inside the analyzed pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableBlock {
    pub cidr: String,
    pub address_count: u64,
}

#[derive(Debug, Clone)]
pub struct GapAnalysis {
    pub pool_id: u64,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub allocated_blocks: Vec<AllocatedBlock>,
    pub available_blocks: Vec<AvailableBlock>,
}

/// `AnalyzeGaps(poolId)` — computes free space inside a parent pool.
pub async fn analyze_gaps(
    store: &dyn Store,
    pool_id: u64,
    cancel: &CancelToken,
) -> Result<GapAnalysis, AnalysisError> {
    let parent = store
        .get_pool(pool_id, cancel)
        .await
        .map_err(|e| AnalysisError::store(format!("get pool {pool_id}"), e))?;
    let parent_prefix = Cidr::parse(&parent.cidr)
        .map_err(|e| AnalysisError::InvalidCidr(pool_id, e.to_string()))?;
    let (parent_start, parent_end) = (parent_prefix.start(), parent_prefix.end());

    let children = store
        .get_children(pool_id, cancel)
        .await
        .map_err(|e| AnalysisError::store(format!("get children of pool {pool_id}"), e))?;

    let mut allocated_blocks = Vec::with_capacity(children.len());
    let mut child_intervals = Vec::with_capacity(children.len());
    for child in &children {
        match Cidr::parse(&child.cidr) {
            Ok(prefix) => child_intervals.push((prefix.start(), prefix.end())),
            Err(e) => {
                warn!(pool_id = child.id, error = %e, "skipping child with unparseable cidr during gap analysis");
                continue;
            }
        }
        let utilization = store
            .calculate_pool_utilization(child.id, cancel)
            .await
            .map_err(|e| AnalysisError::store(format!("utilization of pool {}", child.id), e))?;
        allocated_blocks.push(AllocatedBlock {
            pool_id: child.id,
            name: child.name.clone(),
            cidr: child.cidr.clone(),
            utilization,
        });
    }

    let free_ranges = find_free_ranges(parent_start, parent_end, child_intervals);

    let mut available_blocks = Vec::new();
    let mut free_total: u64 = 0;
    for (start, end) in free_ranges {
        for block in range_to_cidrs(start, end) {
            free_total += block.address_count();
            available_blocks.push(AvailableBlock {
                address_count: block.address_count(),
                cidr: block.to_string(),
            });
        }
    }

    let total = parent_prefix.address_count();
    let used = total.saturating_sub(free_total);

    Ok(GapAnalysis {
        pool_id,
        total,
        used,
        free: free_total,
        allocated_blocks,
        available_blocks,
    })
}

/// `findFreeRanges` — sort, merge overlapping/adjacent child intervals
/// (clamped to the parent span, discarding children wholly outside it),
/// then walk the parent span emitting the gaps between merged blocks and
/// a tail gap if any span remains.
pub(crate) fn find_free_ranges(
    parent_start: u64,
    parent_end: u64,
    child_intervals: Vec<(u64, u64)>,
) -> Vec<(u64, u64)> {
    let mut clamped: Vec<(u64, u64)> = child_intervals
        .into_iter()
        .filter(|&(start, end)| end >= parent_start && start <= parent_end)
        .map(|(start, end)| (start.max(parent_start), end.min(parent_end)))
        .collect();
    clamped.sort_by_key(|&(start, _)| start);

    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(clamped.len());
    for (start, end) in clamped.drain(..) {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end + 1 => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    let mut gaps = Vec::new();
    let mut cursor = parent_start;
    for (start, end) in merged {
        if cursor < start {
            gaps.push((cursor, start - 1));
        }
        cursor = end + 1;
    }
    if cursor <= parent_end {
        gaps.push((cursor, parent_end));
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpam_store::{types::CreatePool, MemoryStore};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    #[tokio::test]
    async fn total_equals_used_plus_free() {
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
        store
            .create_pool(
                CreatePool {
                    name: "child".into(),
                    cidr: "10.0.5.0/24".into(),
                    parent_id: Some(parent.id),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let gaps = analyze_gaps(&store, parent.id, &cancel()).await.unwrap();
        assert_eq!(gaps.total, gaps.used + gaps.free);
    }

    #[tokio::test]
    async fn no_children_is_one_free_block_equal_to_parent() {
        let store = MemoryStore::new();
        let parent = store
            .create_pool(
                CreatePool {
                    name: "parent".into(),
                    cidr: "10.0.0.0/24".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let gaps = analyze_gaps(&store, parent.id, &cancel()).await.unwrap();
        assert_eq!(gaps.available_blocks.len(), 1);
        assert_eq!(gaps.available_blocks[0].cidr, "10.0.0.0/24");
        assert_eq!(gaps.used, 0);
    }

    #[tokio::test]
    async fn one_slash_24_child_inside_slash_16_has_two_canonical_sides() {
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
        store
            .create_pool(
                CreatePool {
                    name: "child".into(),
                    cidr: "10.0.10.0/24".into(),
                    parent_id: Some(parent.id),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let gaps = analyze_gaps(&store, parent.id, &cancel()).await.unwrap();
        // prefix range 10.0.0.0..10.0.9.255 and suffix 10.0.11.0..10.0.255.255,
        // each decomposed into more than one canonical block.
        assert!(gaps.available_blocks.len() >= 2);
        assert_eq!(gaps.total, gaps.used + gaps.free);
    }

    #[test]
    fn overlapping_children_merge_before_gap_math() {
        let gaps = find_free_ranges(0, 299, vec![(0, 99), (50, 199)]);
        assert_eq!(gaps, vec![(200, 299)]);
    }
}
