//! `Analyze` — the summary/health roll-up over a resolved pool set.

use cloudpam_core::cidr::{prefix_address_count, Cidr};
use cloudpam_core::models::pool::PoolType;
use cloudpam_store::{CancelToken, Store};

use crate::compliance::{compliance_over, ComplianceReport};
use crate::error::AnalysisError;
use crate::fragmentation::{analyze_fragmentation, FragmentationReport};
use crate::gaps::{analyze_gaps, GapAnalysis};
use crate::resolve::resolve_pools;

const GAP_ELIGIBLE: [PoolType; 4] = [
    PoolType::Supernet,
    PoolType::Region,
    PoolType::Environment,
    PoolType::Vpc,
];

#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub total_pools: usize,
    pub total_addresses: u64,
    pub used_addresses: u64,
    pub gap_analyses: Vec<GapAnalysis>,
    pub fragmentation: Vec<FragmentationReport>,
    pub compliance: ComplianceReport,
    pub health_score: u32,
}

pub async fn analyze(
    store: &dyn Store,
    pool_ids: &[u64],
    include_children: bool,
    cancel: &CancelToken,
) -> Result<AnalysisSummary, AnalysisError> {
    let resolved = resolve_pools(store, pool_ids, include_children, cancel).await?;

    let mut total_addresses: u64 = 0;
    let mut used_addresses: u64 = 0;
    for pool in &resolved {
        if let Ok(prefix) = Cidr::parse(&pool.cidr) {
            total_addresses = total_addresses.saturating_add(prefix_address_count(&prefix));
        }
        let util = store
            .calculate_pool_utilization(pool.id, cancel)
            .await
            .map_err(|e| AnalysisError::store(format!("utilization of pool {}", pool.id), e))?;
        used_addresses = used_addresses.saturating_add(util.used);
    }

    let mut gap_analyses = Vec::new();
    let mut fragmentation = Vec::new();
    for pool in &resolved {
        let children = store
            .get_children(pool.id, cancel)
            .await
            .map_err(|e| AnalysisError::store(format!("get children of pool {}", pool.id), e))?;
        if GAP_ELIGIBLE.contains(&pool.pool_type) || !children.is_empty() {
            gap_analyses.push(analyze_gaps(store, pool.id, cancel).await?);
        }
        if !children.is_empty() {
            fragmentation.push(analyze_fragmentation(store, pool.id, cancel).await?);
        }
    }

    let compliance = compliance_over(store, &resolved, cancel).await?;

    let mut health_score: i64 = 100;
    health_score -= (10 * compliance.failed as i64 + 2 * compliance.warnings as i64).min(50);
    if let Some(worst) = fragmentation.iter().map(|f| f.score).max() {
        health_score -= (worst as i64 / 4).min(30);
    }
    let health_score = health_score.clamp(0, 100) as u32;

    Ok(AnalysisSummary {
        total_pools: resolved.len(),
        total_addresses,
        used_addresses,
        gap_analyses,
        fragmentation,
        compliance,
        health_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpam_store::{types::CreatePool, MemoryStore};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    #[tokio::test]
    async fn healthy_isolated_pool_scores_full_marks() {
        let store = MemoryStore::new();
        store
            .create_pool(
                CreatePool {
                    name: "root".into(),
                    cidr: "10.0.0.0/16".into(),
                    description: "root pool".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let summary = analyze(&store, &[], false, &cancel()).await.unwrap();
        assert_eq!(summary.total_pools, 1);
        assert_eq!(summary.health_score, 100);
    }

    #[tokio::test]
    async fn errors_and_warnings_reduce_health_score() {
        let store = MemoryStore::new();
        let public = store
            .create_pool(
                CreatePool {
                    name: "public".into(),
                    cidr: "8.8.8.0/24".into(),
                    ..Default::default()
                },
                &cancel(),
            )
            .await
            .unwrap();

        let summary = analyze(&store, &[public.id], false, &cancel())
            .await
            .unwrap();
        assert!(summary.health_score < 100);
    }
}
