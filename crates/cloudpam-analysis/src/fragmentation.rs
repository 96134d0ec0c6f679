//! Fragmentation scoring over a parent pool's direct children.

use std::collections::HashSet;

use cloudpam_core::cidr::Cidr;
use cloudpam_store::{CancelToken, Store};

use crate::error::AnalysisError;
use crate::gaps::analyze_gaps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// `≥0.7 → error`, `≥0.4 → warning`, else `info`.
    fn from_factor(factor: f64) -> Self {
        if factor >= 0.7 {
            Severity::Error
        } else if factor >= 0.4 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Scattered,
    Oversized,
    Undersized,
    Misaligned,
}

#[derive(Debug, Clone)]
pub struct FragmentationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub pool_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FragmentationReport {
    pub pool_id: u64,
    pub score: u32,
    pub issues: Vec<FragmentationIssue>,
    pub recommendations: Vec<String>,
}

const WEIGHT_SCATTERED: f64 = 40.0;
const WEIGHT_OVERSIZED: f64 = 20.0;
const WEIGHT_UNDERSIZED: f64 = 20.0;
const WEIGHT_MISALIGNED: f64 = 20.0;

/// `AnalyzeFragmentation(poolId)` — an integer score in `[0, 100]` plus a
/// bag of issues, from four weighted factors.
pub async fn analyze_fragmentation(
    store: &dyn Store,
    pool_id: u64,
    cancel: &CancelToken,
) -> Result<FragmentationReport, AnalysisError> {
    let children = store
        .get_children(pool_id, cancel)
        .await
        .map_err(|e| AnalysisError::store(format!("get children of pool {pool_id}"), e))?;

    if children.is_empty() {
        return Ok(FragmentationReport {
            pool_id,
            score: 0,
            issues: Vec::new(),
            recommendations: Vec::new(),
        });
    }

    let gaps = analyze_gaps(store, pool_id, cancel).await?;
    let gap_count = gaps.available_blocks.len();
    let scattered_factor = gap_count as f64 / (gap_count + children.len()) as f64;

    let mut utilizations = Vec::with_capacity(children.len());
    for child in &children {
        let util = store
            .calculate_pool_utilization(child.id, cancel)
            .await
            .map_err(|e| AnalysisError::store(format!("utilization of pool {}", child.id), e))?;
        utilizations.push((child, util));
    }

    let oversized: Vec<_> = utilizations
        .iter()
        .filter(|(_, u)| u.child_count == 0 && u.utilization_pct < 25.0)
        .collect();
    let undersized: Vec<_> = utilizations
        .iter()
        .filter(|(_, u)| u.utilization_pct > 90.0)
        .collect();
    let oversized_count = oversized.len();
    let undersized_count = undersized.len();
    let oversized_factor = oversized_count as f64 / children.len() as f64;
    let undersized_factor = undersized_count as f64 / children.len() as f64;

    let mut issues = Vec::new();
    for (child, util) in &oversized {
        issues.push(FragmentationIssue {
            kind: IssueKind::Oversized,
            severity: Severity::from_factor(oversized_factor),
            message: format!(
                "pool {} ({}) is oversized for its usage: {:.1}% utilized",
                child.id, child.cidr, util.utilization_pct
            ),
            pool_id: Some(child.id),
        });
    }
    for (child, util) in &undersized {
        issues.push(FragmentationIssue {
            kind: IssueKind::Undersized,
            severity: Severity::from_factor(undersized_factor),
            message: format!(
                "pool {} ({}) is undersized for its usage: {:.1}% utilized",
                child.id, child.cidr, util.utilization_pct
            ),
            pool_id: Some(child.id),
        });
    }

    if gap_count > 1 {
        issues.push(FragmentationIssue {
            kind: IssueKind::Scattered,
            severity: Severity::from_factor(scattered_factor),
            message: format!(
                "address space is scattered across {gap_count} free ranges under pool {pool_id}"
            ),
            pool_id: None,
        });
    }

    let prefix_lens: HashSet<u8> = children
        .iter()
        .filter_map(|c| Cidr::parse(&c.cidr).ok())
        .map(|c| c.prefix_len())
        .collect();
    let k = prefix_lens.len();
    let misaligned_factor = if k > 1 { 1.0 - 1.0 / k as f64 } else { 0.0 };
    if k > 1 {
        issues.push(FragmentationIssue {
            kind: IssueKind::Misaligned,
            severity: Severity::from_factor(misaligned_factor),
            message: format!(
                "children under pool {pool_id} use {k} distinct prefix lengths"
            ),
            pool_id: None,
        });
    }

    let score = ((scattered_factor * WEIGHT_SCATTERED)
        + (oversized_factor * WEIGHT_OVERSIZED)
        + (undersized_factor * WEIGHT_UNDERSIZED)
        + (misaligned_factor * WEIGHT_MISALIGNED))
        .min(100.0) as u32;

    let mut recommendations = Vec::new();
    if scattered_factor > 0.3 {
        recommendations.push(format!(
            "consolidate allocations under pool {pool_id} — free space is spread across {gap_count} ranges"
        ));
    }
    if oversized_count > 0 {
        recommendations.push(format!(
            "{oversized_count} child pool(s) are far larger than their current usage; consider shrinking or reclaiming"
        ));
    }
    if undersized_count > 0 {
        recommendations.push(format!(
            "{undersized_count} child pool(s) are nearly exhausted; plan an expansion or split"
        ));
    }
    if k > 2 {
        recommendations.push(format!(
            "children span {k} different prefix lengths; standardizing would simplify planning"
        ));
    }

    Ok(FragmentationReport {
        pool_id,
        score,
        issues,
        recommendations,
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
    async fn no_children_scores_zero() {
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
        let report = analyze_fragmentation(&store, parent.id, &cancel())
            .await
            .unwrap();
        assert_eq!(report.score, 0);
        assert!(report.issues.is_empty());
    }

    #[tokio::test]
    async fn scattered_children_emit_scattered_issue() {
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
        for octet in [0u8, 10, 20] {
            store
                .create_pool(
                    CreatePool {
                        name: format!("child-{octet}"),
                        cidr: format!("10.0.{octet}.0/24"),
                        parent_id: Some(parent.id),
                        ..Default::default()
                    },
                    &cancel(),
                )
                .await
                .unwrap();
        }
        let report = analyze_fragmentation(&store, parent.id, &cancel())
            .await
            .unwrap();
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::Scattered));
    }

    #[tokio::test]
    async fn mixed_prefix_lengths_emit_misaligned_issue() {
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
        for (cidr, name) in [
            ("10.0.0.0/20", "a"),
            ("10.0.16.0/24", "b"),
            ("10.0.32.0/28", "c"),
        ] {
            store
                .create_pool(
                    CreatePool {
                        name: name.into(),
                        cidr: cidr.into(),
                        parent_id: Some(parent.id),
                        ..Default::default()
                    },
                    &cancel(),
                )
                .await
                .unwrap();
        }
        let report = analyze_fragmentation(&store, parent.id, &cancel())
            .await
            .unwrap();
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::Misaligned));
    }
}
