//! `Generate` — turn analysis output into scored, prioritized
//! recommendations, regenerationally idempotent per pool.

use cloudpam_analysis::{analyze_gaps, check_compliance};
use cloudpam_core::cidr::Cidr;
use cloudpam_core::models::recommendation::{
    Recommendation, RecommendationPriority, RecommendationType,
};
use cloudpam_store::types::CreateRecommendation;
use cloudpam_store::{CancelToken, Store};
use tracing::info;
use uuid::Uuid;

use crate::error::RecommendError;
use crate::score::score_allocation;

/// Regenerate recommendations for a single pool.
///
/// Before any writes, clears every `pending` recommendation for `pool_id`
/// (applied/dismissed ones are left alone) — this is the property that
/// makes regeneration idempotent: calling `generate` twice in a row leaves
/// the pending count unchanged rather than accumulating duplicates.
pub async fn generate(
    store: &dyn Store,
    pool_id: u64,
    cancel: &CancelToken,
) -> Result<Vec<Recommendation>, RecommendError> {
    store
        .delete_pending_for_pool(pool_id, cancel)
        .await
        .map_err(|e| RecommendError::store(format!("clear pending recs for pool {pool_id}"), e))?;

    let mut created = Vec::new();

    let gaps = analyze_gaps(store, pool_id, cancel).await?;
    let existing_children: Vec<Cidr> = gaps
        .allocated_blocks
        .iter()
        .filter_map(|b| Cidr::parse(&b.cidr).ok())
        .collect();

    for block in &gaps.available_blocks {
        let Ok(candidate) = Cidr::parse(&block.cidr) else {
            continue;
        };
        let score = score_allocation(&candidate, None, &existing_children);
        let priority = RecommendationPriority::from_score(score);
        let rec = store
            .create_recommendation(
                CreateRecommendation {
                    id: Uuid::new_v4().to_string(),
                    pool_id,
                    rec_type: RecommendationType::Allocation,
                    priority,
                    score,
                    suggested_cidr: Some(block.cidr.clone()),
                    rule_id: None,
                    title: format!("Allocate {}", block.cidr),
                    description: format!(
                        "{} addresses free as {} under pool {pool_id}",
                        block.address_count, block.cidr
                    ),
                },
                cancel,
            )
            .await
            .map_err(|e| RecommendError::store("create allocation recommendation", e))?;
        created.push(rec);
    }

    let compliance = check_compliance(store, &[pool_id], false, cancel).await?;
    for violation in compliance.violations.iter().filter(|v| v.pool_id == pool_id) {
        let (priority, score) = compliance_template(violation.rule_id);
        let rec = store
            .create_recommendation(
                CreateRecommendation {
                    id: Uuid::new_v4().to_string(),
                    pool_id,
                    rec_type: RecommendationType::Compliance,
                    priority,
                    score,
                    suggested_cidr: None,
                    rule_id: Some(violation.rule_id.to_string()),
                    title: format!("Fix {}", violation.rule_id),
                    description: violation.message.clone(),
                },
                cancel,
            )
            .await
            .map_err(|e| RecommendError::store("create compliance recommendation", e))?;
        created.push(rec);
    }

    info!(pool_id, count = created.len(), "generated recommendations");
    Ok(created)
}

/// Fixed `(priority, score)` templates per compliance rule id.
fn compliance_template(rule_id: &str) -> (RecommendationPriority, u32) {
    match rule_id {
        "OVERLAP-001" => (RecommendationPriority::High, 90),
        "RFC1918-001" => (RecommendationPriority::Medium, 60),
        "EMPTY-001" => (RecommendationPriority::Low, 30),
        "NAME-001" => (RecommendationPriority::Low, 20),
        "NAME-002" => (RecommendationPriority::Low, 20),
        _ => (RecommendationPriority::Medium, 50),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpam_core::models::recommendation::RecommendationStatus;
    use cloudpam_store::{types::CreatePool, MemoryStore};

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    #[tokio::test]
    async fn regenerating_leaves_pending_count_unchanged() {
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

        let first = generate(&store, parent.id, &cancel()).await.unwrap();
        let second = generate(&store, parent.id, &cancel()).await.unwrap();
        assert_eq!(first.len(), second.len());

        let listed = store
            .list_recommendations(
                Default::default(),
                cloudpam_store::types::Page::all(),
                &cancel(),
            )
            .await
            .unwrap();
        assert_eq!(listed.items.len(), second.len());
        assert!(listed
            .items
            .iter()
            .all(|r| r.status == RecommendationStatus::Pending));
    }

    #[tokio::test]
    async fn allocation_rec_suggests_a_valid_canonical_block() {
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

        let recs = generate(&store, parent.id, &cancel()).await.unwrap();
        let allocation = recs
            .iter()
            .find(|r| r.rec_type == RecommendationType::Allocation)
            .expect("empty /24 pool has one free allocation block");
        let cidr = Cidr::parse(allocation.suggested_cidr.as_ref().unwrap()).unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/24");
    }
}
