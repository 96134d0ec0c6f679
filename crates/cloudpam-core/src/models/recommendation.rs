use serde::{Deserialize, Serialize};

/// A suggestion attached to a pool, produced by the recommendation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub pool_id: u64,
    pub rec_type: RecommendationType,
    pub status: RecommendationStatus,
    pub priority: RecommendationPriority,
    /// Clamped to `[0, 100]`.
    pub score: u32,
    #[serde(default)]
    pub suggested_cidr: Option<String>,
    #[serde(default)]
    pub rule_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub applied_pool_id: Option<u64>,
    #[serde(default)]
    pub dismiss_reason: Option<String>,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Allocation,
    Compliance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Applied,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

impl RecommendationPriority {
    /// `≥70 high`, `≥40 medium`, else `low`.
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            Self::High
        } else if score >= 40 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
