//! cloudpam-recommend
//!
//! Turns `cloudpam-analysis` output into scored, prioritized, applyable
//! recommendations: `Generate`, `Apply`, `Dismiss`.

pub mod apply;
pub mod error;
pub mod generate;
pub mod score;

pub use apply::{apply, dismiss, ApplyRequest};
pub use error::RecommendError;
pub use generate::generate;
pub use score::score_allocation;
