use cloudpam_analysis::AnalysisError;
use cloudpam_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl RecommendError {
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_not_found(),
            Self::Analysis(e) => e.is_not_found(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_conflict())
    }
}
