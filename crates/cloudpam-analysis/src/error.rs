use cloudpam_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the analysis layer.
///
/// Store errors are wrapped with the operation that triggered them (e.g.
/// `"get pool 42: pool 42 not found"`) but the sentinel kind stays
/// queryable through [`AnalysisError::is_not_found`], so callers several
/// layers up can still classify the underlying failure.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("pool {0} has a stored cidr that does not parse: {1}")]
    InvalidCidr(u64, String),
}

impl AnalysisError {
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_not_found())
    }
}
