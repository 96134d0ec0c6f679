//! The `Collector` capability a sync run drives.

use async_trait::async_trait;
use cloudpam_core::models::resource::DiscoveredResource;
use cloudpam_store::CancelToken;
use thiserror::Error;

/// Raised by a [`Collector`] implementation when it cannot complete a
/// collection pass. Carried into the sync job's `error_message` rather than
/// propagated to the caller of [`crate::run_sync`].
#[derive(Debug, Error)]
#[error("collector error: {0}")]
pub struct CollectorError(pub String);

impl CollectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An external source of discovered-resource facts for one cloud account.
/// Implementations live outside this crate (an AWS/GCP/Azure API client, or
/// an HTTP handler receiving push-mode agent reports) — this crate only
/// consumes the capability.
///
/// A collector must be restartable and side-effect free on the cloud side:
/// calling it again for the same account must not mutate cloud state, only
/// re-observe it.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Collect every resource currently visible for `account_id` across
    /// `regions`. `since` is an optional hint a collector may use to narrow
    /// its own upstream queries (e.g. a CloudTrail lookback window); it is
    /// advisory only — the collector is still expected to return the full
    /// current set, since [`crate::run_sync`] ages out anything it omits.
    async fn collect(
        &self,
        account_id: u64,
        regions: &[String],
        since: Option<jiff::Timestamp>,
        cancel: &CancelToken,
    ) -> Result<Vec<DiscoveredResource>, CollectorError>;
}
