//! cloudpam-discovery
//!
//! Discovery reconciliation: drives an external [`Collector`]
//! capability, upserts what it reports into the resource table, ages out
//! what it no longer reports, and exposes operator-gated pool linking.

pub mod collector;
pub mod error;
pub mod link;
pub mod run;

pub use collector::{Collector, CollectorError};
pub use error::DiscoveryError;
pub use link::{link, unlink};
pub use run::run_sync;
