//! cloudpam-store
//!
//! The storage abstraction CloudPAM's planning and allocation engine runs
//! against: one async trait, two backends. `MemoryStore` is the pure
//! in-memory reference used by tests and by `cloudpam-analysis` /
//! `cloudpam-recommend` / `cloudpam-discovery`'s own test suites.
//! `S3Store` persists the same model as one JSON object per entity in S3,
//! using ETag preconditions for optimistic concurrency.

pub mod cancel;
pub mod error;
pub mod memory;
pub mod objects;
pub mod s3_store;
pub mod state;
pub mod store_trait;
pub mod types;

pub use cancel::CancelToken;
pub use error::{ObjectError, StoreError};
pub use memory::MemoryStore;
pub use s3_store::S3Store;
pub use store_trait::Store;
