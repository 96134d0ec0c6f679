//! cloudpam-core
//!
//! Pure domain types, the CIDR kernel, and S3 key conventions.
//! No AWS SDK dependency — this is the shared vocabulary of the CloudPAM
//! planning and allocation engine.

pub mod cidr;
pub mod error;
pub mod models;
pub mod s3_keys;
