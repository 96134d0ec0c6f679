//! cloudpam-auth
//!
//! Bootstrap token issuance and verification: the minimal server-side
//! credential boundary a discovery-agent bootstrap protocol needs.

pub mod error;
pub mod issuer;
pub mod token_store;

pub use error::AuthError;
pub use issuer::{issue, revoke, verify};
pub use token_store::{MemoryTokenStore, S3TokenStore, TokenStore};
