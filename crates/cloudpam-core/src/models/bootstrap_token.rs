use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque secret issued to a prospective discovery agent.
///
/// The plaintext is never persisted — only its hash. [`BootstrapToken`] is
/// the record stored by `cloudpam-auth`; the plaintext is returned to the
/// caller once, at issuance time, and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapToken {
    pub id: Uuid,
    pub label: String,
    /// Hex-encoded SHA-256 of the plaintext.
    pub hash: String,
    pub revoked: bool,
    pub uses: u64,
    pub created_at: jiff::Timestamp,
}
