//! Bootstrap token lifecycle: `issue`, `verify`, `revoke`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cloudpam_core::models::bootstrap_token::BootstrapToken;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::AuthError;
use crate::token_store::TokenStore;

const TOKEN_BYTES: usize = 32;

fn hash_hex(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Constant-time comparison of two equal-or-unequal-length hex strings.
/// Always walks the full length of the longer string so elapsed time does
/// not depend on where the first mismatching byte falls.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let len_match = (a.len() == b.len()) as u8;
    let max_len = a.len().max(b.len());
    let mut diff: u8 = 1 - len_match;
    for i in 0..max_len {
        let byte_a = a.get(i).copied().unwrap_or(0);
        let byte_b = b.get(i).copied().unwrap_or(0);
        diff |= byte_a ^ byte_b;
    }
    diff == 0
}

/// Generate a new bootstrap secret, persist its hash, and return the
/// plaintext once. The caller must show it to the operator immediately —
/// it cannot be recovered afterward.
pub async fn issue(
    store: &dyn TokenStore,
    label: impl Into<String>,
) -> Result<(BootstrapToken, String), AuthError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = BASE64.encode(bytes);

    let token = BootstrapToken {
        id: Uuid::new_v4(),
        label: label.into(),
        hash: hash_hex(&plaintext),
        revoked: false,
        uses: 0,
        created_at: jiff::Timestamp::now(),
    };
    store.insert(token.clone()).await?;
    info!(token_id = %token.id, label = %token.label, "issued bootstrap token");
    Ok((token, plaintext))
}

/// Verify a candidate plaintext against every stored token. Returns the
/// matching token with `uses` incremented, or `None` if no live token
/// matches. Hash comparison is constant-time so lookup latency does not
/// leak which prefix bytes of a candidate matched a stored hash.
pub async fn verify(
    store: &dyn TokenStore,
    plaintext: &str,
) -> Result<Option<BootstrapToken>, AuthError> {
    let candidate_hash = hash_hex(plaintext);
    let tokens = store.all().await?;

    let mut matched = None;
    for token in &tokens {
        if constant_time_eq(&token.hash, &candidate_hash) {
            matched = Some(token.id);
        }
    }

    let Some(id) = matched else {
        return Ok(None);
    };
    let token = store.get(id).await?;
    if token.revoked {
        return Ok(None);
    }
    let updated = store.increment_uses(id).await?;
    Ok(Some(updated))
}

/// Revoke a token by id. A revoked token always fails `verify`.
pub async fn revoke(store: &dyn TokenStore, id: Uuid) -> Result<BootstrapToken, AuthError> {
    let token = store.set_revoked(id).await?;
    info!(token_id = %id, "revoked bootstrap token");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::MemoryTokenStore;

    #[tokio::test]
    async fn issue_then_verify_recovers_the_same_token_and_increments_uses() {
        let store = MemoryTokenStore::new();
        let (token, plaintext) = issue(&store, "agent-1").await.unwrap();

        let verified = verify(&store, &plaintext).await.unwrap().unwrap();
        assert_eq!(verified.id, token.id);
        assert_eq!(verified.uses, 1);

        let verified_again = verify(&store, &plaintext).await.unwrap().unwrap();
        assert_eq!(verified_again.uses, 2);
    }

    #[tokio::test]
    async fn wrong_plaintext_does_not_verify() {
        let store = MemoryTokenStore::new();
        issue(&store, "agent-1").await.unwrap();
        assert!(verify(&store, "not-the-right-secret").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_token_fails_verify() {
        let store = MemoryTokenStore::new();
        let (token, plaintext) = issue(&store, "agent-1").await.unwrap();
        revoke(&store, token.id).await.unwrap();
        assert!(verify(&store, &plaintext).await.unwrap().is_none());
    }

    #[test]
    fn constant_time_eq_agrees_with_naive_equality() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc123", "abc1234"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }
}
