//! Storage for [`BootstrapToken`] records — mirrors `cloudpam-store`'s
//! split between a pure in-memory reference and an S3-backed transactional
//! implementation, but scoped to the one entity this crate owns.

use async_trait::async_trait;
use cloudpam_core::models::bootstrap_token::BootstrapToken;
use cloudpam_core::s3_keys;
use uuid::Uuid;

use crate::error::AuthError;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: BootstrapToken) -> Result<(), AuthError>;
    async fn all(&self) -> Result<Vec<BootstrapToken>, AuthError>;
    async fn get(&self, id: Uuid) -> Result<BootstrapToken, AuthError>;
    async fn set_revoked(&self, id: Uuid) -> Result<BootstrapToken, AuthError>;
    async fn increment_uses(&self, id: Uuid) -> Result<BootstrapToken, AuthError>;
}

/// Pure in-memory [`TokenStore`], guarded by a single `tokio::sync::RwLock`
/// following `cloudpam-store::MemoryStore`'s design.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: tokio::sync::RwLock<std::collections::HashMap<Uuid, BootstrapToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: BootstrapToken) -> Result<(), AuthError> {
        self.inner.write().await.insert(token.id, token);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<BootstrapToken>, AuthError> {
        Ok(self.inner.read().await.values().cloned().collect())
    }

    async fn get(&self, id: Uuid) -> Result<BootstrapToken, AuthError> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AuthError::NotFound(id))
    }

    async fn set_revoked(&self, id: Uuid) -> Result<BootstrapToken, AuthError> {
        let mut inner = self.inner.write().await;
        let token = inner.get_mut(&id).ok_or(AuthError::NotFound(id))?;
        token.revoked = true;
        Ok(token.clone())
    }

    async fn increment_uses(&self, id: Uuid) -> Result<BootstrapToken, AuthError> {
        let mut inner = self.inner.write().await;
        let token = inner.get_mut(&id).ok_or(AuthError::NotFound(id))?;
        token.uses += 1;
        Ok(token.clone())
    }
}

/// S3-backed [`TokenStore`]. One JSON object per token under
/// `bootstrap_tokens/<id>.json`, following `cloudpam-store::S3Store`'s
/// layout convention; reuses its `objects`/`state` helpers directly rather
/// than duplicating the S3 client plumbing.
pub struct S3TokenStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3TokenStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl TokenStore for S3TokenStore {
    async fn insert(&self, token: BootstrapToken) -> Result<(), AuthError> {
        let key = s3_keys::bootstrap_token(token.id);
        cloudpam_store::state::save_state(&self.client, &self.bucket, &key, &token).await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<BootstrapToken>, AuthError> {
        let keys = cloudpam_store::objects::list_objects(
            &self.client,
            &self.bucket,
            s3_keys::BOOTSTRAP_TOKENS_PREFIX,
        )
        .await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let (token, _etag) =
                cloudpam_store::state::load_state::<BootstrapToken>(&self.client, &self.bucket, &key)
                    .await?;
            out.push(token);
        }
        Ok(out)
    }

    async fn get(&self, id: Uuid) -> Result<BootstrapToken, AuthError> {
        let key = s3_keys::bootstrap_token(id);
        match cloudpam_store::state::load_state::<BootstrapToken>(&self.client, &self.bucket, &key)
            .await
        {
            Ok((token, _etag)) => Ok(token),
            Err(cloudpam_store::ObjectError::NotFound { .. }) => Err(AuthError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_revoked(&self, id: Uuid) -> Result<BootstrapToken, AuthError> {
        let key = s3_keys::bootstrap_token(id);
        let (mut token, etag) =
            match cloudpam_store::state::load_state::<BootstrapToken>(&self.client, &self.bucket, &key)
                .await
            {
                Ok(pair) => pair,
                Err(cloudpam_store::ObjectError::NotFound { .. }) => {
                    return Err(AuthError::NotFound(id))
                }
                Err(e) => return Err(e.into()),
            };
        token.revoked = true;
        cloudpam_store::state::save_state_if_match(
            &self.client,
            &self.bucket,
            &key,
            &token,
            &etag,
        )
        .await?;
        Ok(token)
    }

    async fn increment_uses(&self, id: Uuid) -> Result<BootstrapToken, AuthError> {
        let key = s3_keys::bootstrap_token(id);
        let (mut token, etag) =
            match cloudpam_store::state::load_state::<BootstrapToken>(&self.client, &self.bucket, &key)
                .await
            {
                Ok(pair) => pair,
                Err(cloudpam_store::ObjectError::NotFound { .. }) => {
                    return Err(AuthError::NotFound(id))
                }
                Err(e) => return Err(e.into()),
            };
        token.uses += 1;
        cloudpam_store::state::save_state_if_match(
            &self.client,
            &self.bucket,
            &key,
            &token,
            &etag,
        )
        .await?;
        Ok(token)
    }
}
