//! Authorization key repository.

use crate::error::MetadataResult;
use crate::models::AuthorizationRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for authorization keys.
#[async_trait]
pub trait AuthorizationRepo: Send + Sync {
    /// Record a new key. Fails with `AlreadyExists` when the hash is taken.
    async fn create_authorization(&self, row: &AuthorizationRow) -> MetadataResult<()>;

    /// Look up a key by its SHA256 hash.
    async fn get_authorization_by_hash(
        &self,
        key_hash: &str,
    ) -> MetadataResult<Option<AuthorizationRow>>;

    /// Look up a key by ID.
    async fn get_authorization(
        &self,
        authorization_id: Uuid,
    ) -> MetadataResult<Option<AuthorizationRow>>;

    /// Update last used time.
    async fn touch_authorization(
        &self,
        authorization_id: Uuid,
        used_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Revoke a key. Returns false if no such key exists.
    async fn revoke_authorization(
        &self,
        authorization_id: Uuid,
        revoked_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// List every key, newest first.
    async fn list_authorizations(&self) -> MetadataResult<Vec<AuthorizationRow>>;
}
