//! Bootstrap authorization marker repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Tracks which authorization was created from the configured bootstrap hash.
#[async_trait]
pub trait BootstrapRepo: Send + Sync {
    /// Get the active bootstrap authorization ID, if set.
    async fn get_bootstrap_authorization_id(&self) -> MetadataResult<Option<Uuid>>;

    /// Set the active bootstrap authorization ID.
    async fn set_bootstrap_authorization_id(&self, authorization_id: Uuid) -> MetadataResult<()>;

    /// Clear the bootstrap marker.
    async fn clear_bootstrap_authorization_id(&self) -> MetadataResult<()>;
}
