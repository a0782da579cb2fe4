//! Bootstrap authorization key setup.

use anyhow::{Result, bail};
use gemvault_core::Permission;
use gemvault_core::config::AuthConfig;
use gemvault_metadata::{AuthorizationRow, MetadataStore};
use time::OffsetDateTime;

/// Name recorded on the key created from configuration.
pub const BOOTSTRAP_KEY_NAME: &str = "bootstrap";

/// Ensure the configured bootstrap key exists, rotating the previous one if needed.
///
/// If the hash changes between restarts, the previous bootstrap key is revoked
/// and a new `all` key is recorded with the new hash.
pub async fn ensure_bootstrap_key(metadata: &dyn MetadataStore, config: &AuthConfig) -> Result<()> {
    let hash = match config.bootstrap_hash() {
        Ok(Some(hash)) => hash,
        Ok(None) => {
            tracing::debug!("No bootstrap key configured");
            return Ok(());
        }
        Err(e) => bail!("invalid bootstrap key: {e}"),
    };

    if let Some(existing) = metadata.get_authorization_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "bootstrap key hash matches a revoked key (id={}); \
                 use a new key hash",
                existing.authorization_id
            );
        }
        metadata
            .set_bootstrap_authorization_id(existing.authorization_id)
            .await?;
        tracing::debug!("Bootstrap key already exists");
        return Ok(());
    }

    if let Some(previous) = metadata.get_bootstrap_authorization_id().await? {
        metadata
            .revoke_authorization(previous, OffsetDateTime::now_utc())
            .await?;
        tracing::info!(authorization_id = %previous, "Previous bootstrap key revoked");
    }

    let row = AuthorizationRow::new(
        hash,
        &[Permission::All],
        Some(BOOTSTRAP_KEY_NAME.to_string()),
    )?;
    metadata.create_authorization(&row).await?;
    metadata
        .set_bootstrap_authorization_id(row.authorization_id)
        .await?;
    tracing::info!(authorization_id = %row.authorization_id, "Bootstrap key created");

    Ok(())
}
