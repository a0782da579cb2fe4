//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use gemvault_core::{Authorization, AuthorizationId, Permission};
use sqlx::FromRow;
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// Authorization key record.
#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationRow {
    pub authorization_id: Uuid,
    pub key_hash: String,
    pub permissions: String, // JSON array
    pub name: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
}

impl AuthorizationRow {
    /// Build a fresh, unrevoked record for `key_hash`.
    pub fn new(
        key_hash: impl Into<String>,
        permissions: &[Permission],
        name: Option<String>,
    ) -> MetadataResult<Self> {
        let permissions: Vec<&str> = permissions.iter().map(Permission::as_str).collect();
        Ok(Self {
            authorization_id: Uuid::new_v4(),
            key_hash: key_hash.into(),
            permissions: serde_json::to_string(&permissions)
                .map_err(|e| MetadataError::Internal(format!("encode permissions: {e}")))?,
            name,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            revoked_at: None,
        })
    }

    /// Convert to the domain type. Unknown permission names are dropped.
    pub fn to_authorization(&self) -> MetadataResult<Authorization> {
        let names: Vec<String> = serde_json::from_str(&self.permissions).map_err(|e| {
            MetadataError::Internal(format!(
                "invalid permissions for authorization {}: {e}",
                self.authorization_id
            ))
        })?;

        let permissions: HashSet<Permission> = names
            .iter()
            .filter_map(|name| match Permission::parse(name) {
                Ok(permission) => Some(permission),
                Err(_) => {
                    tracing::warn!(
                        authorization_id = %self.authorization_id,
                        invalid_permission = %name,
                        "Authorization contains unknown permission, ignoring"
                    );
                    None
                }
            })
            .collect();

        Ok(Authorization {
            id: AuthorizationId::from_uuid(self.authorization_id),
            permissions,
            name: self.name.clone(),
            created_at: self.created_at,
            revoked_at: self.revoked_at,
        })
    }
}
