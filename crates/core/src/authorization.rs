//! Authorization keys and permissions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an authorization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorizationId(Uuid);

impl AuthorizationId {
    /// Generate a new random authorization ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            crate::Error::InvalidAuthorization(format!("invalid authorization ID: {e}"))
        })
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AuthorizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuthorizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorizationId({})", self.0)
    }
}

impl fmt::Display for AuthorizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permissions an authorization key can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Every permission, including ones added later.
    All,
    /// Push new gem versions.
    Push,
    /// Yank and unyank versions.
    Yank,
    /// Fetch private gems.
    Fetch,
}

impl Permission {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "push" => Ok(Self::Push),
            "yank" => Ok(Self::Yank),
            "fetch" => Ok(Self::Fetch),
            _ => Err(crate::Error::InvalidAuthorization(format!(
                "unknown permission: {s}"
            ))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Push => "push",
            Self::Yank => "yank",
            Self::Fetch => "fetch",
        }
    }

    /// Check if this permission implies another one.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::All => true,
            _ => self == other,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored authorization with its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Authorization {
    /// Authorization identifier.
    pub id: AuthorizationId,
    /// Granted permissions.
    pub permissions: HashSet<Permission>,
    /// Human-readable label.
    pub name: Option<String>,
    /// When the key was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the key was revoked (if revoked).
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl Authorization {
    /// Check if the key is still usable.
    pub fn is_valid(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// Check if the key carries a permission.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.iter().any(|p| p.implies(&permission))
    }
}

/// Hash a raw authorization key for storage and lookup (SHA256 hex).
pub fn hash_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(permissions: &[Permission]) -> Authorization {
        Authorization {
            id: AuthorizationId::new(),
            permissions: permissions.iter().copied().collect(),
            name: None,
            created_at: OffsetDateTime::now_utc(),
            revoked_at: None,
        }
    }

    #[test]
    fn test_permission_implies() {
        assert!(Permission::All.implies(&Permission::Push));
        assert!(Permission::All.implies(&Permission::Yank));
        assert!(Permission::All.implies(&Permission::Fetch));
        assert!(Permission::Push.implies(&Permission::Push));
        assert!(!Permission::Push.implies(&Permission::Yank));
        assert!(!Permission::Yank.implies(&Permission::All));
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(Permission::parse("all").unwrap(), Permission::All);
        assert_eq!(Permission::parse("push").unwrap(), Permission::Push);
        assert_eq!(Permission::parse("yank").unwrap(), Permission::Yank);
        assert_eq!(Permission::parse("fetch").unwrap(), Permission::Fetch);
        assert!(Permission::parse("admin").is_err());
    }

    #[test]
    fn test_has_permission() {
        let push_only = authorization(&[Permission::Push]);
        assert!(push_only.has_permission(Permission::Push));
        assert!(!push_only.has_permission(Permission::Yank));

        let all = authorization(&[Permission::All]);
        assert!(all.has_permission(Permission::Yank));
    }

    #[test]
    fn test_revoked_is_invalid() {
        let mut auth = authorization(&[Permission::All]);
        assert!(auth.is_valid());
        auth.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!auth.is_valid());
    }

    #[test]
    fn test_hash_key_is_sha256_hex() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
