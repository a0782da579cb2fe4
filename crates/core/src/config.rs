//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:9292").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted size of a pushed gem archive, in bytes.
    #[serde(default = "default_max_gem_size")]
    pub max_gem_size: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:9292".to_string()
}

fn default_max_gem_size() -> u64 {
    crate::DEFAULT_MAX_GEM_SIZE
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_gem_size: default_max_gem_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// Process-local storage; contents are lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Authentication configuration for the private gem source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Realm advertised in `WWW-Authenticate` challenges.
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Path prefix owned by the private gem source.
    #[serde(default = "default_private_prefix")]
    pub private_prefix: String,
    /// Pre-computed hash of an initial `all` authorization key (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-key" | sha256sum`
    ///
    /// If the hash changes between restarts, the previous bootstrap key is
    /// revoked and a new one is recorded.
    #[serde(default)]
    pub bootstrap_key_hash: Option<String>,
}

fn default_realm() -> String {
    crate::DEFAULT_REALM.to_string()
}

fn default_private_prefix() -> String {
    crate::DEFAULT_PRIVATE_PREFIX.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            private_prefix: default_private_prefix(),
            bootstrap_key_hash: None,
        }
    }
}

impl AuthConfig {
    /// Validate authentication configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        let prefix = &self.private_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(format!(
                "auth.private_prefix must start with '/' and not end with one, got {prefix:?}"
            ));
        }

        if self.realm.contains('"') {
            return Err("auth.realm must not contain double quotes".to_string());
        }

        self.bootstrap_hash()?;
        Ok(())
    }

    /// Configured bootstrap key hash in the form keys are stored under.
    ///
    /// An optional `sha256:` prefix is dropped and hex digits are lowercased.
    pub fn bootstrap_hash(&self) -> Result<Option<String>, String> {
        let Some(configured) = self.bootstrap_key_hash.as_deref() else {
            return Ok(None);
        };
        let hash = configured
            .trim()
            .strip_prefix("sha256:")
            .unwrap_or(configured.trim())
            .to_ascii_lowercase();
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(
                "auth.bootstrap_key_hash must be a 64-character SHA256 hex string".to_string(),
            );
        }
        Ok(Some(hash))
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Private source authentication.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses in-memory storage and a dummy bootstrap key.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::Memory,
            metadata: MetadataConfig::default(),
            auth: AuthConfig {
                // SHA256 of "test-bootstrap-key"
                bootstrap_key_hash: Some(crate::hash_key("test-bootstrap-key")),
                ..AuthConfig::default()
            },
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.max_gem_size == 0 {
            return Err("server.max_gem_size must be greater than 0".to_string());
        }
        self.auth.validate()
    }
}
