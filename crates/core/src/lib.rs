//! Core domain types and shared logic for the gemvault private gem server.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Gem identities, full names and yank slugs
//! - Gem archive parsing (name, version, platform, dependencies)
//! - Ruby Marshal 4.8 encoding for spec indexes
//! - Authorization keys and permissions
//! - Configuration

pub mod archive;
pub mod authorization;
pub mod config;
pub mod error;
pub mod gem;
pub mod marshal;

pub use archive::{Dependency, GemSpec};
pub use authorization::{Authorization, AuthorizationId, Permission, hash_key};
pub use error::{Error, Result};
pub use gem::{GemIdentity, is_prerelease, normalize_platform, slug};
pub use marshal::MarshalValue;

/// Platform string RubyGems uses for pure-Ruby gems.
pub const DEFAULT_PLATFORM: &str = "ruby";

/// Default authentication realm presented on authorization failures.
pub const DEFAULT_REALM: &str = "Gemstash Private Gems";

/// Default path prefix of the private gem source.
pub const DEFAULT_PRIVATE_PREFIX: &str = "/private";

/// Default maximum accepted gem archive size: 64 MiB
pub const DEFAULT_MAX_GEM_SIZE: u64 = 64 * 1024 * 1024;
