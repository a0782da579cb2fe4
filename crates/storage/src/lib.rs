//! Object storage abstraction and backends for gemvault.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait with atomic whole-object writes
//! - Backends: local filesystem and in-memory
//! - The [`ResourceStore`]: namespaced resources holding gem archives,
//!   specifications and a property bag, with per-resource locking

pub mod backends;
pub mod error;
pub mod resource;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use resource::{
    ContentKind, PRIVATE_GEMS_NAMESPACE, Properties, Resource, ResourceLock, ResourceStore,
};
pub use traits::{ObjectMeta, ObjectStore};

use gemvault_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}
