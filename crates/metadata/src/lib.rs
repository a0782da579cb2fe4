//! Metadata store for gemvault.
//!
//! Holds the control-plane data that does not live in object storage:
//! - Authorization keys, their permissions and revocation
//! - The marker for the configured bootstrap key

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::AuthorizationRow;
pub use repos::{AuthorizationRepo, BootstrapRepo};
pub use store::{MetadataStore, SqliteStore};

use gemvault_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
