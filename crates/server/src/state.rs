//! Application state shared across handlers.

use crate::auth::Authorizer;
use crate::index::SpecsIndex;
use crate::matcher::SourceTable;
use gemvault_core::config::AppConfig;
use gemvault_metadata::MetadataStore;
use gemvault_storage::{ObjectStore, ResourceStore};
use std::sync::Arc;

/// Application state, built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Raw object store.
    pub storage: Arc<dyn ObjectStore>,
    /// Private gem resources on top of `storage`.
    pub gems: ResourceStore,
    /// Authorization keys.
    pub metadata: Arc<dyn MetadataStore>,
    /// Cached spec indexes.
    pub specs: Arc<SpecsIndex>,
    /// Gem sources by path prefix.
    pub sources: Arc<SourceTable>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let sources = SourceTable::new(&config.auth.private_prefix);
        Self {
            config: Arc::new(config),
            gems: ResourceStore::private_gems(Arc::clone(&storage)),
            storage,
            metadata,
            specs: Arc::new(SpecsIndex::new()),
            sources: Arc::new(sources),
        }
    }

    /// Authorization checker over this state's metadata store.
    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(Arc::clone(&self.metadata))
    }

    /// Realm named in authorization challenges.
    pub fn realm(&self) -> &str {
        &self.config.auth.realm
    }
}
