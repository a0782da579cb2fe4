//! Namespaced resources on top of an [`ObjectStore`].
//!
//! A resource is addressed by name inside a namespace and holds any number of
//! independently stored contents plus a JSON property bag:
//!
//! ```text
//! <namespace>/<name>/gem
//! <namespace>/<name>/spec
//! <namespace>/<name>/properties.json
//! ```
//!
//! The `gem` content is written last on save, so its presence marks a fully
//! pushed resource.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use bytes::Bytes;
use dashmap::DashMap;
use gemvault_core::{Dependency, normalize_platform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Namespace holding private gems.
pub const PRIVATE_GEMS_NAMESPACE: &str = "private/gems";

const PROPERTIES_FILE: &str = "properties.json";

/// Kinds of content a resource can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// The `.gem` archive.
    Gem,
    /// The deflated gem specification.
    Spec,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gem => "gem",
            Self::Spec => "spec",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent property bag of a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    /// Visibility flag: false once yanked.
    #[serde(default)]
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl Properties {
    /// Whether these properties were recorded for exactly this identity.
    ///
    /// Different identities can share a full name, so a stored resource is
    /// checked against the identity that addresses it.
    pub fn is_identity(&self, name: &str, version: &str, platform: Option<&str>) -> bool {
        self.name.as_deref() == Some(name)
            && self.version.as_deref() == Some(version)
            && normalize_platform(self.platform.as_deref()) == normalize_platform(platform)
    }
}

/// Namespaced collection of resources with a per-name lock table.
#[derive(Clone)]
pub struct ResourceStore {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ResourceStore {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into().trim_end_matches('/').to_string(),
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Store for the private gem namespace.
    pub fn private_gems(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(store, PRIVATE_GEMS_NAMESPACE)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Handle to the resource `name`. Nothing is read until asked for.
    pub fn resource(&self, name: &str) -> Resource {
        Resource {
            store: Arc::clone(&self.store),
            prefix: format!("{}/{}", self.namespace, name),
            name: name.to_string(),
            contents: HashMap::new(),
            properties: None,
        }
    }

    /// Acquire the exclusive lock for `name`.
    ///
    /// Locks are per name; holders of different names never contend.
    pub async fn lock(&self, name: &str) -> ResourceLock {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = Arc::clone(&lock).lock_owned().await;
        ResourceLock {
            name: name.to_string(),
            lock,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Names of every resource that has properties in this namespace, sorted.
    pub async fn list(&self) -> StorageResult<Vec<String>> {
        let prefix = format!("{}/", self.namespace);
        let suffix = format!("/{PROPERTIES_FILE}");
        let mut names: Vec<String> = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&prefix)?
                    .strip_suffix(&suffix)
                    .filter(|name| !name.contains('/'))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Guard returned by [`ResourceStore::lock`].
pub struct ResourceLock {
    name: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        self.guard = None;
        // Only the table and this guard still know the mutex: nobody is waiting.
        self.locks
            .remove_if(&self.name, |_, lock| {
                Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(&self.lock) == 2
            });
    }
}

/// A single resource inside a [`ResourceStore`].
pub struct Resource {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    name: String,
    contents: HashMap<ContentKind, Bytes>,
    properties: Option<Properties>,
}

impl Resource {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, file: &str) -> String {
        format!("{}/{}", self.prefix, file)
    }

    /// Whether `kind` content is stored.
    pub async fn exists(&self, kind: ContentKind) -> StorageResult<bool> {
        self.store.exists(&self.key(kind.as_str())).await
    }

    /// Read `kind` content (and the properties) into memory.
    ///
    /// Fails with [`StorageError::NotFound`] when the content is absent.
    pub async fn load(&mut self, kind: ContentKind) -> StorageResult<&mut Self> {
        let data = self.store.get(&self.key(kind.as_str())).await?;
        self.contents.insert(kind, data);
        self.load_properties().await?;
        Ok(self)
    }

    /// Content previously read by [`Resource::load`].
    pub fn content(&self, kind: ContentKind) -> Option<&Bytes> {
        self.contents.get(&kind)
    }

    /// Read the property bag. A resource without one has default properties.
    pub async fn load_properties(&mut self) -> StorageResult<&Properties> {
        let key = self.key(PROPERTIES_FILE);
        let properties = match self.store.get(&key).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                StorageError::CorruptProperties {
                    key,
                    reason: e.to_string(),
                }
            })?,
            Err(StorageError::NotFound(_)) => Properties::default(),
            Err(e) => return Err(e),
        };
        Ok(&*self.properties.insert(properties))
    }

    /// Properties as of the last load or save.
    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref()
    }

    /// Write contents and properties. The gem archive goes last.
    pub async fn save(
        &mut self,
        contents: impl IntoIterator<Item = (ContentKind, Bytes)>,
        properties: Properties,
    ) -> StorageResult<()> {
        let mut contents: Vec<_> = contents.into_iter().collect();
        contents.sort_by_key(|(kind, _)| *kind == ContentKind::Gem);

        self.write_properties(&properties).await?;
        for (kind, data) in contents {
            self.store.put(&self.key(kind.as_str()), data.clone()).await?;
            self.contents.insert(kind, data);
        }
        debug!(resource = %self.prefix, "saved resource");
        Ok(())
    }

    /// Read, modify and write back the property bag.
    pub async fn update_properties(
        &mut self,
        update: impl FnOnce(&mut Properties),
    ) -> StorageResult<&Properties> {
        let mut properties = self.load_properties().await?.clone();
        update(&mut properties);
        self.write_properties(&properties).await?;
        Ok(&*self.properties.insert(properties))
    }

    async fn write_properties(&mut self, properties: &Properties) -> StorageResult<()> {
        let key = self.key(PROPERTIES_FILE);
        let raw = serde_json::to_vec(properties).map_err(|e| StorageError::CorruptProperties {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.put(&key, Bytes::from(raw)).await?;
        self.properties = Some(properties.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use std::time::Duration;

    fn store() -> ResourceStore {
        ResourceStore::private_gems(Arc::new(MemoryBackend::new()))
    }

    fn indexed() -> Properties {
        Properties {
            indexed: true,
            name: Some("rack".to_string()),
            version: Some("2.2.8".to_string()),
            ..Properties::default()
        }
    }

    #[test]
    fn test_properties_identity() {
        let plain = indexed();
        assert!(plain.is_identity("rack", "2.2.8", None));
        assert!(plain.is_identity("rack", "2.2.8", Some("ruby")));
        assert!(!plain.is_identity("rack-2", "2.8", None));
        assert!(!plain.is_identity("rack", "2.2.8", Some("java")));

        let java = Properties {
            platform: Some("java".to_string()),
            ..indexed()
        };
        assert!(java.is_identity("rack", "2.2.8", Some("java")));
        assert!(!java.is_identity("rack", "2.2.8-java", None));
        assert!(!Properties::default().is_identity("rack", "2.2.8", None));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let store = store();
        let mut resource = store.resource("rack-2.2.8");

        assert!(!resource.exists(ContentKind::Gem).await.unwrap());
        assert!(matches!(
            resource.load(ContentKind::Gem).await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(
            resource.load_properties().await.unwrap(),
            &Properties::default()
        );
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = store();
        let mut resource = store.resource("rack-2.2.8");
        resource
            .save(
                [
                    (ContentKind::Gem, Bytes::from("gem")),
                    (ContentKind::Spec, Bytes::from("spec")),
                ],
                indexed(),
            )
            .await
            .unwrap();

        let mut fresh = store.resource("rack-2.2.8");
        fresh.load(ContentKind::Gem).await.unwrap();
        assert_eq!(fresh.content(ContentKind::Gem), Some(&Bytes::from("gem")));
        assert_eq!(fresh.content(ContentKind::Spec), None);
        assert!(fresh.properties().unwrap().indexed);
        assert!(fresh.exists(ContentKind::Spec).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_properties_keeps_contents() {
        let store = store();
        let mut resource = store.resource("rack-2.2.8");
        resource
            .save([(ContentKind::Gem, Bytes::from("gem"))], indexed())
            .await
            .unwrap();

        let updated = resource
            .update_properties(|p| p.indexed = false)
            .await
            .unwrap();
        assert!(!updated.indexed);
        assert_eq!(updated.name.as_deref(), Some("rack"));

        let mut fresh = store.resource("rack-2.2.8");
        fresh.load(ContentKind::Gem).await.unwrap();
        assert!(!fresh.properties().unwrap().indexed);
        assert_eq!(fresh.content(ContentKind::Gem), Some(&Bytes::from("gem")));
    }

    #[tokio::test]
    async fn test_list_returns_resource_names() {
        let store = store();
        for name in ["b-1.0", "a-1.0"] {
            store
                .resource(name)
                .save([(ContentKind::Gem, Bytes::new())], indexed())
                .await
                .unwrap();
        }
        assert_eq!(store.list().await.unwrap(), vec!["a-1.0", "b-1.0"]);
    }

    #[tokio::test]
    async fn test_empty_namespace_lists_nothing() {
        assert!(store().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_name() {
        let store = store();
        let guard = store.lock("rack-2.2.8").await;

        // A different name is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(100), store.lock("rack-3.0.0"))
            .await
            .expect("different names must not contend");
        drop(other);

        let contended = tokio::time::timeout(Duration::from_millis(50), store.lock("rack-2.2.8"));
        assert!(contended.await.is_err(), "same name must wait");

        drop(guard);
        let _again = store.lock("rack-2.2.8").await;
    }

    #[tokio::test]
    async fn test_lock_table_is_cleaned_up() {
        let store = store();
        drop(store.lock("x-1.0").await);
        assert!(store.locks.is_empty());
    }
}
