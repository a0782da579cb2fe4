// Resource store behaviour over the filesystem backend:
// on-disk layout, persistence across handles and per-resource locking.

mod common;

use bytes::Bytes;
use common::{pushed_properties, seeded_bytes};
use gemvault_storage::{
    ContentKind, FilesystemBackend, ObjectStore, PRIVATE_GEMS_NAMESPACE, ResourceStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::time::Duration;

async fn filesystem_store(dir: &TempDir) -> (Arc<dyn ObjectStore>, ResourceStore) {
    let backend: Arc<dyn ObjectStore> =
        Arc::new(FilesystemBackend::new(dir.path()).await.unwrap());
    let store = ResourceStore::private_gems(Arc::clone(&backend));
    (backend, store)
}

#[tokio::test]
async fn test_layout_on_disk() {
    let dir = TempDir::new().unwrap();
    let (_, store) = filesystem_store(&dir).await;

    store
        .resource("example-1.0.0")
        .save(
            [
                (ContentKind::Gem, Bytes::from("gem")),
                (ContentKind::Spec, Bytes::from("spec")),
            ],
            pushed_properties("example", "1.0.0"),
        )
        .await
        .unwrap();

    let base = dir.path().join(PRIVATE_GEMS_NAMESPACE).join("example-1.0.0");
    assert_eq!(std::fs::read(base.join("gem")).unwrap(), b"gem");
    assert_eq!(std::fs::read(base.join("spec")).unwrap(), b"spec");

    let properties: serde_json::Value =
        serde_json::from_slice(&std::fs::read(base.join("properties.json")).unwrap()).unwrap();
    assert_eq!(properties["indexed"], true);
    assert_eq!(properties["name"], "example");
}

#[tokio::test]
async fn test_contents_survive_new_store_instance() {
    let dir = TempDir::new().unwrap();
    let data = seeded_bytes(7, 64 * 1024);
    {
        let (_, store) = filesystem_store(&dir).await;
        store
            .resource("example-1.0.0")
            .save(
                [(ContentKind::Gem, data.clone())],
                pushed_properties("example", "1.0.0"),
            )
            .await
            .unwrap();
    }

    let (_, store) = filesystem_store(&dir).await;
    let mut resource = store.resource("example-1.0.0");
    resource.load(ContentKind::Gem).await.unwrap();
    assert_eq!(resource.content(ContentKind::Gem), Some(&data));
    assert_eq!(store.list().await.unwrap(), vec!["example-1.0.0"]);
}

#[tokio::test]
async fn test_namespaces_are_segregated() {
    let dir = TempDir::new().unwrap();
    let (backend, private) = filesystem_store(&dir).await;
    let other = ResourceStore::new(Arc::clone(&backend), "cache/gems");

    other
        .resource("example-1.0.0")
        .save(
            [(ContentKind::Gem, Bytes::from("upstream"))],
            pushed_properties("example", "1.0.0"),
        )
        .await
        .unwrap();

    assert!(private.list().await.unwrap().is_empty());
    assert!(
        !private
            .resource("example-1.0.0")
            .exists(ContentKind::Gem)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_lock_serializes_read_modify_write() {
    let dir = TempDir::new().unwrap();
    let (_, store) = filesystem_store(&dir).await;
    store
        .resource("example-1.0.0")
        .save(
            [(ContentKind::Gem, Bytes::from("gem"))],
            pushed_properties("example", "1.0.0"),
        )
        .await
        .unwrap();

    let in_section = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let in_section = Arc::clone(&in_section);
        handles.push(tokio::spawn(async move {
            let _guard = store.lock("example-1.0.0").await;
            assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);

            let mut resource = store.resource("example-1.0.0");
            resource
                .update_properties(|p| p.indexed = i % 2 == 0)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;

            in_section.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Whatever the final flag, the bag is intact.
    let mut resource = store.resource("example-1.0.0");
    let properties = resource.load_properties().await.unwrap();
    assert_eq!(properties.name.as_deref(), Some("example"));
    assert_eq!(properties.version.as_deref(), Some("1.0.0"));
}
