//! Server test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use bytes::Bytes;
use gemvault_core::config::{AppConfig, MetadataConfig, StorageConfig};
use gemvault_core::{Permission, hash_key};
use gemvault_metadata::{AuthorizationRow, MetadataStore, SqliteStore};
use gemvault_server::{AppState, create_router};
use gemvault_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// Status, headers and body of a response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem { path: storage_path },
            metadata: MetadataConfig::Sqlite { path: db_path },
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Record a fresh key with the given permissions and return the raw key.
    pub async fn create_key(&self, permissions: &[Permission]) -> String {
        let raw_key = format!("test-key-{}", Uuid::new_v4().simple());
        let row = AuthorizationRow::new(hash_key(&raw_key), permissions, Some("test".to_string()))
            .expect("Failed to build authorization");
        self.metadata()
            .create_authorization(&row)
            .await
            .expect("Failed to create authorization");
        raw_key
    }

    /// Send a request through the router.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        key: Option<&str>,
        content_type: Option<&str>,
        body: impl Into<Body>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, key);
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(body.into()).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, None, Body::empty()).await
    }

    pub async fn push(&self, key: Option<&str>, gem: Bytes) -> TestResponse {
        self.send(
            Method::POST,
            "/private/api/v1/gems",
            key,
            Some("application/octet-stream"),
            gem,
        )
        .await
    }

    /// Yank or unyank with form-encoded parameters, as `gem yank` sends them.
    pub async fn set_visibility(
        &self,
        yank: bool,
        key: Option<&str>,
        form: &str,
    ) -> TestResponse {
        let (method, uri) = if yank {
            (Method::DELETE, "/private/api/v1/gems/yank")
        } else {
            (Method::PUT, "/private/api/v1/gems/unyank")
        };
        self.send(
            method,
            uri,
            key,
            Some("application/x-www-form-urlencoded"),
            form.to_string(),
        )
        .await
    }

    pub async fn yank(&self, key: Option<&str>, form: &str) -> TestResponse {
        self.set_visibility(true, key, form).await
    }

    pub async fn unyank(&self, key: Option<&str>, form: &str) -> TestResponse {
        self.set_visibility(false, key, form).await
    }
}
