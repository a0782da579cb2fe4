//! Tests for bootstrap key initialization behavior.

mod common;

use axum::http::StatusCode;
use common::TestServer;
use common::fixtures::GemFixture;
use gemvault_core::config::AuthConfig;
use gemvault_core::{Permission, hash_key};
use gemvault_server::bootstrap::{BOOTSTRAP_KEY_NAME, ensure_bootstrap_key};
use time::OffsetDateTime;

fn auth_config(raw_key: Option<&str>) -> AuthConfig {
    AuthConfig {
        bootstrap_key_hash: raw_key.map(hash_key),
        ..AuthConfig::default()
    }
}

#[tokio::test]
async fn test_bootstrap_key_created_and_usable() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_bootstrap_key(metadata.as_ref(), &server.state.config.auth)
        .await
        .unwrap();

    let row = metadata
        .get_authorization_by_hash(&hash_key("test-bootstrap-key"))
        .await
        .unwrap()
        .expect("bootstrap key should exist");
    assert_eq!(row.name.as_deref(), Some(BOOTSTRAP_KEY_NAME));
    assert!(row.revoked_at.is_none());
    assert!(row.to_authorization().unwrap().has_permission(Permission::Push));
    assert_eq!(
        metadata.get_bootstrap_authorization_id().await.unwrap(),
        Some(row.authorization_id)
    );

    let response = server
        .push(
            Some("test-bootstrap-key"),
            GemFixture::new("example", "0.1.0").build(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let config = auth_config(Some("first-key"));

    ensure_bootstrap_key(metadata.as_ref(), &config).await.unwrap();
    ensure_bootstrap_key(metadata.as_ref(), &config).await.unwrap();

    let rows = metadata.list_authorizations().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].revoked_at.is_none());
}

#[tokio::test]
async fn test_bootstrap_rotation_revokes_previous_key() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_bootstrap_key(metadata.as_ref(), &auth_config(Some("first-key")))
        .await
        .unwrap();
    ensure_bootstrap_key(metadata.as_ref(), &auth_config(Some("second-key")))
        .await
        .unwrap();

    let first = metadata
        .get_authorization_by_hash(&hash_key("first-key"))
        .await
        .unwrap()
        .unwrap();
    let second = metadata
        .get_authorization_by_hash(&hash_key("second-key"))
        .await
        .unwrap()
        .unwrap();
    assert!(first.revoked_at.is_some());
    assert!(second.revoked_at.is_none());
    assert_eq!(
        metadata.get_bootstrap_authorization_id().await.unwrap(),
        Some(second.authorization_id)
    );

    let response = server
        .push(Some("first-key"), GemFixture::new("example", "0.1.0").build())
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bootstrap_refuses_revoked_hash() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let config = auth_config(Some("first-key"));

    ensure_bootstrap_key(metadata.as_ref(), &config).await.unwrap();
    let row = metadata
        .get_authorization_by_hash(&hash_key("first-key"))
        .await
        .unwrap()
        .unwrap();
    metadata
        .revoke_authorization(row.authorization_id, OffsetDateTime::now_utc())
        .await
        .unwrap();

    let err = ensure_bootstrap_key(metadata.as_ref(), &config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("revoked"));
}

#[tokio::test]
async fn test_bootstrap_without_hash_is_noop() {
    let server = TestServer::new().await;
    let metadata = server.metadata();

    ensure_bootstrap_key(metadata.as_ref(), &auth_config(None))
        .await
        .unwrap();

    assert!(metadata.list_authorizations().await.unwrap().is_empty());
    assert!(metadata.get_bootstrap_authorization_id().await.unwrap().is_none());
}

#[tokio::test]
async fn test_bootstrap_accepts_prefixed_uppercase_hash() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let config = AuthConfig {
        bootstrap_key_hash: Some(format!("sha256:{}", hash_key("shouty").to_uppercase())),
        ..AuthConfig::default()
    };
    // Startup validation and key setup agree on the accepted forms.
    assert!(config.validate().is_ok());

    ensure_bootstrap_key(metadata.as_ref(), &config).await.unwrap();

    assert!(
        metadata
            .get_authorization_by_hash(&hash_key("shouty"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_bootstrap_rejects_malformed_hash() {
    let server = TestServer::new().await;
    let config = AuthConfig {
        bootstrap_key_hash: Some("not-a-hash".to_string()),
        ..AuthConfig::default()
    };

    assert!(
        ensure_bootstrap_key(server.metadata().as_ref(), &config)
            .await
            .is_err()
    );
}
