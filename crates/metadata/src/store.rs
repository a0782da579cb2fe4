//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::AuthorizationRow;
use crate::repos::{AuthorizationRepo, BootstrapRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: AuthorizationRepo + BootstrapRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection: SQLite serializes writers anyway, and a single
            // connection avoids "database is locked" under concurrent handlers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthorizationRepo for SqliteStore {
    async fn create_authorization(&self, row: &AuthorizationRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO authorizations (
                authorization_id, key_hash, permissions, name,
                created_at, last_used_at, revoked_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.authorization_id)
        .bind(&row.key_hash)
        .bind(&row.permissions)
        .bind(&row.name)
        .bind(row.created_at)
        .bind(row.last_used_at)
        .bind(row.revoked_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE constraint") => {
                Err(MetadataError::AlreadyExists(
                    "an authorization with this key already exists".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_authorization_by_hash(
        &self,
        key_hash: &str,
    ) -> MetadataResult<Option<AuthorizationRow>> {
        let row = sqlx::query_as::<_, AuthorizationRow>(
            "SELECT * FROM authorizations WHERE key_hash = ?",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_authorization(
        &self,
        authorization_id: Uuid,
    ) -> MetadataResult<Option<AuthorizationRow>> {
        let row = sqlx::query_as::<_, AuthorizationRow>(
            "SELECT * FROM authorizations WHERE authorization_id = ?",
        )
        .bind(authorization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn touch_authorization(
        &self,
        authorization_id: Uuid,
        used_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query("UPDATE authorizations SET last_used_at = ? WHERE authorization_id = ?")
            .bind(used_at)
            .bind(authorization_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_authorization(
        &self,
        authorization_id: Uuid,
        revoked_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE authorizations SET revoked_at = COALESCE(revoked_at, ?) WHERE authorization_id = ?",
        )
        .bind(revoked_at)
        .bind(authorization_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_authorizations(&self) -> MetadataResult<Vec<AuthorizationRow>> {
        let rows = sqlx::query_as::<_, AuthorizationRow>(
            "SELECT * FROM authorizations ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl BootstrapRepo for SqliteStore {
    async fn get_bootstrap_authorization_id(&self) -> MetadataResult<Option<Uuid>> {
        let value: Option<Option<String>> = sqlx::query_scalar(
            "SELECT bootstrap_authorization_id FROM bootstrap_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        value
            .flatten()
            .filter(|id| !id.is_empty())
            .map(|id| {
                Uuid::parse_str(&id).map_err(|e| {
                    MetadataError::Internal(format!(
                        "invalid bootstrap_authorization_id uuid '{id}': {e}"
                    ))
                })
            })
            .transpose()
    }

    async fn set_bootstrap_authorization_id(&self, authorization_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bootstrap_state (id, bootstrap_authorization_id)
            VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_authorization_id = excluded.bootstrap_authorization_id
            "#,
        )
        .bind(authorization_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_bootstrap_authorization_id(&self) -> MetadataResult<()> {
        sqlx::query("UPDATE bootstrap_state SET bootstrap_authorization_id = NULL WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
-- Authorization keys (only the SHA256 of the key is stored)
CREATE TABLE IF NOT EXISTS authorizations (
    authorization_id BLOB PRIMARY KEY,
    key_hash TEXT NOT NULL UNIQUE,
    permissions TEXT NOT NULL,
    name TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    revoked_at TEXT
);

-- Bootstrap marker
CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_authorization_id TEXT
);
INSERT OR IGNORE INTO bootstrap_state (id, bootstrap_authorization_id) VALUES (1, NULL);
"#;
