//! Authorization keys, the authentication gate and request tracing.

use crate::error::{ApiError, ApiResult};
use crate::metrics::AUTHORIZATION_FAILURES;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use gemvault_core::{Authorization, Permission, hash_key};
use gemvault_metadata::MetadataStore;
use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, truncated and
    /// restricted to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Runs every request inside a span carrying its trace ID.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);
    next.run(req).instrument(span).await
}

/// Authorization key sent by the client.
///
/// Gem clients send the raw key as the whole `Authorization` header; a
/// `Bearer ` scheme (any case) is accepted as well. Blank values count as
/// absent.
pub fn extract_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let key = if value.len() >= 7 && value[..7].eq_ignore_ascii_case("bearer ") {
        value[7..].trim()
    } else {
        value
    };
    (!key.is_empty()).then(|| key.to_string())
}

/// Checks authorization keys against the metadata store.
#[derive(Clone)]
pub struct Authorizer {
    metadata: Arc<dyn MetadataStore>,
}

impl Authorizer {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Resolve `key` and require `permission`.
    ///
    /// Every refusal is an [`ApiError::NotAuthorized`]; other errors come from
    /// the metadata store.
    pub async fn check(&self, key: Option<&str>, permission: Permission) -> ApiResult<Authorization> {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Err(refuse("missing", "Authorization key required".to_string()));
        };

        let Some(row) = self.metadata.get_authorization_by_hash(&hash_key(key)).await? else {
            return Err(refuse("invalid", "Authorization key is invalid".to_string()));
        };
        let authorization = row.to_authorization()?;
        if !authorization.is_valid() {
            return Err(refuse("invalid", "Authorization key is invalid".to_string()));
        }
        if !authorization.has_permission(permission) {
            return Err(refuse(
                "permission",
                format!("Authorization key doesn't have {permission} access"),
            ));
        }

        // Update last used time (fire and forget)
        let metadata = Arc::clone(&self.metadata);
        let authorization_id = row.authorization_id;
        tokio::spawn(async move {
            if let Err(e) = metadata
                .touch_authorization(authorization_id, OffsetDateTime::now_utc())
                .await
            {
                tracing::debug!(%authorization_id, error = %e, "failed to record key usage");
            }
        });

        Ok(authorization)
    }
}

fn refuse(reason: &'static str, message: String) -> ApiError {
    AUTHORIZATION_FAILURES.with_label_values(&[reason]).inc();
    tracing::info!(reason, "authorization refused");
    ApiError::NotAuthorized(message)
}

/// Run `op`, turning a [`ApiError::NotAuthorized`] into a challenge for `realm`.
/// Every other outcome passes through untouched.
pub async fn authenticated<T, F>(realm: &str, op: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    match op.await {
        Err(ApiError::NotAuthorized(message)) => Err(ApiError::Challenge {
            realm: realm.to_string(),
            message,
        }),
        other => other,
    }
}
