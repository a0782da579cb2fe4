//! The private gem source: endpoint table and handlers.

use crate::auth::{authenticated, extract_key};
use crate::dependencies::{self, DependencyEntry};
use crate::error::{ApiError, ApiResult};
use crate::index::IndexKind;
use crate::lifecycle::{self, YankParams};
use crate::metrics::record_download;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Form, FromRequest, Query, Request};
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use gemvault_core::gem::validate_full_name;
use gemvault_storage::{ContentKind, Resource};
use serde::Deserialize;

const NOT_YET_SUPPORTED: &str = "Not yet supported";
const YANKED: &str = "That gem has been yanked";

/// Endpoints of the private source, resolved from method and rewritten path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Push,
    Yank,
    Unyank,
    /// `.gemspec.rz` for the given full name.
    Spec(String),
    /// `.gem` archive for the given full name.
    Gem(String),
    Index(IndexKind),
    Dependencies,
    DependenciesJson,
    /// Recognized, but refused in the private namespace.
    Unsupported,
}

impl Endpoint {
    pub fn parse(method: &Method, path: &str) -> Option<Self> {
        let read = *method == Method::GET || *method == Method::HEAD;
        let endpoint = match path {
            "/api/v1/gems" if *method == Method::POST => Self::Push,
            "/api/v1/gems/yank" if *method == Method::DELETE => Self::Yank,
            "/api/v1/gems/unyank" if *method == Method::PUT => Self::Unyank,
            "/specs.4.8.gz" if read => Self::Index(IndexKind::All),
            "/prerelease_specs.4.8.gz" if read => Self::Index(IndexKind::Prerelease),
            "/api/v1/dependencies" if read => Self::Dependencies,
            "/api/v1/dependencies.json" if read => Self::DependenciesJson,
            "/" | "/names" | "/versions" | "/latest_specs.4.8.gz" if read => Self::Unsupported,
            "/api/v1/add_spec.json" | "/api/v1/remove_spec.json" if *method == Method::POST => {
                Self::Unsupported
            }
            _ if read => {
                if let Some(id) = path
                    .strip_prefix("/quick/Marshal.4.8/")
                    .and_then(|rest| rest.strip_suffix(".gemspec.rz"))
                    .filter(|id| is_segment(id))
                {
                    Self::Spec(id.to_string())
                } else if let Some(id) = path
                    .strip_prefix("/gems/")
                    .and_then(|rest| rest.strip_suffix(".gem"))
                    .filter(|id| is_segment(id))
                {
                    Self::Gem(id.to_string())
                } else if path.strip_prefix("/info/").is_some_and(is_segment)
                    || path.strip_prefix("/fetch/actual/gem/").is_some_and(is_segment)
                {
                    Self::Unsupported
                } else {
                    return None;
                }
            }
            _ => return None,
        };
        Some(endpoint)
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains('/')
}

/// Serve a request whose path has already been rewritten for this source.
pub async fn serve(state: &AppState, path: &str, req: Request) -> ApiResult<Response> {
    let Some(endpoint) = Endpoint::parse(req.method(), path) else {
        return Err(ApiError::NotFound("Not Found".to_string()));
    };
    tracing::debug!(?endpoint, "private source request");

    match endpoint {
        Endpoint::Push => {
            let key = extract_key(req.headers());
            let gem = read_gem(req).await?;
            let identity = authenticated(
                state.realm(),
                lifecycle::push(state, key.as_deref(), gem),
            )
            .await?;
            Ok(format!(
                "Successfully registered gem: {} ({})",
                identity.name(),
                identity.slug()
            )
            .into_response())
        }
        Endpoint::Yank => {
            let key = extract_key(req.headers());
            let params = yank_params(req).await?;
            let full_name = authenticated(
                state.realm(),
                lifecycle::yank(state, key.as_deref(), &params),
            )
            .await?;
            Ok(format!("Successfully yanked gem: {full_name}").into_response())
        }
        Endpoint::Unyank => {
            let key = extract_key(req.headers());
            let params = yank_params(req).await?;
            let full_name = authenticated(
                state.realm(),
                lifecycle::unyank(state, key.as_deref(), &params),
            )
            .await?;
            Ok(format!("Successfully unyanked gem: {full_name}").into_response())
        }
        Endpoint::Spec(full_name) => serve_spec(state, &full_name).await,
        Endpoint::Gem(full_name) => {
            let resource = fetch_gem(state, &full_name).await?;
            let data = resource
                .content(ContentKind::Gem)
                .cloned()
                .ok_or_else(|| ApiError::Internal(format!("{full_name}: gem not loaded")))?;
            record_download(ContentKind::Gem.as_str(), data.len());
            Ok(binary(data))
        }
        Endpoint::Index(kind) => Ok(binary(state.specs.get(&state.gems, kind).await?)),
        Endpoint::Dependencies => {
            let names = requested_gems(req.uri())?;
            let entries = dependencies::for_gems(&state.gems, &names).await?;
            Ok(binary(Bytes::from(dependencies::to_marshal(&entries))))
        }
        Endpoint::DependenciesJson => {
            let names = requested_gems(req.uri())?;
            let entries: Vec<DependencyEntry> = dependencies::for_gems(&state.gems, &names).await?;
            Ok(Json(entries).into_response())
        }
        Endpoint::Unsupported => Err(ApiError::Forbidden(NOT_YET_SUPPORTED.to_string())),
    }
}

fn binary(data: Bytes) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response()
}

/// Metadata is served whatever the version's visibility, but only once the
/// archive is stored: a push that failed before writing it left no version.
async fn serve_spec(state: &AppState, full_name: &str) -> ApiResult<Response> {
    if validate_full_name(full_name).is_err() {
        return Err(ApiError::NotFound("Not Found".to_string()));
    }
    let mut resource = state.gems.resource(full_name);
    if !resource.exists(ContentKind::Gem).await? || !resource.exists(ContentKind::Spec).await? {
        return Err(ApiError::NotFound("Not Found".to_string()));
    }
    let data = resource
        .load(ContentKind::Spec)
        .await?
        .content(ContentKind::Spec)
        .cloned()
        .ok_or_else(|| ApiError::Internal(format!("{full_name}: spec not loaded")))?;
    record_download(ContentKind::Spec.as_str(), data.len());
    Ok(binary(data))
}

/// Load a live version: 404 until its archive exists, 403 while yanked.
pub async fn fetch_gem(state: &AppState, full_name: &str) -> ApiResult<Resource> {
    if validate_full_name(full_name).is_err() {
        return Err(ApiError::NotFound("Not Found".to_string()));
    }
    let mut resource = state.gems.resource(full_name);
    if !resource.exists(ContentKind::Gem).await? {
        return Err(ApiError::NotFound("Not Found".to_string()));
    }
    resource.load(ContentKind::Gem).await?;
    if !resource.properties().is_some_and(|p| p.indexed) {
        return Err(ApiError::Forbidden(YANKED.to_string()));
    }
    Ok(resource)
}

/// Read the pushed archive, bounded by the router's body limit.
async fn read_gem(req: Request) -> ApiResult<Bytes> {
    Bytes::from_request(req, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })
}

/// Yank parameters from the query string and, for form posts, the body.
/// Body values take precedence.
async fn yank_params(req: Request) -> ApiResult<YankParams> {
    let Query(query) = Query::<YankParams>::try_from_uri(req.uri())
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return Ok(query);
    }

    let Form(form) = Form::<YankParams>::from_request(req, &())
        .await
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    Ok(form.or(query))
}

#[derive(Debug, Default, Deserialize)]
struct DependencyQuery {
    gems: Option<String>,
}

fn requested_gems(uri: &Uri) -> ApiResult<Vec<String>> {
    let Query(query) = Query::<DependencyQuery>::try_from_uri(uri)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    dependencies::parse_gem_names(query.gems.as_deref())
}
