//! Push, yank and unyank of private gem versions.
//!
//! Each operation authorizes first, then holds the resource lock of the
//! addressed version for its whole check-then-write sequence. A refused
//! authorization never touches storage.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{GEMS_PUSHED, GEMS_UNYANKED, GEMS_YANKED, record_rejection};
use crate::state::AppState;
use bytes::Bytes;
use gemvault_core::gem::validate_full_name;
use gemvault_core::{GemIdentity, GemSpec, Permission};
use gemvault_storage::{ContentKind, Properties};
use serde::Deserialize;

/// Push a gem archive.
pub async fn push(state: &AppState, key: Option<&str>, gem: Bytes) -> ApiResult<GemIdentity> {
    state.authorizer().check(key, Permission::Push).await?;

    let spec = parse_archive(gem.clone()).await?;
    let identity = spec.identity.clone();
    let full_name = identity.full_name();

    let _lock = state.gems.lock(&full_name).await;
    let mut resource = state.gems.resource(&full_name);
    if resource.exists(ContentKind::Gem).await? {
        record_rejection("push");
        let stored = resource.load_properties().await?;
        let message = if !stored.is_identity(
            identity.name(),
            identity.version(),
            identity.platform(),
        ) {
            format!("Cannot push: {full_name} is already taken by another gem!")
        } else if stored.indexed {
            "Cannot push to an existing version!".to_string()
        } else {
            "Cannot push to a yanked version!".to_string()
        };
        return Err(ApiError::Validation(message));
    }

    let properties = Properties {
        indexed: true,
        name: Some(identity.name().to_string()),
        version: Some(identity.version().to_string()),
        platform: identity.platform().map(str::to_string),
        prerelease: identity.is_prerelease(),
        dependencies: spec.dependencies.clone(),
    };
    let spec_blob = Bytes::from(spec.spec_blob()?);
    let size = gem.len();
    resource
        .save(
            [(ContentKind::Gem, gem), (ContentKind::Spec, spec_blob)],
            properties,
        )
        .await?;

    state.specs.invalidate();
    GEMS_PUSHED.inc();
    tracing::info!(gem = %identity, size, "gem pushed");
    Ok(identity)
}

/// Parsing inflates and walks the archive, so it runs on the blocking pool.
async fn parse_archive(gem: Bytes) -> ApiResult<GemSpec> {
    let spec = tokio::task::spawn_blocking(move || GemSpec::parse(&gem))
        .await
        .map_err(|e| ApiError::Internal(format!("archive parser task failed: {e}")))??;
    Ok(spec)
}

/// Parameters addressing a version for yank and unyank.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct YankParams {
    pub gem_name: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

impl YankParams {
    /// Field-wise merge: values in `self` win over `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            gem_name: self.gem_name.or(fallback.gem_name),
            version: self.version.or(fallback.version),
            platform: self.platform.or(fallback.platform),
        }
    }

    /// Gem name and slug. A blank platform is the same as none.
    pub fn target(&self) -> ApiResult<(String, String)> {
        let name = required(self.gem_name.as_deref(), "gem_name")?;
        let version = required(self.version.as_deref(), "version")?;
        Ok((
            name.to_string(),
            gemvault_core::slug(version, self.platform.as_deref()),
        ))
    }

    /// Whether `stored` was recorded for exactly the addressed version.
    fn addresses(&self, stored: &Properties) -> bool {
        stored.is_identity(
            trimmed(&self.gem_name),
            trimmed(&self.version),
            self.platform.as_deref(),
        )
    }
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

fn required<'a>(value: Option<&'a str>, field: &str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("Missing required parameter: {field}")))
}

#[derive(Clone, Copy, Debug)]
enum Visibility {
    Yank,
    Unyank,
}

impl Visibility {
    fn operation(self) -> &'static str {
        match self {
            Self::Yank => "yank",
            Self::Unyank => "unyank",
        }
    }

    /// `indexed` after the change.
    fn indexed(self) -> bool {
        matches!(self, Self::Unyank)
    }

    fn unknown(self) -> ApiError {
        ApiError::NotFound(format!(
            "Cannot {} an unknown version!",
            self.operation()
        ))
    }

    fn already(self) -> ApiError {
        ApiError::Validation(
            match self {
                Self::Yank => "Cannot yank an already yanked version!",
                Self::Unyank => "Cannot unyank an indexed version!",
            }
            .to_string(),
        )
    }
}

/// Hide a pushed version from indexes and downloads. Contents are kept.
pub async fn yank(state: &AppState, key: Option<&str>, params: &YankParams) -> ApiResult<String> {
    set_visibility(state, key, params, Visibility::Yank).await
}

/// Restore a yanked version.
pub async fn unyank(state: &AppState, key: Option<&str>, params: &YankParams) -> ApiResult<String> {
    set_visibility(state, key, params, Visibility::Unyank).await
}

/// Returns the full name of the changed version.
async fn set_visibility(
    state: &AppState,
    key: Option<&str>,
    params: &YankParams,
    change: Visibility,
) -> ApiResult<String> {
    state.authorizer().check(key, Permission::Yank).await?;

    let (name, slug) = params.target()?;
    let full_name = format!("{name}-{slug}");
    if validate_full_name(&full_name).is_err() {
        return Err(change.unknown());
    }

    let _lock = state.gems.lock(&full_name).await;
    let mut resource = state.gems.resource(&full_name);
    if !resource.exists(ContentKind::Gem).await? {
        record_rejection(change.operation());
        return Err(change.unknown());
    }
    let stored = resource.load_properties().await?;
    if !params.addresses(stored) {
        record_rejection(change.operation());
        return Err(change.unknown());
    }
    if stored.indexed == change.indexed() {
        record_rejection(change.operation());
        return Err(change.already());
    }

    resource
        .update_properties(|p| p.indexed = change.indexed())
        .await?;

    state.specs.invalidate();
    match change {
        Visibility::Yank => GEMS_YANKED.inc(),
        Visibility::Unyank => GEMS_UNYANKED.inc(),
    }
    tracing::info!(gem = %full_name, operation = change.operation(), "gem visibility changed");
    Ok(full_name)
}
