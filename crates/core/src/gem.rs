//! Gem identity, full names and yank slugs.
//!
//! A gem version is identified by `(name, version, platform?)`. Two strings
//! are derived from it:
//! - the *full name* (`name-version[-platform]`), used as the storage key
//! - the *slug* (`version[-platform]`), used to address yank/unyank
//!
//! Platform normalization lives here so that the write side (push) and the
//! addressing side (yank/unyank) can never disagree: an absent, blank or
//! `ruby` platform all mean "no platform".

use crate::error::{Error, Result};
use crate::DEFAULT_PLATFORM;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a single identity component.
const MAX_COMPONENT_LEN: usize = 128;

/// Maximum length of a full name (name + version + platform and separators).
const MAX_FULL_NAME_LEN: usize = 3 * MAX_COMPONENT_LEN + 2;

/// A validated gem identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemIdentity {
    name: String,
    version: String,
    platform: Option<String>,
}

impl GemIdentity {
    /// Create a new identity, validating every component.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        platform: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        validate_name(&name)?;
        validate_version(&version)?;

        let platform = normalize_platform(platform);
        if let Some(platform) = &platform {
            validate_platform(platform)?;
        }

        Ok(Self {
            name,
            version,
            platform,
        })
    }

    /// Gem name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version string, exactly as declared by the gem.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Platform, if the gem is platform-specific.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Platform as listed in spec indexes (`ruby` when absent).
    pub fn platform_or_default(&self) -> &str {
        self.platform.as_deref().unwrap_or(DEFAULT_PLATFORM)
    }

    /// Storage key for this identity.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.slug())
    }

    /// Yank/unyank addressing token for this identity.
    pub fn slug(&self) -> String {
        slug(&self.version, self.platform.as_deref())
    }

    /// Whether the version is a prerelease.
    pub fn is_prerelease(&self) -> bool {
        is_prerelease(&self.version)
    }
}

impl fmt::Display for GemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Normalize an optional platform: blank and `ruby` collapse to `None`.
pub fn normalize_platform(platform: Option<&str>) -> Option<String> {
    platform
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != DEFAULT_PLATFORM)
        .map(str::to_string)
}

/// Compute the yank slug: `version`, or `version-platform` when a platform is given.
pub fn slug(version: &str, platform: Option<&str>) -> String {
    match normalize_platform(platform) {
        Some(platform) => format!("{version}-{platform}"),
        None => version.to_string(),
    }
}

/// RubyGems rule: any letter in the version makes it a prerelease.
pub fn is_prerelease(version: &str) -> bool {
    version.chars().any(|c| c.is_ascii_alphabetic())
}

/// Validate a full name taken from a request path before it becomes a storage key.
pub fn validate_full_name(full_name: &str) -> Result<()> {
    if full_name.is_empty()
        || full_name.len() > MAX_FULL_NAME_LEN
        || full_name.starts_with(['.', '-'])
        || full_name.contains("..")
        || !full_name.chars().all(is_identity_char)
    {
        return Err(Error::InvalidFullName(full_name.to_string()));
    }
    Ok(())
}

fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

fn validate_component(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_COMPONENT_LEN
        && !value.contains("..")
        && value.chars().all(is_identity_char)
}

fn validate_name(name: &str) -> Result<()> {
    if !validate_component(name) || name.starts_with(['.', '-']) {
        return Err(Error::InvalidGemName(name.to_string()));
    }
    Ok(())
}

/// `-` separates the version from the platform in a full name, so it never
/// appears inside a version.
fn validate_version(version: &str) -> Result<()> {
    if !validate_component(version)
        || !version.starts_with(|c: char| c.is_ascii_digit())
        || version.contains('-')
    {
        return Err(Error::InvalidVersion(version.to_string()));
    }
    Ok(())
}

/// Platforms start with a letter so they cannot be read back as a version.
fn validate_platform(platform: &str) -> Result<()> {
    if !validate_component(platform) || !platform.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(Error::InvalidPlatform(platform.to_string()));
    }
    Ok(())
}
