//! Dependency API: runtime dependencies of indexed versions, by gem name.

use crate::error::{ApiError, ApiResult};
use gemvault_core::marshal::MarshalValue;
use gemvault_core::DEFAULT_PLATFORM;
use gemvault_storage::{ContentKind, ResourceStore};
use serde::Serialize;
use std::collections::BTreeSet;

/// Upper bound on gem names per request, matching rubygems.org.
pub const MAX_DEPENDENCY_GEMS: usize = 200;

/// One indexed version and its runtime dependencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DependencyEntry {
    pub name: String,
    pub number: String,
    pub platform: String,
    /// `[name, requirement]` pairs.
    pub dependencies: Vec<[String; 2]>,
}

impl DependencyEntry {
    fn to_marshal(&self) -> MarshalValue {
        MarshalValue::Hash(vec![
            (
                MarshalValue::symbol("name"),
                MarshalValue::string(self.name.as_str()),
            ),
            (
                MarshalValue::symbol("number"),
                MarshalValue::string(self.number.as_str()),
            ),
            (
                MarshalValue::symbol("platform"),
                MarshalValue::string(self.platform.as_str()),
            ),
            (
                MarshalValue::symbol("dependencies"),
                MarshalValue::Array(
                    self.dependencies
                        .iter()
                        .map(|[name, requirement]| {
                            MarshalValue::Array(vec![
                                MarshalValue::string(name.as_str()),
                                MarshalValue::string(requirement.as_str()),
                            ])
                        })
                        .collect(),
                ),
            ),
        ])
    }
}

/// Split the comma-separated `gems` parameter, dropping blanks and duplicates.
pub fn parse_gem_names(param: Option<&str>) -> ApiResult<Vec<String>> {
    let names: BTreeSet<String> = param
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.len() > MAX_DEPENDENCY_GEMS {
        return Err(ApiError::Validation(format!(
            "Too many gems (use --full-index instead), max {MAX_DEPENDENCY_GEMS}"
        )));
    }
    Ok(names.into_iter().collect())
}

/// Dependency entries for every indexed version of `names`.
pub async fn for_gems(gems: &ResourceStore, names: &[String]) -> ApiResult<Vec<DependencyEntry>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for full_name in gems.list().await? {
        // Cheap prefix filter before touching storage; the recorded name decides.
        if !names
            .iter()
            .any(|name| full_name.starts_with(&format!("{name}-")))
        {
            continue;
        }

        let mut resource = gems.resource(&full_name);
        let properties = resource.load_properties().await?.clone();
        let (Some(name), Some(version)) = (properties.name, properties.version) else {
            continue;
        };
        if !properties.indexed || !names.contains(&name) {
            continue;
        }
        if !resource.exists(ContentKind::Gem).await? {
            continue;
        }

        entries.push(DependencyEntry {
            name,
            number: version,
            platform: properties
                .platform
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
            dependencies: properties
                .dependencies
                .into_iter()
                .map(|dep| [dep.name, dep.requirement])
                .collect(),
        });
    }

    entries.sort_by(|a, b| {
        (&a.name, &a.number, &a.platform).cmp(&(&b.name, &b.number, &b.platform))
    });
    Ok(entries)
}

/// Marshal form used by `gem install` and Bundler.
pub fn to_marshal(entries: &[DependencyEntry]) -> Vec<u8> {
    MarshalValue::Array(entries.iter().map(DependencyEntry::to_marshal).collect()).dump()
}
