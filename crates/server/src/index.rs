//! `specs.4.8.gz` and `prerelease_specs.4.8.gz` index generation.
//!
//! An index is the gzipped Marshal dump of `[name, Gem::Version, platform]`
//! tuples for every indexed resource. Built indexes are kept in memory until
//! the next successful push, yank or unyank.

use crate::error::ApiResult;
use crate::metrics::{INDEX_BUILD_DURATION, INDEX_BUILDS};
use bytes::Bytes;
use dashmap::DashMap;
use gemvault_core::marshal::{MarshalValue, gzip};
use gemvault_core::{DEFAULT_PLATFORM, is_prerelease};
use gemvault_storage::{ContentKind, ResourceStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Which listing to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Every indexed version.
    All,
    /// Only prerelease versions.
    Prerelease,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "specs",
            Self::Prerelease => "prerelease_specs",
        }
    }

    fn includes(&self, version: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prerelease => is_prerelease(version),
        }
    }
}

/// One row of an index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub platform: String,
}

/// Indexed entries of the store, sorted by name, version and platform.
pub async fn collect_entries(gems: &ResourceStore, kind: IndexKind) -> ApiResult<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    for full_name in gems.list().await? {
        let mut resource = gems.resource(&full_name);
        let properties = resource.load_properties().await?.clone();
        if !properties.indexed {
            continue;
        }
        let (Some(name), Some(version)) = (properties.name, properties.version) else {
            tracing::warn!(%full_name, "indexed resource without identity, skipping");
            continue;
        };
        if !kind.includes(&version) {
            continue;
        }
        // Properties are written before the archive; skip half-written pushes.
        if !resource.exists(ContentKind::Gem).await? {
            continue;
        }
        entries.push(IndexEntry {
            name,
            version,
            platform: properties
                .platform
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
        });
    }
    entries.sort();
    Ok(entries)
}

/// Marshal and gzip a listing.
pub fn encode(entries: &[IndexEntry]) -> ApiResult<Bytes> {
    let tuples = entries
        .iter()
        .map(|entry| {
            MarshalValue::Array(vec![
                MarshalValue::string(entry.name.as_str()),
                MarshalValue::gem_version(entry.version.as_str()),
                MarshalValue::string(entry.platform.as_str()),
            ])
        })
        .collect();
    Ok(Bytes::from(gzip(&MarshalValue::Array(tuples).dump())?))
}

/// Cached index builder.
///
/// Entries are stamped with the generation they were built in; bumping the
/// generation makes every older entry invisible even if a build that started
/// before the bump stores its result afterwards.
#[derive(Default)]
pub struct SpecsIndex {
    generation: AtomicU64,
    cache: DashMap<IndexKind, (u64, Bytes)>,
}

impl SpecsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized index of `kind`, from cache when still current.
    pub async fn get(&self, gems: &ResourceStore, kind: IndexKind) -> ApiResult<Bytes> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(entry) = self.cache.get(&kind)
            && entry.0 == generation
        {
            return Ok(entry.1.clone());
        }

        let started = Instant::now();
        let entries = collect_entries(gems, kind).await?;
        let data = encode(&entries)?;
        INDEX_BUILDS.with_label_values(&[kind.as_str()]).inc();
        INDEX_BUILD_DURATION.observe(started.elapsed().as_secs_f64());
        tracing::debug!(index = kind.as_str(), entries = entries.len(), "built spec index");

        self.cache.insert(kind, (generation, data.clone()));
        Ok(data)
    }

    /// Drop every cached index.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
    }
}
