//! Gem archive parsing.
//!
//! A `.gem` file is a plain tar archive holding `metadata.gz` (a gzipped YAML
//! `Gem::Specification`), `data.tar.gz` and `checksums.yaml.gz`. Only the
//! metadata is read here.

use crate::error::{Error, Result};
use crate::gem::GemIdentity;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use std::io::{Read, Write};
use std::path::Path;

const METADATA_ENTRY: &str = "metadata.gz";

/// Upper bound on the decompressed metadata document.
const MAX_METADATA_SIZE: u64 = 4 * 1024 * 1024;

/// A runtime dependency declared by a gem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Requirement string, e.g. `">= 1.0, < 2"`.
    pub requirement: String,
}

/// Specification extracted from a gem archive.
#[derive(Clone, Debug)]
pub struct GemSpec {
    pub identity: GemIdentity,
    pub dependencies: Vec<Dependency>,
    /// The metadata document, verbatim.
    pub yaml: String,
}

impl GemSpec {
    /// Parse the specification out of raw `.gem` bytes.
    pub fn parse(gem: &[u8]) -> Result<Self> {
        if gem.is_empty() {
            return Err(Error::InvalidArchive("empty gem archive".to_string()));
        }

        let yaml = read_metadata(gem)?;
        Self::from_yaml(yaml)
    }

    /// Build from a metadata YAML document.
    pub fn from_yaml(yaml: String) -> Result<Self> {
        let document: Value = serde_yaml_ng::from_str(&yaml)
            .map_err(|e| Error::InvalidSpec(format!("metadata is not valid YAML: {e}")))?;
        let document = untag(document);

        let name = document
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidSpec("missing name".to_string()))?;
        let version = document
            .get("version")
            .and_then(version_string)
            .ok_or_else(|| Error::InvalidSpec("missing version".to_string()))?;
        let platform = document.get("platform").and_then(Value::as_str);

        let identity = GemIdentity::new(name, version, platform)?;
        let dependencies = document
            .get("dependencies")
            .and_then(Value::as_sequence)
            .map(|deps| deps.iter().filter_map(runtime_dependency).collect())
            .unwrap_or_default();

        Ok(Self {
            identity,
            dependencies,
            yaml,
        })
    }

    /// Stored form of the specification: the metadata document, zlib-deflated.
    pub fn spec_blob(&self) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(self.yaml.as_bytes())
            .map_err(|e| Error::Serialization(format!("deflate failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::Serialization(format!("deflate failed: {e}")))
    }
}

fn read_metadata(gem: &[u8]) -> Result<String> {
    let mut archive = tar::Archive::new(gem);
    let entries = archive
        .entries()
        .map_err(|e| Error::InvalidArchive(format!("not a tar archive: {e}")))?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::InvalidArchive(format!("corrupt entry: {e}")))?;
        let is_metadata = entry
            .path()
            .map(|p| p == Path::new(METADATA_ENTRY))
            .unwrap_or(false);
        if !is_metadata {
            continue;
        }

        let mut yaml = String::new();
        GzDecoder::new(entry)
            .take(MAX_METADATA_SIZE + 1)
            .read_to_string(&mut yaml)
            .map_err(|e| Error::InvalidArchive(format!("unreadable {METADATA_ENTRY}: {e}")))?;
        if yaml.len() as u64 > MAX_METADATA_SIZE {
            return Err(Error::InvalidArchive(format!(
                "{METADATA_ENTRY} exceeds {MAX_METADATA_SIZE} bytes"
            )));
        }
        return Ok(yaml);
    }

    Err(Error::InvalidArchive(format!("no {METADATA_ENTRY} entry")))
}

/// Drop Ruby object tags (`!ruby/object:Gem::Version` and friends).
fn untag(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => untag(tagged.value),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(untag).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (untag(k), untag(v)))
                .collect::<Mapping>(),
        ),
        other => other,
    }
}

/// A version is either `{version: "1.0"}` (a `Gem::Version`) or a bare scalar.
fn version_string(value: &Value) -> Option<String> {
    match value {
        Value::Mapping(_) => value.get("version").and_then(version_string),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn runtime_dependency(value: &Value) -> Option<Dependency> {
    let name = value.get("name")?.as_str()?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or(":runtime");
    if kind.trim_start_matches(':') != "runtime" {
        return None;
    }

    let requirement = value
        .get("requirement")
        .and_then(|r| r.get("requirements"))
        .and_then(Value::as_sequence)
        .map(|reqs| {
            reqs.iter()
                .filter_map(requirement_clause)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| ">= 0".to_string());

    Some(Dependency {
        name: name.to_string(),
        requirement,
    })
}

/// One `[op, version]` pair.
fn requirement_clause(value: &Value) -> Option<String> {
    let pair = value.as_sequence()?;
    let op = pair.first()?.as_str()?;
    let version = version_string(pair.get(1)?)?;
    Some(format!("{op} {version}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use flate2::write::GzEncoder;

    const RACK_SPEC: &str = r#"--- !ruby/object:Gem::Specification
name: rack-session
version: !ruby/object:Gem::Version
  version: 2.0.0
platform: ruby
authors:
- Example
dependencies:
- !ruby/object:Gem::Dependency
  name: rack
  requirement: !ruby/object:Gem::Requirement
    requirements:
    - - ">="
      - !ruby/object:Gem::Version
        version: 3.0.0
    - - "<"
      - !ruby/object:Gem::Version
        version: '4'
  type: :runtime
  prerelease: false
- !ruby/object:Gem::Dependency
  name: minitest
  requirement: !ruby/object:Gem::Requirement
    requirements:
    - - "~>"
      - !ruby/object:Gem::Version
        version: '5.0'
  type: :development
  prerelease: false
"#;

    fn build_gem(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data.as_slice())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_gem_archive() {
        let gem = build_gem(&[
            ("metadata.gz", gz(RACK_SPEC.as_bytes())),
            ("data.tar.gz", gz(b"")),
        ]);
        let spec = GemSpec::parse(&gem).unwrap();

        assert_eq!(spec.identity.name(), "rack-session");
        assert_eq!(spec.identity.version(), "2.0.0");
        assert_eq!(spec.identity.platform(), None);
        assert_eq!(spec.identity.full_name(), "rack-session-2.0.0");
        assert_eq!(
            spec.dependencies,
            vec![Dependency {
                name: "rack".to_string(),
                requirement: ">= 3.0.0, < 4".to_string(),
            }]
        );
    }

    #[test]
    fn test_platform_gem() {
        let yaml = "---\nname: puma\nversion:\n  version: 6.4.0\nplatform: java\n";
        let spec = GemSpec::from_yaml(yaml.to_string()).unwrap();
        assert_eq!(spec.identity.full_name(), "puma-6.4.0-java");
        assert!(spec.dependencies.is_empty());
    }

    #[test]
    fn test_empty_archive_rejected() {
        assert!(matches!(GemSpec::parse(&[]), Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(GemSpec::parse(b"definitely not a gem").is_err());
    }

    #[test]
    fn test_missing_metadata_rejected() {
        let gem = build_gem(&[("data.tar.gz", gz(b""))]);
        assert!(matches!(GemSpec::parse(&gem), Err(Error::InvalidArchive(_))));
    }

    #[test]
    fn test_missing_version_rejected() {
        let gem = build_gem(&[("metadata.gz", gz(b"---\nname: broken\n"))]);
        assert!(matches!(GemSpec::parse(&gem), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn test_spec_blob_inflates_to_metadata() {
        let spec = GemSpec::from_yaml(RACK_SPEC.to_string()).unwrap();
        let blob = spec.spec_blob().unwrap();

        let mut inflated = String::new();
        ZlibDecoder::new(blob.as_slice())
            .read_to_string(&mut inflated)
            .unwrap();
        assert_eq!(inflated, RACK_SPEC);
    }
}
