//! Test fixtures: real `.gem` archives built in memory.

use bytes::Bytes;
use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// A gem to build: name, version, optional platform and runtime dependencies.
#[derive(Clone, Debug)]
pub struct GemFixture {
    pub name: String,
    pub version: String,
    pub platform: Option<String>,
    pub dependencies: Vec<(String, String)>,
}

#[allow(dead_code)]
impl GemFixture {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            platform: None,
            dependencies: Vec::new(),
        }
    }

    pub fn platform(mut self, platform: &str) -> Self {
        self.platform = Some(platform.to_string());
        self
    }

    /// Add a runtime dependency with a single `op version` clause.
    pub fn depends_on(mut self, name: &str, op: &str, version: &str) -> Self {
        self.dependencies
            .push((name.to_string(), format!("{op} {version}")));
        self
    }

    /// The metadata document, shaped like `gem build` writes it.
    pub fn metadata_yaml(&self) -> String {
        let mut yaml = format!(
            "--- !ruby/object:Gem::Specification\nname: {}\nversion: !ruby/object:Gem::Version\n  version: '{}'\nplatform: {}\nauthors:\n- Test Author\n",
            self.name,
            self.version,
            self.platform.as_deref().unwrap_or("ruby"),
        );
        if self.dependencies.is_empty() {
            yaml.push_str("dependencies: []\n");
        } else {
            yaml.push_str("dependencies:\n");
            for (name, requirement) in &self.dependencies {
                let (op, version) = requirement.split_once(' ').unwrap();
                yaml.push_str(&format!(
                    "- !ruby/object:Gem::Dependency\n  name: {name}\n  requirement: !ruby/object:Gem::Requirement\n    requirements:\n    - - \"{op}\"\n      - !ruby/object:Gem::Version\n        version: '{version}'\n  type: :runtime\n  prerelease: false\n"
                ));
            }
        }
        yaml
    }

    /// A plain tar holding `metadata.gz`, `data.tar.gz` and `checksums.yaml.gz`.
    pub fn build(&self) -> Bytes {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [
            ("metadata.gz", gzip(self.metadata_yaml().as_bytes())),
            ("data.tar.gz", gzip(format!("lib/{}.rb", self.name).as_bytes())),
            ("checksums.yaml.gz", gzip(b"---\n")),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o444);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data.as_slice())
                .unwrap();
        }
        Bytes::from(builder.into_inner().unwrap())
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[allow(dead_code)]
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

#[allow(dead_code)]
pub fn inflate(data: &[u8]) -> String {
    let mut out = String::new();
    ZlibDecoder::new(data).read_to_string(&mut out).unwrap();
    out
}

/// Seed bytes that are not a gem archive.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_parses_as_gem() {
        let gem = GemFixture::new("widget", "1.2.0")
            .platform("java")
            .depends_on("rack", ">=", "2.0")
            .build();
        let spec = gemvault_core::GemSpec::parse(&gem).unwrap();
        assert_eq!(spec.identity.full_name(), "widget-1.2.0-java");
        assert_eq!(spec.dependencies.len(), 1);
        assert_eq!(spec.dependencies[0].requirement, ">= 2.0");
    }
}
