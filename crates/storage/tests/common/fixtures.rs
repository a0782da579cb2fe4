use bytes::Bytes;
use gemvault_core::Dependency;
use gemvault_storage::Properties;

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Properties as a successful push would record them.
pub fn pushed_properties(name: &str, version: &str) -> Properties {
    Properties {
        indexed: true,
        name: Some(name.to_string()),
        version: Some(version.to_string()),
        platform: None,
        prerelease: gemvault_core::is_prerelease(version),
        dependencies: vec![Dependency {
            name: "rack".to_string(),
            requirement: ">= 2.0".to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
