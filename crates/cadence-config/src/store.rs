// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage port for raw config blobs.

use thiserror::Error;

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns [`ConfigError::NotFound`] when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob, replacing any previous value.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("[CONFIG_NOT_FOUND] no config stored under this key")]
    NotFound,
    /// Key is empty or could escape the store root.
    #[error("[CONFIG_INVALID_KEY] `{0}` is not a valid config key")]
    InvalidKey(String),
    /// I/O error while reading/writing.
    #[error("[CONFIG_IO] {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("[CONFIG_SERDE] {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("[CONFIG_OTHER] {0}")]
    Other(String),
}

/// Accepts keys made of ASCII letters, digits, `-`, `_` and `.`, not starting
/// with a dot.
pub fn validate_key(key: &str) -> Result<(), ConfigError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if key.is_empty() || key.starts_with('.') || !key.chars().all(allowed) {
        return Err(ConfigError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_are_accepted() {
        for key in ["driver", "driver-v2", "harness.world", "a_b"] {
            validate_key(key).unwrap();
        }
    }

    #[test]
    fn path_like_keys_are_rejected() {
        for key in ["", ".hidden", "../escape", "a/b", "a\\b", "sp ace"] {
            assert!(matches!(validate_key(key), Err(ConfigError::InvalidKey(_))));
        }
    }
}
