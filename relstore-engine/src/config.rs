//! Runtime configuration for the record manager.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Buffer pool frames used when nothing else is configured.
pub const DEFAULT_POOL_FRAMES: usize = 5;

/// Tunables applied to every table opened through a
/// [`RecordManager`](crate::RecordManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordManagerConfig {
    /// Frames in each table's buffer pool.
    pub buffer_pool_frames: usize,
}

impl Default for RecordManagerConfig {
    fn default() -> Self {
        RecordManagerConfig {
            buffer_pool_frames: DEFAULT_POOL_FRAMES,
        }
    }
}

impl RecordManagerConfig {
    /// Parse a configuration from TOML. Missing keys fall back to their
    /// defaults.
    pub fn from_toml_str(input: &str) -> EngineResult<Self> {
        Ok(toml::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecordManagerConfig::default();
        assert_eq!(config.buffer_pool_frames, 5);
    }

    #[test]
    fn test_parse_toml() {
        let config = RecordManagerConfig::from_toml_str("buffer_pool_frames = 32").unwrap();
        assert_eq!(config.buffer_pool_frames, 32);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RecordManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config.buffer_pool_frames, DEFAULT_POOL_FRAMES);
    }

    #[test]
    fn test_bad_toml_is_rejected() {
        assert!(RecordManagerConfig::from_toml_str("buffer_pool_frames = \"lots\"").is_err());
    }
}
