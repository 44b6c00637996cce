//! # stage-config
//!
//! Layered configuration loading for the staging engine using `figment`.
//!
//! Configuration sources (in priority order):
//! 1. Environment variables (`STAGE_*`)
//! 2. An optional TOML file path supplied by the caller
//! 3. Built-in defaults

pub mod chunking;
pub mod error;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

pub use chunking::ChunkingConfig;
pub use error::ConfigError;

/// Top-level staging engine configuration.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, Default)]
pub struct StageConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl StageConfig {
    /// Load configuration layering environment variables over an optional
    /// TOML file over built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML file exists but fails to parse,
    /// or if the merged configuration cannot be extracted into
    /// [`StageConfig`].
    pub fn load(toml_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = toml_path
            && path.exists()
        {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("STAGE_").split("_"));

        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_with_no_file() {
        let config = StageConfig::load(None).unwrap();
        assert_eq!(config.chunking.chunk_threshold_bytes, 32 * 1024);
    }

    #[test]
    fn env_override_wins_over_defaults() {
        unsafe {
            std::env::set_var("STAGE_CHUNKING_CHUNK_THRESHOLD_BYTES", "1024");
        }
        let config = StageConfig::load(None).unwrap();
        unsafe {
            std::env::remove_var("STAGE_CHUNKING_CHUNK_THRESHOLD_BYTES");
        }
        assert_eq!(config.chunking.chunk_threshold_bytes, 1024);
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.toml");
        std::fs::write(&path, "[chunking]\nsample_rows = 5\n").unwrap();
        let config = StageConfig::load(Some(&path)).unwrap();
        assert_eq!(config.chunking.sample_rows, 5);
    }
}
