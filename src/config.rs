//! Engine configuration
//!
//! Read from YAML. Every field has a default, so an empty file (or no file
//! at all) is a valid configuration.

use crate::query::PathBounds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Entity classification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub enabled: bool,
    /// Classifier calls allowed in flight at once
    pub max_concurrency: usize,
    /// Per-scene classification timeout
    pub timeout_secs: u64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrency: 4,
            timeout_secs: 30,
        }
    }
}

/// Narrative-logic evaluator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub enabled: bool,
    /// Per-path evaluation timeout
    pub timeout_secs: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 60,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bounds: PathBounds,
    pub classification: ClassificationConfig,
    pub narrative: NarrativeConfig,
}

impl EngineConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: EngineConfig = if yaml.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Load from the default location, falling back to defaults if the
    /// file does not exist
    pub fn load_default() -> ConfigResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Default config path (`<config dir>/plotline/config.yaml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("plotline").join("config.yaml"))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.classification.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "classification.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.classification.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "classification.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.narrative.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "narrative.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Bounds for one evaluation: request values override configured ones
    pub fn bounds_for(&self, max_depth: Option<usize>, max_paths: Option<usize>) -> PathBounds {
        PathBounds::new(
            max_depth.unwrap_or(self.bounds.max_depth),
            max_paths.unwrap_or(self.bounds.max_paths),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = EngineConfig::from_yaml("bounds:\n  max_paths: 50\nnarrative:\n  enabled: false\n").unwrap();

        assert_eq!(config.bounds.max_paths, 50);
        assert_eq!(config.bounds.max_depth, 64);
        assert!(!config.narrative.enabled);
        assert_eq!(config.classification, ClassificationConfig::default());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = EngineConfig::from_yaml("classification:\n  max_concurrency: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let err = EngineConfig::from_yaml("classification:\n  timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_yaml("narrative:\n  timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "classification:\n  timeout_secs: 5").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.classification.timeout_secs, 5);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_request_bounds_override() {
        let config = EngineConfig::default();
        let bounds = config.bounds_for(None, Some(100));
        assert_eq!(bounds, PathBounds::new(64, 100));
    }
}
