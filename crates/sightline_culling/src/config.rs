//! # Culling Configuration
//!
//! Tuning knobs for the scene traversal driver, loadable from TOML:
//!
//! ```toml
//! success_duration = 4
//! failure_duration = 0
//! cell_culling = true
//! node_culling = true
//! frustum_test_nodes = true
//! ```
//!
//! Missing keys fall back to [`CullingConfig::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::visibility::FRAME_MASK;

/// Longest window a query result may be trusted for.
pub const MAX_DURATION: u64 = FRAME_MASK >> 1;

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CullingConfig {
    /// Frames a visible query result is trusted for after harvest.
    pub success_duration: u64,
    /// Frames a hidden query result is trusted for after harvest.
    pub failure_duration: u64,
    /// Issue per-cell occlusion queries. When off, every populated
    /// cell in the region renders.
    pub cell_culling: bool,
    /// Honor per-node `occlusion_cull` flags.
    pub node_culling: bool,
    /// Test node bounds against the region before queuing.
    pub frustum_test_nodes: bool,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            success_duration: 4,
            failure_duration: 0,
            cell_culling: true,
            node_culling: true,
            frustum_test_nodes: true,
        }
    }
}

impl CullingConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on bad syntax or unknown keys,
    /// [`ConfigError::Invalid`] on out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`CullingConfig::from_toml_str`].
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!(path = %path.display(), ?config, "culling config loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("success_duration", self.success_duration),
            ("failure_duration", self.failure_duration),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::Invalid(format!(
                    "{name} = {value} exceeds {MAX_DURATION}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(CullingConfig::from_toml_str("").unwrap(), CullingConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = CullingConfig::from_toml_str("success_duration = 10\ncell_culling = false\n").unwrap();
        assert_eq!(config.success_duration, 10);
        assert!(!config.cell_culling);
        assert!(config.node_culling);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = CullingConfig::from_toml_str("succes_duration = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = CullingConfig::from_toml_str(&format!("failure_duration = {}", i64::MAX)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("failure_duration")));
    }

    #[test]
    fn test_missing_file() {
        let err = CullingConfig::from_toml_file("/nonexistent/sightline.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
