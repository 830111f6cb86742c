//! Engine configuration
//!
//! Persisted as camelCase JSON. Every field has a default, so a partial or
//! missing file is valid.

use std::path::Path;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Result;

/// Environment variable overriding [`EngineConfig::log_level`]
pub const LOG_ENV: &str = "CERES_LOG";

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn default_max_forward_depth() -> usize {
    256
}

fn default_emit_node_events() -> bool {
    true
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Severity gate for the log facade
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,
    /// Bound on nested sub-executions within one dispatch
    #[serde(default = "default_max_forward_depth")]
    pub max_forward_depth: usize,
    /// Optional bound on the number of nodes one dispatch may execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chain_steps: Option<usize>,
    /// Send per-node started/completed events to the sink
    #[serde(default = "default_emit_node_events")]
    pub emit_node_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_forward_depth: default_max_forward_depth(),
            max_chain_steps: None,
            emit_node_events: default_emit_node_events(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from disk, defaults if the file does not exist
    ///
    /// The `CERES_LOG` environment variable overrides the log level.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::try_exists(path).await? {
            let contents = fs::read_to_string(path).await?;
            serde_json::from_str(&contents)?
        } else {
            log::debug!("No config at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?).await?;
        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Apply `CERES_LOG`, ignoring unparsable values with a warning
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(LOG_ENV) {
            self.apply_log_override(&value);
        }
    }

    fn apply_log_override(&mut self, value: &str) {
        match value.trim().parse::<LevelFilter>() {
            Ok(level) => self.log_level = level,
            Err(e) => log::warn!("Ignoring {}={:?}: {}", LOG_ENV, value, e),
        }
    }

    /// Set the log facade's max level from this config
    pub fn apply_log_level(&self) {
        log::set_max_level(self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.max_forward_depth, 256);
        assert_eq!(config.max_chain_steps, None);
        assert!(config.emit_node_events);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"logLevel":"debug"}"#).unwrap();
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.max_forward_depth, 256);
    }

    #[test]
    fn test_log_override() {
        let mut config = EngineConfig::default();
        config.apply_log_override(" WARN ");
        assert_eq!(config.log_level, LevelFilter::Warn);
        config.apply_log_override("loud");
        assert_eq!(config.log_level, LevelFilter::Warn);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ceres.json");

        let missing = EngineConfig::load(dir.path().join("missing.json")).await.unwrap();
        assert_eq!(missing.max_forward_depth, 256);

        let config = EngineConfig {
            log_level: LevelFilter::Off,
            max_forward_depth: 8,
            max_chain_steps: Some(1000),
            ..Default::default()
        };
        config.save(&path).await.unwrap();
        let loaded = EngineConfig::load(&path).await.unwrap();
        assert_eq!(loaded.max_forward_depth, 8);
        assert_eq!(loaded.max_chain_steps, Some(1000));
        assert_eq!(loaded.log_level, LevelFilter::Off);
    }
}
