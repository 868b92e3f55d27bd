//! Configuration loading and validation for copperkite.
//!
//! Loads configuration from `~/.copperkite/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The root configuration structure.
///
/// Maps directly to `~/.copperkite/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to send requests to
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum phases per round (tool-request/execute iterations)
    #[serde(default = "default_phase_ceiling")]
    pub phase_ceiling: u32,

    /// Context configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Session store configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Context budget and compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total context budget, in estimated units
    #[serde(default = "default_budget_units")]
    pub budget_units: usize,

    /// Fraction of the budget at which compaction triggers (0.0–1.0)
    #[serde(default = "default_trigger_ratio")]
    pub trigger_ratio: f32,

    /// How many dropped turns are summarized per chunk
    #[serde(default = "default_summary_chunk")]
    pub summary_chunk: usize,
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long conversation state is retained, in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_model() -> String {
    "kite-large".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_phase_ceiling() -> u32 {
    10
}
fn default_budget_units() -> usize {
    80_000
}
fn default_trigger_ratio() -> f32 {
    0.8
}
fn default_summary_chunk() -> usize {
    20
}
fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            phase_ceiling: default_phase_ceiling(),
            context: ContextConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_units: default_budget_units(),
            trigger_ratio: default_trigger_ratio(),
            summary_chunk: default_summary_chunk(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the default location with env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if let Ok(model) = std::env::var("COPPERKITE_MODEL") {
            config.model = model;
        }
        if let Ok(ceiling) = std::env::var("COPPERKITE_PHASE_CEILING") {
            config.phase_ceiling = ceiling.parse().map_err(|_| {
                ConfigError::Validation("COPPERKITE_PHASE_CEILING must be an integer".into())
            })?;
        }
        if let Ok(budget) = std::env::var("COPPERKITE_BUDGET_UNITS") {
            config.context.budget_units = budget.parse().map_err(|_| {
                ConfigError::Validation("COPPERKITE_BUDGET_UNITS must be an integer".into())
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".copperkite")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.phase_ceiling == 0 {
            return Err(ConfigError::Validation(
                "phase_ceiling must be at least 1".into(),
            ));
        }
        if self.context.budget_units == 0 {
            return Err(ConfigError::Validation(
                "context.budget_units must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.context.trigger_ratio) {
            return Err(ConfigError::Validation(
                "context.trigger_ratio must be between 0.0 and 1.0".into(),
            ));
        }
        if self.context.summary_chunk == 0 {
            return Err(ConfigError::Validation(
                "context.summary_chunk must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.phase_ceiling, 10);
        assert_eq!(config.context.budget_units, 80_000);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = AgentConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "kite-large");
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "kite-small"

[context]
budget_units = 12000
"#,
        )
        .unwrap();

        let config = AgentConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "kite-small");
        assert_eq!(config.context.budget_units, 12000);
        // Untouched fields keep their defaults
        assert_eq!(config.phase_ceiling, 10);
        assert!((config.context.trigger_ratio - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_zero_phase_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "phase_ceiling = 0").unwrap();

        let err = AgentConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_bad_trigger_ratio() {
        let mut config = AgentConfig::default();
        config.context.trigger_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unparseable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [not toml").unwrap();

        let err = AgentConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
