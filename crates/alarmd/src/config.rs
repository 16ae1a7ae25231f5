//! Engine configuration.
//!
//! Loaded from a TOML file when one is given or found in the user's config
//! directory, otherwise defaults apply. Every field is optional in the file.
//!
//! ```toml
//! idle_interval_ms = 1000
//! max_workers_per_type = 1
//! auto_start_workers = false
//! event_buffer = 1024
//! max_pending = 10000
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ALARMD_CONFIG";

/// How long a worker with nothing to claim waits before rescanning.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1_000;

/// Subscriber buffer for the event broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1_024;

/// Maximum number of pending alarms.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Tunables for the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Idle wait between scans when a worker finds nothing to claim.
    pub idle_interval_ms: u64,

    /// Upper bound on live workers per message type. `StartWorkers` adds
    /// one worker per call until the bound is reached.
    pub max_workers_per_type: usize,

    /// Start a worker automatically the first time a type is scheduled.
    pub auto_start_workers: bool,

    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,

    /// Maximum number of pending alarms in the list.
    pub max_pending: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
            max_workers_per_type: 1,
            auto_start_workers: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl EngineConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "idle_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.max_workers_per_type == 0 {
            return Err(ConfigError::Invalid {
                field: "max_workers_per_type",
                reason: "must be at least 1",
            });
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "event_buffer",
                reason: "must be at least 1",
            });
        }
        if self.max_pending == 0 {
            return Err(ConfigError::Invalid {
                field: "max_pending",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `explicit` if given, else the default file if it exists,
    /// else returns defaults.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading config");
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "Loading default config");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config_dir>/alarmd/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("alarmd").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.idle_interval(), Duration::from_secs(1));
        assert_eq!(config.max_workers_per_type, 1);
        assert!(!config.auto_start_workers);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("idle_interval_ms = 250\n").unwrap();
        assert_eq!(config.idle_interval_ms, 250);
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_toml_str("idle_ms = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("max_workers_per_type = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_workers_per_type",
                ..
            }
        ));

        let err = EngineConfig::from_toml_str("idle_interval_ms = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config value for idle_interval_ms: must be greater than zero"
        );
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_workers_per_type = 3").unwrap();
        writeln!(file, "auto_start_workers = true").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_workers_per_type, 3);
        assert!(config.auto_start_workers);
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = EngineConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
