//! Bridge settings (indy-bridge.toml)
//!
//! The same schema is used for the project file and the global file; the
//! loader merges them field by field.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Library loaded when no name is configured
pub const DEFAULT_LIBRARY_NAME: &str = "indy";

/// Settled tokens remembered per registry when not configured
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 1024;

/// Log filter used when not configured
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Native library location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<LibraryConfig>,

    /// Call lifecycle tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calls: Option<CallsConfig>,

    /// Logging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// `[library]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// Short name ("indy") or full path of the shared library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Extra directories searched before the platform defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_paths: Option<Vec<PathBuf>>,
}

/// `[calls]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CallsConfig {
    /// Give up waiting for a callback after this many milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Settled tokens remembered for duplicate-callback detection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone_capacity: Option<usize>,

    /// Abandoned calls older than this are reclaimed by a sweep
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_after_ms: Option<u64>,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, e.g. "indy_bridge=debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl BridgeConfig {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse settings from TOML text; `origin` is only used for error reporting
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the settings
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(library) = &self.library {
            if let Some(name) = &library.name {
                if name.trim().is_empty() {
                    return Err(invalid("library.name", "must not be empty"));
                }
            }
        }

        if let Some(calls) = &self.calls {
            if calls.timeout_ms == Some(0) {
                return Err(invalid("calls.timeout_ms", "must be greater than zero"));
            }
            if calls.tombstone_capacity == Some(0) {
                return Err(invalid(
                    "calls.tombstone_capacity",
                    "must be greater than zero",
                ));
            }
            if calls.sweep_after_ms == Some(0) {
                return Err(invalid("calls.sweep_after_ms", "must be greater than zero"));
            }
        }

        if let Some(filter) = self.logging.as_ref().and_then(|l| l.filter.as_ref()) {
            if filter.trim().is_empty() {
                return Err(invalid("logging.filter", "must not be empty"));
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Other config takes precedence for every field it sets.
    pub fn merge(&mut self, other: &BridgeConfig) {
        if let Some(theirs) = &other.library {
            let ours = self.library.get_or_insert_with(Default::default);
            if theirs.name.is_some() {
                ours.name = theirs.name.clone();
            }
            if theirs.search_paths.is_some() {
                ours.search_paths = theirs.search_paths.clone();
            }
        }

        if let Some(theirs) = &other.calls {
            let ours = self.calls.get_or_insert_with(Default::default);
            if theirs.timeout_ms.is_some() {
                ours.timeout_ms = theirs.timeout_ms;
            }
            if theirs.tombstone_capacity.is_some() {
                ours.tombstone_capacity = theirs.tombstone_capacity;
            }
            if theirs.sweep_after_ms.is_some() {
                ours.sweep_after_ms = theirs.sweep_after_ms;
            }
        }

        if let Some(theirs) = &other.logging {
            let ours = self.logging.get_or_insert_with(Default::default);
            if theirs.filter.is_some() {
                ours.filter = theirs.filter.clone();
            }
        }
    }

    /// Effective library name
    pub fn library_name(&self) -> &str {
        self.library
            .as_ref()
            .and_then(|l| l.name.as_deref())
            .unwrap_or(DEFAULT_LIBRARY_NAME)
    }

    /// Extra library search paths (empty when not configured)
    pub fn search_paths(&self) -> &[PathBuf] {
        self.library
            .as_ref()
            .and_then(|l| l.search_paths.as_deref())
            .unwrap_or(&[])
    }

    /// Caller-side timeout for each call, `None` waits forever
    pub fn call_timeout(&self) -> Option<Duration> {
        self.calls
            .as_ref()
            .and_then(|c| c.timeout_ms)
            .map(Duration::from_millis)
    }

    pub fn tombstone_capacity(&self) -> usize {
        self.calls
            .as_ref()
            .and_then(|c| c.tombstone_capacity)
            .unwrap_or(DEFAULT_TOMBSTONE_CAPACITY)
    }

    /// Minimum age before an abandoned call can be swept
    pub fn sweep_after(&self) -> Option<Duration> {
        self.calls
            .as_ref()
            .and_then(|c| c.sweep_after_ms)
            .map(Duration::from_millis)
    }

    pub fn log_filter(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Get the global settings file path (~/.indy/bridge.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".indy").join("bridge.toml"))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
