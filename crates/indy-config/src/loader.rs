//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{BridgeConfig, CallsConfig, LibraryConfig, LoggingConfig};
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Overrides the library name or path
pub const ENV_LIBRARY: &str = "INDY_BRIDGE_LIBRARY";
/// Overrides `calls.timeout_ms`
pub const ENV_TIMEOUT_MS: &str = "INDY_BRIDGE_TIMEOUT_MS";
/// Overrides `logging.filter`
pub const ENV_LOG: &str = "INDY_BRIDGE_LOG";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.indy/bridge.toml) - lowest priority
/// 2. Project config (./indy-bridge.toml) - overrides global
/// 3. Environment variables (INDY_BRIDGE_*) - highest priority
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective settings after merging every source
    pub settings: BridgeConfig,

    /// Directory where indy-bridge.toml was found
    pub config_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads global settings from an explicit path
    pub fn with_global_path(path: PathBuf) -> Self {
        Self {
            global_config_path: Some(path),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find indy-bridge.toml, layers it over the
    /// global settings, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (config_root, project) = Self::find_project_config(start_dir)?;

        let mut settings = self.load_global_config()?;
        settings.merge(&project);
        let settings = Self::apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            config_root,
        })
    }

    /// Load configuration from a specific settings file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = BridgeConfig::load_from_file(config_path)?;

        let mut settings = self.load_global_config()?;
        settings.merge(&project);
        let settings = Self::apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            config_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(start_dir: &Path) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    /// Load global configuration; a missing file or home directory yields defaults
    fn load_global_config(&mut self) -> ConfigResult<BridgeConfig> {
        if self.global_config_path.is_none() {
            match BridgeConfig::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                Err(ConfigError::HomeNotFound) => return Ok(BridgeConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) if path.exists() => BridgeConfig::load_from_file(path),
            _ => Ok(BridgeConfig::default()),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        let mut overlay = BridgeConfig::default();

        if let Ok(library) = env::var(ENV_LIBRARY) {
            overlay.library = Some(LibraryConfig {
                name: Some(library),
                search_paths: None,
            });
        }

        if let Ok(timeout) = env::var(ENV_TIMEOUT_MS) {
            let timeout_ms = timeout
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: ENV_TIMEOUT_MS.to_string(),
                    reason: format!("'{}' is not a number of milliseconds: {}", timeout, e),
                })?;
            overlay.calls = Some(CallsConfig {
                timeout_ms: Some(timeout_ms),
                ..Default::default()
            });
        }

        if let Ok(filter) = env::var(ENV_LOG) {
            overlay.logging = Some(LoggingConfig {
                filter: Some(filter),
            });
        }

        config.merge(&overlay);
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the directory holding indy-bridge.toml
    pub fn config_root(&self) -> Option<&Path> {
        self.config_root.as_deref()
    }
}
