//! Indy Bridge Configuration
//!
//! Provides configuration management for the native-call bridge:
//! - Bridge settings file (indy-bridge.toml)
//! - Global user configuration (~/.indy/bridge.toml)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.indy/bridge.toml)
//! 2. Project config (./indy-bridge.toml, searched upwards)
//! 3. Environment variables (INDY_BRIDGE_*)
//!
//! # Example
//!
//! ```no_run
//! use indy_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("library: {}", config.settings.library_name());
//! ```

pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the per-project settings file
pub const CONFIG_FILE_NAME: &str = "indy-bridge.toml";

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use settings::{BridgeConfig, CallsConfig, LibraryConfig, LoggingConfig};
