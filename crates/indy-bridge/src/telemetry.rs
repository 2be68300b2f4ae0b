//! Logging setup
//!
//! The bridge logs through `tracing`; applications that have no subscriber of
//! their own can install a formatted one here.

use indy_config::BridgeConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Build the filter: `RUST_LOG` when set, `directives` otherwise
pub fn env_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .map_err(|e| LoggingError::InvalidFilter {
            filter: directives.to_string(),
            reason: e.to_string(),
        })
}

/// Install a fmt subscriber as the global default
pub fn init_logging(directives: &str) -> Result<(), LoggingError> {
    let filter = env_filter(directives)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)?;

    tracing::debug!(filter = directives, "Logging initialized");
    Ok(())
}

/// Install logging using `[logging] filter`
pub fn init_from_config(config: &BridgeConfig) -> Result<(), LoggingError> {
    init_logging(config.log_filter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_invalid_filter_rejected() {
        std::env::remove_var("RUST_LOG");
        let result = env_filter("indy_bridge=notalevel");
        assert!(matches!(result, Err(LoggingError::InvalidFilter { .. })));
    }

    #[test]
    #[serial]
    fn test_second_install_is_an_error() {
        std::env::remove_var("RUST_LOG");
        let first = init_logging("warn");
        let second = init_logging("warn");
        // Another test binary component may have installed one first
        assert!(first.is_ok() || matches!(first, Err(LoggingError::AlreadyInstalled)));
        assert!(matches!(second, Err(LoggingError::AlreadyInstalled)));
    }
}
