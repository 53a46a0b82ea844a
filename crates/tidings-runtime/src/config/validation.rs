//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, TidingsConfig};
use tidings_core::DispatcherConfig;

/// Validates the entire configuration.
pub fn validate_config(config: &TidingsConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatcher_config(&config.dispatcher)?;
    Ok(())
}

/// Validates logging configuration.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation(
            "logging.filters contains an empty module name",
        ));
    }

    Ok(())
}

/// Validates dispatcher configuration.
fn validate_dispatcher_config(dispatcher: &DispatcherConfig) -> ConfigResult<()> {
    if dispatcher.name.trim().is_empty() {
        return Err(ConfigError::validation("dispatcher.name must not be empty"));
    }

    if dispatcher.error_capacity == 0 {
        return Err(ConfigError::validation(
            "dispatcher.error_capacity must be greater than 0",
        ));
    }

    Ok(())
}
