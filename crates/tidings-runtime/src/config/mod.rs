//! Configuration module for the tidings runtime.
//!
//! This module provides layered configuration loading (files, environment,
//! programmatic overrides) and validation for the dispatcher and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig, TidingsConfig};
pub use validation::validate_config;
