//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// What happens to an error record when the error channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorOverflow {
    /// Drop the new record and log a warning.
    #[default]
    DropNewest,
    /// Wait for room. The failing invocation stays suspended until a reader
    /// drains the channel, forever if nobody ever does.
    Block,
}

/// Settings for a single [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Name attached to the dispatcher's tracing spans.
    #[serde(default = "default_name")]
    pub name: String,

    /// Capacity of the error channel. Values below 1 are raised to 1.
    #[serde(default = "default_error_capacity")]
    pub error_capacity: usize,

    /// Policy applied when the error channel is full.
    #[serde(default)]
    pub error_overflow: ErrorOverflow,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            error_capacity: default_error_capacity(),
            error_overflow: ErrorOverflow::default(),
        }
    }
}

impl DispatcherConfig {
    /// Sets the span name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the error channel capacity.
    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    /// Sets the overflow policy of the error channel.
    pub fn error_overflow(mut self, overflow: ErrorOverflow) -> Self {
        self.error_overflow = overflow;
        self
    }
}

fn default_name() -> String {
    "tidings".to_string()
}

fn default_error_capacity() -> usize {
    64
}
