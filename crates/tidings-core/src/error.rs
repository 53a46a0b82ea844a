//! Error types for the tidings dispatcher.
//!
//! Errors fall into three groups:
//!
//! - [`ValidationError`]: returned synchronously by `subscribe` when a
//!   registration is rejected. The registry is left untouched.
//! - [`HandlerFailure`]: what went wrong inside a single handler invocation.
//!   Never returned to a caller; it travels inside an
//!   [`ErrorRecord`](crate::record::ErrorRecord) on the error channel.
//! - [`DispatchError`]: usage faults against a closed dispatcher, or one
//!   created outside a Tokio runtime.

use thiserror::Error;

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors raised when a registration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The registered value is not a handler at all.
    #[error("not callable: {type_name}")]
    NotCallable {
        /// Best-effort name of the rejected value's type.
        type_name: &'static str,
    },

    /// The handler does not take exactly one parameter.
    #[error("wrong arity: handler '{handler}' takes {found} parameters, expected 1")]
    WrongArity {
        /// Type name of the rejected handler.
        handler: &'static str,
        /// The number of parameters the handler declares.
        found: usize,
    },

    /// The dispatcher was closed; nothing was registered.
    #[error("dispatcher is closed")]
    Closed,
}

// =============================================================================
// Handler Failures
// =============================================================================

/// A failure captured at the boundary of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFailure {
    /// The handler panicked. Carries the panic message when one was available.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler returned an error value.
    #[error("handler returned an error: {0}")]
    Returned(String),

    /// The payload handed to the handler was not of its parameter type.
    ///
    /// The dispatch loop only routes exact type matches, so this indicates a
    /// registry inconsistency rather than a user error.
    #[error("payload type mismatch: expected '{expected}', got '{found}'")]
    TypeMismatch {
        /// The handler's declared parameter type.
        expected: &'static str,
        /// The published value's type.
        found: &'static str,
    },
}

impl HandlerFailure {
    /// Builds a [`HandlerFailure::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Usage faults reported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts published values.
    #[error("dispatcher is closed")]
    Closed,

    /// `close` was called on a dispatcher that was already closed.
    #[error("dispatcher was already closed")]
    AlreadyClosed,

    /// The dispatcher was created outside a Tokio runtime.
    #[error("no Tokio runtime to run the dispatch loop on")]
    NoRuntime,
}

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::NotCallable { type_name: "u8" };
        assert!(err.to_string().starts_with("not callable"));

        let err = ValidationError::WrongArity {
            handler: "two_args",
            found: 2,
        };
        assert!(err.to_string().starts_with("wrong arity"));
        assert!(err.to_string().contains("takes 2"));

        assert_eq!(ValidationError::Closed.to_string(), "dispatcher is closed");
    }

    #[test]
    fn test_failure_from_panic_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(
            HandlerFailure::from_panic(&*boxed),
            HandlerFailure::Panicked("static message".into())
        );

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(
            HandlerFailure::from_panic(&*boxed),
            HandlerFailure::Panicked("owned message".into())
        );

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        assert_eq!(
            HandlerFailure::from_panic(&*boxed),
            HandlerFailure::Panicked("unknown panic".into())
        );
    }
}
