//! # Tidings Core
//!
//! The dispatch engine of tidings: an in-process publish/subscribe dispatcher
//! that routes each published value to the handlers whose parameter type is
//! exactly the value's runtime type.
//!
//! This crate provides:
//! - [`Dispatcher`]: registry, rendezvous intake, dispatch loop, error channel
//! - [`Handler`]: blanket-implemented for async functions and closures
//! - [`ErrorRecord`]: a captured handler failure, delivered on the error channel
//! - [`DispatcherConfig`]: error channel sizing and overflow policy
//!
//! ```rust,ignore
//! use tidings_core::Dispatcher;
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.subscribe(|n: u64| async move { println!("{n}") })?;
//! dispatcher.publish(7_u64).await?;
//! ```
//!
//! The dispatch loop is spawned on construction, so [`Dispatcher::new`] must
//! be called inside a Tokio runtime; [`Dispatcher::try_new`] reports a
//! missing runtime as [`DispatchError::NoRuntime`] instead of panicking.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod record;

mod registry;

pub use config::{DispatcherConfig, ErrorOverflow};
pub use dispatcher::{Dispatcher, DispatcherStats, WeakDispatcher};
pub use error::{DispatchError, DispatchResult, HandlerFailure, ValidationError};
pub use handler::{
    BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerFn, HandlerId, HandlerOutput,
    ParamType, Payload, Subscriber,
};
pub use record::{ErrorReceiver, ErrorRecord};
