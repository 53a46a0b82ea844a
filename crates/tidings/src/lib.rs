//! # Tidings
//!
//! Type-routed, in-process publish/subscribe for Rust.
//!
//! ## Overview
//!
//! Handlers are async functions or closures taking exactly one argument. A
//! published value is delivered to every handler whose argument type is
//! exactly the value's type, each invocation running as its own task:
//!
//! ```text
//! ┌───────────┐ rendezvous ┌──────────────┐  scan   ┌──────────────────────────┐
//! │ publish() │───────────▶│ dispatch loop│────────▶│ handler(String) task     │
//! └───────────┘            │              │────────▶│ handler(String) task     │
//!                          └──────────────┘         └──────────┬───────────────┘
//!                                                              │ panic / Err
//!                                                              ▼
//!                                                       errors() channel
//! ```
//!
//! - **Dispatcher**: registry, single dispatch loop, error channel
//! - **Handlers**: user-defined async functions (Axum-style)
//! - **Runtime**: configuration, logging and graceful shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidings::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::load()?;
//!     let dispatcher = runtime.dispatcher();
//!
//!     dispatcher.subscribe(|line: String| async move {
//!         info!(%line, "received");
//!     })?;
//!     dispatcher.publish("hello".to_string()).await?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `tidings.toml` (default)
//! - `yaml-config`: load `tidings.yaml`
//! - `json-log`: enable the `json` log format

pub use tidings_core as core;
pub use tidings_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tidings::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use tidings_runtime::{Runtime, TidingsConfig};

    // Dispatcher and handler registration
    pub use tidings_core::{
        DispatchError, Dispatcher, DispatcherConfig, ErrorOverflow, ErrorRecord, HandlerFailure,
        HandlerId, Subscriber, ValidationError, WeakDispatcher,
    };

    // Logging macros
    pub use tidings_runtime::prelude::*;
}
