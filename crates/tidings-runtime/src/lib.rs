//! Tidings Runtime - configuration, logging and lifecycle for the tidings dispatcher.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`): defaults, `tidings.toml` / `tidings.yaml`,
//!   `TIDINGS_*` environment variables
//! - Logging setup (`LoggingBuilder`) driven by the `[logging]` section
//! - Runtime orchestration (`Runtime`): builds the dispatcher from the
//!   `[dispatcher]` section and drains it on shutdown
//!
//! ```ignore
//! use tidings_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::load()?;
//!
//!     runtime.dispatcher().subscribe(|n: u64| async move {
//!         tracing::info!(n, "got a number");
//!     })?;
//!     runtime.dispatcher().publish(42_u64).await?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, Profile, TidingsConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Runtime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
