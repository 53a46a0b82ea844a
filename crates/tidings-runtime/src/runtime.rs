//! Application lifecycle around a [`Dispatcher`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tidings_runtime::Runtime;
//!
//! // Loads tidings.toml from the working directory, TIDINGS_* from the environment
//! let runtime = Runtime::load()?;
//!
//! runtime.dispatcher().subscribe(|line: String| async move {
//!     println!("{line}");
//! })?;
//!
//! // Runs until Ctrl+C, then drains the dispatcher
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;

use tokio::signal;
use tracing::info;

use crate::config::{ConfigLoader, TidingsConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use tidings_core::Dispatcher;

/// Owns the configuration and the dispatcher built from it.
pub struct Runtime {
    config: TidingsConfig,
    dispatcher: Dispatcher,
}

impl Runtime {
    /// Creates a runtime from an already loaded configuration.
    ///
    /// Validates the configuration, initializes logging (a no-op if a
    /// subscriber is already installed) and starts the dispatcher. Must be
    /// called inside a Tokio runtime.
    pub fn new(config: TidingsConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let dispatcher = Dispatcher::with_config(config.dispatcher.clone());

        info!(
            dispatcher = %config.dispatcher.name,
            log_level = %config.logging.level,
            error_capacity = config.dispatcher.error_capacity,
            error_overflow = ?config.dispatcher.error_overflow,
            "Runtime initialized from configuration"
        );

        Ok(Self { config, dispatcher })
    }

    /// Loads configuration with the default search rules and creates a runtime.
    pub fn load() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &TidingsConfig {
        &self.config
    }

    /// Returns the dispatcher. Clones share the same registry.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs until Ctrl+C (or SIGTERM on Unix), then shuts the dispatcher down.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!(
            dispatcher = %self.config.dispatcher.name,
            "Tidings runtime is now running. Press Ctrl+C to stop."
        );

        wait_for_shutdown().await?;
        self.shutdown().await;
        Ok(())
    }

    /// Runs until `shutdown` completes, then shuts the dispatcher down.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown().await;
    }

    /// Closes the dispatcher and waits for in-flight handlers.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        let stats = self.dispatcher.stats();
        info!(
            published = stats.published,
            invocations = stats.invocations,
            failures = stats.failures,
            dropped_errors = stats.dropped_errors,
            "Tidings runtime stopped"
        );
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

/// Builder for creating a [`Runtime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = Runtime::builder()
///     .config_file("config/tidings.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: TidingsConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = self.config_loader.load()?;
        Runtime::new(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::RuntimeError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tidings_core::DispatchError;

    #[tokio::test]
    async fn test_runtime_from_config() {
        let config = TidingsConfig {
            dispatcher: tidings_core::DispatcherConfig::default().name("runtime-test"),
            ..Default::default()
        };
        let runtime = Runtime::new(config).unwrap();

        assert_eq!(runtime.config().dispatcher.name, "runtime-test");
        assert!(!runtime.dispatcher().is_closed());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = TidingsConfig::default();
        config.dispatcher.error_capacity = 0;

        let result = Runtime::new(config);
        assert!(matches!(
            result,
            Err(RuntimeError::Config(ConfigError::ValidationError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_run_until_drains_handlers() {
        let runtime = Runtime::new(TidingsConfig::default()).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        runtime
            .dispatcher()
            .subscribe(move |n: u32| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    counter.fetch_add(n as usize, Ordering::SeqCst);
                }
            })
            .unwrap();

        runtime.dispatcher().publish(3_u32).await.unwrap();
        runtime.dispatcher().publish(4_u32).await.unwrap();

        // Both values must have been scanned before close clears the registry.
        tokio::time::timeout(Duration::from_secs(5), async {
            while runtime.dispatcher().stats().invocations < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        runtime.run_until(async {}).await;

        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(runtime.dispatcher().is_closed());
        assert_eq!(
            runtime.dispatcher().publish(5_u32).await,
            Err(DispatchError::Closed)
        );
    }

    #[tokio::test]
    async fn test_builder_without_files() {
        let dir = std::env::temp_dir().join("tidings-runtime-builder-test");
        let mut overrides = TidingsConfig::default();
        overrides.dispatcher.name = "built".into();

        let runtime = Runtime::builder()
            .without_env()
            .search_path(&dir)
            .merge(overrides)
            .build()
            .unwrap();

        assert_eq!(runtime.config().dispatcher.name, "built");
        runtime.shutdown().await;
        assert!(runtime.dispatcher().is_closed());
    }
}
