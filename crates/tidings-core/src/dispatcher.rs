//! The type-routed dispatcher.
//!
//! A [`Dispatcher`] owns an ordered handler registry, a rendezvous intake for
//! published values, one background dispatch loop and a bounded error channel.
//!
//! ```text
//! publish(v) ──► [intake] ──► dispatch loop ──┬─► handler A(v)  (own task)
//!   (waits until           (scan under the    ├─► handler B(v)  (own task)
//!    the loop takes v)      registry lock)    └─► ...
//!                                                    │ panic / Err
//!                                                    ▼
//!                                              [error channel] ──► errors()
//! ```
//!
//! # Rules
//!
//! - **Exact matching**: a handler fires iff the published value's [`TypeId`]
//!   equals its parameter's. No subtype or trait-object matching.
//! - **Fire and forget**: each matching handler runs in its own task; the loop
//!   moves on to the next value as soon as the scan is done.
//! - **No ordering**: invocations for one value, or for consecutive values,
//!   may start and finish in any order.
//! - **Isolation**: a panicking or failing handler becomes an [`ErrorRecord`];
//!   it never reaches the loop, sibling invocations or the publisher.
//!
//! # Example
//!
//! ```rust,ignore
//! use tidings_core::Dispatcher;
//!
//! let dispatcher = Dispatcher::new();
//! let mut errors = dispatcher.errors().expect("first call");
//!
//! dispatcher.subscribe(|text: String| async move {
//!     println!("got {text}");
//! })?;
//!
//! dispatcher.publish(String::from("hello")).await?;
//! dispatcher.publish(42_u32).await?; // no u32 handler: nothing happens
//!
//! dispatcher.shutdown().await;
//! ```
//!
//! [`TypeId`]: std::any::TypeId

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Level, debug, info, span, trace, warn};

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, DispatchResult, HandlerFailure, ValidationError};
use crate::handler::{BoxFuture, Handler, HandlerId, ParamType, Payload, Subscriber};
use crate::record::{Delivery, ErrorReceiver, ErrorRecord, ErrorSink};
use crate::registry::{Entry, Registry};

/// A published value on its way to the dispatch loop.
struct Envelope {
    payload: Payload,
    value_type: ParamType,
    accepted: oneshot::Sender<()>,
}

impl Envelope {
    fn new<T: Any + Send + Sync>(value: T) -> (Self, oneshot::Receiver<()>) {
        let (accepted, rx) = oneshot::channel();
        let envelope = Self {
            payload: Arc::new(value),
            value_type: ParamType::of::<T>(),
            accepted,
        };
        (envelope, rx)
    }
}

/// Counters exposed through [`Dispatcher::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Values taken by the dispatch loop.
    pub published: u64,
    /// Handler invocations launched.
    pub invocations: u64,
    /// Invocations that panicked or returned an error.
    pub failures: u64,
    /// Error records that never reached a reader.
    pub dropped_errors: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    invocations: AtomicU64,
    failures: AtomicU64,
    dropped_errors: AtomicU64,
}

/// State shared by the handles, the dispatch loop and the invocations.
struct Shared {
    name: String,
    registry: Mutex<Registry>,
    errors: ErrorSink,
    tracker: TaskTracker,
    counters: Counters,
}

struct Inner {
    shared: Arc<Shared>,
    intake: Mutex<Option<mpsc::Sender<Envelope>>>,
    errors_rx: Mutex<Option<ErrorReceiver>>,
}

/// The central publish/subscribe dispatcher.
///
/// Cloning a `Dispatcher` yields another handle to the same engine. The loop
/// stops once [`close`](Self::close) is called or the last handle is dropped.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync`; every operation takes `&self`.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// A non-owning handle to a [`Dispatcher`].
///
/// Handlers that need to reach their own dispatcher (for example to
/// unsubscribe themselves) should capture this instead of a `Dispatcher`,
/// which would keep the engine alive through its own registry.
#[derive(Clone)]
pub struct WeakDispatcher {
    inner: Weak<Inner>,
}

impl WeakDispatcher {
    /// Returns a strong handle if the dispatcher still exists.
    pub fn upgrade(&self) -> Option<Dispatcher> {
        self.inner.upgrade().map(|inner| Dispatcher { inner })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the dispatch loop is
    /// spawned immediately.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Creates a dispatcher with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. Use
    /// [`try_with_config`](Self::try_with_config) where that is possible.
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self::start(config, &Handle::current())
    }

    /// Creates a dispatcher with the default configuration, without panicking.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoRuntime`] when called outside a Tokio runtime.
    pub fn try_new() -> DispatchResult<Self> {
        Self::try_with_config(DispatcherConfig::default())
    }

    /// Creates a dispatcher with the given configuration, without panicking.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoRuntime`] when called outside a Tokio runtime.
    pub fn try_with_config(config: DispatcherConfig) -> DispatchResult<Self> {
        let handle = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        Ok(Self::start(config, &handle))
    }

    fn start(config: DispatcherConfig, handle: &Handle) -> Self {
        let (errors, errors_rx) = ErrorSink::channel(config.error_capacity, config.error_overflow);
        let (intake_tx, intake_rx) = mpsc::channel(1);

        let shared = Arc::new(Shared {
            name: config.name,
            registry: Mutex::new(Registry::new()),
            errors,
            tracker: TaskTracker::new(),
            counters: Counters::default(),
        });

        let span = span!(Level::DEBUG, "dispatch_loop", dispatcher = %shared.name);
        shared
            .tracker
            .spawn_on(run(Arc::clone(&shared), intake_rx).instrument(span), handle);

        debug!(
            dispatcher = %shared.name,
            error_capacity = config.error_capacity,
            error_overflow = ?config.error_overflow,
            "Dispatcher started"
        );

        Self {
            inner: Arc::new(Inner {
                shared,
                intake: Mutex::new(Some(intake_tx)),
                errors_rx: Mutex::new(Some(errors_rx)),
            }),
        }
    }

    /// Returns a non-owning handle to this dispatcher.
    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Registers a handler.
    ///
    /// The handler must take exactly one parameter; values whose runtime type
    /// is exactly that parameter's type are delivered to it. Registering the
    /// same handler twice makes it fire twice per value.
    ///
    /// Returns the handler's identity token, usable with
    /// [`unsubscribe_id`](Self::unsubscribe_id).
    ///
    /// # Errors
    ///
    /// [`ValidationError::WrongArity`] for handlers taking zero or several
    /// parameters, [`ValidationError::Closed`] after [`close`](Self::close).
    /// The registry is left unchanged.
    pub fn subscribe<H, Args>(&self, handler: H) -> Result<HandlerId, ValidationError>
    where
        H: Handler<Args>,
    {
        self.register(Subscriber::new(handler))
    }

    /// Registers a handler passed as a type-erased value.
    ///
    /// Only a boxed [`Subscriber`] is accepted.
    ///
    /// # Errors
    ///
    /// [`ValidationError::NotCallable`] for any other value, and the errors of
    /// [`subscribe`](Self::subscribe).
    pub fn subscribe_any(
        &self,
        handler: Box<dyn Any + Send>,
    ) -> Result<HandlerId, ValidationError> {
        match handler.downcast::<Subscriber>() {
            Ok(subscriber) => self.register(*subscriber),
            Err(_) => Err(ValidationError::NotCallable {
                type_name: "dyn Any",
            }),
        }
    }

    /// Registers a prebuilt [`Subscriber`].
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe).
    pub fn register(&self, subscriber: Subscriber) -> Result<HandlerId, ValidationError> {
        let (id, parameter, handler) = subscriber.validate()?;

        let mut registry = self.inner.shared.registry.lock();
        if self.is_closed() {
            warn!(handler = %id, "Subscribe on a closed dispatcher rejected");
            return Err(ValidationError::Closed);
        }
        registry.push(Entry {
            id,
            parameter,
            handler,
        });

        debug!(handler = %id, parameter = %parameter, "Handler subscribed");
        Ok(id)
    }

    /// Removes every registration of `handler`.
    ///
    /// Identity is the handler's type, so clones of one closure are removed
    /// together. Returns the number of registrations removed; zero is not an
    /// error.
    pub fn unsubscribe<H: 'static>(&self, handler: &H) -> usize {
        self.unsubscribe_id(HandlerId::of_val(handler))
    }

    /// Removes every registration with the given identity.
    pub fn unsubscribe_id(&self, id: HandlerId) -> usize {
        let removed = self.inner.shared.registry.lock().remove(id);
        debug!(handler = %id, removed, "Handler unsubscribed");
        removed
    }

    /// Returns the number of registrations.
    pub fn handler_count(&self) -> usize {
        self.inner.shared.registry.lock().len()
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Hands a value to the dispatch loop.
    ///
    /// Completes once the loop has taken the value, not once handlers have run.
    /// There is no queue: while the loop is busy, publishers wait.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Closed`] after [`close`](Self::close).
    pub async fn publish<T: Any + Send + Sync>(&self, value: T) -> DispatchResult<()> {
        let intake = self.intake()?;
        let (envelope, accepted) = Envelope::new(value);
        intake
            .send(envelope)
            .await
            .map_err(|_| DispatchError::Closed)?;
        accepted.await.map_err(|_| DispatchError::Closed)
    }

    /// Blocking variant of [`publish`](Self::publish) for synchronous code.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn publish_blocking<T: Any + Send + Sync>(&self, value: T) -> DispatchResult<()> {
        let intake = self.intake()?;
        let (envelope, accepted) = Envelope::new(value);
        intake
            .blocking_send(envelope)
            .map_err(|_| DispatchError::Closed)?;
        accepted.blocking_recv().map_err(|_| DispatchError::Closed)
    }

    fn intake(&self) -> DispatchResult<mpsc::Sender<Envelope>> {
        self.inner
            .intake
            .lock()
            .clone()
            .ok_or(DispatchError::Closed)
    }

    // =========================================================================
    // Errors and lifecycle
    // =========================================================================

    /// Takes the receiving end of the error channel.
    ///
    /// Returns `None` after the first call. Under
    /// [`ErrorOverflow::Block`](crate::ErrorOverflow::Block), failing
    /// invocations wait until this receiver drains the channel.
    pub fn errors(&self) -> Option<ErrorReceiver> {
        self.inner.errors_rx.lock().take()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.intake.lock().is_none()
    }

    /// Stops accepting values and clears the registry.
    ///
    /// Values already handed over are drained by the loop, but find no
    /// handlers. Invocations already running are not waited for; use
    /// [`shutdown`](Self::shutdown) for that.
    ///
    /// # Errors
    ///
    /// [`DispatchError::AlreadyClosed`] on the second call.
    pub fn close(&self) -> DispatchResult<()> {
        let intake = self.inner.intake.lock().take();
        if intake.is_none() {
            return Err(DispatchError::AlreadyClosed);
        }
        drop(intake);

        self.inner.shared.registry.lock().clear();
        self.inner.shared.tracker.close();

        info!(dispatcher = %self.inner.shared.name, "Dispatcher closed");
        Ok(())
    }

    /// Closes the dispatcher if still open, then waits for the loop to drain
    /// and for every running invocation to finish. The error channel is closed
    /// afterwards, so a reader sees the remaining records and then `None`.
    ///
    /// Under [`ErrorOverflow::Block`](crate::ErrorOverflow::Block) with no one
    /// reading [`errors`](Self::errors), this may wait forever.
    pub async fn shutdown(&self) {
        if self.close().is_err() {
            trace!(dispatcher = %self.inner.shared.name, "Shutdown on a closed dispatcher");
        }
        self.inner.shared.tracker.wait().await;
        self.inner.shared.errors.close();
        debug!(dispatcher = %self.inner.shared.name, "Dispatcher drained");
    }

    /// Returns a snapshot of the dispatcher's counters.
    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.inner.shared.counters;
        DispatcherStats {
            published: counters.published.load(Ordering::Relaxed),
            invocations: counters.invocations.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            dropped_errors: counters.dropped_errors.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.shared.name)
            .field("handler_count", &self.handler_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Dispatch loop
// =============================================================================

async fn run(shared: Arc<Shared>, mut intake: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = intake.recv().await {
        let Envelope {
            payload,
            value_type,
            accepted,
        } = envelope;

        shared.counters.published.fetch_add(1, Ordering::Relaxed);
        // The publisher may have been cancelled while waiting.
        let _ = accepted.send(());

        dispatch(&shared, payload, value_type);
    }
    debug!("Intake closed, dispatch loop exiting");
}

/// Scans the registry and launches one task per matching handler.
///
/// The registry lock is held for the scan only, never across an invocation.
fn dispatch(shared: &Arc<Shared>, payload: Payload, value_type: ParamType) {
    let span = span!(Level::DEBUG, "dispatch", value_type = %value_type);
    let _enter = span.enter();

    let mut matched = 0_u64;
    {
        let registry = shared.registry.lock();
        for entry in registry.matching(value_type) {
            matched += 1;
            let invocation = entry.handler.call(Arc::clone(&payload), value_type);
            let span = span!(Level::TRACE, "invoke", handler = %entry.id);
            shared.tracker.spawn(
                invoke(Arc::clone(shared), entry.id, value_type, invocation).instrument(span),
            );
        }
    }

    shared
        .counters
        .invocations
        .fetch_add(matched, Ordering::Relaxed);
    trace!(matched, "Scan complete");
}

/// Runs one invocation, converting a panic or error into an [`ErrorRecord`].
async fn invoke(
    shared: Arc<Shared>,
    handler: HandlerId,
    value_type: ParamType,
    invocation: BoxFuture<'static, Result<(), HandlerFailure>>,
) {
    let outcome = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(HandlerFailure::from_panic(&*panic)),
    };

    let Err(failure) = outcome else {
        return;
    };

    shared.counters.failures.fetch_add(1, Ordering::Relaxed);
    warn!(handler = %handler, value_type = %value_type, %failure, "Handler failed");

    let record = ErrorRecord::new(handler, value_type, failure);
    if shared.errors.report(record).await == Delivery::Dropped {
        shared
            .counters
            .dropped_errors
            .fetch_add(1, Ordering::Relaxed);
    }
}
