//! Failure records and the error channel.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::config::ErrorOverflow;
use crate::error::HandlerFailure;
use crate::handler::{HandlerId, ParamType};

/// A handler failure, paired with the handler that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler '{handler}' failed on a '{value_type}' value: {failure}")]
pub struct ErrorRecord {
    handler: HandlerId,
    value_type: ParamType,
    #[source]
    failure: HandlerFailure,
}

impl ErrorRecord {
    /// Creates a new record.
    pub fn new(handler: HandlerId, value_type: ParamType, failure: HandlerFailure) -> Self {
        Self {
            handler,
            value_type,
            failure,
        }
    }

    /// Identity of the failing handler.
    pub fn handler(&self) -> HandlerId {
        self.handler
    }

    /// Runtime type of the value the handler was invoked with.
    pub fn value_type(&self) -> ParamType {
        self.value_type
    }

    /// The captured failure.
    pub fn failure(&self) -> &HandlerFailure {
        &self.failure
    }

    /// Consumes the record, returning the captured failure.
    pub fn into_failure(self) -> HandlerFailure {
        self.failure
    }
}

/// Receiving half of the error channel.
pub type ErrorReceiver = mpsc::Receiver<ErrorRecord>;

/// Outcome of handing a record to the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Dropped,
}

/// Sending half of the error channel, applying the configured overflow policy.
pub(crate) struct ErrorSink {
    tx: Mutex<Option<mpsc::Sender<ErrorRecord>>>,
    overflow: ErrorOverflow,
}

impl ErrorSink {
    pub(crate) fn channel(capacity: usize, overflow: ErrorOverflow) -> (Self, ErrorReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
                overflow,
            },
            rx,
        )
    }

    /// Hands a record to the channel.
    ///
    /// With [`ErrorOverflow::Block`] this waits for room, indefinitely if no
    /// one is reading. A record whose receiver was dropped, or that arrives
    /// after [`close`](Self::close), counts as dropped.
    pub(crate) async fn report(&self, record: ErrorRecord) -> Delivery {
        let Some(tx) = self.tx.lock().clone() else {
            debug!(handler = %record.handler(), "Error channel closed, discarding record");
            return Delivery::Dropped;
        };

        match self.overflow {
            ErrorOverflow::Block => match tx.send(record).await {
                Ok(()) => Delivery::Delivered,
                Err(mpsc::error::SendError(record)) => {
                    debug!(handler = %record.handler(), "Error receiver dropped, discarding record");
                    Delivery::Dropped
                }
            },
            ErrorOverflow::DropNewest => match tx.try_send(record) {
                Ok(()) => Delivery::Delivered,
                Err(TrySendError::Full(record)) => {
                    warn!(
                        handler = %record.handler(),
                        failure = %record.failure(),
                        "Error channel full, dropping record"
                    );
                    Delivery::Dropped
                }
                Err(TrySendError::Closed(record)) => {
                    debug!(handler = %record.handler(), "Error receiver dropped, discarding record");
                    Delivery::Dropped
                }
            },
        }
    }

    /// Drops the sending half. The receiver yields the buffered records, then `None`.
    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str) -> ErrorRecord {
        ErrorRecord::new(
            HandlerId::of::<fn(String)>(),
            ParamType::of::<String>(),
            HandlerFailure::Panicked(message.to_string()),
        )
    }

    #[test]
    fn test_record_display_names_handler_and_failure() {
        let text = record("boom").to_string();
        assert!(text.contains(HandlerId::of::<fn(String)>().name()));
        assert!(text.contains("boom"));
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_first_records() {
        let (sink, mut rx) = ErrorSink::channel(2, ErrorOverflow::DropNewest);
        assert_eq!(sink.report(record("a")).await, Delivery::Delivered);
        assert_eq!(sink.report(record("b")).await, Delivery::Delivered);
        assert_eq!(sink.report(record("c")).await, Delivery::Dropped);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.failure(), &HandlerFailure::Panicked("a".into()));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.failure(), &HandlerFailure::Panicked("b".into()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_counts_as_dropped() {
        for overflow in [ErrorOverflow::Block, ErrorOverflow::DropNewest] {
            let (sink, rx) = ErrorSink::channel(1, overflow);
            drop(rx);
            assert_eq!(sink.report(record("lost")).await, Delivery::Dropped);
        }
    }

    #[tokio::test]
    async fn test_close_ends_the_stream_after_buffered_records() {
        let (sink, mut rx) = ErrorSink::channel(4, ErrorOverflow::DropNewest);
        assert_eq!(sink.report(record("kept")).await, Delivery::Delivered);

        sink.close();
        assert_eq!(sink.report(record("late")).await, Delivery::Dropped);

        let kept = rx.recv().await.unwrap();
        assert_eq!(kept.failure(), &HandlerFailure::Panicked("kept".into()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_block_waits_for_room() {
        let (sink, mut rx) = ErrorSink::channel(1, ErrorOverflow::Block);
        let sink = std::sync::Arc::new(sink);
        assert_eq!(sink.report(record("a")).await, Delivery::Delivered);

        let pending = tokio::spawn({
            let sink = std::sync::Arc::clone(&sink);
            async move { sink.report(record("b")).await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert!(rx.recv().await.is_some());
        assert_eq!(pending.await.unwrap(), Delivery::Delivered);
        assert!(rx.recv().await.is_some());
    }
}
