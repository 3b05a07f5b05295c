use std::panic::{RefUnwindSafe, UnwindSafe};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::SqliteLeaseError;

/// Channel side of the pool's diagnostics stream.
///
/// Errors that cannot be returned to a caller (exhaustion, failed connection
/// builds, authorizer denials, close failures) are offered here without
/// blocking. When the receiver is full or gone the error is logged instead.
#[derive(Clone, Debug)]
pub struct ErrorSink {
    tx: mpsc::Sender<SqliteLeaseError>,
}

// Reporting only moves an owned error into the channel; nothing is observed
// in a broken state after an unwind.
impl UnwindSafe for ErrorSink {}
impl RefUnwindSafe for ErrorSink {}

impl ErrorSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<SqliteLeaseError>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SqliteLeaseError>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Offer `err` to the receiver without waiting.
    pub fn report(&self, err: SqliteLeaseError) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                tracing::warn!(%err, "error sink full; dropping error");
            }
            Err(TrySendError::Closed(err)) => {
                tracing::debug!(%err, "error sink closed; dropping error");
            }
        }
    }
}

impl From<mpsc::Sender<SqliteLeaseError>> for ErrorSink {
    fn from(tx: mpsc::Sender<SqliteLeaseError>) -> Self {
        Self::new(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sink_drops_without_blocking() {
        let (sink, mut rx) = ErrorSink::channel(1);
        sink.report(SqliteLeaseError::CursorExhausted);
        sink.report(SqliteLeaseError::LeaseReleased);

        assert!(matches!(rx.try_recv(), Ok(SqliteLeaseError::CursorExhausted)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_sink_is_ignored() {
        let (sink, rx) = ErrorSink::channel(4);
        drop(rx);
        sink.report(SqliteLeaseError::LeaseReleased);
    }
}
