//! Lock-guarded session state: lifecycle flag, outbound queue, key store.
//!
//! Reads (`get`, `state`, try-enqueue) take the read side of the lock;
//! `set`, `unset` and lifecycle transitions take the write side. The queue
//! sender lives behind the same lock so closing the queue and leaving
//! `Open` happen in one step.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::Envelope;
use crate::error::HubError;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting writes.
    Open,
    /// A close was requested; queued messages are still being flushed.
    Closing,
    /// Pumps have stopped or are stopping; nothing is accepted.
    Closed,
}

/// Outcome of a non-blocking enqueue on an accepting queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    Queued,
    Dropped,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    output: Option<mpsc::Sender<Envelope>>,
    keys: HashMap<String, Value>,
}

#[derive(Debug)]
pub(crate) struct SessionCore {
    inner: RwLock<Inner>,
}

impl SessionCore {
    pub(crate) fn new(output: mpsc::Sender<Envelope>, keys: HashMap<String, Value>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: SessionState::Open,
                output: Some(output),
                keys,
            }),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.read().state
    }

    /// Queues a data envelope without blocking.
    pub(crate) fn try_enqueue(&self, envelope: Envelope) -> Result<Enqueued, HubError> {
        let inner = self.inner.read();
        let Some(output) = inner.output.as_ref().filter(|_| inner.state == SessionState::Open)
        else {
            return Err(HubError::WriteToClosedSession);
        };
        match output.try_send(envelope) {
            Ok(()) => Ok(Enqueued::Queued),
            Err(TrySendError::Full(_)) => Ok(Enqueued::Dropped),
            Err(TrySendError::Closed(_)) => Err(HubError::WriteToClosedSession),
        }
    }

    /// Moves `Open` to `Closing`, queues the close envelope and closes the
    /// queue. Only the first caller succeeds.
    pub(crate) fn begin_close(&self, envelope: Envelope) -> Result<Enqueued, HubError> {
        let mut inner = self.inner.write();
        if inner.state != SessionState::Open {
            return Err(HubError::AlreadyClosed);
        }
        inner.state = SessionState::Closing;
        let Some(output) = inner.output.take() else {
            return Err(HubError::AlreadyClosed);
        };
        match output.try_send(envelope) {
            Ok(()) => Ok(Enqueued::Queued),
            Err(TrySendError::Full(_)) => Ok(Enqueued::Dropped),
            // Write pump already gone; nothing left to flush.
            Err(TrySendError::Closed(_)) => Ok(Enqueued::Queued),
        }
    }

    /// Marks the session closed after its pumps have been told to stop.
    pub(crate) fn finish(&self) {
        let mut inner = self.inner.write();
        inner.state = SessionState::Closed;
        inner.output = None;
    }

    pub(crate) fn set(&self, key: String, value: Value) {
        self.inner.write().keys.insert(key, value);
    }

    pub(crate) fn unset(&self, key: &str) -> Option<Value> {
        self.inner.write().keys.remove(key)
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().keys.get(key).cloned()
    }

    pub(crate) fn keys(&self) -> HashMap<String, Value> {
        self.inner.read().keys.clone()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Bytes;

    use super::*;

    fn core(capacity: usize) -> (SessionCore, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (SessionCore::new(tx, HashMap::new()), rx)
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (core, _rx) = core(1);
        assert_eq!(core.try_enqueue(Envelope::text("a")), Ok(Enqueued::Queued));
        assert_eq!(core.try_enqueue(Envelope::text("b")), Ok(Enqueued::Dropped));
    }

    #[test]
    fn begin_close_succeeds_once() {
        let (core, mut rx) = core(4);
        assert_eq!(core.begin_close(Envelope::close(Bytes::new())), Ok(Enqueued::Queued));
        assert_eq!(core.state(), SessionState::Closing);
        assert_eq!(
            core.begin_close(Envelope::close(Bytes::new())),
            Err(HubError::AlreadyClosed)
        );
        assert_eq!(
            core.try_enqueue(Envelope::text("late")),
            Err(HubError::WriteToClosedSession)
        );

        // Queue holds the close envelope and is then closed for good.
        assert!(rx.try_recv().is_ok());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn finish_is_terminal() {
        let (core, _rx) = core(4);
        core.finish();
        assert_eq!(core.state(), SessionState::Closed);
        assert_eq!(
            core.begin_close(Envelope::close(Bytes::new())),
            Err(HubError::AlreadyClosed)
        );
    }

    #[test]
    fn consumer_gone_rejects_writes() {
        let (core, rx) = core(4);
        drop(rx);
        assert_eq!(
            core.try_enqueue(Envelope::text("x")),
            Err(HubError::WriteToClosedSession)
        );
    }
}
