//! A managed duplex connection and its per-session state.
//!
//! A [`Session`] is created by the [`crate::Hub`] when a transport is
//! handed over, and lives until both of its pumps have stopped. All
//! writes are non-blocking: they either land in the bounded outbound
//! queue or are dropped and reported to the error handler.

pub(crate) mod pump;
mod state;

pub use state::SessionState;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use self::state::{Enqueued, SessionCore};
use crate::config::HubConfig;
use crate::domain::{Envelope, RequestInfo, SessionId};
use crate::error::HubError;
use crate::hub::HandlerRegistry;
use crate::transport::{CLOSE_INTERNAL_ERROR, format_close_message};

/// Largest close reason that fits in a control frame next to the status code.
const MAX_CLOSE_REASON: usize = 123;

/// One live connection managed by a hub.
pub struct Session {
    id: SessionId,
    request: RequestInfo,
    connected_at: DateTime<Utc>,
    config: Arc<HubConfig>,
    handlers: Arc<HandlerRegistry>,
    core: SessionCore,
    me: Weak<Session>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("uri", &self.request.uri)
            .field("remote_addr", &self.request.remote_addr)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an open session and the receiving end of its outbound queue.
    pub(crate) fn new(
        request: RequestInfo,
        config: Arc<HubConfig>,
        handlers: Arc<HandlerRegistry>,
        keys: HashMap<String, Value>,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(config.message_buffer_size.max(1));
        let session = Arc::new_cyclic(|me| Self {
            id: SessionId::new(),
            request,
            connected_at: Utc::now(),
            config,
            handlers,
            core: SessionCore::new(tx, keys),
            me: Weak::clone(me),
        });
        (session, rx)
    }

    /// Session with default request metadata and no hub, for unit tests.
    #[cfg(test)]
    pub(crate) fn detached(
        config: HubConfig,
        handlers: Arc<HandlerRegistry>,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        Self::new(
            RequestInfo::default(),
            Arc::new(config),
            handlers,
            HashMap::new(),
        )
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the metadata of the request this session was upgraded from.
    #[must_use]
    pub const fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Returns when the session was created.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub(crate) fn config(&self) -> &HubConfig {
        &self.config
    }

    pub(crate) fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Queues a text message for the peer.
    ///
    /// Never blocks. When the outbound queue is full the message is
    /// dropped and [`HubError::BufferFull`] goes to the error handler;
    /// the call itself still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::WriteToClosedSession`] unless the session is open.
    pub fn write(&self, msg: impl Into<Bytes>) -> Result<(), HubError> {
        self.enqueue(Envelope::text(msg))
    }

    /// Queues a binary message for the peer. Same semantics as [`Session::write`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::WriteToClosedSession`] unless the session is open.
    pub fn write_binary(&self, msg: impl Into<Bytes>) -> Result<(), HubError> {
        self.enqueue(Envelope::binary(msg))
    }

    /// Closes the session with an empty close frame.
    ///
    /// Messages queued before the call are still written, then the close
    /// frame, then the connection is released.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::AlreadyClosed`] if a close already happened.
    pub fn close(&self) -> Result<(), HubError> {
        self.begin_close(Envelope::close(Bytes::new()))
    }

    /// Closes the session with a custom close payload, normally built with
    /// [`crate::transport::format_close_message`].
    ///
    /// The payload is either empty or a big-endian status code followed by
    /// UTF-8 reason text.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidClosePayload`] for a one-byte payload,
    /// leaving the session open, and [`HubError::AlreadyClosed`] if a close
    /// already happened.
    pub fn close_with_msg(&self, msg: impl Into<Bytes>) -> Result<(), HubError> {
        let msg = msg.into();
        if msg.len() == 1 {
            return Err(HubError::InvalidClosePayload);
        }
        self.begin_close(Envelope::close(msg))
    }

    /// Closes the session with status 1011 and the error's text as reason.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::AlreadyClosed`] if a close already happened.
    pub fn close_with_err(&self, err: &dyn std::error::Error) -> Result<(), HubError> {
        let text = err.to_string();
        let payload = format_close_message(CLOSE_INTERNAL_ERROR, truncate_reason(&text));
        self.begin_close(Envelope::close(payload))
    }

    /// Stores a value under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.core.set(key.into(), value.into());
    }

    /// Removes and returns the value under `key`.
    pub fn unset(&self, key: &str) -> Option<Value> {
        self.core.unset(key)
    }

    /// Returns the value under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.core.get(key)
    }

    /// Returns the value under `key`.
    ///
    /// Use this only for keys the application guarantees to have set,
    /// typically at connect time; [`Session::get`] is the recoverable form.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not present.
    #[must_use]
    #[allow(clippy::panic)]
    pub fn must_get(&self, key: &str) -> Value {
        match self.core.get(key) {
            Some(value) => value,
            None => panic!("session key \"{key}\" does not exist"),
        }
    }

    /// Returns a snapshot of every stored key.
    #[must_use]
    pub fn keys(&self) -> HashMap<String, Value> {
        self.core.keys()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Returns `true` once a close was requested or the connection ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() != SessionState::Open
    }

    pub(crate) fn enqueue(&self, envelope: Envelope) -> Result<(), HubError> {
        if self.core.try_enqueue(envelope)? == Enqueued::Dropped {
            self.report(&HubError::BufferFull);
        }
        Ok(())
    }

    fn begin_close(&self, envelope: Envelope) -> Result<(), HubError> {
        if self.core.begin_close(envelope)? == Enqueued::Dropped {
            self.report(&HubError::BufferFull);
        }
        tracing::debug!(session_id = %self.id, "session closing");
        Ok(())
    }

    pub(crate) fn finish(&self) {
        self.core.finish();
    }

    /// Hands an asynchronous failure to the error handler.
    pub(crate) fn report(&self, error: &HubError) {
        if let Some(me) = self.me.upgrade() {
            self.handlers.error(&me, error);
        }
    }
}

fn truncate_reason(text: &str) -> &str {
    if text.len() <= MAX_CLOSE_REASON {
        return text;
    }
    let mut end = MAX_CLOSE_REASON;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default()
}
