//! Registry of live sessions with one-to-many broadcast.
//!
//! [`Hub`] owns the set of open sessions keyed by [`SessionId`]. The set
//! is guarded by a single lock held only to add, remove or copy members;
//! every broadcast copies the membership first and then writes to each
//! session outside the lock, so a saturated session never delays the
//! others or the caller.

mod handlers;

pub use handlers::{CloseHandler, ErrorHandler, HandlerRegistry, MessageHandler, SessionHandler};

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::HubConfig;
use crate::domain::{Envelope, RequestInfo, SessionId};
use crate::error::HubError;
use crate::session::{Session, pump};
use crate::transport::Transport;

#[derive(Debug, Default)]
struct LiveSet {
    members: HashMap<SessionId, Arc<Session>>,
    closed: bool,
}

#[derive(Debug)]
struct HubInner {
    config: Arc<HubConfig>,
    handlers: Arc<HandlerRegistry>,
    sessions: RwLock<LiveSet>,
}

/// Shared handle to a set of live sessions. Cloning is cheap.
///
/// # Concurrency
///
/// - Register, deregister and snapshot are serialized by one lock.
/// - Per-session writes happen outside that lock and never block.
/// - Broadcast order across sessions is unspecified.
#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    /// Creates an empty hub.
    ///
    /// Logs a warning when `ping_period` is not shorter than `pong_wait`;
    /// such a configuration disconnects idle peers but is left as given.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        if !config.has_valid_liveness() {
            tracing::warn!(
                ping_period = ?config.ping_period,
                pong_wait = ?config.pong_wait,
                "ping period is not shorter than pong wait; idle sessions will time out"
            );
        }
        Self {
            inner: Arc::new(HubInner {
                config: Arc::new(config),
                handlers: Arc::new(HandlerRegistry::new()),
                sessions: RwLock::new(LiveSet::default()),
            }),
        }
    }

    /// Returns the configuration shared by every session.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Sets the callback run after a session is registered.
    pub fn on_connect(&self, f: impl Fn(&Arc<Session>) + Send + Sync + 'static) {
        self.inner.handlers.set_connect(f);
    }

    /// Sets the callback run after a session is deregistered.
    pub fn on_disconnect(&self, f: impl Fn(&Arc<Session>) + Send + Sync + 'static) {
        self.inner.handlers.set_disconnect(f);
    }

    /// Sets the callback for inbound text messages.
    pub fn on_message(&self, f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static) {
        self.inner.handlers.set_message(f);
    }

    /// Sets the callback for inbound binary messages.
    pub fn on_message_binary(&self, f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static) {
        self.inner.handlers.set_message_binary(f);
    }

    /// Sets the callback for text messages written to a peer.
    pub fn on_message_sent(&self, f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static) {
        self.inner.handlers.set_message_sent(f);
    }

    /// Sets the callback for binary messages written to a peer.
    pub fn on_message_sent_binary(
        &self,
        f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static,
    ) {
        self.inner.handlers.set_message_sent_binary(f);
    }

    /// Sets the callback for liveness pongs.
    pub fn on_pong(&self, f: impl Fn(&Arc<Session>) + Send + Sync + 'static) {
        self.inner.handlers.set_pong(f);
    }

    /// Sets the callback for close frames sent by a peer.
    pub fn on_close(&self, f: impl Fn(&Arc<Session>, u16, &str) + Send + Sync + 'static) {
        self.inner.handlers.set_close(f);
    }

    /// Replaces the default logging error callback.
    pub fn on_error(&self, f: impl Fn(&Arc<Session>, &HubError) + Send + Sync + 'static) {
        self.inner.handlers.set_error(f);
    }

    /// Runs a session on `transport` until the connection ends.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] without touching the transport if
    /// the hub has been closed.
    pub async fn handle_transport<T: Transport>(
        &self,
        transport: T,
        request: RequestInfo,
    ) -> Result<(), HubError> {
        self.handle_transport_with_keys(transport, request, HashMap::new())
            .await
    }

    /// Like [`Hub::handle_transport`], with the session's key store
    /// pre-populated before the connect callback runs.
    ///
    /// Sequence: register, connect callback, pumps, deregister once both
    /// pumps have stopped, disconnect callback.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub async fn handle_transport_with_keys<T: Transport>(
        &self,
        transport: T,
        request: RequestInfo,
        keys: HashMap<String, Value>,
    ) -> Result<(), HubError> {
        let (session, output) = Session::new(
            request,
            Arc::clone(&self.inner.config),
            Arc::clone(&self.inner.handlers),
            keys,
        );
        self.register(&session)?;
        tracing::debug!(session_id = %session.id(), "session connected");
        self.inner.handlers.connect(&session);

        pump::run(&session, transport, output).await;

        self.deregister(&session);
        tracing::debug!(session_id = %session.id(), "session disconnected");
        self.inner.handlers.disconnect(&session);
        Ok(())
    }

    /// Adds a session to the live set.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn register(&self, session: &Arc<Session>) -> Result<(), HubError> {
        let mut set = self.inner.sessions.write();
        if set.closed {
            return Err(HubError::HubClosed);
        }
        set.members.insert(session.id(), Arc::clone(session));
        Ok(())
    }

    /// Removes a session from the live set. Returns `false` if it was not
    /// a member, which makes repeated calls harmless.
    pub fn deregister(&self, session: &Session) -> bool {
        self.inner
            .sessions
            .write()
            .members
            .remove(&session.id())
            .is_some()
    }

    /// Sends a text message to every live session.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast(&self, msg: impl Into<Bytes>) -> Result<(), HubError> {
        self.fan_out(&Envelope::text(msg), |_| true)
    }

    /// Sends a text message to every live session except `except`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast_others(&self, msg: impl Into<Bytes>, except: &Session) -> Result<(), HubError> {
        let skip = except.id();
        self.fan_out(&Envelope::text(msg), |s| s.id() != skip)
    }

    /// Sends a text message to every live session accepted by `filter`.
    ///
    /// `filter` runs outside the live-set lock.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast_filter(
        &self,
        msg: impl Into<Bytes>,
        filter: impl Fn(&Arc<Session>) -> bool,
    ) -> Result<(), HubError> {
        self.fan_out(&Envelope::text(msg), filter)
    }

    /// Sends a text message to the given sessions.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast_multiple(
        &self,
        msg: impl Into<Bytes>,
        sessions: &[Arc<Session>],
    ) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::HubClosed);
        }
        let envelope = Envelope::text(msg);
        for session in sessions {
            let _ = session.enqueue(envelope.clone());
        }
        Ok(())
    }

    /// Sends a binary message to every live session.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast_binary(&self, msg: impl Into<Bytes>) -> Result<(), HubError> {
        self.fan_out(&Envelope::binary(msg), |_| true)
    }

    /// Sends a binary message to every live session except `except`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast_binary_others(
        &self,
        msg: impl Into<Bytes>,
        except: &Session,
    ) -> Result<(), HubError> {
        let skip = except.id();
        self.fan_out(&Envelope::binary(msg), |s| s.id() != skip)
    }

    /// Sends a binary message to every live session accepted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub has been closed.
    pub fn broadcast_binary_filter(
        &self,
        msg: impl Into<Bytes>,
        filter: impl Fn(&Arc<Session>) -> bool,
    ) -> Result<(), HubError> {
        self.fan_out(&Envelope::binary(msg), filter)
    }

    /// Returns a snapshot of the live sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.sessions.read().members.values().cloned().collect()
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.read().members.len()
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().members.is_empty()
    }

    /// Returns `true` once [`Hub::close`] or [`Hub::close_with_msg`] ran.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.sessions.read().closed
    }

    /// Closes the hub and every live session with an empty close frame.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubClosed`] if the hub was already closed.
    pub fn close(&self) -> Result<(), HubError> {
        self.close_with_msg(Bytes::new())
    }

    /// Closes the hub and every live session with the given close payload.
    /// New transports are refused from then on.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidClosePayload`] for a one-byte payload,
    /// leaving the hub open, and [`HubError::HubClosed`] if the hub was
    /// already closed.
    pub fn close_with_msg(&self, msg: impl Into<Bytes>) -> Result<(), HubError> {
        let payload = msg.into();
        if payload.len() == 1 {
            return Err(HubError::InvalidClosePayload);
        }
        let members: Vec<Arc<Session>> = {
            let mut set = self.inner.sessions.write();
            if set.closed {
                return Err(HubError::HubClosed);
            }
            set.closed = true;
            set.members.values().cloned().collect()
        };

        tracing::info!(sessions = members.len(), "closing hub");
        for session in &members {
            let _ = session.close_with_msg(payload.clone());
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<Arc<Session>>, HubError> {
        let set = self.inner.sessions.read();
        if set.closed {
            return Err(HubError::HubClosed);
        }
        Ok(set.members.values().cloned().collect())
    }

    fn fan_out(
        &self,
        envelope: &Envelope,
        filter: impl Fn(&Arc<Session>) -> bool,
    ) -> Result<(), HubError> {
        for session in self.snapshot()?.iter().filter(|s| filter(s)) {
            // Sessions closing concurrently simply miss the message.
            let _ = session.enqueue(envelope.clone());
        }
        Ok(())
    }

    #[cfg(test)]
    fn attach(&self) -> (Arc<Session>, tokio::sync::mpsc::Receiver<Envelope>) {
        Session::new(
            RequestInfo::default(),
            Arc::clone(&self.inner.config),
            Arc::clone(&self.inner.handlers),
            HashMap::new(),
        )
    }
}
