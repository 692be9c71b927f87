//! Callbacks bound to session lifecycle and message events.
//!
//! One callback per event kind; registering again replaces the previous
//! callback. Dispatch is synchronous and runs inline in whichever pump
//! raised the event, so a slow callback stalls only that session.

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use parking_lot::RwLock;

use crate::error::HubError;
use crate::session::Session;

/// Callback receiving only the session.
pub type SessionHandler = Arc<dyn Fn(&Arc<Session>) + Send + Sync>;
/// Callback receiving the session and a message payload.
pub type MessageHandler = Arc<dyn Fn(&Arc<Session>, &Bytes) + Send + Sync>;
/// Callback receiving the session and the peer's close code and reason.
pub type CloseHandler = Arc<dyn Fn(&Arc<Session>, u16, &str) + Send + Sync>;
/// Callback receiving the session and an asynchronous failure.
pub type ErrorHandler = Arc<dyn Fn(&Arc<Session>, &HubError) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    connect: Option<SessionHandler>,
    disconnect: Option<SessionHandler>,
    message: Option<MessageHandler>,
    message_binary: Option<MessageHandler>,
    message_sent: Option<MessageHandler>,
    message_sent_binary: Option<MessageHandler>,
    pong: Option<SessionHandler>,
    close: Option<CloseHandler>,
    error: Option<ErrorHandler>,
}

/// Registry of user callbacks, shared by the hub and all its sessions.
///
/// Unset callbacks are no-ops, except the error callback which defaults
/// to logging through `tracing`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Handlers>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.handlers.read();
        f.debug_struct("HandlerRegistry")
            .field("connect", &h.connect.is_some())
            .field("disconnect", &h.disconnect.is_some())
            .field("message", &h.message.is_some())
            .field("message_binary", &h.message_binary.is_some())
            .field("message_sent", &h.message_sent.is_some())
            .field("message_sent_binary", &h.message_sent_binary.is_some())
            .field("pong", &h.pong.is_some())
            .field("close", &h.close.is_some())
            .field("error", &h.error.is_some())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates a registry with every callback unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback run after a session is registered.
    pub fn set_connect(&self, f: impl Fn(&Arc<Session>) + Send + Sync + 'static) {
        self.handlers.write().connect = Some(Arc::new(f));
    }

    /// Sets the callback run after a session is deregistered.
    pub fn set_disconnect(&self, f: impl Fn(&Arc<Session>) + Send + Sync + 'static) {
        self.handlers.write().disconnect = Some(Arc::new(f));
    }

    /// Sets the callback for inbound text messages.
    pub fn set_message(&self, f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static) {
        self.handlers.write().message = Some(Arc::new(f));
    }

    /// Sets the callback for inbound binary messages.
    pub fn set_message_binary(&self, f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static) {
        self.handlers.write().message_binary = Some(Arc::new(f));
    }

    /// Sets the callback for text messages written to the peer.
    pub fn set_message_sent(&self, f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static) {
        self.handlers.write().message_sent = Some(Arc::new(f));
    }

    /// Sets the callback for binary messages written to the peer.
    pub fn set_message_sent_binary(
        &self,
        f: impl Fn(&Arc<Session>, &Bytes) + Send + Sync + 'static,
    ) {
        self.handlers.write().message_sent_binary = Some(Arc::new(f));
    }

    /// Sets the callback for liveness pongs.
    pub fn set_pong(&self, f: impl Fn(&Arc<Session>) + Send + Sync + 'static) {
        self.handlers.write().pong = Some(Arc::new(f));
    }

    /// Sets the callback for close frames sent by the peer.
    pub fn set_close(&self, f: impl Fn(&Arc<Session>, u16, &str) + Send + Sync + 'static) {
        self.handlers.write().close = Some(Arc::new(f));
    }

    /// Replaces the default logging error callback.
    pub fn set_error(&self, f: impl Fn(&Arc<Session>, &HubError) + Send + Sync + 'static) {
        self.handlers.write().error = Some(Arc::new(f));
    }

    // Each dispatch clones the callback out of the lock before calling it,
    // so callbacks may re-register handlers without deadlocking.

    pub(crate) fn connect(&self, session: &Arc<Session>) {
        let handler = self.handlers.read().connect.clone();
        if let Some(handler) = handler {
            handler(session);
        }
    }

    pub(crate) fn disconnect(&self, session: &Arc<Session>) {
        let handler = self.handlers.read().disconnect.clone();
        if let Some(handler) = handler {
            handler(session);
        }
    }

    pub(crate) fn message(&self, session: &Arc<Session>, payload: &Bytes) {
        let handler = self.handlers.read().message.clone();
        if let Some(handler) = handler {
            handler(session, payload);
        }
    }

    pub(crate) fn message_binary(&self, session: &Arc<Session>, payload: &Bytes) {
        let handler = self.handlers.read().message_binary.clone();
        if let Some(handler) = handler {
            handler(session, payload);
        }
    }

    pub(crate) fn message_sent(&self, session: &Arc<Session>, payload: &Bytes) {
        let handler = self.handlers.read().message_sent.clone();
        if let Some(handler) = handler {
            handler(session, payload);
        }
    }

    pub(crate) fn message_sent_binary(&self, session: &Arc<Session>, payload: &Bytes) {
        let handler = self.handlers.read().message_sent_binary.clone();
        if let Some(handler) = handler {
            handler(session, payload);
        }
    }

    pub(crate) fn pong(&self, session: &Arc<Session>) {
        let handler = self.handlers.read().pong.clone();
        if let Some(handler) = handler {
            handler(session);
        }
    }

    pub(crate) fn close(&self, session: &Arc<Session>, code: u16, reason: &str) {
        let handler = self.handlers.read().close.clone();
        if let Some(handler) = handler {
            handler(session, code, reason);
        }
    }

    pub(crate) fn error(&self, session: &Arc<Session>, error: &HubError) {
        let handler = self.handlers.read().error.clone();
        match handler {
            Some(handler) => handler(session, error),
            None if error.ends_session() => {
                tracing::warn!(session_id = %session.id(), %error, "session error");
            }
            None => {
                tracing::debug!(session_id = %session.id(), %error, "session message dropped");
            }
        }
    }
}
