//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] is the central error type. Synchronous session operations
//! return it to the caller; pump failures have no caller and are handed to
//! the registered error handler instead. When an upgrade is refused the
//! error is rendered as a structured JSON response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::transport::TransportError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "hub is closed"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Errors produced by sessions and the hub.
///
/// # Error Code Ranges
///
/// | Range     | Category             |
/// |-----------|----------------------|
/// | 1000–1999 | Session state        |
/// | 2000–2999 | Hub state            |
/// | 3000–3999 | Connection / pumps   |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// A write was attempted on a session that is closing or closed.
    #[error("tried to write to a closed session")]
    WriteToClosedSession,

    /// The session's outbound queue was full; the message was dropped.
    #[error("session message buffer is full")]
    BufferFull,

    /// A close was attempted on a session that is closing or closed.
    #[error("session is already closed")]
    AlreadyClosed,

    /// A close payload was a single byte, too short to hold a status code.
    #[error("close payload must be empty or start with a two-byte status code")]
    InvalidClosePayload,

    /// The hub has been closed and accepts no new sessions.
    #[error("hub is closed")]
    HubClosed,

    /// No frame arrived before the read deadline.
    #[error("read deadline exceeded")]
    ReadTimeout,

    /// A frame could not be written before the write deadline.
    #[error("write deadline exceeded")]
    WriteTimeout,

    /// An inbound frame exceeded the configured read limit.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Size of the offending frame payload.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The peer sent a close frame.
    #[error("peer closed the connection (code {code}): {reason}")]
    PeerClosed {
        /// Close status code, `1005` when the peer sent none.
        code: u16,
        /// Reason text sent by the peer.
        reason: String,
    },

    /// Error reported by the underlying transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::WriteToClosedSession => 1001,
            Self::BufferFull => 1002,
            Self::AlreadyClosed => 1003,
            Self::InvalidClosePayload => 1004,
            Self::HubClosed => 2001,
            Self::ReadTimeout => 3001,
            Self::WriteTimeout => 3002,
            Self::MessageTooLarge { .. } => 3003,
            Self::PeerClosed { .. } => 3004,
            Self::Transport(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::HubClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::WriteToClosedSession | Self::AlreadyClosed => StatusCode::CONFLICT,
            Self::BufferFull => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidClosePayload => StatusCode::BAD_REQUEST,
            Self::MessageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ReadTimeout | Self::WriteTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::PeerClosed { .. } | Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns `true` for the pump failures that end a session.
    ///
    /// Errors returned from synchronous calls leave the session as it was.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::ReadTimeout
                | Self::WriteTimeout
                | Self::MessageTooLarge { .. }
                | Self::PeerClosed { .. }
                | Self::Transport(_)
        )
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
