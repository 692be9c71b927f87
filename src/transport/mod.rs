//! Transport seam: the frame-level duplex stream a session runs on.
//!
//! Wire negotiation and frame encoding belong to the transport; the core
//! only reads whole frames, writes whole frames, and applies its own
//! deadlines and size limit around those calls. A transport is split into
//! independently owned halves so the read and write pumps never contend
//! on a shared handle.

pub mod memory;

use std::future::Future;

use axum::body::Bytes;

use crate::domain::{Envelope, EnvelopeKind};

/// Normal closure status code.
pub const CLOSE_NORMAL: u16 = 1000;
/// Server-side failure status code, used by [`crate::Session::close_with_err`].
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code.
    pub code: u16,
    /// UTF-8 reason text.
    pub reason: String,
}

/// A single frame exchanged with the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text data frame.
    Text(Bytes),
    /// Binary data frame.
    Binary(Bytes),
    /// Liveness probe.
    Ping(Bytes),
    /// Liveness probe answer.
    Pong(Bytes),
    /// Close frame, with an optional status.
    Close(Option<CloseReason>),
}

impl Frame {
    /// Converts an outbound envelope into the frame written to the peer.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let payload = envelope.payload().clone();
        match envelope.kind() {
            EnvelopeKind::Text => Self::Text(payload),
            EnvelopeKind::Binary => Self::Binary(payload),
            EnvelopeKind::Ping => Self::Ping(payload),
            EnvelopeKind::Close => Self::Close(parse_close_message(&payload)),
        }
    }
}

/// Builds a close payload: a big-endian status code followed by the reason.
#[must_use]
pub fn format_close_message(code: u16, text: &str) -> Bytes {
    let mut buf = Vec::with_capacity(2 + text.len());
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
    Bytes::from(buf)
}

/// Parses a close payload built by [`format_close_message`].
///
/// Returns `None` for an empty payload or one too short to hold a status
/// code; invalid UTF-8 in the reason is replaced lossily.
#[must_use]
pub fn parse_close_message(payload: &[u8]) -> Option<CloseReason> {
    let (code, reason) = payload.split_first_chunk::<2>()?;
    Some(CloseReason {
        code: u16::from_be_bytes(*code),
        reason: String::from_utf8_lossy(reason).into_owned(),
    })
}

/// Errors raised by a transport. Passed through to the error handler
/// verbatim inside [`crate::HubError::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Underlying I/O or protocol failure.
    #[error("transport i/o error: {0}")]
    Io(String),

    /// The connection is already gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// A text frame did not contain valid UTF-8.
    #[error("text frame is not valid utf-8")]
    InvalidUtf8,
}

/// Read half of a transport.
pub trait FrameRead: Send + 'static {
    /// Reads the next frame. `None` means the stream has ended.
    fn read_frame(&mut self) -> impl Future<Output = Option<Result<Frame, TransportError>>> + Send;
}

/// Write half of a transport.
pub trait FrameWrite: Send + 'static {
    /// Writes one frame to the peer.
    fn write_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A negotiated duplex connection handed to the hub.
pub trait Transport: Send + 'static {
    /// Read half.
    type Reader: FrameRead;
    /// Write half.
    type Writer: FrameWrite;

    /// Splits the transport into halves owned by the read and write pumps.
    fn split(self) -> (Self::Reader, Self::Writer);
}
