//! In-memory transport for exercising sessions without a socket.
//!
//! [`MemoryTransport::pair`] returns the transport handed to the hub and
//! a [`MemoryPeer`] that plays the remote side.

use axum::body::Bytes;
use tokio::sync::mpsc;

use super::{Frame, FrameRead, FrameWrite, Transport, TransportError};

/// Session side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
}

/// Remote side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_session: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_session: mpsc::UnboundedReceiver<Frame>,
}

/// Read half of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryReader(mpsc::UnboundedReceiver<Result<Frame, TransportError>>);

/// Write half of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryWriter(mpsc::UnboundedSender<Frame>);

impl MemoryTransport {
    /// Creates a connected transport/peer pair.
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        let (to_session, inbound) = mpsc::unbounded_channel();
        let (outbound, from_session) = mpsc::unbounded_channel();
        (
            Self { inbound, outbound },
            MemoryPeer {
                to_session,
                from_session,
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (MemoryReader, MemoryWriter) {
        (MemoryReader(self.inbound), MemoryWriter(self.outbound))
    }
}

impl FrameRead for MemoryReader {
    async fn read_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.0.recv().await
    }
}

impl FrameWrite for MemoryWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.0
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

impl MemoryPeer {
    /// Delivers a frame to the session's read pump.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the session has
    /// released its read half.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.to_session
            .send(Ok(frame))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Delivers a text frame.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryPeer::send`].
    pub fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send(Frame::Text(Bytes::copy_from_slice(text.as_bytes())))
    }

    /// Makes the session's next read fail with `error`.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryPeer::send`].
    pub fn fail(&self, error: TransportError) -> Result<(), TransportError> {
        self.to_session
            .send(Err(error))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Waits for the next frame written by the session. `None` once the
    /// session has released its write half and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_session.recv().await
    }

    /// Returns a frame already written by the session, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_session.try_recv().ok()
    }

    /// Stops accepting frames from the session; its next write fails with
    /// [`TransportError::ConnectionClosed`]. Frames already written can
    /// still be received.
    pub fn close_receiver(&mut self) {
        self.from_session.close();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_in_both_directions() {
        let (transport, mut peer) = MemoryTransport::pair();
        let (mut reader, mut writer) = transport.split();

        tokio_test::assert_ok!(peer.send_text("hello"));
        let Some(Ok(frame)) = reader.read_frame().await else {
            panic!("expected a frame");
        };
        assert_eq!(frame, Frame::Text(Bytes::from_static(b"hello")));

        tokio_test::assert_ok!(writer.write_frame(Frame::Ping(Bytes::new())).await);
        assert_eq!(peer.recv().await, Some(Frame::Ping(Bytes::new())));
    }

    #[tokio::test]
    async fn dropped_peer_ends_read_stream() {
        let (transport, peer) = MemoryTransport::pair();
        let (mut reader, mut writer) = transport.split();
        drop(peer);
        assert!(reader.read_frame().await.is_none());
        assert_eq!(
            writer.write_frame(Frame::Text(Bytes::new())).await,
            Err(TransportError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn closed_receiver_rejects_writes() {
        let (transport, mut peer) = MemoryTransport::pair();
        let (_reader, mut writer) = transport.split();
        peer.close_receiver();
        assert_eq!(
            writer.write_frame(Frame::Text(Bytes::new())).await,
            Err(TransportError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn injected_error_is_read() {
        let (transport, peer) = MemoryTransport::pair();
        let (mut reader, _writer) = transport.split();
        tokio_test::assert_ok!(peer.fail(TransportError::Io("reset".to_string())));
        assert_eq!(
            reader.read_frame().await,
            Some(Err(TransportError::Io("reset".to_string())))
        );
    }
}
