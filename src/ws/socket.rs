//! Adapter from axum's [`WebSocket`] to the hub's [`Transport`] seam.

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::transport::{CloseReason, Frame, FrameRead, FrameWrite, Transport, TransportError};

/// An upgraded axum WebSocket, ready to be handed to a [`crate::Hub`].
#[derive(Debug)]
pub struct AxumTransport(WebSocket);

/// Read half of an [`AxumTransport`].
#[derive(Debug)]
pub struct AxumReader(SplitStream<WebSocket>);

/// Write half of an [`AxumTransport`].
#[derive(Debug)]
pub struct AxumWriter(SplitSink<WebSocket, Message>);

impl AxumTransport {
    /// Wraps an upgraded socket.
    #[must_use]
    pub const fn new(socket: WebSocket) -> Self {
        Self(socket)
    }
}

impl Transport for AxumTransport {
    type Reader = AxumReader;
    type Writer = AxumWriter;

    fn split(self) -> (AxumReader, AxumWriter) {
        let (tx, rx) = self.0.split();
        (AxumReader(rx), AxumWriter(tx))
    }
}

impl FrameRead for AxumReader {
    async fn read_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let msg = self.0.next().await?;
        Some(
            msg.map(frame_from_message)
                .map_err(|e| TransportError::Io(e.to_string())),
        )
    }
}

impl FrameWrite for AxumWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = message_from_frame(frame)?;
        self.0
            .send(msg)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

fn frame_from_message(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(Bytes::from(text)),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
            code: f.code,
            reason: f.reason.as_str().to_string(),
        })),
    }
}

fn message_from_frame(frame: Frame) -> Result<Message, TransportError> {
    Ok(match frame {
        Frame::Text(data) => {
            let text = String::from_utf8(data.to_vec()).map_err(|_| TransportError::InvalidUtf8)?;
            Message::text(text)
        }
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        })),
    })
}
