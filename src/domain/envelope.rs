//! Outbound message unit queued for a session's write pump.

use axum::body::Bytes;

/// Kind of an outbound [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// UTF-8 text data frame.
    Text,
    /// Binary data frame.
    Binary,
    /// Liveness probe.
    Ping,
    /// Close frame. The payload is either empty or a close message built
    /// with [`crate::transport::format_close_message`].
    Close,
}

/// Tagged outbound payload.
///
/// Immutable once constructed; the payload is reference counted so a
/// broadcast shares one buffer across every recipient queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: EnvelopeKind,
    payload: Bytes,
}

impl Envelope {
    /// Creates an envelope of the given kind.
    #[must_use]
    pub fn new(kind: EnvelopeKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Text envelope.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(EnvelopeKind::Text, payload)
    }

    /// Binary envelope.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(EnvelopeKind::Binary, payload)
    }

    /// Close envelope.
    #[must_use]
    pub fn close(payload: impl Into<Bytes>) -> Self {
        Self::new(EnvelopeKind::Close, payload)
    }

    /// Returns the envelope kind.
    #[must_use]
    pub const fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        assert_eq!(Envelope::text("a").kind(), EnvelopeKind::Text);
        assert_eq!(Envelope::binary(vec![1u8]).kind(), EnvelopeKind::Binary);
        assert_eq!(Envelope::close(Bytes::new()).kind(), EnvelopeKind::Close);
    }

    #[test]
    fn clones_share_payload() {
        let env = Envelope::text("hello");
        let copy = env.clone();
        assert_eq!(env, copy);
        assert_eq!(copy.payload().as_ref(), b"hello");
    }
}
