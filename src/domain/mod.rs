//! Domain layer: identifiers, outbound envelopes, request metadata.

pub mod envelope;
pub mod request_info;
pub mod session_id;

pub use envelope::{Envelope, EnvelopeKind};
pub use request_info::RequestInfo;
pub use session_id::SessionId;
