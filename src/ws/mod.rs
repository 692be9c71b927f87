//! WebSocket layer: axum transport adapter, upgrade handling, relay wiring.
//!
//! The `/ws` endpoint hands every upgraded socket to the shared
//! [`crate::Hub`], which runs it as a session.

pub mod handler;
pub mod relay;
pub mod socket;

pub use handler::upgrade;
pub use socket::AxumTransport;
