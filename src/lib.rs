//! # relay-hub
//!
//! Session hub for long-lived WebSocket connections.
//!
//! Every connection handed to a [`Hub`] becomes a [`Session`] with its own
//! read and write pumps. Outbound messages go through a bounded per-session
//! queue that never blocks the sender, liveness is enforced with ping/pong
//! and read deadlines, and the hub broadcasts to any subset of the live set.
//!
//! ## Architecture
//!
//! ```text
//! axum upgrade (ws/)
//!     │  AxumTransport
//!     ▼
//! Hub (hub/) ── HandlerRegistry ── user callbacks
//!     │  register / deregister / broadcast
//!     ▼
//! Session (session/)
//!     ├── read pump:  frames → callbacks, pong → read deadline
//!     └── write pump: queue → frames, ticker → ping
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use relay_hub::{Hub, HubConfig};
//!
//! let hub = Hub::new(HubConfig::default());
//! let echo = hub.clone();
//! hub.on_message(move |session, msg| {
//!     let _ = session.write(msg.clone());
//!     let _ = echo.broadcast_others(msg.clone(), session);
//! });
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod session;
pub mod transport;
pub mod ws;

pub use config::HubConfig;
pub use domain::{Envelope, EnvelopeKind, RequestInfo, SessionId};
pub use error::HubError;
pub use hub::Hub;
pub use session::{Session, SessionState};
