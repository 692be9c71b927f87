//! Shared application state injected into all Axum handlers.

use crate::hub::Hub;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hub every upgraded WebSocket joins.
    pub hub: Hub,
}
