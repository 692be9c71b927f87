//! HTTP surface of the demo server: system endpoints and the `/ws` route.

pub mod system;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router.
///
/// The `/ws` route reads the peer address, so the router must be served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(system::routes())
        .route("/ws", get(ws_handler))
        .with_state(state)
}
