//! Axum WebSocket upgrade handling.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};

use super::socket::AxumTransport;
use crate::app_state::AppState;
use crate::domain::RequestInfo;
use crate::error::HubError;
use crate::hub::Hub;

/// Upgrades the request and runs the resulting socket as a hub session.
///
/// Refuses with `503` when the hub is closed. The transport's read limit
/// is set to the hub's `max_message_size`.
pub fn upgrade(hub: Hub, ws: WebSocketUpgrade, request: RequestInfo) -> Response {
    if hub.is_closed() {
        return HubError::HubClosed.into_response();
    }

    let limit = hub.config().max_message_size;
    ws.max_message_size(limit)
        .on_upgrade(move |socket| async move {
            if let Err(e) = hub
                .handle_transport(AxumTransport::new(socket), request)
                .await
            {
                tracing::warn!(error = %e, "websocket session refused");
            }
        })
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket and join the hub.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = RequestInfo::new(uri, headers, Some(remote_addr));
    upgrade(state.hub, ws, request)
}
