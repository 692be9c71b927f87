//! Relay behavior used by the demo server.

use crate::hub::Hub;

/// Wires `hub` as a relay: text messages go to every session including the
/// sender, binary messages go to everyone else.
pub fn install_relay(hub: &Hub) {
    let relay = hub.clone();
    hub.on_message(move |_, msg| {
        if let Err(e) = relay.broadcast(msg.clone()) {
            tracing::debug!(error = %e, "relay broadcast skipped");
        }
    });

    let relay = hub.clone();
    hub.on_message_binary(move |session, msg| {
        if let Err(e) = relay.broadcast_binary_others(msg.clone(), session) {
            tracing::debug!(error = %e, "relay broadcast skipped");
        }
    });

    hub.on_connect(|session| {
        tracing::info!(
            session_id = %session.id(),
            remote_addr = ?session.request().remote_addr,
            "client connected"
        );
    });
    hub.on_disconnect(|session| {
        tracing::info!(session_id = %session.id(), "client disconnected");
    });
}
