//! Metadata of the HTTP request a session was upgraded from.

use std::net::SocketAddr;

use axum::http::{HeaderMap, Uri};

/// Originating request metadata, captured at upgrade time.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Request URI including the query string.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Peer address, when the server was started with connect info.
    pub remote_addr: Option<SocketAddr>,
}

impl RequestInfo {
    /// Creates request metadata from its parts.
    #[must_use]
    pub fn new(uri: Uri, headers: HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            uri,
            headers,
            remote_addr,
        }
    }

    /// Returns the value of a query parameter, if present.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.uri.query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    /// Returns a header value as a string, if present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}
