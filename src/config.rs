//! Hub and server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Durations are given in milliseconds.

use std::net::SocketAddr;
use std::time::Duration;

/// Timing and size parameters shared by every session of a hub.
///
/// `ping_period` must be shorter than `pong_wait`: the peer's answer to a
/// ping is what pushes the read deadline forward, so a ping period at or
/// beyond the pong wait lets idle but healthy peers time out. The hub
/// logs a warning for such configurations but does not correct them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Deadline for writing a single frame.
    pub write_wait: Duration,

    /// How long the read pump waits for any frame before giving up.
    pub pong_wait: Duration,

    /// Interval between liveness pings. Zero disables pings.
    pub ping_period: Duration,

    /// Largest inbound data frame payload accepted, in bytes.
    pub max_message_size: usize,

    /// Capacity of each session's outbound queue.
    pub message_buffer_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            message_buffer_size: 256,
        }
    }
}

impl HubConfig {
    /// Loads the hub configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to [`HubConfig::default`].
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            write_wait: parse_env_millis("HUB_WRITE_WAIT_MS", defaults.write_wait),
            pong_wait: parse_env_millis("HUB_PONG_WAIT_MS", defaults.pong_wait),
            ping_period: parse_env_millis("HUB_PING_PERIOD_MS", defaults.ping_period),
            max_message_size: parse_env("HUB_MAX_MESSAGE_SIZE", defaults.max_message_size),
            message_buffer_size: parse_env(
                "HUB_MESSAGE_BUFFER_SIZE",
                defaults.message_buffer_size,
            )
            .max(1),
        }
    }

    /// Returns `true` when pings are sent before the read deadline expires.
    #[must_use]
    pub fn has_valid_liveness(&self) -> bool {
        self.ping_period < self.pong_wait
    }
}

/// Settings for the demo server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,
}

impl ServerConfig {
    /// Loads server settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        Ok(Self { listen_addr })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding milliseconds.
fn parse_env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
