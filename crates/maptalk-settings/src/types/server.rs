//! Network, CORS and connection-limit settings.

use serde::{Deserialize, Serialize};

/// Origins the production web client is served from.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://map-talk-chat.vercel.app",
    "https://map-talk-chat.vercel.app/",
];

/// Relay server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Browser origins allowed to connect. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Concurrent WebSocket connections accepted before upgrades are refused.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub send_queue_capacity: usize,
    /// Inbound events buffered for the coordinator.
    pub inbound_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3003,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_connections: 1024,
            send_queue_capacity: 256,
            inbound_queue_capacity: 1024,
            heartbeat_interval_secs: 25,
            heartbeat_timeout_secs: 60,
            max_message_size: 64 * 1024,
        }
    }
}
