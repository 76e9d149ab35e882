//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`, so
//! a partial file only overrides the keys it names.

mod logging;
mod server;

pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the relay.
///
/// ```json
/// {
///   "server": { "port": 4000, "allowedOrigins": ["http://localhost:5173"] },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Settings schema version.
    pub version: String,
    /// Network, CORS and connection limits.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RelaySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.allowed_origins.is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.allowedOrigins must not be empty".into(),
            ));
        }
        if s.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if s.send_queue_capacity == 0 || s.inbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "queue capacities must be at least 1".into(),
            ));
        }
        if s.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if s.heartbeat_timeout_secs <= s.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) must exceed heartbeatIntervalSecs ({})",
                s.heartbeat_timeout_secs, s.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}
