//! Identifiers.
//!
//! Both serialize as bare JSON scalars so they match what browser clients
//! already send and expect.

use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Transport-assigned identifier of one live connection.
///
/// Stable for the lifetime of the connection and never reused.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an existing identifier string.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ConnectionId {
    /// Mint a fresh, time-ordered connection id (`conn_<uuid v7>`).
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-assigned identifier of a published room marker.
///
/// Clients pick these freely; strings and numbers are both accepted and are
/// never equal to each other (`1` and `"1"` name different rooms).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomId {
    /// String id.
    Text(String),
    /// Numeric id, kept with its original JSON representation.
    Number(Number),
}

impl RoomId {
    /// Wrap a string identifier.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// The id as a string slice, if it is a string id.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl From<u64> for RoomId {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}
