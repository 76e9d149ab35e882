//! Records shared with clients: users, positions and room markers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::ids::{ConnectionId, RoomId};

/// A map position as announced by the client.
///
/// Opaque to the relay: usually `{lat, lng}`, but whatever the client sent
/// (including `null` or nothing at all) is stored and echoed unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub Value);

impl Position {
    /// A `{lat, lng}` position.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self(json!({ "lat": lat, "lng": lng }))
    }

    /// The raw payload.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Whether the client sent no position (absent or `null`).
    pub fn is_unknown(&self) -> bool {
        self.0.is_null()
    }
}

/// A logged-in user. Identity is `id`, the connection that logged in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Display name chosen by the client. Not unique.
    pub name: String,
    /// Last announced map position.
    pub position: Position,
    /// Connection this user is attached to.
    pub id: ConnectionId,
}

/// A published room marker.
///
/// `owner` is attribution only: it decides which rooms are withdrawn when a
/// connection goes away, nothing else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier chosen by the publishing client.
    pub id: RoomId,
    /// Connection that published the room.
    pub owner: ConnectionId,
    /// Arbitrary client-defined fields (label, radius, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Room {
    /// Room with no extra fields.
    pub fn new(id: RoomId, owner: ConnectionId) -> Self {
        Self {
            id,
            owner,
            fields: Map::new(),
        }
    }

    /// Builder-style helper to set one client field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.fields.insert(key.into(), value);
        self
    }
}
