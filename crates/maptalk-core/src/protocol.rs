//! JSON wire protocol.
//!
//! Every frame in either direction is one envelope:
//!
//! ```json
//! { "event": "sendRoom", "data": { "id": "r1", "owner": "conn_...", "label": "cafe" } }
//! ```
//!
//! Inbound events form a closed set; anything else fails to decode and is
//! dropped by the transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProtocolError;
use crate::ids::{ConnectionId, RoomId};
use crate::model::{Position, Room, User};

/// Payload of `login`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginPayload {
    /// Display name.
    pub name: String,
    /// Current map position. Absent until the client has a fix.
    #[serde(default)]
    pub position: Position,
}

/// Payload of `sendMessage`, forwarded verbatim as `message`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Recipient connection. A message without one is never delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ConnectionId>,
    /// Sender label as supplied by the client. Not checked against the
    /// actual origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// Any other client-supplied fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `{ id }` reference to a room, used by `removeRoom` in both directions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRef {
    /// Room being referenced.
    pub id: RoomId,
}

/// Events a client may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Announce name and position.
    Login(LoginPayload),
    /// Direct message to one connection.
    SendMessage(DirectMessage),
    /// Publish or fully replace a room.
    SendRoom(Room),
    /// Withdraw a room.
    RemoveRoom(RoomRef),
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => "login",
            Self::SendMessage(_) => "sendMessage",
            Self::SendRoom(_) => "sendRoom",
            Self::RemoveRoom(_) => "removeRoom",
        }
    }
}

/// Events the relay sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full presence snapshot.
    OnlineUsers(Vec<User>),
    /// Full room snapshot.
    Rooms(Vec<Room>),
    /// Another connection logged in.
    UserJoined(User),
    /// A connection went away; carries its user name if it had logged in.
    UserLeft(Option<String>),
    /// Forwarded direct message.
    Message(DirectMessage),
    /// A room was published or replaced.
    SendRoom(Room),
    /// A room was withdrawn.
    RemoveRoom(RoomRef),
}

impl ServerEvent {
    /// Serialize to one text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            event: self.name(),
            source,
        })
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "onlineUsers",
            Self::Rooms(_) => "rooms",
            Self::UserJoined(_) => "userJoined",
            Self::UserLeft(_) => "userLeft",
            Self::Message(_) => "message",
            Self::SendRoom(_) => "sendRoom",
            Self::RemoveRoom(_) => "removeRoom",
        }
    }
}
