//! Inbound frame classification and decoding.

use axum::extract::ws::Message;
use maptalk_core::{ClientEvent, ConnectionId};
use tracing::{debug, warn};

/// What a raw WebSocket message means for the session loop.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    /// A text payload (from a text frame or a UTF-8 binary frame).
    Text(String),
    /// Control traffic that only proves liveness.
    Heartbeat,
    /// The client closed the socket.
    Close,
    /// A frame the relay cannot use.
    Ignored,
}

/// Classify one WebSocket message.
pub fn classify(msg: Message) -> Incoming {
    match msg {
        Message::Text(t) => Incoming::Text(t.to_string()),
        Message::Binary(data) => match std::str::from_utf8(&data) {
            Ok(s) => Incoming::Text(s.to_string()),
            Err(_) => Incoming::Ignored,
        },
        Message::Ping(_) | Message::Pong(_) => Incoming::Heartbeat,
        Message::Close(_) => Incoming::Close,
    }
}

/// Decode a text payload into a client event.
///
/// Malformed frames and unknown event names are logged and dropped; nothing
/// is reported back to the client.
pub fn decode_frame(conn_id: &ConnectionId, text: &str) -> Option<ClientEvent> {
    match ClientEvent::decode(text) {
        Ok(event) => {
            debug!(conn_id = %conn_id, event = event.name(), "inbound event");
            Some(event)
        }
        Err(e) => {
            warn!(
                conn_id = %conn_id,
                error = %e,
                kind = e.error_kind(),
                len = text.len(),
                "dropping undecodable frame"
            );
            None
        }
    }
}
