//! Event router.
//!
//! Owns the presence roster and room registry and turns each inbound event
//! into store mutations plus a list of [`Dispatch`]es for the transport to
//! deliver. Handlers never fail: malformed frames are rejected before they
//! reach the router, and unknown targets simply produce undeliverable
//! dispatches.

use tracing::debug;

use crate::ids::ConnectionId;
use crate::model::{Room, User};
use crate::presence::PresenceStore;
use crate::protocol::{ClientEvent, DirectMessage, LoginPayload, RoomRef, ServerEvent};
use crate::rooms::RoomStore;

/// Something that happened on a connection.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// The transport accepted the connection.
    Connected,
    /// The client sent an event.
    Event(ClientEvent),
    /// The connection is gone. Always the last inbound for a connection.
    Disconnected,
}

/// Who should receive an outbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Exactly one connection. Silently undelivered if it is not connected.
    Connection(ConnectionId),
    /// Every connected client except the given one.
    AllExcept(ConnectionId),
}

/// One outbound event and its audience.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    /// Audience.
    pub target: Target,
    /// Event to deliver.
    pub event: ServerEvent,
}

impl Dispatch {
    fn to(id: &ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::Connection(id.clone()),
            event,
        }
    }

    fn others(origin: &ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::AllExcept(origin.clone()),
            event,
        }
    }
}

/// Sans-IO router over the two relay stores.
#[derive(Debug, Default)]
pub struct Router {
    presence: PresenceStore,
    rooms: RoomStore,
}

impl Router {
    /// Router with empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one inbound event from `origin` to completion.
    pub fn handle(&mut self, origin: &ConnectionId, inbound: Inbound) -> Vec<Dispatch> {
        match inbound {
            Inbound::Connected => self.on_connect(origin),
            Inbound::Event(ClientEvent::Login(payload)) => self.on_login(origin, payload),
            Inbound::Event(ClientEvent::SendMessage(msg)) => Self::on_message(origin, msg),
            Inbound::Event(ClientEvent::SendRoom(room)) => self.on_send_room(origin, room),
            Inbound::Event(ClientEvent::RemoveRoom(room_ref)) => {
                self.on_remove_room(origin, room_ref)
            }
            Inbound::Disconnected => self.on_disconnect(origin),
        }
    }

    /// Presence roster.
    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    /// Room registry.
    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    fn on_connect(&self, origin: &ConnectionId) -> Vec<Dispatch> {
        vec![
            Dispatch::to(origin, ServerEvent::OnlineUsers(self.presence.snapshot())),
            Dispatch::to(origin, ServerEvent::Rooms(self.rooms.snapshot())),
        ]
    }

    fn on_login(&mut self, origin: &ConnectionId, payload: LoginPayload) -> Vec<Dispatch> {
        let user = User {
            name: payload.name,
            position: payload.position,
            id: origin.clone(),
        };
        debug!(conn_id = %origin, name = %user.name, "user logged in");
        self.presence.insert(user.clone());

        vec![
            Dispatch::others(origin, ServerEvent::UserJoined(user)),
            Dispatch::to(origin, ServerEvent::OnlineUsers(self.presence.snapshot())),
        ]
    }

    fn on_message(origin: &ConnectionId, msg: DirectMessage) -> Vec<Dispatch> {
        let Some(to) = msg.to.clone() else {
            debug!(conn_id = %origin, "direct message without recipient, dropping");
            return Vec::new();
        };
        debug!(conn_id = %origin, to = %to, "forwarding direct message");
        vec![Dispatch::to(&to, ServerEvent::Message(msg))]
    }

    fn on_send_room(&mut self, origin: &ConnectionId, room: Room) -> Vec<Dispatch> {
        let outcome = self.rooms.upsert(room.clone());
        debug!(conn_id = %origin, room_id = %room.id, ?outcome, "room published");
        vec![Dispatch::others(origin, ServerEvent::SendRoom(room))]
    }

    fn on_remove_room(&mut self, origin: &ConnectionId, room_ref: RoomRef) -> Vec<Dispatch> {
        let removed = self.rooms.remove_by_id(&room_ref.id).is_some();
        debug!(conn_id = %origin, room_id = %room_ref.id, removed, "room withdrawn");
        vec![Dispatch::others(origin, ServerEvent::RemoveRoom(room_ref))]
    }

    fn on_disconnect(&mut self, origin: &ConnectionId) -> Vec<Dispatch> {
        let name = self.presence.remove_by_connection(origin).map(|u| u.name);
        let owned = self.rooms.remove_by_owner(origin);
        debug!(
            conn_id = %origin,
            logged_in = name.is_some(),
            rooms_removed = owned.len(),
            "connection cleaned up"
        );

        let mut out = Vec::with_capacity(1 + owned.len());
        out.push(Dispatch::others(origin, ServerEvent::UserLeft(name)));
        out.extend(owned.into_iter().map(|room| {
            Dispatch::others(origin, ServerEvent::RemoveRoom(RoomRef { id: room.id }))
        }));
        out
    }
}
