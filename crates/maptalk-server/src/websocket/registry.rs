//! Registry of live connections and outbound fan-out.

use std::sync::Arc;

use dashmap::DashMap;
use maptalk_core::{ConnectionId, Dispatch, ServerEvent, Target};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// A reserved place under the connection limit. Released on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    _permit: OwnedSemaphorePermit,
}

/// Live connections indexed by id.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    send_queue_capacity: usize,
    slots: Arc<Semaphore>,
}

impl ConnectionRegistry {
    /// Create an empty registry admitting up to `max_connections` reserved
    /// slots, whose connections buffer up to `send_queue_capacity` outbound
    /// frames each.
    pub fn new(send_queue_capacity: usize, max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            send_queue_capacity: send_queue_capacity.max(1),
            slots: Arc::new(Semaphore::new(
                max_connections.clamp(1, Semaphore::MAX_PERMITS),
            )),
        }
    }

    /// Reserve a slot for a connection about to be upgraded.
    ///
    /// Returns `None` when every slot is taken. The reservation is atomic, so
    /// concurrent upgrades can never exceed the limit.
    pub fn try_reserve(&self) -> Option<ConnectionSlot> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| ConnectionSlot { _permit: permit })
    }

    /// Slots not currently reserved.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Admit a new connection under a fresh id.
    pub fn register(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.send_queue_capacity);
        let connection = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
        let _ = self
            .connections
            .insert(connection.id.clone(), Arc::clone(&connection));
        (connection, rx)
    }

    /// Forget a connection. Returns whether it was present.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Queue a frame for one connection. Unknown ids are a silent no-op.
    pub fn send_to(&self, id: &ConnectionId, frame: Arc<String>) -> bool {
        let Some(conn) = self.connections.get(id) else {
            debug!(conn_id = %id, "target not connected, dropping frame");
            return false;
        };
        if conn.send(frame) {
            true
        } else {
            warn!(conn_id = %id, dropped = conn.drop_count(), "send queue full or closed, dropping frame");
            false
        }
    }

    /// Queue a frame for every connection except `except`. Returns how many
    /// queues accepted it.
    pub fn broadcast_except(&self, except: &ConnectionId, frame: &Arc<String>) -> usize {
        let mut delivered = 0;
        for entry in &self.connections {
            if entry.key() == except {
                continue;
            }
            if entry.value().send(Arc::clone(frame)) {
                delivered += 1;
            } else {
                warn!(conn_id = %entry.key(), "send queue full or closed, dropping frame");
            }
        }
        delivered
    }

    /// Encode a router dispatch once and queue it for its audience.
    pub fn deliver(&self, dispatch: &Dispatch) -> usize {
        let Some(frame) = encode(&dispatch.event) else {
            return 0;
        };
        let recipients = match &dispatch.target {
            Target::Connection(id) => usize::from(self.send_to(id, frame)),
            Target::AllExcept(except) => self.broadcast_except(except, &frame),
        };
        debug!(event = dispatch.event.name(), recipients, "dispatched");
        recipients
    }
}

fn encode(event: &ServerEvent) -> Option<Arc<String>> {
    match event.encode() {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(event = event.name(), error = %e, kind = e.error_kind(), "failed to encode event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maptalk_core::{RoomId, RoomRef};

    fn remove_room(id: &str) -> ServerEvent {
        ServerEvent::RemoveRoom(RoomRef {
            id: RoomId::from_raw(id),
        })
    }

    #[test]
    fn register_assigns_unique_ids() {
        let reg = ConnectionRegistry::new(4, 8);
        let (a, _ra) = reg.register();
        let (b, _rb) = reg.register();
        assert_ne!(a.id, b.id);
        assert_eq!(reg.count(), 2);
        assert!(reg.contains(&a.id));
    }

    #[test]
    fn slots_are_bounded_and_released_on_drop() {
        let reg = ConnectionRegistry::new(4, 2);
        let first = reg.try_reserve().unwrap();
        let _second = reg.try_reserve().unwrap();
        assert!(reg.try_reserve().is_none());
        assert_eq!(reg.available_slots(), 0);

        drop(first);
        assert_eq!(reg.available_slots(), 1);
        assert!(reg.try_reserve().is_some());
    }

    #[test]
    fn concurrent_reservations_never_exceed_limit() {
        let reg = Arc::new(ConnectionRegistry::new(4, 3));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.try_reserve())
            })
            .collect();
        let granted: Vec<ConnectionSlot> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(granted.len(), 3);
    }

    #[test]
    fn unregister_removes_once() {
        let reg = ConnectionRegistry::new(4, 8);
        let (a, _ra) = reg.register();
        assert!(reg.unregister(&a.id));
        assert!(!reg.unregister(&a.id));
        assert_eq!(reg.count(), 0);
    }

    #[tokio::test]
    async fn deliver_to_single_connection() {
        let reg = ConnectionRegistry::new(4, 8);
        let (a, mut ra) = reg.register();
        let (_b, mut rb) = reg.register();

        let sent = reg.deliver(&Dispatch {
            target: Target::Connection(a.id.clone()),
            event: remove_room("r1"),
        });
        assert_eq!(sent, 1);
        assert_eq!(
            *ra.recv().await.unwrap(),
            r#"{"event":"removeRoom","data":{"id":"r1"}}"#
        );
        assert!(rb.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_excludes_origin() {
        let reg = ConnectionRegistry::new(4, 8);
        let (a, mut ra) = reg.register();
        let (_b, mut rb) = reg.register();
        let (_c, mut rc) = reg.register();

        let sent = reg.deliver(&Dispatch {
            target: Target::AllExcept(a.id.clone()),
            event: ServerEvent::UserLeft(Some("Ann".into())),
        });
        assert_eq!(sent, 2);
        assert!(ra.try_recv().is_err());
        assert!(rb.recv().await.is_some());
        assert!(rc.recv().await.is_some());
    }

    #[test]
    fn unknown_target_is_noop() {
        let reg = ConnectionRegistry::new(4, 8);
        let sent = reg.deliver(&Dispatch {
            target: Target::Connection(ConnectionId::from_raw("ghost")),
            event: remove_room("r1"),
        });
        assert_eq!(sent, 0);
    }

    #[test]
    fn full_queue_does_not_block_others() {
        let reg = ConnectionRegistry::new(1, 8);
        let (a, _ra) = reg.register();
        let (_b, _rb) = reg.register();
        let (_c, mut rc) = reg.register();

        let frame = Arc::new("x".to_string());
        assert_eq!(reg.broadcast_except(&a.id, &frame), 2);
        let _ = rc.try_recv();
        assert_eq!(reg.broadcast_except(&a.id, &frame), 1);
    }
}
