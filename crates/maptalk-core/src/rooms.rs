//! Published room registry.

use crate::ids::{ConnectionId, RoomId};
use crate::model::Room;

/// Outcome of [`RoomStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The room id was new; the room was appended.
    Inserted,
    /// A room with this id existed and was overwritten in place.
    Replaced,
}

/// Ordered registry of published rooms, keyed by room id.
#[derive(Debug, Default, Clone)]
pub struct RoomStore {
    rooms: Vec<Room>,
}

impl RoomStore {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the room with the same id, or append it.
    ///
    /// Replacement is a whole-record overwrite, `owner` included.
    pub fn upsert(&mut self, room: Room) -> Upsert {
        if let Some(existing) = self.rooms.iter_mut().find(|r| r.id == room.id) {
            *existing = room;
            Upsert::Replaced
        } else {
            self.rooms.push(room);
            Upsert::Inserted
        }
    }

    /// Remove the room with `id`, if present.
    pub fn remove_by_id(&mut self, id: &RoomId) -> Option<Room> {
        let idx = self.rooms.iter().position(|r| &r.id == id)?;
        Some(self.rooms.remove(idx))
    }

    /// Remove every room owned by `owner`, returning them in store order.
    pub fn remove_by_owner(&mut self, owner: &ConnectionId) -> Vec<Room> {
        let (removed, kept): (Vec<Room>, Vec<Room>) = std::mem::take(&mut self.rooms)
            .into_iter()
            .partition(|r| &r.owner == owner);
        self.rooms = kept;
        removed
    }

    /// Room with `id`.
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| &r.id == id)
    }

    /// Value copy of the registry.
    pub fn snapshot(&self) -> Vec<Room> {
        self.rooms.clone()
    }

    /// Number of published rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are published.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room(id: &str, owner: &str, label: &str) -> Room {
        Room::new(RoomId::from_raw(id), ConnectionId::from_raw(owner)).with_field("label", json!(label))
    }

    #[test]
    fn upsert_appends_new_ids() {
        let mut store = RoomStore::new();
        assert_eq!(store.upsert(room("r1", "a", "cafe")), Upsert::Inserted);
        assert_eq!(store.upsert(room("r2", "a", "bar")), Upsert::Inserted);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut store = RoomStore::new();
        let _ = store.upsert(room("r1", "a", "cafe"));
        let _ = store.upsert(room("r2", "a", "park"));
        assert_eq!(store.upsert(room("r1", "a", "bar")), Upsert::Replaced);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].id, RoomId::from_raw("r1"));
        assert_eq!(snap[0].fields["label"], "bar");
    }

    #[test]
    fn replace_is_full_overwrite() {
        let mut store = RoomStore::new();
        let _ = store.upsert(room("r1", "a", "cafe").with_field("radius", json!(50)));
        let _ = store.upsert(room("r1", "b", "bar"));

        let r = store.get(&RoomId::from_raw("r1")).unwrap();
        assert_eq!(r.owner.as_str(), "b");
        assert!(!r.fields.contains_key("radius"));
    }

    #[test]
    fn remove_by_id_absent_is_noop() {
        let mut store = RoomStore::new();
        let _ = store.upsert(room("r1", "a", "cafe"));
        assert!(store.remove_by_id(&RoomId::from_raw("nope")).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_by_id_removes() {
        let mut store = RoomStore::new();
        let _ = store.upsert(room("r1", "a", "cafe"));
        let removed = store.remove_by_id(&RoomId::from_raw("r1")).unwrap();
        assert_eq!(removed.fields["label"], "cafe");
        assert!(store.is_empty());
    }

    #[test]
    fn remove_by_owner_takes_all_and_keeps_order() {
        let mut store = RoomStore::new();
        let _ = store.upsert(room("r1", "a", "1"));
        let _ = store.upsert(room("r2", "b", "2"));
        let _ = store.upsert(room("r3", "a", "3"));
        let _ = store.upsert(room("r4", "b", "4"));

        let removed = store.remove_by_owner(&ConnectionId::from_raw("a"));
        let removed_ids: Vec<_> = removed.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(removed_ids, vec!["r1", "r3"]);

        let kept: Vec<_> = store.snapshot().into_iter().map(|r| r.id.to_string()).collect();
        assert_eq!(kept, vec!["r2", "r4"]);
    }

    #[test]
    fn remove_by_owner_absent_is_noop() {
        let mut store = RoomStore::new();
        let _ = store.upsert(room("r1", "a", "1"));
        assert!(store.remove_by_owner(&ConnectionId::from_raw("z")).is_empty());
        assert_eq!(store.len(), 1);
    }
}
