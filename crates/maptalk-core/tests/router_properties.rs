//! Property tests for the event router over random event sequences.

use std::collections::HashSet;

use maptalk_core::{
    ClientEvent, ConnectionId, DirectMessage, Dispatch, Inbound, LoginPayload, Position, Room,
    RoomId, RoomRef, Router, ServerEvent, Target,
};
use proptest::prelude::*;
use serde_json::{Map, json};

#[derive(Clone, Debug)]
enum Op {
    Connect(u8),
    Login(u8, String),
    Message(u8, u8),
    SendRoom { from: u8, room: u8, owner: u8, label: u8 },
    RemoveRoom(u8, u8),
    Disconnect(u8),
}

fn conn(n: u8) -> ConnectionId {
    ConnectionId::from_raw(format!("conn_{n}"))
}

fn room_id(n: u8) -> RoomId {
    RoomId::from_raw(format!("room_{n}"))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Connect),
        (0u8..4, "[a-z]{1,6}").prop_map(|(c, n)| Op::Login(c, n)),
        (0u8..4, 0u8..6).prop_map(|(c, t)| Op::Message(c, t)),
        (0u8..4, 0u8..5, 0u8..4, any::<u8>()).prop_map(|(from, room, owner, label)| {
            Op::SendRoom { from, room, owner, label }
        }),
        (0u8..4, 0u8..6).prop_map(|(c, r)| Op::RemoveRoom(c, r)),
        (0u8..4).prop_map(Op::Disconnect),
    ]
}

fn apply(router: &mut Router, op: &Op) -> (ConnectionId, Vec<Dispatch>) {
    let (origin, inbound) = match op {
        Op::Connect(c) => (conn(*c), Inbound::Connected),
        Op::Login(c, name) => (
            conn(*c),
            Inbound::Event(ClientEvent::Login(LoginPayload {
                name: name.clone(),
                position: Position::new(f64::from(*c), 0.0),
            })),
        ),
        Op::Message(c, to) => (
            conn(*c),
            Inbound::Event(ClientEvent::SendMessage(DirectMessage {
                content: Some("hi".into()),
                to: Some(conn(*to)),
                from: None,
                extra: Map::new(),
            })),
        ),
        Op::SendRoom { from, room, owner, label } => (
            conn(*from),
            Inbound::Event(ClientEvent::SendRoom(
                Room::new(room_id(*room), conn(*owner)).with_field("label", json!(label)),
            )),
        ),
        Op::RemoveRoom(c, r) => (
            conn(*c),
            Inbound::Event(ClientEvent::RemoveRoom(RoomRef { id: room_id(*r) })),
        ),
        Op::Disconnect(c) => (conn(*c), Inbound::Disconnected),
    };
    let out = router.handle(&origin, inbound);
    (origin, out)
}

proptest! {
    #[test]
    fn broadcasts_never_include_origin(ops in proptest::collection::vec(op(), 1..64)) {
        let mut router = Router::new();
        for op in &ops {
            let (origin, out) = apply(&mut router, op);
            for d in &out {
                match (&d.target, &d.event) {
                    (Target::AllExcept(except), _) => prop_assert_eq!(except, &origin),
                    (Target::Connection(to), ServerEvent::Message(msg)) => {
                        prop_assert_eq!(Some(to), msg.to.as_ref());
                    }
                    (Target::Connection(to), _) => prop_assert_eq!(to, &origin),
                }
            }
        }
    }

    #[test]
    fn stores_stay_keyed(ops in proptest::collection::vec(op(), 1..64)) {
        let mut router = Router::new();
        for op in &ops {
            let _ = apply(&mut router, op);

            let users = router.presence().snapshot();
            let user_ids: HashSet<_> = users.iter().map(|u| u.id.clone()).collect();
            prop_assert_eq!(user_ids.len(), users.len());

            let rooms = router.rooms().snapshot();
            let room_ids: HashSet<_> = rooms.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(room_ids.len(), rooms.len());
        }
    }

    #[test]
    fn disconnect_removes_everything_owned(
        ops in proptest::collection::vec(op(), 0..48),
        victim in 0u8..4,
    ) {
        let mut router = Router::new();
        for op in &ops {
            let _ = apply(&mut router, op);
        }

        let owned_before: Vec<RoomId> = router
            .rooms()
            .snapshot()
            .into_iter()
            .filter(|r| r.owner == conn(victim))
            .map(|r| r.id)
            .collect();
        let others_before = router.rooms().len() - owned_before.len();

        let (_, out) = apply(&mut router, &Op::Disconnect(victim));

        let announced: Vec<RoomId> = out
            .iter()
            .filter_map(|d| match &d.event {
                ServerEvent::RemoveRoom(r) => Some(r.id.clone()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(announced, owned_before);
        prop_assert!(router.presence().get(&conn(victim)).is_none());
        prop_assert!(router.rooms().snapshot().iter().all(|r| r.owner != conn(victim)));
        prop_assert_eq!(router.rooms().len(), others_before);
    }

    #[test]
    fn remove_room_is_idempotent(
        ops in proptest::collection::vec(op(), 0..48),
        target in 0u8..6,
    ) {
        let mut router = Router::new();
        for op in &ops {
            let _ = apply(&mut router, op);
        }

        let _ = apply(&mut router, &Op::RemoveRoom(0, target));
        let after_once = router.rooms().snapshot();
        let out = apply(&mut router, &Op::RemoveRoom(1, target)).1;

        prop_assert_eq!(router.rooms().snapshot(), after_once);
        prop_assert_eq!(out.len(), 1);
        prop_assert!(router.rooms().get(&room_id(target)).is_none());
    }

    #[test]
    fn republish_keeps_position_and_count(
        ops in proptest::collection::vec(op(), 0..48),
        room in 0u8..5,
        label in any::<u8>(),
    ) {
        let mut router = Router::new();
        for op in &ops {
            let _ = apply(&mut router, op);
        }
        let before: Vec<RoomId> = router.rooms().snapshot().into_iter().map(|r| r.id).collect();
        let existed = before.contains(&room_id(room));

        let _ = apply(&mut router, &Op::SendRoom { from: 0, room, owner: 0, label });

        let after: Vec<RoomId> = router.rooms().snapshot().into_iter().map(|r| r.id).collect();
        if existed {
            prop_assert_eq!(&after, &before);
        } else {
            prop_assert_eq!(after.len(), before.len() + 1);
            prop_assert_eq!(after.last(), Some(&room_id(room)));
        }
        let stored = router.rooms().get(&room_id(room)).cloned();
        prop_assert_eq!(stored.map(|r| r.fields["label"].clone()), Some(json!(label)));
    }
}
