//! # maptalk-core
//!
//! Domain model and relay logic for the maptalk presence server.
//!
//! - Branded identifiers ([`ConnectionId`], [`RoomId`])
//! - Records shared between clients ([`User`], [`Position`], [`Room`])
//! - The JSON wire protocol ([`ClientEvent`], [`ServerEvent`])
//! - The presence roster and room registry ([`PresenceStore`], [`RoomStore`])
//! - The sans-IO [`Router`] that turns inbound events into store mutations and
//!   outbound [`Dispatch`]es
//!
//! Nothing in this crate performs I/O. The transport executes the dispatches
//! the router returns.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod model;
pub mod presence;
pub mod protocol;
pub mod rooms;
pub mod router;

pub use errors::ProtocolError;
pub use ids::{ConnectionId, RoomId};
pub use model::{Position, Room, User};
pub use presence::PresenceStore;
pub use protocol::{ClientEvent, DirectMessage, LoginPayload, RoomRef, ServerEvent};
pub use rooms::{RoomStore, Upsert};
pub use router::{Dispatch, Inbound, Router, Target};
