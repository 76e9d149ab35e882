//! # maptalk-server
//!
//! Axum HTTP + `WebSocket` transport for the maptalk relay.
//!
//! - `GET /ws`: one `WebSocket` per client, JSON `{event, data}` frames
//! - `GET /health`: liveness and store counters
//! - A single coordinator task owns the presence and room stores and runs the
//!   [`maptalk_core::Router`] for every inbound event in arrival order
//! - Per-connection bounded send queues, heartbeat pings, origin allow-list
//! - Two-phase shutdown: sessions close, then the coordinator drains their
//!   disconnects and stops

#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{RelayServer, ServerHandle};
pub use shutdown::RelayShutdown;
