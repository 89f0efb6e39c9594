//! `arena_server`
//!
//! Server-side systems:
//! - Fixed-tick clock driving the shared [`arena_shared::sim::Simulation`]
//! - Connection gateway feeding joins, leaves and consume requests
//! - Receives `Input` datagrams
//! - Sends `Snapshot`s on the broadcast cadence
//!
//! Networking model:
//! - TCP: handshake, pellet sync/events, death notices, consume requests
//! - UDP: gameplay plane (input/snapshots)

pub mod server;

pub use server::GameServer;
