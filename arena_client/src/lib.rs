//! `arena_client`
//!
//! Client-side systems:
//! - Connection management (reliable + unreliable channels)
//! - Input sampling from a wandering bot
//! - Local pellet table kept in sync from server events
//! - Interpolation for players and NPCs between snapshots

pub mod client;
pub mod input;
pub mod interp;

pub use client::GameClient;
