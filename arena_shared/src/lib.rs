//! `arena_shared`
//!
//! The authoritative simulation core of the arena plus the pieces both
//! client and server need.
//!
//! Design goals:
//! - Single-threaded, deterministic for a given seed and input order.
//! - Fixed-size pools with in-place respawn; slot index is identity.
//! - Gateway traffic enters only through queued events, never mid-tick.
//! - No `unsafe`.

pub mod ability;
pub mod collision;
pub mod config;
pub mod event;
pub mod math;
pub mod movement;
pub mod net;
pub mod npc;
pub mod sim;
pub mod snapshot;
pub mod spawn;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::sim::*;
    pub use crate::snapshot::*;
    pub use crate::world::*;
}
