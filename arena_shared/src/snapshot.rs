//! Snapshot broadcaster.
//!
//! Turns the registry into wire snapshots and decides when the next one is
//! due. Food can be left out of periodic snapshots; in that mode pellets are
//! announced one at a time as they are eaten (see [`crate::event::FoodRespawned`]).

use serde::{Deserialize, Serialize};

use crate::{
    math::Vec2,
    net::ClientId,
    world::{Millis, World},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: ClientId,
    pub position: Vec2,
    pub size: f32,
    pub color: u32,
    /// Lets clients draw the dash cooldown.
    pub dash_ready_at: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    pub index: usize,
    pub position: Vec2,
    pub size: f32,
    pub color: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodState {
    pub index: usize,
    pub position: Vec2,
}

/// World snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub players: Vec<PlayerState>,
    pub npcs: Vec<NpcState>,
    /// `None` when food travels as individual events instead.
    pub food: Option<Vec<FoodState>>,
}

impl WorldSnapshot {
    pub fn player(&self, id: ClientId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// Every pellet, in slot order.
pub fn food_states(world: &World) -> Vec<FoodState> {
    world
        .food
        .iter()
        .map(|f| FoodState {
            index: f.index,
            position: f.position,
        })
        .collect()
}

/// Captures the registry as it stands.
pub fn capture(world: &World, tick: u64, include_food: bool) -> WorldSnapshot {
    WorldSnapshot {
        tick,
        players: world
            .players
            .values()
            .map(|p| PlayerState {
                id: p.id,
                position: p.body.position,
                size: p.body.size,
                color: p.color,
                dash_ready_at: p.dash.ready_at,
            })
            .collect(),
        npcs: world
            .npcs
            .iter()
            .map(|n| NpcState {
                index: n.index,
                position: n.body.position,
                size: n.body.size,
                color: n.color,
            })
            .collect(),
        food: include_food.then(|| food_states(world)),
    }
}

/// Broadcast cadence, independent of the tick rate.
///
/// Fires on the first call, then whenever `interval_ms` has passed since the
/// last firing. Missed slots are not made up.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    interval_ms: Millis,
    last_sent: Option<Millis>,
}

impl Broadcaster {
    pub fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms,
            last_sent: None,
        }
    }

    pub fn due(&mut self, now: Millis) -> bool {
        let due = match self.last_sent {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
        };
        if due {
            self.last_sent = Some(now);
        }
        due
    }
}
