//! Entity registry.
//!
//! The world owns every entity for the lifetime of the process:
//! - players, keyed by connection id (ordered, so iteration is stable)
//! - food pellets, a fixed pool where the slot index is the identity
//! - NPCs, a fixed pool where the slot index is the identity
//!
//! Pools never shrink. A consumed pellet or NPC is reset in place, which also
//! means indices handed out in snapshots and events stay valid forever.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::{SimConfig, Tuning},
    math::{Bounds, Vec2},
    net::ClientId,
    spawn,
};

/// Milliseconds on the simulation clock.
pub type Millis = u64;

/// Position and size; the parts of a player or NPC that collisions touch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Vec2,
    /// Growth currency and collision radius.
    pub size: f32,
}

/// Where a player's position comes from each tick.
///
/// Selected once per player when it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSource {
    /// The server integrates the player's heading input.
    Integrated,
    /// The client reports an absolute position which is copied and clamped.
    ClientReported,
}

/// Dash timers. Both are absolute timestamps, not counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DashState {
    pub active_until: Millis,
    pub ready_at: Millis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: ClientId,
    pub body: Body,
    pub color: u32,
    pub source: PositionSource,
    /// Heading for `Integrated`, absolute position for `ClientReported`.
    pub input: Vec2,
    pub dash: DashState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Npc {
    pub index: usize,
    pub body: Body,
    pub color: u32,
    pub heading: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Food {
    pub index: usize,
    pub position: Vec2,
}

/// Handle to a member of the entity set (players and NPCs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Player(ClientId),
    Npc(usize),
}

/// The entity registry.
#[derive(Debug, Clone)]
pub struct World {
    pub bounds: Bounds,
    pub players: BTreeMap<ClientId, Player>,
    pub npcs: Vec<Npc>,
    pub food: Vec<Food>,
}

impl World {
    /// Creates an empty world.
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            players: BTreeMap::new(),
            npcs: Vec::new(),
            food: Vec::new(),
        }
    }

    /// Creates a world with its food and NPC pools filled.
    pub fn populate<R: Rng + ?Sized>(cfg: &SimConfig, rng: &mut R) -> Self {
        let bounds = Bounds::from_size(cfg.world_size);
        let mut world = Self::new(bounds);
        world.food = (0..cfg.food_count)
            .map(|index| Food {
                index,
                position: spawn::random_position(&bounds, rng),
            })
            .collect();
        world.npcs = (0..cfg.active_npcs())
            .map(|index| spawn::new_npc(index, &cfg.tuning, &bounds, rng))
            .collect();
        world
    }

    /// Adds a player at a randomized spawn point near the center.
    ///
    /// Returns `false` (and changes nothing) if the id is already present.
    pub fn create_player<R: Rng + ?Sized>(
        &mut self,
        id: ClientId,
        source: PositionSource,
        tuning: &Tuning,
        rng: &mut R,
    ) -> bool {
        if self.players.contains_key(&id) {
            return false;
        }
        let position = spawn::player_spawn_point(tuning, &self.bounds, rng);
        let input = match source {
            PositionSource::Integrated => Vec2::ZERO,
            PositionSource::ClientReported => position,
        };
        self.players.insert(
            id,
            Player {
                id,
                body: Body {
                    position,
                    size: tuning.min_size,
                },
                color: tuning.player_color,
                source,
                input,
                dash: DashState::default(),
            },
        );
        true
    }

    /// Removes a player immediately. No corpse, no respawn.
    pub fn remove_player(&mut self, id: ClientId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn player(&self, id: ClientId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: ClientId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Current body of an entity, if it still exists.
    pub fn body(&self, e: EntityRef) -> Option<Body> {
        match e {
            EntityRef::Player(id) => self.players.get(&id).map(|p| p.body),
            EntityRef::Npc(i) => self.npcs.get(i).map(|n| n.body),
        }
    }

    pub fn body_mut(&mut self, e: EntityRef) -> Option<&mut Body> {
        match e {
            EntityRef::Player(id) => self.players.get_mut(&id).map(|p| &mut p.body),
            EntityRef::Npc(i) => self.npcs.get_mut(i).map(|n| &mut n.body),
        }
    }

    /// Resets a consumed entity in place and returns where it respawned.
    ///
    /// A client-reported player also has its last reported position replaced,
    /// so the next integration keeps it at the respawn point instead of
    /// copying it back to where it was eaten.
    pub fn respawn<R: Rng + ?Sized>(
        &mut self,
        e: EntityRef,
        tuning: &Tuning,
        rng: &mut R,
    ) -> Option<Vec2> {
        let bounds = self.bounds;
        match e {
            EntityRef::Player(id) => {
                let player = self.players.get_mut(&id)?;
                spawn::respawn(&mut player.body, tuning, &bounds, rng);
                if player.source == PositionSource::ClientReported {
                    player.input = player.body.position;
                }
                Some(player.body.position)
            }
            EntityRef::Npc(i) => {
                let npc = self.npcs.get_mut(i)?;
                spawn::respawn(&mut npc.body, tuning, &bounds, rng);
                Some(npc.body.position)
            }
        }
    }

    /// The entity set in evaluation order: players by id, then NPCs by slot.
    pub fn entity_order(&self) -> Vec<EntityRef> {
        self.players
            .keys()
            .map(|id| EntityRef::Player(*id))
            .chain((0..self.npcs.len()).map(EntityRef::Npc))
            .collect()
    }

    /// Whether `e` is a player whose position the client reports.
    pub fn is_client_reported(&self, e: EntityRef) -> bool {
        match e {
            EntityRef::Player(id) => self
                .players
                .get(&id)
                .is_some_and(|p| p.source == PositionSource::ClientReported),
            EntityRef::Npc(_) => false,
        }
    }
}
