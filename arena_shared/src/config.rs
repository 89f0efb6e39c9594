//! Configuration system.
//!
//! Loads arena configuration from JSON strings/files (file IO left to app).
//! Every field has a default, so a config file only needs the overrides.

use std::{str::FromStr, time::Duration};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Largest food pool sent inside full snapshots.
///
/// A pellet costs roughly 56 bytes of JSON, so past this a snapshot with
/// food no longer fits one datagram once players and NPCs are added.
pub const FULL_SNAPSHOT_FOOD_LIMIT: usize = 800;

bitflags::bitflags! {
    /// Optional engine features. Profiles are presets of these.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Features: u32 {
        /// Autonomous NPC pool.
        const NPCS = 1 << 0;
        /// Time-gated dash ability.
        const DASH = 1 << 1;
        /// Players report absolute positions instead of headings.
        const TRUST_CLIENT = 1 << 2;
        /// Food is elided from snapshots and announced per consumption.
        const FOOD_EVENTS = 1 << 3;
    }
}

/// Named deployment presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Players and food only, server-computed movement.
    Classic,
    /// Adds NPCs and dash on top of `Classic`.
    Arena,
    /// Low-rate NPC relay with client-reported player positions.
    Relay,
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(Profile::Classic),
            "arena" => Ok(Profile::Arena),
            "relay" => Ok(Profile::Relay),
            other => bail!("unknown profile: {other}"),
        }
    }
}

/// Gameplay constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Size of every freshly spawned or respawned player/NPC.
    pub min_size: f32,
    /// NPC spawn size band, `[npc_size_min, npc_size_max)`.
    pub npc_size_min: f32,
    pub npc_size_max: f32,
    /// Edge length of the square around the origin players join in.
    pub player_spawn_spread: f32,
    pub player_base_speed: f32,
    pub npc_base_speed: f32,
    /// Speed law: `base * speed_constant / (size + speed_offset)`.
    pub speed_constant: f32,
    pub speed_offset: f32,
    /// Per-tick probability that an NPC picks a new heading.
    pub npc_turn_chance: f64,
    /// NPC heading components are drawn from `[-range, range)`.
    pub npc_heading_range: f32,
    pub food_epsilon: f32,
    pub food_growth: f32,
    /// Food rules for players whose position is client-reported.
    pub trusted_food_epsilon: f32,
    pub trusted_food_growth: f32,
    /// Predator must exceed `prey.size * dominance_threshold`.
    pub dominance_threshold: f32,
    /// Share of the prey's size the predator gains.
    pub transfer_fraction: f32,
    pub dash_factor: f32,
    pub dash_duration_ms: u64,
    pub dash_cooldown_ms: u64,
    /// Dash is only granted while `size > dash_min_size`.
    pub dash_min_size: f32,
    pub dash_cost: f32,
    pub player_color: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_size: 3.0,
            npc_size_min: 3.0,
            npc_size_max: 8.0,
            player_spawn_spread: 500.0,
            player_base_speed: 2.5,
            npc_base_speed: 2.0,
            speed_constant: 5.0,
            speed_offset: 2.0,
            npc_turn_chance: 0.02,
            npc_heading_range: 0.5,
            food_epsilon: 0.5,
            food_growth: 0.1,
            trusted_food_epsilon: 3.0,
            trusted_food_growth: 0.05,
            dominance_threshold: 1.2,
            transfer_fraction: 0.4,
            dash_factor: 3.0,
            dash_duration_ms: 500,
            dash_cooldown_ms: 3000,
            dash_min_size: 4.0,
            dash_cost: 1.0,
            player_color: 0x00ff_ff,
        }
    }
}

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Snapshot rate; clamped to `tick_hz` since snapshots go out on ticks.
    pub broadcast_hz: u32,
    /// Full edge length of the square world.
    pub world_size: f32,
    pub food_count: usize,
    pub npc_count: usize,
    pub features: Features,
    pub tuning: Tuning,
    /// Seed for the simulation RNG; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::profile(Profile::Arena)
    }
}

impl SimConfig {
    /// Builds the preset for a named profile.
    pub fn profile(profile: Profile) -> Self {
        let base = Self {
            tick_hz: 60,
            broadcast_hz: 60,
            world_size: 2000.0,
            food_count: 300,
            npc_count: 20,
            features: Features::NPCS | Features::DASH,
            tuning: Tuning::default(),
            seed: None,
        };
        match profile {
            Profile::Classic => Self {
                npc_count: 0,
                features: Features::empty(),
                ..base
            },
            Profile::Arena => base,
            Profile::Relay => Self {
                tick_hz: 20,
                broadcast_hz: 20,
                features: Features::NPCS | Features::TRUST_CLIENT | Features::FOOD_EVENTS,
                ..base
            },
        }
    }

    pub fn has(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    /// NPC slots actually populated.
    pub fn active_npcs(&self) -> usize {
        if self.has(Features::NPCS) {
            self.npc_count
        } else {
            0
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    /// Switches food to per-pellet events when the pool is too large for
    /// full snapshots. Applied by `Simulation::new`.
    pub fn normalized(mut self) -> Self {
        if !self.has(Features::FOOD_EVENTS) && self.food_count > FULL_SNAPSHOT_FOOD_LIMIT {
            warn!(
                food_count = self.food_count,
                limit = FULL_SNAPSHOT_FOOD_LIMIT,
                "Food pool too large for snapshots, enabling food events"
            );
            self.features |= Features::FOOD_EVENTS;
        }
        self
    }

    pub fn broadcast_interval_ms(&self) -> u64 {
        let hz = self.broadcast_hz.clamp(1, self.tick_hz.max(1));
        1000 / u64::from(hz)
    }
}

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Player name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
    #[serde(default)]
    pub sim: SimConfig,
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            player_name: default_player_name(),
            sim: SimConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
