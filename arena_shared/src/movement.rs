//! Movement integrator.
//!
//! Speed law: `base * speed_constant / (size + speed_offset)`. Bigger means
//! strictly slower, never zero. Displacement is per tick, not per second.

use crate::{
    ability,
    config::Tuning,
    math::{Bounds, Vec2},
    world::{Millis, PositionSource, World},
};

/// Per-tick speed for an entity of `size`.
pub fn effective_speed(base: f32, size: f32, tuning: &Tuning) -> f32 {
    base * (tuning.speed_constant / (size + tuning.speed_offset))
}

impl PositionSource {
    /// Next position given the current one and the latest input.
    ///
    /// `Integrated` steps along `input` as a heading; `ClientReported` takes
    /// `input` as the position itself. Both end clamped to `bounds`.
    pub fn next_position(self, current: Vec2, input: Vec2, speed: f32, bounds: &Bounds) -> Vec2 {
        let next = match self {
            PositionSource::Integrated => current + input * speed,
            PositionSource::ClientReported => input,
        };
        if next.is_finite() {
            bounds.clamp(next)
        } else {
            current
        }
    }
}

/// Advances every NPC and player by one tick.
pub fn integrate(world: &mut World, tuning: &Tuning, now: Millis) {
    let bounds = world.bounds;

    for npc in &mut world.npcs {
        let speed = effective_speed(tuning.npc_base_speed, npc.body.size, tuning);
        npc.body.position =
            PositionSource::Integrated.next_position(npc.body.position, npc.heading, speed, &bounds);
    }

    for player in world.players.values_mut() {
        let mut speed = effective_speed(tuning.player_base_speed, player.body.size, tuning);
        if ability::dash_active(&player.dash, now) {
            speed *= tuning.dash_factor;
        }
        player.body.position =
            player
                .source
                .next_position(player.body.position, player.input, speed, &bounds);
    }
}
