//! NPC controller.
//!
//! Memoryless wander: every tick each NPC independently keeps its heading or,
//! with a small fixed probability, rolls a new one. Runs before movement so a
//! new heading applies on the same tick.

use rand::Rng;

use crate::{config::Tuning, spawn, world::World};

/// Re-rolls NPC headings. Returns how many NPCs turned.
pub fn wander<R: Rng + ?Sized>(world: &mut World, tuning: &Tuning, rng: &mut R) -> usize {
    let chance = tuning.npc_turn_chance.clamp(0.0, 1.0);
    let mut turned = 0;
    for npc in &mut world.npcs {
        if rng.gen_bool(chance) {
            npc.heading = spawn::random_heading(tuning.npc_heading_range, rng);
            turned += 1;
        }
    }
    turned
}
