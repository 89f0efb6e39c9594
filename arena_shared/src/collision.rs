//! Collision resolver.
//!
//! Two rules, evaluated over the entity set (players, then NPCs):
//!
//! 1. **Food**: an entity eats any pellet closer than `size + epsilon`, grows
//!    by a fixed increment, and the pellet is relocated on the spot.
//! 2. **Predation**: for an ordered pair `(a, b)`, `a` eats `b` when `b` lies
//!    within `a.size` and `a.size > b.size * dominance_threshold`. `a` gains
//!    `b.size * transfer_fraction`; `b` respawns at minimum size.
//!
//! # Evaluation order
//!
//! Entities are visited in the fixed order of [`World::entity_order`] taken
//! at the start of the pass, and every mutation is applied immediately. For
//! each entity its food checks run first, then its predation checks against
//! every other entity. Sizes and positions are always re-read, so an entity
//! respawned earlier in the pass is judged later with its new, smaller body.
//! This same-tick re-evaluation is intentional and kept stable.
//!
//! Entities missing at lookup time are skipped.

use rand::Rng;
use tracing::debug;

use crate::{
    config::Tuning,
    event::{EventBus, FoodRespawned, PlayerDied},
    spawn,
    world::{EntityRef, World},
};

/// Where resolution results go.
pub struct Outcome<'a> {
    pub events: &'a mut EventBus,
    /// Whether pellet relocations are published as events.
    pub announce_food: bool,
}

/// Totals for one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub food_eaten: usize,
    pub entities_eaten: usize,
}

/// Runs both rules over the whole entity set.
pub fn resolve<R: Rng + ?Sized>(
    world: &mut World,
    tuning: &Tuning,
    rng: &mut R,
    out: &mut Outcome<'_>,
) -> PassStats {
    let order = world.entity_order();
    let mut stats = PassStats::default();

    for &hunter in &order {
        if world.body(hunter).is_none() {
            continue;
        }

        for index in (0..world.food.len()).rev() {
            if eat_food(world, hunter, index, tuning, rng, out) {
                stats.food_eaten += 1;
            }
        }

        for &prey in &order {
            if prey != hunter && eat_entity(world, hunter, prey, tuning, rng, out).is_some() {
                stats.entities_eaten += 1;
            }
        }
    }

    stats
}

/// Food rule for one entity and one pellet.
///
/// Players with client-reported positions get a wider reach and a smaller
/// reward. Returns whether the pellet was eaten.
pub fn eat_food<R: Rng + ?Sized>(
    world: &mut World,
    who: EntityRef,
    index: usize,
    tuning: &Tuning,
    rng: &mut R,
    out: &mut Outcome<'_>,
) -> bool {
    let Some(body) = world.body(who) else {
        return false;
    };
    let Some(food) = world.food.get(index) else {
        return false;
    };

    let (epsilon, growth) = if world.is_client_reported(who) {
        (tuning.trusted_food_epsilon, tuning.trusted_food_growth)
    } else {
        (tuning.food_epsilon, tuning.food_growth)
    };
    if body.position.distance(food.position) >= body.size + epsilon {
        return false;
    }

    if let Some(body) = world.body_mut(who) {
        body.size += growth;
    }
    if let Some(position) = spawn::spawn_food(world, index, rng) {
        if out.announce_food {
            out.events.push(FoodRespawned { index, position });
        }
    }
    true
}

/// Predation rule for one ordered pair.
///
/// Returns the size `hunter` gained, or `None` if nothing happened.
pub fn eat_entity<R: Rng + ?Sized>(
    world: &mut World,
    hunter: EntityRef,
    prey: EntityRef,
    tuning: &Tuning,
    rng: &mut R,
    out: &mut Outcome<'_>,
) -> Option<f32> {
    if hunter == prey {
        return None;
    }
    let a = world.body(hunter)?;
    let b = world.body(prey)?;

    if a.position.distance(b.position) >= a.size || a.size <= b.size * tuning.dominance_threshold {
        return None;
    }

    let gained = b.size * tuning.transfer_fraction;
    world.body_mut(hunter)?.size += gained;

    world.respawn(prey, tuning, rng);

    if let EntityRef::Player(victim) = prey {
        debug!(client_id = ?victim, by = ?hunter, gained, "Player consumed");
        out.events.push(PlayerDied { victim, by: hunter });
    }
    Some(gained)
}
