//! Spawn manager.
//!
//! (Re)initializes pool slots and respawns consumed entities. All of these are
//! plain mutations with no failure mode; out-of-range slots are ignored.

use rand::Rng;

use crate::{
    config::Tuning,
    math::{Bounds, Vec2},
    world::{Body, Npc, World},
};

/// Uniformly random point in `[-half_extent, half_extent)` on both axes.
pub fn random_position<R: Rng + ?Sized>(bounds: &Bounds, rng: &mut R) -> Vec2 {
    let span = bounds.half_extent * 2.0;
    Vec2::new(
        (rng.gen::<f32>() - 0.5) * span,
        (rng.gen::<f32>() - 0.5) * span,
    )
}

/// Random heading with each component in `[-range, range)`.
pub fn random_heading<R: Rng + ?Sized>(range: f32, rng: &mut R) -> Vec2 {
    Vec2::new(
        (rng.gen::<f32>() - 0.5) * 2.0 * range,
        (rng.gen::<f32>() - 0.5) * 2.0 * range,
    )
}

/// Join point for a new player: a small square around the world center.
pub fn player_spawn_point<R: Rng + ?Sized>(tuning: &Tuning, bounds: &Bounds, rng: &mut R) -> Vec2 {
    let spread = Bounds::from_size(tuning.player_spawn_spread);
    bounds.clamp(random_position(&spread, rng))
}

/// Builds a fresh NPC for slot `index`.
pub fn new_npc<R: Rng + ?Sized>(index: usize, tuning: &Tuning, bounds: &Bounds, rng: &mut R) -> Npc {
    let size = if tuning.npc_size_max > tuning.npc_size_min {
        rng.gen_range(tuning.npc_size_min..tuning.npc_size_max)
    } else {
        tuning.npc_size_min
    };
    Npc {
        index,
        body: Body {
            position: random_position(bounds, rng),
            size,
        },
        color: rng.gen_range(0..0x00ff_ffff),
        heading: random_heading(tuning.npc_heading_range, rng),
    }
}

/// Relocates the pellet at `index`. Returns its new position.
pub fn spawn_food<R: Rng + ?Sized>(world: &mut World, index: usize, rng: &mut R) -> Option<Vec2> {
    let bounds = world.bounds;
    let food = world.food.get_mut(index)?;
    food.position = random_position(&bounds, rng);
    Some(food.position)
}

/// Resets a consumed body: minimum size at a fresh random point anywhere.
pub fn respawn<R: Rng + ?Sized>(body: &mut Body, tuning: &Tuning, bounds: &Bounds, rng: &mut R) {
    body.size = tuning.min_size;
    body.position = random_position(bounds, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Food;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn spawn_food_moves_only_that_slot() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut world = World::new(Bounds::new(1000.0));
        world.food = (0..3)
            .map(|index| Food {
                index,
                position: Vec2::ZERO,
            })
            .collect();

        let moved = spawn_food(&mut world, 1, &mut rng).unwrap();
        assert_ne!(moved, Vec2::ZERO);
        assert_eq!(world.food[1].position, moved);
        assert_eq!(world.food[0].position, Vec2::ZERO);
        assert_eq!(world.food[2].position, Vec2::ZERO);
        assert!(spawn_food(&mut world, 3, &mut rng).is_none());
    }

    #[test]
    fn new_npc_rolls_within_its_bands() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let tuning = Tuning::default();
        let bounds = Bounds::new(1000.0);

        let npc = new_npc(7, &tuning, &bounds, &mut rng);
        assert_eq!(npc.index, 7);
        assert!(bounds.contains(npc.body.position));
        assert!(npc.body.size >= 3.0 && npc.body.size < 8.0);
        assert!(npc.heading.x.abs() <= 0.5 && npc.heading.y.abs() <= 0.5);
        assert!(npc.color < 0x00ff_ffff);
    }

    #[test]
    fn respawn_resets_to_min_size_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let bounds = Bounds::new(1000.0);
        let mut body = Body {
            position: Vec2::new(5.0, 5.0),
            size: 42.0,
        };
        respawn(&mut body, &Tuning::default(), &bounds, &mut rng);
        assert_eq!(body.size, 3.0);
        assert!(bounds.contains(body.position));
    }

    #[test]
    fn player_spawn_point_stays_near_center() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let tuning = Tuning::default();
        let bounds = Bounds::new(1000.0);
        for _ in 0..200 {
            let p = player_spawn_point(&tuning, &bounds, &mut rng);
            assert!(p.x.abs() <= 250.0 && p.y.abs() <= 250.0);
        }
    }
}
