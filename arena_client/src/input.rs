//! Input handling.
//!
//! A headless client has no keyboard, so input comes from [`Wanderer`], a
//! small bot that drifts around the arena. Sampled input becomes one
//! `PlayerInput` per client tick.

use arena_shared::{math::Vec2, net::PlayerInput, snapshot::PlayerState};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// User input state at a moment in time.
///
/// `dir` is a heading, or the absolute position the client claims when its
/// position is client-reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub dir: Vec2,
    pub dash: bool,
}

/// Turns sampled input into the payload for a tick.
pub fn build_input(input: InputState) -> PlayerInput {
    PlayerInput {
        dir: Some(input.dir),
        dash: input.dash,
    }
}

/// Random-walk input source.
pub struct Wanderer {
    rng: StdRng,
    heading: Vec2,
    /// Where this bot believes it is when it reports its own position.
    claimed: Option<Vec2>,
}

impl Wanderer {
    /// Chance per sample of picking a new heading.
    const TURN_CHANCE: f64 = 0.02;
    /// Chance per sample of dashing when big enough.
    const DASH_CHANCE: f64 = 0.01;
    /// Distance moved per sample when reporting positions.
    const STEP: f32 = 2.0;

    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let heading = Self::pick_heading(&mut rng);
        Self {
            rng,
            heading,
            claimed: None,
        }
    }

    fn pick_heading(rng: &mut StdRng) -> Vec2 {
        Vec2::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0))
    }

    /// Samples the next input.
    ///
    /// `me` is this player's latest snapshot entry, if any. With
    /// `report_position` the returned `dir` is an absolute position kept
    /// inside `half_extent`.
    pub fn sample(
        &mut self,
        me: Option<&PlayerState>,
        report_position: bool,
        half_extent: f32,
    ) -> InputState {
        if self.rng.gen_bool(Self::TURN_CHANCE) {
            self.heading = Self::pick_heading(&mut self.rng);
        }
        let dash = me.is_some_and(|p| p.size > 4.0) && self.rng.gen_bool(Self::DASH_CHANCE);

        if !report_position {
            return InputState {
                dir: self.heading,
                dash,
            };
        }

        let base = match (self.claimed, me) {
            (Some(c), _) => c,
            (None, Some(p)) => p.position,
            (None, None) => Vec2::ZERO,
        };
        let mut next = base + self.heading * Self::STEP;
        if next.x.abs() > half_extent {
            self.heading.x = -self.heading.x;
            next.x = next.x.clamp(-half_extent, half_extent);
        }
        if next.y.abs() > half_extent {
            self.heading.y = -self.heading.y;
            next.y = next.y.clamp(-half_extent, half_extent);
        }
        self.claimed = Some(next);
        InputState { dir: next, dash }
    }

    /// Forget the claimed position, e.g. after being eaten and respawned.
    pub fn reset(&mut self) {
        self.claimed = None;
    }
}
