//! Dash ability.
//!
//! A dash multiplies a player's speed for a short window and costs size. Both
//! timers are absolute timestamps compared against the tick time, so uneven
//! tick spacing never stretches or shortens a dash.

use tracing::debug;

use crate::{
    config::Tuning,
    world::{DashState, Millis, Player},
};

/// Whether the dash window covers `now`.
pub fn dash_active(dash: &DashState, now: Millis) -> bool {
    now < dash.active_until
}

/// Activates a dash if the cooldown has elapsed and the player is big enough.
///
/// Returns whether the dash was granted. Refusals are silent by contract.
pub fn try_dash(player: &mut Player, tuning: &Tuning, now: Millis) -> bool {
    if now <= player.dash.ready_at || player.body.size <= tuning.dash_min_size {
        return false;
    }
    player.dash = DashState {
        active_until: now + tuning.dash_duration_ms,
        ready_at: now + tuning.dash_cooldown_ms,
    };
    player.body.size = (player.body.size - tuning.dash_cost).max(tuning.min_size);
    debug!(client_id = ?player.id, until = player.dash.active_until, "Dash granted");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::Vec2,
        net::ClientId,
        world::{Body, PositionSource},
    };

    fn player(size: f32) -> Player {
        Player {
            id: ClientId(1),
            body: Body {
                position: Vec2::ZERO,
                size,
            },
            color: 0,
            source: PositionSource::Integrated,
            input: Vec2::new(1.0, 0.0),
            dash: DashState::default(),
        }
    }

    #[test]
    fn dash_sets_timers_and_costs_size() {
        let tuning = Tuning::default();
        let mut p = player(10.0);
        assert!(try_dash(&mut p, &tuning, 1_000));
        assert_eq!(p.dash.active_until, 1_500);
        assert_eq!(p.dash.ready_at, 4_000);
        assert_eq!(p.body.size, 9.0);
        assert!(dash_active(&p.dash, 1_499));
        assert!(!dash_active(&p.dash, 1_500));
    }

    #[test]
    fn small_players_cannot_dash() {
        let mut p = player(4.0);
        assert!(!try_dash(&mut p, &Tuning::default(), 1_000));
        assert_eq!(p.body.size, 4.0);
        assert_eq!(p.dash, DashState::default());
    }

    #[test]
    fn cooldown_blocks_repeated_requests() {
        let tuning = Tuning::default();
        let mut p = player(20.0);
        assert!(try_dash(&mut p, &tuning, 1_000));
        for now in (1_000..=4_000).step_by(100) {
            assert!(!try_dash(&mut p, &tuning, now), "re-dashed at {now}");
        }
        assert_eq!(p.body.size, 19.0);
        assert!(try_dash(&mut p, &tuning, 4_001));
        assert_eq!(p.body.size, 18.0);
    }
}
