//! Simulation facade.
//!
//! `Simulation` owns the registry, the RNG and the pending output events. It
//! is single-threaded by construction: the server hands gateway traffic to it
//! as [`GatewayEvent`]s drained at tick start, then calls [`Simulation::tick`].
//!
//! Tick pipeline, in order:
//! 1. NPC controller (when NPCs are enabled)
//! 2. movement integrator
//! 3. collision resolver
//!
//! Gateway operations only write input fields, insert or remove players, or
//! run a server-validated consume request. They never fail the tick.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    ability,
    collision::{self, Outcome, PassStats},
    config::{Features, SimConfig},
    event::{EventBus, FoodRespawned, PlayerDied},
    math::Vec2,
    movement, npc,
    net::{ClientId, PlayerInput, Target},
    snapshot::{self, FoodState, WorldSnapshot},
    world::{EntityRef, Millis, PositionSource, World},
};

/// Why a gateway request was ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("no player for client {0:?}")]
    UnknownPlayer(ClientId),
    #[error("non-finite coordinates from client {0:?}")]
    NonFinite(ClientId),
}

/// One unit of gateway traffic, queued outside the tick and applied inside it.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Join { client: ClientId },
    Input { client: ClientId, input: PlayerInput },
    Consume { client: ClientId, target: Target },
    Leave { client: ClientId },
}

/// The authoritative simulation.
pub struct Simulation {
    cfg: SimConfig,
    world: World,
    rng: ChaCha8Rng,
    events: EventBus,
    tick: u64,
}

impl Simulation {
    /// Builds a world with full food and NPC pools.
    pub fn new(cfg: SimConfig) -> Self {
        let cfg = cfg.normalized();
        let mut rng = match cfg.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let world = World::populate(&cfg, &mut rng);
        info!(
            food = world.food.len(),
            npcs = world.npcs.len(),
            half_extent = world.bounds.half_extent,
            features = ?cfg.features,
            "World initialized"
        );
        Self {
            cfg,
            world,
            rng,
            events: EventBus::default(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable registry access for setup and tests. Do not use mid-tick.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Position source a newly joining player gets under this config.
    pub fn default_source(&self) -> PositionSource {
        if self.cfg.has(Features::TRUST_CLIENT) {
            PositionSource::ClientReported
        } else {
            PositionSource::Integrated
        }
    }

    /// Creates the player for a new connection.
    pub fn join(&mut self, client: ClientId) -> bool {
        let source = self.default_source();
        self.join_with(client, source)
    }

    /// Creates a player with an explicit position source.
    pub fn join_with(&mut self, client: ClientId, source: PositionSource) -> bool {
        let created = self
            .world
            .create_player(client, source, &self.cfg.tuning, &mut self.rng);
        if created {
            info!(client_id = ?client, ?source, players = self.world.players.len(), "Player joined");
        }
        created
    }

    /// Removes a player immediately.
    pub fn leave(&mut self, client: ClientId) -> bool {
        let removed = self.world.remove_player(client).is_some();
        if removed {
            info!(client_id = ?client, players = self.world.players.len(), "Player left");
        }
        removed
    }

    /// Records a player's latest input and handles a dash request.
    ///
    /// A missing `dir` keeps the previous input. Rejected input changes nothing.
    pub fn input(
        &mut self,
        client: ClientId,
        input: PlayerInput,
        now: Millis,
    ) -> Result<(), InputError> {
        let bounds = self.world.bounds;
        let dash_enabled = self.cfg.has(Features::DASH);
        let tuning = &self.cfg.tuning;
        let player = self
            .world
            .player_mut(client)
            .ok_or(InputError::UnknownPlayer(client))?;

        if let Some(dir) = input.dir {
            if !dir.is_finite() {
                return Err(InputError::NonFinite(client));
            }
            player.input = match player.source {
                PositionSource::Integrated => {
                    Vec2::new(dir.x.clamp(-1.0, 1.0), dir.y.clamp(-1.0, 1.0))
                }
                PositionSource::ClientReported => bounds.clamp(dir),
            };
        }

        if input.dash && dash_enabled {
            ability::try_dash(player, tuning, now);
        }
        Ok(())
    }

    /// Client-initiated, server-validated consumption.
    ///
    /// The same distance and size rules as the tick apply. Returns whether
    /// anything was eaten; unknown targets simply fail the check.
    pub fn consume(&mut self, client: ClientId, target: Target) -> Result<bool, InputError> {
        if self.world.player(client).is_none() {
            return Err(InputError::UnknownPlayer(client));
        }
        let hunter = EntityRef::Player(client);
        let mut out = Outcome {
            events: &mut self.events,
            announce_food: self.cfg.has(Features::FOOD_EVENTS),
        };
        let tuning = &self.cfg.tuning;
        let eaten = match target {
            Target::Food(index) => {
                collision::eat_food(&mut self.world, hunter, index, tuning, &mut self.rng, &mut out)
            }
            Target::Npc(index) => collision::eat_entity(
                &mut self.world,
                hunter,
                EntityRef::Npc(index),
                tuning,
                &mut self.rng,
                &mut out,
            )
            .is_some(),
            Target::Player(prey) => collision::eat_entity(
                &mut self.world,
                hunter,
                EntityRef::Player(prey),
                tuning,
                &mut self.rng,
                &mut out,
            )
            .is_some(),
        };
        Ok(eaten)
    }

    /// Applies one queued gateway event. Rejections are logged and dropped.
    pub fn apply(&mut self, event: GatewayEvent, now: Millis) {
        let result = match event {
            GatewayEvent::Join { client } => {
                self.join(client);
                Ok(())
            }
            GatewayEvent::Leave { client } => {
                self.leave(client);
                Ok(())
            }
            GatewayEvent::Input { client, input } => self.input(client, input, now),
            GatewayEvent::Consume { client, target } => self.consume(client, target).map(|_| ()),
        };
        if let Err(e) = result {
            debug!(error = %e, "Gateway request ignored");
        }
    }

    /// Runs one tick of the pipeline at wall-clock time `now`.
    pub fn tick(&mut self, now: Millis) -> PassStats {
        let tuning = &self.cfg.tuning;
        if self.cfg.has(Features::NPCS) {
            npc::wander(&mut self.world, tuning, &mut self.rng);
        }
        movement::integrate(&mut self.world, tuning, now);

        let mut out = Outcome {
            events: &mut self.events,
            announce_food: self.cfg.has(Features::FOOD_EVENTS),
        };
        let stats = collision::resolve(&mut self.world, tuning, &mut self.rng, &mut out);
        self.tick += 1;
        stats
    }

    /// Snapshot for the broadcaster; food is left out in food-event mode.
    pub fn snapshot(&self) -> WorldSnapshot {
        snapshot::capture(&self.world, self.tick, !self.cfg.has(Features::FOOD_EVENTS))
    }

    /// Every pellet, for join-time sync.
    pub fn food_state(&self) -> Vec<FoodState> {
        snapshot::food_states(&self.world)
    }

    pub fn drain_deaths(&mut self) -> Vec<PlayerDied> {
        self.events.drain::<PlayerDied>()
    }

    pub fn drain_food_events(&mut self) -> Vec<FoodRespawned> {
        self.events.drain::<FoodRespawned>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Profile,
        world::{Body, Food},
    };

    const A: ClientId = ClientId(1);
    const B: ClientId = ClientId(2);

    fn empty_sim(features: Features) -> Simulation {
        Simulation::new(SimConfig {
            food_count: 0,
            npc_count: 0,
            features,
            seed: Some(7),
            ..SimConfig::default()
        })
    }

    fn set_body(sim: &mut Simulation, id: ClientId, position: Vec2, size: f32) {
        sim.world_mut().player_mut(id).unwrap().body = Body { position, size };
    }

    #[test]
    fn food_scenario() {
        let mut sim = empty_sim(Features::empty());
        sim.world_mut().food.push(Food {
            index: 0,
            position: Vec2::ZERO,
        });
        sim.join(A);
        set_body(&mut sim, A, Vec2::new(2.0, 0.0), 3.0);

        sim.tick(0);

        assert!((sim.world().player(A).unwrap().body.size - 3.1).abs() < 1e-5);
        assert_ne!(sim.world().food[0].position, Vec2::ZERO);
        // Not in food-event mode: no announcements pile up.
        assert!(sim.drain_food_events().is_empty());
    }

    #[test]
    fn predation_scenario() {
        let mut sim = empty_sim(Features::empty());
        sim.join(A);
        sim.join(B);
        set_body(&mut sim, A, Vec2::ZERO, 10.0);
        set_body(&mut sim, B, Vec2::ZERO, 5.0);

        sim.tick(0);

        let a = sim.world().player(A).unwrap().body;
        let b = sim.world().player(B).unwrap().body;
        // A moved with zero heading, so only growth changes it.
        assert!((a.size - 12.0).abs() < 1e-5);
        assert_eq!(b.size, 3.0);
        assert!(sim.world().bounds.contains(b.position));
        let deaths = sim.drain_deaths();
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].victim, B);
    }

    #[test]
    fn reported_victim_stays_where_it_respawned() {
        let mut sim = empty_sim(Features::TRUST_CLIENT);
        sim.join(A);
        sim.join(B);
        let at_origin = PlayerInput {
            dir: Some(Vec2::ZERO),
            dash: false,
        };
        sim.input(A, at_origin, 0).unwrap();
        sim.input(B, at_origin, 0).unwrap();
        set_body(&mut sim, A, Vec2::ZERO, 10.0);
        set_body(&mut sim, B, Vec2::ZERO, 5.0);

        sim.tick(0);
        assert_eq!(sim.drain_deaths().len(), 1);
        let respawned = sim.world().player(B).unwrap().body.position;

        // No new input from B: it must not be copied back to the kill spot.
        sim.tick(16);
        sim.tick(33);
        assert!(sim.drain_deaths().is_empty());
        let b = sim.world().player(B).unwrap().body;
        assert_eq!(b.position, respawned);
        assert_eq!(b.size, 3.0);
        assert!((sim.world().player(A).unwrap().body.size - 12.0).abs() < 1e-5);
    }

    #[test]
    fn large_food_pool_still_fits_a_datagram() {
        use crate::net::{encode_to_bytes, NetMsg, MAX_DATAGRAM_LEN};

        let mut sim = Simulation::new(SimConfig {
            food_count: 1500,
            seed: Some(3),
            ..SimConfig::profile(Profile::Arena)
        });
        assert!(sim.config().has(Features::FOOD_EVENTS));
        for id in 1..=16 {
            sim.join(ClientId(id));
        }
        sim.tick(0);

        let snap = sim.snapshot();
        assert!(snap.food.is_none());
        let bytes = encode_to_bytes(&NetMsg::Snapshot(snap)).unwrap();
        assert!(bytes.len() < MAX_DATAGRAM_LEN, "{} bytes", bytes.len());
        assert_eq!(sim.food_state().len(), 1500);
    }

    #[test]
    fn equal_size_scenario() {
        let mut sim = empty_sim(Features::empty());
        sim.join(A);
        sim.join(B);
        set_body(&mut sim, A, Vec2::ZERO, 5.0);
        set_body(&mut sim, B, Vec2::ZERO, 5.0);

        sim.tick(0);

        assert_eq!(sim.world().player(A).unwrap().body.size, 5.0);
        assert_eq!(sim.world().player(B).unwrap().body.size, 5.0);
        assert!(sim.drain_deaths().is_empty());
    }

    #[test]
    fn input_is_clamped_and_non_finite_rejected() {
        let mut sim = empty_sim(Features::empty());
        sim.join(A);

        sim.input(
            A,
            PlayerInput {
                dir: Some(Vec2::new(5.0, -0.5)),
                dash: false,
            },
            0,
        )
        .unwrap();
        assert_eq!(sim.world().player(A).unwrap().input, Vec2::new(1.0, -0.5));

        let err = sim
            .input(
                A,
                PlayerInput {
                    dir: Some(Vec2::new(f32::NAN, 0.0)),
                    dash: false,
                },
                0,
            )
            .unwrap_err();
        assert_eq!(err, InputError::NonFinite(A));
        assert_eq!(sim.world().player(A).unwrap().input, Vec2::new(1.0, -0.5));

        // Missing dir keeps the last heading.
        sim.input(A, PlayerInput::default(), 0).unwrap();
        assert_eq!(sim.world().player(A).unwrap().input, Vec2::new(1.0, -0.5));

        assert_eq!(
            sim.input(B, PlayerInput::default(), 0),
            Err(InputError::UnknownPlayer(B))
        );
    }

    #[test]
    fn dash_only_when_enabled() {
        let mut sim = empty_sim(Features::empty());
        sim.join(A);
        set_body(&mut sim, A, Vec2::ZERO, 10.0);
        let dash = PlayerInput {
            dir: None,
            dash: true,
        };
        sim.input(A, dash, 1_000).unwrap();
        assert_eq!(sim.world().player(A).unwrap().body.size, 10.0);

        let mut sim = empty_sim(Features::DASH);
        sim.join(A);
        set_body(&mut sim, A, Vec2::ZERO, 10.0);
        sim.input(A, dash, 1_000).unwrap();
        sim.input(A, dash, 1_200).unwrap();
        assert_eq!(sim.world().player(A).unwrap().body.size, 9.0);
        assert_eq!(sim.world().player(A).unwrap().dash.ready_at, 4_000);
    }

    #[test]
    fn trusted_player_follows_reported_position() {
        let mut sim = empty_sim(Features::TRUST_CLIENT);
        sim.join(A);
        assert_eq!(
            sim.world().player(A).unwrap().source,
            PositionSource::ClientReported
        );
        sim.input(
            A,
            PlayerInput {
                dir: Some(Vec2::new(-5_000.0, 40.0)),
                dash: false,
            },
            0,
        )
        .unwrap();
        sim.tick(0);
        assert_eq!(
            sim.world().player(A).unwrap().body.position,
            Vec2::new(-1000.0, 40.0)
        );
    }

    #[test]
    fn consume_is_validated_by_the_server() {
        let mut sim = empty_sim(Features::FOOD_EVENTS);
        sim.world_mut().food.push(Food {
            index: 0,
            position: Vec2::new(100.0, 100.0),
        });
        sim.join(A);
        sim.join(B);
        set_body(&mut sim, A, Vec2::ZERO, 10.0);
        set_body(&mut sim, B, Vec2::new(50.0, 0.0), 5.0);

        // Too far away for either target.
        assert_eq!(sim.consume(A, Target::Food(0)), Ok(false));
        assert_eq!(sim.consume(A, Target::Player(B)), Ok(false));
        // Out-of-range and self targets fail quietly.
        assert_eq!(sim.consume(A, Target::Food(9)), Ok(false));
        assert_eq!(sim.consume(A, Target::Npc(0)), Ok(false));
        assert_eq!(sim.consume(A, Target::Player(A)), Ok(false));

        set_body(&mut sim, B, Vec2::new(5.0, 0.0), 5.0);
        assert_eq!(sim.consume(A, Target::Player(B)), Ok(true));
        assert_eq!(sim.drain_deaths().len(), 1);

        sim.world_mut().food[0].position = Vec2::new(1.0, 1.0);
        assert_eq!(sim.consume(A, Target::Food(0)), Ok(true));
        assert_eq!(sim.drain_food_events().len(), 1);

        assert_eq!(
            sim.consume(ClientId(99), Target::Food(0)),
            Err(InputError::UnknownPlayer(ClientId(99)))
        );
    }

    #[test]
    fn leave_removes_immediately_and_is_idempotent() {
        let mut sim = empty_sim(Features::empty());
        sim.apply(GatewayEvent::Join { client: A }, 0);
        assert!(sim.world().player(A).is_some());
        sim.apply(GatewayEvent::Leave { client: A }, 0);
        assert!(sim.world().player(A).is_none());
        sim.apply(GatewayEvent::Leave { client: A }, 0);
        sim.apply(
            GatewayEvent::Input {
                client: A,
                input: PlayerInput::default(),
            },
            0,
        );
        sim.tick(0);
        assert!(sim.snapshot().players.is_empty());
    }

    #[test]
    fn pools_are_stable_over_many_ticks() {
        let mut cfg = SimConfig::profile(Profile::Arena);
        cfg.seed = Some(99);
        cfg.world_size = 200.0;
        let mut sim = Simulation::new(cfg);
        for c in 1..=8 {
            sim.join(ClientId(c));
        }
        for t in 0..2_000u64 {
            if t % 37 == 0 {
                let c = ClientId((t % 8) as u32 + 1);
                sim.apply(
                    GatewayEvent::Input {
                        client: c,
                        input: PlayerInput {
                            dir: Some(Vec2::new(1.0, -1.0)),
                            dash: true,
                        },
                    },
                    t * 16,
                );
            }
            sim.tick(t * 16);
            sim.drain_deaths();
        }
        let world = sim.world();
        assert_eq!(world.food.len(), 300);
        assert_eq!(world.npcs.len(), 20);
        for p in world.players.values() {
            assert!(p.body.size >= 3.0);
            assert!(world.bounds.contains(p.body.position));
        }
        for n in &world.npcs {
            assert!(n.body.size >= 3.0);
            assert!(world.bounds.contains(n.body.position));
        }
        assert_eq!(sim.tick_count(), 2_000);
    }

    #[test]
    fn snapshot_respects_food_events_mode() {
        let mut cfg = SimConfig::profile(Profile::Relay);
        cfg.seed = Some(3);
        let sim = Simulation::new(cfg);
        assert!(sim.snapshot().food.is_none());
        assert_eq!(sim.food_state().len(), 300);

        let sim = Simulation::new(SimConfig {
            seed: Some(3),
            ..SimConfig::profile(Profile::Classic)
        });
        assert_eq!(sim.snapshot().food.map(|f| f.len()), Some(300));
        assert!(sim.snapshot().npcs.is_empty());
    }
}
