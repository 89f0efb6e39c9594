//! Headless soak runner.
//!
//! Drives every profile's simulation for many ticks with bot players and
//! checks the world invariants after each tick:
//! - pool sizes never change
//! - every body stays inside the bounds with a finite position
//! - no size drops below the minimum
//!
//! Usage:
//!   cargo run -p arena_tests --bin soak_runner -- [--ticks 20000] [--players 12] [--seed 7]

use std::time::Instant;

use anyhow::Context;
use arena_client::input::{build_input, Wanderer};
use arena_shared::{
    config::{Profile, SimConfig},
    net::ClientId,
    sim::{GatewayEvent, Simulation},
    world::{Millis, World},
};
use tracing::info;

struct Args {
    ticks: u64,
    players: u32,
    seed: u64,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut out = Args {
        ticks: 20_000,
        players: 12,
        seed: 7,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--ticks", Some(v)) => out.ticks = v.parse().context("--ticks")?,
            ("--players", Some(v)) => out.players = v.parse().context("--players")?,
            ("--seed", Some(v)) => out.seed = v.parse().context("--seed")?,
            (flag, _) => anyhow::bail!("unknown or incomplete argument: {flag}"),
        }
        i += 2;
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct SoakStats {
    food_eaten: usize,
    entities_eaten: usize,
    deaths: usize,
    food_events: usize,
    max_size: f32,
}

fn check_world(world: &World, cfg: &SimConfig, tick: u64) -> anyhow::Result<()> {
    anyhow::ensure!(
        world.food.len() == cfg.food_count,
        "tick {tick}: food pool is {} not {}",
        world.food.len(),
        cfg.food_count
    );
    anyhow::ensure!(
        world.npcs.len() == cfg.active_npcs(),
        "tick {tick}: npc pool is {} not {}",
        world.npcs.len(),
        cfg.active_npcs()
    );

    let bodies = world
        .players
        .values()
        .map(|p| p.body)
        .chain(world.npcs.iter().map(|n| n.body));
    for body in bodies {
        anyhow::ensure!(
            body.position.is_finite() && world.bounds.contains(body.position),
            "tick {tick}: body out of bounds at {:?}",
            body.position
        );
        anyhow::ensure!(
            body.size >= cfg.tuning.min_size,
            "tick {tick}: size {} below minimum",
            body.size
        );
    }
    for food in &world.food {
        anyhow::ensure!(
            world.bounds.contains(food.position),
            "tick {tick}: pellet {} out of bounds",
            food.index
        );
    }
    Ok(())
}

fn soak(profile: Profile, args: &Args) -> anyhow::Result<SoakStats> {
    let cfg = SimConfig {
        seed: Some(args.seed),
        ..SimConfig::profile(profile)
    };
    let mut sim = Simulation::new(cfg.clone());
    let step_ms = 1000 / Millis::from(cfg.tick_hz.max(1));
    let half_extent = sim.world().bounds.half_extent;
    let trust = sim.config().has(arena_shared::config::Features::TRUST_CLIENT);

    let mut bots: Vec<(ClientId, Wanderer)> = (0..args.players)
        .map(|i| (ClientId(i + 1), Wanderer::new(args.seed ^ u64::from(i))))
        .collect();
    for (id, _) in &bots {
        sim.apply(GatewayEvent::Join { client: *id }, 0);
    }

    let mut stats = SoakStats::default();
    for tick in 0..args.ticks {
        let now = tick * step_ms;
        let snap = sim.snapshot();
        for (id, bot) in &mut bots {
            let input = bot.sample(snap.player(*id), trust, half_extent);
            sim.apply(
                GatewayEvent::Input {
                    client: *id,
                    input: build_input(input),
                },
                now,
            );
        }

        let pass = sim.tick(now);
        stats.food_eaten += pass.food_eaten;
        stats.entities_eaten += pass.entities_eaten;

        for death in sim.drain_deaths() {
            stats.deaths += 1;
            if let Some((_, bot)) = bots.iter_mut().find(|(id, _)| *id == death.victim) {
                bot.reset();
            }
        }
        stats.food_events += sim.drain_food_events().len();

        check_world(sim.world(), &cfg, tick)?;
        let biggest = sim
            .world()
            .players
            .values()
            .map(|p| p.body.size)
            .fold(0.0, f32::max);
        stats.max_size = stats.max_size.max(biggest);
    }

    if cfg.has(arena_shared::config::Features::FOOD_EVENTS) {
        anyhow::ensure!(
            stats.food_events == stats.food_eaten,
            "{} pellets eaten but {} events",
            stats.food_eaten,
            stats.food_events
        );
    } else {
        anyhow::ensure!(stats.food_events == 0, "food events without FOOD_EVENTS");
    }
    Ok(stats)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    for profile in [Profile::Classic, Profile::Arena, Profile::Relay] {
        let started = Instant::now();
        let stats = soak(profile, &args).with_context(|| format!("{profile:?} soak"))?;
        info!(
            ?profile,
            ticks = args.ticks,
            players = args.players,
            food_eaten = stats.food_eaten,
            entities_eaten = stats.entities_eaten,
            deaths = stats.deaths,
            max_size = stats.max_size,
            secs = started.elapsed().as_secs_f64(),
            "Soak passed"
        );
    }
    Ok(())
}
