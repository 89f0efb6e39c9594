//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config arena.json] [--profile arena]
//!       [--addr 127.0.0.1:40000] [--tick-hz 60] [--broadcast-hz 60] [--seed 7]
//!
//! Flags apply left to right; `--config` and `--profile` replace the
//! simulation settings wholesale, so put them before the rate flags.
//!
//! Console commands:
//!   status         - Show server status
//!   players        - List players
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_server::GameServer;
use arena_shared::config::{ArenaConfig, Profile, SimConfig};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let mut cfg = ArenaConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config", Some(path)) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {path}"))?;
                cfg = ArenaConfig::from_json_str(&raw)
                    .with_context(|| format!("parse config {path}"))?;
            }
            ("--profile", Some(name)) => {
                let profile: Profile = name.parse()?;
                let seed = cfg.sim.seed;
                cfg.sim = SimConfig {
                    seed,
                    ..SimConfig::profile(profile)
                };
            }
            ("--addr", Some(addr)) => cfg.server_addr = addr.clone(),
            ("--tick-hz", Some(hz)) => {
                cfg.sim.tick_hz = hz.parse().context("--tick-hz")?;
            }
            ("--broadcast-hz", Some(hz)) => {
                cfg.sim.broadcast_hz = hz.parse().context("--broadcast-hz")?;
            }
            ("--seed", Some(seed)) => {
                cfg.sim.seed = Some(seed.parse().context("--seed")?);
            }
            (flag, _) => anyhow::bail!("unknown or incomplete argument: {flag}"),
        }
        i += 2;
    }
    anyhow::ensure!(cfg.sim.tick_hz > 0, "--tick-hz must be positive");
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.sim.tick_hz,
        broadcast_hz = cfg.sim.broadcast_hz,
        features = ?cfg.sim.features,
        "Starting server"
    );

    let mut server = GameServer::bind(cfg).await.context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'players' for the roster, 'quit' to exit.");
    println!();

    server.run().await
}
