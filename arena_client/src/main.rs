//! Standalone headless client.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40000] [--name bot] [--seed 1]
//!       [--hz 60] [--ticks 600]
//!
//! The client connects, drives its player with a wandering bot and logs what
//! it sees. Without `--ticks` it runs until `quit` or the server goes away.
//!
//! Console commands:
//!   status                      - Show client status
//!   eat <food|npc|player> <n>   - Ask to consume a target
//!   quit                        - Disconnect and exit

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use arena_client::client::{ClientState, GameClient};
use arena_client::input::Wanderer;
use arena_shared::config::ArenaConfig;
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    cfg: ArenaConfig,
    seed: u64,
    hz: u32,
    ticks: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut out = Args {
        cfg: ArenaConfig::default(),
        seed: 1,
        hz: 60,
        ticks: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--addr", Some(addr)) => out.cfg.server_addr = addr.clone(),
            ("--name", Some(name)) => out.cfg.player_name = name.clone(),
            ("--seed", Some(seed)) => out.seed = seed.parse().context("--seed")?,
            ("--hz", Some(hz)) => out.hz = hz.parse().context("--hz")?,
            ("--ticks", Some(n)) => out.ticks = Some(n.parse().context("--ticks")?),
            (flag, _) => anyhow::bail!("unknown or incomplete argument: {flag}"),
        }
        i += 2;
    }
    anyhow::ensure!(out.hz > 0, "--hz must be positive");
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    info!(server = %args.cfg.server_addr, seed = args.seed, "Starting client");

    let mut client = GameClient::connect(&args.cfg).await.context("connect")?;
    let mut bot = Wanderer::new(args.seed);

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

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

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let tick_interval = Duration::from_secs_f64(1.0 / f64::from(args.hz));
    let mut ticks = 0u64;
    let mut deaths_seen = 0;

    loop {
        while let Ok(line) = console_rx.try_recv() {
            match client.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{line}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }

        client.poll_reliable();
        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }
        if client.deaths != deaths_seen {
            deaths_seen = client.deaths;
            bot.reset();
        }

        let me = client
            .snaps
            .last_snapshot()
            .and_then(|s| s.player(client.client_id))
            .cloned();
        let input = bot.sample(me.as_ref(), client.trust_client, client.half_extent);
        client.tick(input).await?;
        client.recv_snapshot().await?;

        if let Some(snap) = client.snaps.last_snapshot() {
            if snap.tick % 120 == 0 {
                info!(
                    tick = snap.tick,
                    players = snap.players.len(),
                    npcs = snap.npcs.len(),
                    size = me.map(|p| p.size),
                    "Snapshot"
                );
            }
        }

        ticks += 1;
        if args.ticks.is_some_and(|limit| ticks >= limit) {
            client.disconnect("done").await?;
            break;
        }
        tokio::time::sleep(tick_interval).await;
    }

    Ok(())
}
