//! Server implementation.
//!
//! An authoritative fixed-tick server. It supports:
//! - A connection gateway: one task per TCP connection doing the handshake,
//!   forwarding consume requests and reporting disconnects
//! - UDP input and UDP snapshots
//! - A console (status, players, quit)
//!
//! Concurrency model:
//! - Connection tasks never touch the world. They push into a bounded queue
//!   that the tick loop drains at the start of every tick.
//! - The simulation, the client table and the broadcaster live on the tick
//!   loop only.
//! - Outbound traffic is fire-and-forget: each client has an unbounded queue
//!   feeding its writer task. Snapshot send failures are logged and dropped,
//!   and a snapshot too large for one datagram is reported instead of sent.

use anyhow::Context;
use arena_shared::{
    config::{ArenaConfig, Features, SimConfig},
    net::{
        encode_to_bytes, ClientId, NetMsg, ReliableConn, ReliableListener, MAX_DATAGRAM_LEN,
        PROTOCOL_VERSION,
    },
    sim::{GatewayEvent, Simulation},
    snapshot::{Broadcaster, FoodState},
    world::Millis,
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    net::UdpSocket,
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Capacity of the gateway queue between connection tasks and the tick.
const GATEWAY_QUEUE: usize = 1024;

/// Traffic from connection tasks to the tick loop.
#[derive(Debug)]
enum Inbound {
    Connected {
        client_id: ClientId,
        udp_peer: SocketAddr,
        outbound: mpsc::UnboundedSender<NetMsg>,
    },
    Gateway(GatewayEvent),
}

/// What a new connection is told in `Welcome`.
#[derive(Debug, Clone, Copy)]
struct WelcomeInfo {
    half_extent: f32,
    trust_client: bool,
}

/// Connected client state.
struct ClientState {
    udp_peer: SocketAddr,
    outbound: mpsc::UnboundedSender<NetMsg>,
}

/// Game server.
pub struct GameServer {
    pub cfg: ArenaConfig,
    sim: Simulation,
    clients: HashMap<ClientId, ClientState>,

    local_addr: SocketAddr,
    udp: UdpSocket,

    inbound_rx: mpsc::Receiver<Inbound>,
    broadcaster: Broadcaster,
    started: Instant,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
    shutdown: bool,
    /// Set after an oversized snapshot was reported, until one fits again.
    oversize_warned: bool,
}

impl GameServer {
    /// Binds TCP and UDP on the configured address and starts accepting.
    ///
    /// Port 0 picks an ephemeral TCP port; UDP then binds the same port.
    pub async fn bind(cfg: ArenaConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let udp = UdpSocket::bind(local_addr).await.context("udp bind")?;

        let sim = Simulation::new(cfg.sim.clone());
        let welcome = WelcomeInfo {
            half_extent: sim.world().bounds.half_extent,
            trust_client: cfg.sim.has(Features::TRUST_CLIENT),
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(GATEWAY_QUEUE);
        tokio::spawn(accept_loop(listener, inbound_tx, welcome));

        Ok(Self {
            broadcaster: Broadcaster::new(cfg.sim.broadcast_interval_ms()),
            cfg,
            sim,
            clients: HashMap::new(),
            local_addr,
            udp,
            inbound_rx,
            started: Instant::now(),
            console_rx: None,
            shutdown: false,
            oversize_warned: false,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the bound address (TCP and UDP share it).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Milliseconds since the server started; the simulation clock.
    fn now_ms(&self) -> Millis {
        self.started.elapsed().as_millis() as Millis
    }

    /// Runs the fixed-tick loop until `quit`.
    ///
    /// Missed ticks are skipped, never replayed.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let period = self.sim.config().tick_interval();
        let budget = period.mul_f64(0.9);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.shutdown {
            ticker.tick().await;
            let began = Instant::now();
            self.step().await?;
            let took = began.elapsed();
            if took > budget {
                warn!(
                    tick = self.sim.tick_count(),
                    took_ms = took.as_secs_f64() * 1000.0,
                    "Tick over budget"
                );
            }
        }
        info!("Server loop stopped");
        Ok(())
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.sim.config().tick_interval();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step().await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one tick: gateway traffic, simulation, outbound fan-out.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        self.process_console_commands();
        let now = self.now_ms();
        self.drain_inbound(now);
        self.recv_inputs(now)?;

        let stats = self.sim.tick(now);
        if stats.entities_eaten > 0 {
            debug!(tick = self.sim.tick_count(), eaten = stats.entities_eaten, "Predation");
        }

        self.dispatch_events();
        if self.broadcaster.due(now) {
            self.send_snapshots().await?;
        }
        Ok(())
    }

    fn process_console_commands(&mut self) {
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(cmd) = tokens.first() else {
            return Vec::new();
        };

        match *cmd {
            "status" => {
                let world = self.sim.world();
                vec![
                    format!("Tick: {}", self.sim.tick_count()),
                    format!("Features: {:?}", self.sim.config().features),
                    format!("Clients: {}", self.clients.len()),
                    format!(
                        "Entities: {} players, {} npcs, {} food",
                        world.players.len(),
                        world.npcs.len(),
                        world.food.len()
                    ),
                ]
            }
            "players" => self
                .sim
                .world()
                .players
                .values()
                .map(|p| {
                    format!(
                        "  {:?}: pos=({:.1}, {:.1}) size={:.2} source={:?}",
                        p.id, p.body.position.x, p.body.position.y, p.body.size, p.source
                    )
                })
                .collect(),
            "quit" | "exit" => {
                info!("Server shutting down");
                for c in self.clients.values() {
                    let _ = c.outbound.send(NetMsg::Disconnect {
                        reason: "server shutting down".to_string(),
                    });
                }
                self.shutdown = true;
                vec!["Shutting down".to_string()]
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    fn drain_inbound(&mut self, now: Millis) {
        while let Ok(msg) = self.inbound_rx.try_recv() {
            match msg {
                Inbound::Connected {
                    client_id,
                    udp_peer,
                    outbound,
                } => {
                    if self.sim.config().has(Features::FOOD_EVENTS) {
                        let _ = outbound.send(NetMsg::FoodSync(self.sim.food_state()));
                    }
                    self.clients.insert(client_id, ClientState { udp_peer, outbound });
                    self.sim.apply(GatewayEvent::Join { client: client_id }, now);
                }
                Inbound::Gateway(event) => {
                    if let GatewayEvent::Leave { client } = &event {
                        self.clients.remove(client);
                    }
                    self.sim.apply(event, now);
                }
            }
        }
    }

    /// Drains pending input datagrams without blocking.
    fn recv_inputs(&mut self, now: Millis) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match self.udp.try_recv_from(&mut buf) {
                Ok((n, from)) => match serde_json::from_slice::<NetMsg>(&buf[..n]) {
                    Ok(NetMsg::Input { client_id, input }) => {
                        let Some(c) = self.clients.get_mut(&client_id) else {
                            debug!(client_id = ?client_id, %from, "Input from unknown client");
                            continue;
                        };
                        c.udp_peer = from;
                        self.sim
                            .apply(GatewayEvent::Input { client: client_id, input }, now);
                    }
                    Ok(other) => debug!(?other, "Unexpected UDP message"),
                    Err(e) => debug!(%from, error = %e, "Malformed datagram"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(())
    }

    fn dispatch_events(&mut self) {
        for death in self.sim.drain_deaths() {
            if let Some(c) = self.clients.get(&death.victim) {
                let _ = c.outbound.send(NetMsg::Dead);
            }
        }

        let food = self.sim.drain_food_events();
        for ev in food {
            let msg = NetMsg::FoodRespawned(FoodState {
                index: ev.index,
                position: ev.position,
            });
            for c in self.clients.values() {
                let _ = c.outbound.send(msg.clone());
            }
        }
    }

    /// Serializes the current snapshot, or `None` if it cannot fit a datagram.
    fn snapshot_payload(&mut self) -> anyhow::Result<Option<Bytes>> {
        let payload = encode_to_bytes(&NetMsg::Snapshot(self.sim.snapshot()))
            .context("serialize snapshot")?;
        if payload.len() <= MAX_DATAGRAM_LEN {
            self.oversize_warned = false;
            return Ok(Some(payload));
        }
        if !self.oversize_warned {
            warn!(
                bytes = payload.len(),
                limit = MAX_DATAGRAM_LEN,
                players = self.sim.world().players.len(),
                "Snapshot exceeds datagram size, not sent"
            );
            self.oversize_warned = true;
        } else {
            debug!(bytes = payload.len(), "Snapshot still oversized");
        }
        Ok(None)
    }

    async fn send_snapshots(&mut self) -> anyhow::Result<()> {
        if self.clients.is_empty() {
            return Ok(());
        }
        let Some(payload) = self.snapshot_payload()? else {
            return Ok(());
        };

        for (id, c) in &self.clients {
            if let Err(e) = self.udp.send_to(&payload, c.udp_peer).await {
                debug!(client_id = ?id, udp_peer = %c.udp_peer, error = %e, "Snapshot send failed");
            }
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: ReliableListener,
    inbound: mpsc::Sender<Inbound>,
    welcome: WelcomeInfo,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = inbound.closed() => break,
        };
        match accepted {
            Ok((conn, peer)) => {
                let inbound = inbound.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(conn, peer, inbound, welcome).await {
                        warn!(%peer, error = %e, "Connection ended with error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
    debug!("Accept loop stopped");
}

/// Handshake, then relay the connection's control traffic into the gateway queue.
async fn serve_connection(
    mut conn: ReliableConn,
    peer: SocketAddr,
    inbound: mpsc::Sender<Inbound>,
    welcome: WelcomeInfo,
) -> anyhow::Result<()> {
    let (client_id, udp_peer) = handshake(&mut conn, peer, welcome).await?;

    let (mut reader, mut writer) = conn.into_split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<NetMsg>();
    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = writer.send(&msg).await {
                debug!(client_id = ?client_id, error = %e, "Writer closed");
                break;
            }
        }
    });

    inbound
        .send(Inbound::Connected {
            client_id,
            udp_peer,
            outbound,
        })
        .await
        .context("gateway queue closed")?;
    info!(client_id = ?client_id, %udp_peer, "Client connected");

    loop {
        let event = match reader.recv().await {
            Ok(NetMsg::Consume { target }) => GatewayEvent::Consume {
                client: client_id,
                target,
            },
            Ok(NetMsg::Input { input, .. }) => GatewayEvent::Input {
                client: client_id,
                input,
            },
            Ok(NetMsg::Disconnect { reason }) => {
                info!(client_id = ?client_id, reason = %reason, "Client disconnected");
                break;
            }
            Ok(other) => {
                debug!(client_id = ?client_id, ?other, "Unexpected reliable message");
                continue;
            }
            Err(e) => {
                debug!(client_id = ?client_id, error = %e, "Connection closed");
                break;
            }
        };
        if inbound.send(Inbound::Gateway(event)).await.is_err() {
            return Ok(());
        }
    }

    let _ = inbound
        .send(Inbound::Gateway(GatewayEvent::Leave { client: client_id }))
        .await;
    Ok(())
}

async fn handshake(
    conn: &mut ReliableConn,
    peer: SocketAddr,
    welcome: WelcomeInfo,
) -> anyhow::Result<(ClientId, SocketAddr)> {
    match conn.recv().await? {
        NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
        NetMsg::Hello { protocol } => {
            let _ = conn
                .send(&NetMsg::Disconnect {
                    reason: format!("protocol {protocol} unsupported, expected {PROTOCOL_VERSION}"),
                })
                .await;
            anyhow::bail!("client protocol {protocol} unsupported");
        }
        other => anyhow::bail!("unexpected handshake msg: {other:?}"),
    }

    let client_udp_port = match conn.recv().await? {
        NetMsg::UdpHello { client_udp_port } => client_udp_port,
        other => anyhow::bail!("expected UdpHello, got {other:?}"),
    };

    let client_id = ClientId::new_unique();
    conn.send(&NetMsg::Welcome {
        client_id,
        half_extent: welcome.half_extent,
        trust_client: welcome.trust_client,
    })
    .await?;

    Ok((client_id, SocketAddr::new(peer.ip(), client_udp_port)))
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(sim: SimConfig) -> anyhow::Result<(GameServer, ArenaConfig)> {
    let mut cfg = ArenaConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        sim,
        ..Default::default()
    };
    let server = GameServer::bind(cfg.clone()).await?;
    cfg.server_addr = server.local_addr().to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{config::Profile, math::Vec2, world::Food};

    fn seeded(profile: Profile) -> SimConfig {
        SimConfig {
            seed: Some(5),
            ..SimConfig::profile(profile)
        }
    }

    #[tokio::test]
    async fn ticks_without_clients() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(seeded(Profile::Arena)).await?;
        assert_ne!(cfg.server_addr, "127.0.0.1:0");
        for _ in 0..5 {
            server.step().await?;
        }
        assert_eq!(server.sim().tick_count(), 5);
        assert_eq!(server.client_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_snapshot_is_reported_not_sent() -> anyhow::Result<()> {
        let (mut server, _) = bind_ephemeral(seeded(Profile::Classic)).await?;
        assert!(server.snapshot_payload()?.is_some());
        assert!(!server.oversize_warned);

        // Grow the pool behind the config's back, past what a datagram holds.
        let world = server.sim.world_mut();
        let extra = world.food.len()..2_000;
        world.food.extend(extra.map(|index| Food {
            index,
            position: Vec2::new(-123.456_78, 987.654_3),
        }));
        assert!(server.snapshot_payload()?.is_none());
        assert!(server.oversize_warned);

        server.sim.world_mut().food.truncate(300);
        assert!(server.snapshot_payload()?.is_some());
        assert!(!server.oversize_warned);
        Ok(())
    }

    #[tokio::test]
    async fn console_status_and_quit() -> anyhow::Result<()> {
        let (mut server, _) = bind_ephemeral(seeded(Profile::Classic)).await?;
        let status = server.exec_console("status");
        assert!(status.iter().any(|l| l == "Clients: 0"));
        assert!(status.iter().any(|l| l.contains("0 npcs, 300 food")));
        assert!(server.exec_console("   ").is_empty());
        assert_eq!(server.exec_console("bogus"), vec!["Unknown command: bogus"]);

        server.exec_console("quit");
        // The loop sees the flag before waiting on the first tick.
        server.run().await?;
        Ok(())
    }
}
