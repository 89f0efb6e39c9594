//! Client implementation.
//!
//! The client maintains:
//! - A reliable control stream (handshake, pellet events, death notices,
//!   consume requests), read by a background task
//! - An unreliable datagram socket (input, snapshots)
//! - Snapshot history for interpolation
//! - A local pellet table when the server streams food as events
//! - Console for user commands

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use arena_shared::{
    config::ArenaConfig,
    math::Vec2,
    net::{
        ClientId, NetMsg, PlayerInput, ReliableConn, ReliableWriter, Target, UnreliableConn,
        PROTOCOL_VERSION,
    },
    snapshot::FoodState,
};
use tokio::{net::TcpStream, sync::mpsc};
use tracing::{debug, info, warn};

use crate::{
    input::{build_input, InputState},
    interp::SnapshotBuffer,
};

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected to any server.
    Disconnected,
    /// Handshake done, playing.
    Connected,
}

/// High-level game client.
pub struct GameClient {
    pub client_id: ClientId,
    pub state: ClientState,
    /// Half the world edge, from `Welcome`.
    pub half_extent: f32,
    /// Whether the server expects this client to report its own position.
    pub trust_client: bool,

    writer: ReliableWriter,
    reliable_rx: mpsc::UnboundedReceiver<NetMsg>,
    pub unreliable: UnreliableConn,
    pub snaps: SnapshotBuffer,
    tick: u32,

    /// Pellets by slot, fed by `FoodSync`/`FoodRespawned` or by snapshots
    /// that carry food.
    pub food: BTreeMap<usize, Vec2>,
    /// How many times this player has been eaten.
    pub deaths: u32,
}

impl GameClient {
    /// Connects to a server and performs handshake.
    pub async fn connect(cfg: &ArenaConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;

        info!(server = %server_addr, name = %cfg.player_name, "Connecting to server");

        // Bind UDP first so we can tell the server where to send snapshots.
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let unreliable = UnreliableConn::connect(bind, server_addr).await?;
        let client_udp_port = unreliable.local_addr().context("udp local_addr")?.port();

        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        let mut reliable = ReliableConn::new(stream);

        reliable
            .send(&NetMsg::Hello {
                protocol: PROTOCOL_VERSION,
            })
            .await?;
        reliable.send(&NetMsg::UdpHello { client_udp_port }).await?;

        let (client_id, half_extent, trust_client) = match reliable.recv().await? {
            NetMsg::Welcome {
                client_id,
                half_extent,
                trust_client,
            } => (client_id, half_extent, trust_client),
            NetMsg::Disconnect { reason } => anyhow::bail!("server refused: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        info!(client_id = ?client_id, half_extent, trust_client, "Connected to server");

        let (mut reader, writer) = reliable.into_split();
        let (tx, reliable_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Reliable reader stopped");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client_id,
            state: ClientState::Connected,
            half_extent,
            trust_client,
            writer,
            reliable_rx,
            unreliable,
            snaps: SnapshotBuffer::new(32),
            tick: 0,
            food: BTreeMap::new(),
            deaths: 0,
        })
    }

    /// Handles every reliable message that has already arrived.
    pub fn poll_reliable(&mut self) {
        loop {
            match self.reliable_rx.try_recv() {
                Ok(msg) => self.handle_reliable_message(msg),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if self.state != ClientState::Disconnected {
                        warn!("Reliable connection closed");
                        self.state = ClientState::Disconnected;
                    }
                    break;
                }
            }
        }
    }

    /// Waits up to `timeout` for one reliable message, then drains the rest.
    ///
    /// Returns whether anything was handled.
    pub async fn wait_reliable(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.reliable_rx.recv()).await {
            Ok(Some(msg)) => {
                self.handle_reliable_message(msg);
                self.poll_reliable();
                true
            }
            Ok(None) => {
                self.state = ClientState::Disconnected;
                false
            }
            Err(_) => false,
        }
    }

    fn handle_reliable_message(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::FoodSync(all) => {
                debug!(pellets = all.len(), "Food sync");
                self.food = all.into_iter().map(|f| (f.index, f.position)).collect();
            }
            NetMsg::FoodRespawned(FoodState { index, position }) => {
                self.food.insert(index, position);
            }
            NetMsg::Dead => {
                self.deaths += 1;
                info!(client_id = ?self.client_id, deaths = self.deaths, "Eaten");
            }
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Disconnected from server");
                self.state = ClientState::Disconnected;
            }
            other => {
                debug!(?other, "Unhandled reliable message");
            }
        }
    }

    /// Advances one client tick: send the sampled input.
    pub async fn tick(&mut self, input: InputState) -> anyhow::Result<PlayerInput> {
        let payload = build_input(input);
        self.unreliable
            .send(&NetMsg::Input {
                client_id: self.client_id,
                input: payload,
            })
            .await?;
        self.tick += 1;
        Ok(payload)
    }

    /// Waits briefly for a datagram, then drains everything already queued.
    ///
    /// Every snapshot goes through the buffer so the newest one ends up last,
    /// however far the socket had fallen behind. Returns whether any new
    /// snapshot was stored.
    pub async fn recv_snapshot(&mut self) -> anyhow::Result<bool> {
        let Some(first) = self
            .unreliable
            .recv_timeout(Duration::from_millis(20))
            .await?
        else {
            return Ok(false);
        };
        let mut stored = self.handle_datagram(first);
        let mut drained = 0usize;
        while let Some(msg) = self.unreliable.try_recv()? {
            stored |= self.handle_datagram(msg);
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "Caught up on queued datagrams");
        }
        Ok(stored)
    }

    fn handle_datagram(&mut self, msg: NetMsg) -> bool {
        match msg {
            NetMsg::Snapshot(s) => {
                let food: Option<BTreeMap<usize, Vec2>> = s
                    .food
                    .as_ref()
                    .map(|all| all.iter().map(|f| (f.index, f.position)).collect());
                let stored = self.snaps.push(s);
                if let (true, Some(food)) = (stored, food) {
                    self.food = food;
                }
                stored
            }
            other => {
                debug!(?other, "Unexpected UDP message");
                false
            }
        }
    }

    /// Asks the server to let this player eat `target`.
    pub async fn request_consume(&mut self, target: Target) -> anyhow::Result<()> {
        self.writer.send(&NetMsg::Consume { target }).await
    }

    /// Tells the server we are leaving.
    pub async fn disconnect(&mut self, reason: &str) -> anyhow::Result<()> {
        if self.state == ClientState::Disconnected {
            return Ok(());
        }
        self.state = ClientState::Disconnected;
        self.writer
            .send(&NetMsg::Disconnect {
                reason: reason.to_string(),
            })
            .await
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(cmd) = tokens.first() else {
            return Ok(Vec::new());
        };

        match *cmd {
            "status" => {
                let mut out = vec![
                    format!("State: {:?}", self.state),
                    format!("Client ID: {:?}", self.client_id),
                    format!("Tick: {}", self.tick),
                    format!("Deaths: {}", self.deaths),
                    format!("Pellets known: {}", self.food.len()),
                    format!("Snapshots buffered: {}", self.snaps.len()),
                ];
                if let Some(me) = self.snaps.last_snapshot().and_then(|s| s.player(self.client_id))
                {
                    out.push(format!(
                        "Me: pos=({:.1}, {:.1}) size={:.2}",
                        me.position.x, me.position.y, me.size
                    ));
                }
                Ok(out)
            }
            "eat" => {
                let kind = tokens.get(1).copied();
                let n = tokens.get(2).map(|n| n.parse::<usize>());
                let target = match (kind, n) {
                    (Some("food"), Some(Ok(i))) => Target::Food(i),
                    (Some("npc"), Some(Ok(i))) => Target::Npc(i),
                    (Some("player"), Some(Ok(id))) => Target::Player(ClientId(id as u32)),
                    _ => return Ok(vec!["Usage: eat <food|npc|player> <n>".to_string()]),
                };
                self.request_consume(target).await?;
                Ok(vec![format!("Requested {target:?}")])
            }
            "disconnect" | "quit" | "exit" => {
                self.disconnect("client quit").await?;
                Ok(vec!["Disconnected".to_string()])
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }
}
