//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use anyhow::Context;
use arena_client::client::ClientState;
use arena_client::input::InputState;
use arena_client::GameClient;
use arena_server::server::bind_ephemeral;
use arena_shared::config::{Profile, SimConfig};
use arena_shared::math::Vec2;
use arena_shared::net::{
    decode_from_bytes, encode_to_bytes, ClientId, NetMsg, ReliableConn, Target, PROTOCOL_VERSION,
};
use tokio::net::TcpStream;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn seeded(profile: Profile, seed: u64) -> SimConfig {
    SimConfig {
        seed: Some(seed),
        ..SimConfig::profile(profile)
    }
}

/// Unit-style test: protocol messages roundtrip correctly.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let hello = NetMsg::Hello {
        protocol: PROTOCOL_VERSION,
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&hello)?)?, hello);

    let welcome = NetMsg::Welcome {
        client_id: ClientId(1),
        half_extent: 1000.0,
        trust_client: true,
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&welcome)?)?, welcome);

    let consume = NetMsg::Consume {
        target: Target::Npc(4),
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&consume)?)?, consume);

    Ok(())
}

/// Full integration: spawn server, connect client, exchange input/snapshots.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_server_full_roundtrip() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, cfg) = bind_ephemeral(seeded(Profile::Arena, 21)).await?;

    // Accepting happens on its own task; the tick loop only needs to run.
    let server_handle = tokio::spawn(async move {
        server.run_for_ticks(90).await?;
        Ok::<_, anyhow::Error>(server)
    });

    let mut client = GameClient::connect(&cfg).await?;
    assert!(!client.trust_client);
    assert_eq!(client.half_extent, 1000.0);

    let mut seen_self = 0;
    for _ in 0..60 {
        client
            .tick(InputState {
                dir: Vec2::new(1.0, 0.0),
                dash: false,
            })
            .await?;
        if client.recv_snapshot().await? {
            let snap = client.snaps.last_snapshot().context("snapshot just stored")?;
            if snap.player(client.client_id).is_some() {
                seen_self += 1;
            }
        }
        if seen_self >= 3 {
            break;
        }
    }
    assert!(seen_self >= 3, "expected snapshots containing our player");

    let snap = client.snaps.last_snapshot().context("no snapshot")?;
    assert_eq!(snap.npcs.len(), 20);
    assert_eq!(snap.food.as_ref().map(Vec::len), Some(300));
    assert!(client
        .snaps
        .interp_player(client.client_id, 0.5)
        .is_some());

    client.disconnect("test done").await?;
    assert_eq!(client.state, ClientState::Disconnected);

    let server = server_handle.await??;
    assert_eq!(server.sim().tick_count(), 90);
    assert_eq!(server.client_count(), 0, "leave processed");
    assert!(server.sim().world().players.is_empty());

    Ok(())
}

/// Food-event mode: a full pellet sync on join, then one event per eaten pellet.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relay_syncs_food_and_streams_respawns() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, cfg) = bind_ephemeral(seeded(Profile::Relay, 33)).await?;
    let server_handle = tokio::spawn(async move {
        server.run_for_ticks(80).await?;
        Ok::<_, anyhow::Error>(server)
    });

    let mut client = GameClient::connect(&cfg).await?;
    assert!(client.trust_client);

    while client.food.is_empty() {
        anyhow::ensure!(
            client.wait_reliable(Duration::from_secs(2)).await,
            "no FoodSync after join"
        );
    }
    assert_eq!(client.food.len(), 300);

    // Report our position right on top of pellet 0.
    let target = client.food[&0];
    let mut moved = false;
    for _ in 0..60 {
        client
            .tick(InputState {
                dir: target,
                dash: false,
            })
            .await?;
        client.recv_snapshot().await?;
        client.poll_reliable();
        if client.food[&0] != target {
            moved = true;
            break;
        }
    }
    assert!(moved, "pellet 0 should have been eaten and relocated");
    assert_eq!(client.food.len(), 300);

    if let Some(snap) = client.snaps.last_snapshot() {
        assert!(snap.food.is_none(), "relay snapshots carry no food");
    }

    client.disconnect("test done").await?;
    server_handle.await??;
    Ok(())
}

/// A client speaking another protocol version is refused with a reason.
#[tokio::test]
async fn protocol_mismatch_is_refused() -> anyhow::Result<()> {
    init_tracing();

    let (mut server, cfg) = bind_ephemeral(seeded(Profile::Classic, 1)).await?;
    let stream = TcpStream::connect(cfg.server_addr.as_str()).await?;
    let mut conn = ReliableConn::new(stream);
    conn.send(&NetMsg::Hello {
        protocol: PROTOCOL_VERSION + 1,
    })
    .await?;

    match conn.recv().await? {
        NetMsg::Disconnect { reason } => assert!(reason.contains("unsupported")),
        other => panic!("expected Disconnect, got {other:?}"),
    }

    server.step().await?;
    assert_eq!(server.client_count(), 0);
    Ok(())
}

/// A client that fell behind the broadcast catches up to the newest snapshot
/// in one receive.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backlogged_snapshots_are_drained_to_the_newest() -> anyhow::Result<()> {
    init_tracing();

    let sim = SimConfig {
        food_count: 10,
        ..seeded(Profile::Classic, 5)
    };
    let (mut server, cfg) = bind_ephemeral(sim).await?;
    let mut client = GameClient::connect(&cfg).await?;

    for _ in 0..100 {
        if server.client_count() == 1 {
            break;
        }
        server.step().await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::ensure!(server.client_count() == 1, "join never reached the tick");

    // Several broadcasts land before the client looks at its socket.
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.step().await?;
    }

    assert!(client.recv_snapshot().await?);
    let newest = client.snaps.last_snapshot().context("no snapshot")?;
    assert_eq!(newest.tick, server.sim().tick_count());
    assert!(client.snaps.len() >= 6, "only {} buffered", client.snaps.len());
    assert!(!client.recv_snapshot().await?, "backlog should be empty");
    Ok(())
}
