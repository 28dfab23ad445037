//! Session layer (spec §4.10, §5): the WebSocket transport, the
//! connection<->player bijection, and the fixed-rate tick scheduler.
//!
//! The `World` lives entirely inside [`run_tick_loop`] — no other task
//! ever touches it. Connection tasks only ever talk to the tick loop
//! through the `inbound` channel and the `snapshot` broadcast channel,
//! which is what gives us spec §5's guarantee that inbound messages are
//! applied "only during the input-drain phase of a tick ... never
//! interleaved with the simulation body": the drain loop at the top of
//! [`run_tick_loop`] *is* that phase, and nothing else can reach the
//! world in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use protocol::{ActionKind, ClientMessage, InputPayload, ProtocolError, ServerMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::config::Config;
use crate::world::World;

#[inline]
fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// A decoded client message, or a connection lifecycle event, queued
/// for the next tick's input-drain phase.
enum Inbound {
    Connect { name: String, reply: oneshot::Sender<(u32, protocol::InitConfig)> },
    Disconnect { player_id: u32 },
    Input { player_id: u32, payload: InputPayload },
    Action { player_id: u32, action: ActionKind },
    SetName { player_id: u32, name: String },
}

/// Bind the listener, start the tick loop, and accept connections
/// until the listening socket errors (spec §7: "unrecoverable I/O
/// errors on the listening socket" are the one error that aborts the
/// process).
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "arena server listening");

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();
    let (snapshot_tx, _) = broadcast::channel::<Arc<ServerMessage>>(4);

    let tick_hz = config.server.tick_hz.max(1);
    let world = World::new(config.world.width, config.world.height, config.world.instant_merge, config.tuning.clone());
    let population = config.population.clone();
    let loop_snapshot_tx = snapshot_tx.clone();
    tokio::spawn(run_tick_loop(world, population, tick_hz, inbound_rx, loop_snapshot_tx));

    loop {
        let (stream, peer) = listener.accept().await?;
        let inbound_tx = inbound_tx.clone();
        let snapshot_rx = snapshot_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, inbound_tx, snapshot_rx).await {
                warn!(%peer, error = %e, "connection ended");
            }
        });
    }
}

/// The single-threaded cooperative tick scheduler (spec §5): one
/// `World`, one task, fired every `1/tick_hz` seconds with no
/// suspension point inside the pipeline body itself.
async fn run_tick_loop(
    mut world: World,
    population: crate::config::PopulationConfig,
    tick_hz: u32,
    mut inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    snapshot_tx: broadcast::Sender<Arc<ServerMessage>>,
) {
    let mut ticker = interval(Duration::from_secs_f64(1.0 / tick_hz as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let now = now_ms();

        // Input-drain phase: apply everything queued since the last
        // tick before the pipeline body runs (spec §5).
        while let Ok(msg) = inbound_rx.try_recv() {
            match msg {
                Inbound::Connect { name, reply } => {
                    let player_id = world.join_player(name, false, now);
                    let _ = reply.send((player_id, world.init_config()));
                }
                Inbound::Disconnect { player_id } => world.remove_player(player_id),
                Inbound::Input { player_id, payload } => {
                    world.apply_input(player_id, payload.dir_x, payload.dir_y, payload.cursor_x, payload.cursor_y);
                }
                Inbound::Action { player_id, action } => world.handle_action(player_id, action, now),
                Inbound::SetName { player_id, name } => world.set_name(player_id, &name),
            }
        }

        world.tick(now, &population);

        let snapshot = ServerMessage::Snapshot {
            timestamp: now,
            players: world.players_snapshot(),
            pellets: world.pellets_snapshot(),
            viruses: world.viruses_snapshot(),
            feed_pellets: world.feed_pellets_snapshot(),
            virus_projectiles: world.virus_projectiles_snapshot(),
        };
        // No receivers yet (server just started, or every client
        // dropped) is not an error; the snapshot is simply discarded.
        let _ = snapshot_tx.send(Arc::new(snapshot));
    }
}

/// Handle one WebSocket connection end to end: join, relay inbound
/// messages to the tick loop, relay outbound snapshots to the socket,
/// and leave on transport error or clean close (spec §4.10, §7).
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    mut snapshot_rx: broadcast::Receiver<Arc<ServerMessage>>,
) -> anyhow::Result<()> {
    let ws = accept_async(stream).await?;
    info!(%peer, "connection established");
    let (mut write, mut read) = ws.split();

    let (reply_tx, reply_rx) = oneshot::channel();
    inbound_tx
        .send(Inbound::Connect { name: String::new(), reply: reply_tx })
        .map_err(|_| anyhow::anyhow!("tick loop is gone"))?;
    let (player_id, init_config) = reply_rx.await?;

    let init = ServerMessage::Init { player_id, config: init_config };
    write.send(Message::Text(serde_json::to_string(&init)?.into())).await?;

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(&text, player_id, &inbound_tx, &mut write, peer).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "transport error");
                        break;
                    }
                    _ => {}
                }
            }
            broadcast_msg = snapshot_rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        let json = serde_json::to_string(msg.as_ref())?;
                        if write.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // A slow reader lagging behind the broadcast buffer just
                    // catches up on the next snapshot; it never drops the
                    // connection (spec §7: no retry/abort for soft timeouts).
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    let _ = inbound_tx.send(Inbound::Disconnect { player_id });
    info!(%peer, player_id, "connection closed");
    Ok(())
}

/// Decode one inbound text frame and either forward it to the tick
/// loop or, for `ping`, reply directly (spec §7 malformed-message
/// handling: parse failures are logged and dropped, the connection
/// stays open).
async fn handle_client_text(
    text: &str,
    player_id: u32,
    inbound_tx: &mpsc::UnboundedSender<Inbound>,
    write: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    peer: SocketAddr,
) -> anyhow::Result<()> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Input { input }) => {
            let _ = inbound_tx.send(Inbound::Input { player_id, payload: input });
        }
        Ok(ClientMessage::Action { action }) => {
            let _ = inbound_tx.send(Inbound::Action { player_id, action: action.kind });
        }
        Ok(ClientMessage::SetName { name }) => {
            let _ = inbound_tx.send(Inbound::SetName { player_id, name });
        }
        Ok(ClientMessage::Ping { timestamp }) => {
            let pong = ServerMessage::Pong { timestamp };
            let json = serde_json::to_string(&pong)?;
            write.send(Message::Text(json.into())).await?;
        }
        Err(e) => {
            let err = ProtocolError::from(e);
            warn!(%peer, error = %err, "malformed client message, dropping it");
        }
    }
    Ok(())
}
