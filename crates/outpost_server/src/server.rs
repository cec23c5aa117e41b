//! TCP transport for the authoritative side.
//!
//! Each accepted connection gets a reader task and, once it has joined, a
//! writer task fed by an unbounded queue. Readers never touch the simulation
//! except to admit a joining player (under the simulation lock); intents are
//! queued for the tick loop, which drains them without blocking.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use outpost_core::player::{Player, PlayerId, PlayerProfile};
use outpost_core::protocol::{AssignedId, ClientMessage, Intent, ServerMessage};
use outpost_core::simulation::Simulation;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::framing::{encode_message, read_frame, write_frame};

/// How long a refused connection is kept open for the peer to read why.
const LINGER: Duration = Duration::from_millis(500);

/// An encoded frame, shared by every peer it is queued for.
pub type Frame = Arc<[u8]>;

/// Reports from connection tasks to the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// An intent from a joined player. Per connection, these arrive in
    /// receipt order.
    Input {
        /// Sender.
        player: PlayerId,
        /// What they want to do.
        intent: Intent,
    },
    /// A joined player's connection closed or failed.
    Left {
        /// Departed player.
        player: PlayerId,
        /// Human readable cause.
        reason: String,
    },
}

/// Outbound queues of joined peers, by player id.
#[derive(Debug, Clone, Default)]
pub struct Peers {
    inner: Arc<Mutex<BTreeMap<PlayerId, mpsc::UnboundedSender<Frame>>>>,
}

impl Peers {
    /// Number of joined peers.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no peer has joined.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    async fn insert(&self, player: PlayerId, queue: mpsc::UnboundedSender<Frame>) {
        self.inner.lock().await.insert(player, queue);
    }

    /// Forget a peer. Dropping its queue ends its writer task. Returns
    /// whether it was present.
    pub async fn remove(&self, player: PlayerId) -> bool {
        self.inner.lock().await.remove(&player).is_some()
    }

    async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Queue `frame` for every peer except `exclude`. Returns the peers whose
    /// writer has already stopped.
    pub async fn broadcast(&self, frame: &Frame, exclude: Option<PlayerId>) -> Vec<PlayerId> {
        let peers = self.inner.lock().await;
        peers
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .filter_map(|(id, queue)| queue.send(Arc::clone(frame)).err().map(|_| *id))
            .collect()
    }
}

/// State shared by the accept loop and every connection task.
struct Shared {
    sim: Arc<Mutex<Simulation>>,
    peers: Peers,
    inbound: mpsc::UnboundedSender<Inbound>,
    max_remote: usize,
    shutdown: watch::Receiver<bool>,
}

/// Listening server.
pub struct Server {
    local_addr: SocketAddr,
    peers: Peers,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Bind and start accepting. Joining players are added to `sim`.
    pub async fn bind(config: &ServerConfig, sim: Arc<Mutex<Simulation>>) -> Result<Self> {
        let listener = TcpListener::bind(config.address()).await?;
        let local_addr = listener.local_addr()?;
        let peers = Peers::default();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            sim,
            peers: peers.clone(),
            inbound: inbound_tx,
            max_remote: config.max_remote_peers(),
            shutdown: shutdown_rx,
        });
        let accept_task = tokio::spawn(accept_loop(listener, shared));

        info!(addr = %local_addr, max_players = config.max_players, "Server listening");
        Ok(Self {
            local_addr,
            peers,
            inbound,
            shutdown,
            accept_task,
        })
    }

    /// Address actually bound, useful with port 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Joined peers.
    #[must_use]
    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    /// Everything reported since the last call, in arrival order. Never blocks.
    pub fn drain_inbound(&mut self) -> Vec<Inbound> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbound.try_recv() {
            events.push(event);
        }
        events
    }

    /// Encode once and queue for every peer but `exclude`.
    ///
    /// Fire and forget: a peer whose writer has stopped has already reported
    /// itself through [`Inbound::Left`].
    pub async fn broadcast(&self, message: &ServerMessage, exclude: Option<PlayerId>) -> Result<()> {
        let frame: Frame = encode_message(message)?.into();
        for player in self.peers.broadcast(&frame, exclude).await {
            debug!(player = %player, kind = message.kind(), "Skipped stopped peer");
        }
        Ok(())
    }

    /// Stop accepting and close every connection.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        self.accept_task.abort();
        self.peers.clear().await;
        info!(addr = %self.local_addr, "Server shut down");
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, Arc::clone(&shared)));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn refuse(mut writer: OwnedWriteHalf, addr: SocketAddr, reason: &str) {
    info!(%addr, reason, "Refused connection");
    let message = ServerMessage::Error {
        message: reason.to_string(),
    };
    match encode_message(&message) {
        Ok(frame) => {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!(%addr, error = %e, "Could not deliver refusal");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode refusal"),
    }
    let _ = writer.shutdown().await;
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%addr, error = %e, "Could not disable Nagle");
    }
    let (mut reader, writer) = stream.into_split();

    if shared.peers.len().await >= shared.max_remote {
        refuse(writer, addr, "Server full").await;
        linger(&mut reader).await;
        return;
    }
    info!(%addr, "New connection");

    let mut shutdown = shared.shutdown.clone();
    let Some(profile) = await_join_request(&mut reader, addr, &mut shutdown).await else {
        return;
    };
    let Some(player) = admit(&shared, writer, addr, &profile).await else {
        linger(&mut reader).await;
        return;
    };

    let reason = read_intents(&mut reader, player, &shared, &mut shutdown).await;
    // The tick loop ignores departures of peers it already removed.
    let _ = shared.inbound.send(Inbound::Left { player, reason });
}

/// Discard input until the peer hangs up, so a refusal is not lost to a
/// reset caused by unread data.
async fn linger(reader: &mut OwnedReadHalf) {
    let mut sink = [0u8; 1024];
    let drain = async {
        while matches!(reader.read(&mut sink).await, Ok(n) if n > 0) {}
    };
    let _ = tokio::time::timeout(LINGER, drain).await;
}

/// Read until a `join_request` arrives. Anything else is ignored.
async fn await_join_request(
    reader: &mut OwnedReadHalf,
    addr: SocketAddr,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<PlayerProfile> {
    loop {
        let frame = tokio::select! {
            frame = read_frame(reader) => frame,
            _ = shutdown.changed() => return None,
        };
        match frame {
            Ok(Some(bytes)) => match ClientMessage::from_slice(&bytes) {
                Ok(ClientMessage::JoinRequest { name, color_idx }) => {
                    return Some(PlayerProfile {
                        name,
                        color_index: color_idx,
                    });
                }
                Ok(other) => warn!(%addr, ?other, "Ignoring message before join_request"),
                Err(e) => warn!(%addr, error = %e, "Ignoring malformed message"),
            },
            Ok(None) => {
                info!(%addr, "Connection closed before joining");
                return None;
            }
            Err(e) => {
                warn!(%addr, error = %e, "Connection failed before joining");
                return None;
            }
        }
    }
}

/// Add the player to the world, queue `assign_id` and `initial_state` for
/// them and `player_join` for everyone else, all under the simulation lock.
async fn admit(
    shared: &Shared,
    writer: OwnedWriteHalf,
    addr: SocketAddr,
    profile: &PlayerProfile,
) -> Option<PlayerId> {
    let mut sim = shared.sim.lock().await;
    if shared.peers.len().await >= shared.max_remote {
        drop(sim);
        refuse(writer, addr, "Server full").await;
        return None;
    }

    let player = sim.world_mut().join_player(profile);
    let snapshot = sim.world().full_snapshot();
    let joined = sim.world().player(player).map(Player::state);
    let greeting = [
        ServerMessage::AssignId {
            data: AssignedId { id: player },
        },
        ServerMessage::InitialState {
            data: Box::new(snapshot),
        },
    ];
    let frames: Result<Vec<Vec<u8>>> = greeting.iter().map(encode_message).collect();
    let frames = match frames {
        Ok(frames) => frames,
        Err(e) => {
            error!(player = %player, error = %e, "Failed to encode greeting");
            sim.world_mut().remove_player(player);
            return None;
        }
    };

    let (queue, pending) = mpsc::unbounded_channel::<Frame>();
    for frame in frames {
        let _ = queue.send(frame.into());
    }
    shared.peers.insert(player, queue).await;

    if let Some(state) = joined {
        match encode_message(&ServerMessage::PlayerJoin { data: state }) {
            Ok(frame) => {
                let frame: Frame = frame.into();
                shared.peers.broadcast(&frame, Some(player)).await;
            }
            Err(e) => error!(player = %player, error = %e, "Failed to encode player_join"),
        }
    }
    drop(sim);

    tokio::spawn(write_loop(writer, pending, player, shared.inbound.clone()));
    info!(player = %player, name = %profile.name, %addr, "Player joined");
    Some(player)
}

/// Forward intents to the tick loop until the connection ends. Returns why it
/// ended.
async fn read_intents(
    reader: &mut OwnedReadHalf,
    player: PlayerId,
    shared: &Shared,
    shutdown: &mut watch::Receiver<bool>,
) -> String {
    loop {
        let frame = tokio::select! {
            frame = read_frame(reader) => frame,
            _ = shutdown.changed() => return "server shutdown".to_string(),
        };
        match frame {
            Ok(Some(bytes)) => match ClientMessage::from_slice(&bytes) {
                Ok(ClientMessage::Input { payload }) => {
                    let event = Inbound::Input {
                        player,
                        intent: payload,
                    };
                    if shared.inbound.send(event).is_err() {
                        return "server stopped".to_string();
                    }
                }
                Ok(ClientMessage::JoinRequest { .. }) => {
                    warn!(player = %player, "Ignoring repeated join_request");
                }
                Err(e) => warn!(player = %player, error = %e, "Ignoring malformed message"),
            },
            Ok(None) => return "connection closed".to_string(),
            // Includes framing desync; the stream cannot be resynchronised.
            Err(e) => return e.to_string(),
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Frame>,
    player: PlayerId,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(player = %player, error = %e, "Send failed, dropping peer");
            let reason = format!("send failed: {e}");
            let _ = inbound.send(Inbound::Left { player, reason });
            return;
        }
    }
    let _ = writer.shutdown().await;
}
