//! Session loops.
//!
//! A [`HostSession`] owns the authoritative simulation and drives it at the
//! configured tick rate, feeding it the intents queued by the server and
//! broadcasting what it produces. A host game and a dedicated server differ
//! only in whether a local player is driven in-process.
//!
//! A [`ReplicaSession`] mirrors a remote world: it applies server messages,
//! interpolates cosmetic state and forwards intents.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use outpost_core::player::{PlayerId, PlayerProfile};
use outpost_core::protocol::{Intent, ServerMessage};
use outpost_core::simulation::{Simulation, TickEvents};
use outpost_core::snapshot::SessionMode;
use outpost_core::world::World;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::config::ServerConfig;
use crate::error::{NetError, Result};
use crate::persistence;
use crate::server::{Inbound, Server};

// =============================================================================
// Authoritative side
// =============================================================================

/// Authoritative game served over TCP.
pub struct HostSession {
    config: ServerConfig,
    mode: SessionMode,
    sim: Arc<Mutex<Simulation>>,
    server: Server,
}

impl HostSession {
    /// Start serving `world`. `local_player` is the in-process player of a
    /// host game, `None` for a dedicated server.
    pub async fn start(config: ServerConfig, world: World, local_player: Option<PlayerId>) -> Result<Self> {
        config.validate()?;
        let sim = Arc::new(Mutex::new(Simulation::authoritative(world, local_player)));
        let server = Server::bind(&config, Arc::clone(&sim)).await?;
        info!(
            addr = %server.local_addr(),
            tick_rate = config.tick_rate,
            dedicated = local_player.is_none(),
            "Session started"
        );
        Ok(Self {
            config,
            mode: SessionMode::Host,
            sim,
            server,
        })
    }

    /// Address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr()
    }

    /// The shared simulation. Lock it only briefly; the tick loop and joining
    /// clients contend for it.
    #[must_use]
    pub fn simulation(&self) -> Arc<Mutex<Simulation>> {
        Arc::clone(&self.sim)
    }

    /// Number of connected remote players.
    pub async fn peer_count(&self) -> usize {
        self.server.peers().len().await
    }

    /// Apply an intent from the in-process player. Resulting messages go out
    /// with the next tick.
    pub async fn apply_local_intent(&self, intent: &Intent) -> bool {
        let mut sim = self.sim.lock().await;
        match sim.local_player() {
            Some(player) => sim.apply_intent(player, intent),
            None => false,
        }
    }

    /// Run one tick: apply queued intents and departures in arrival order,
    /// advance the simulation, then broadcast everything it produced.
    ///
    /// A message that fails to broadcast is logged and skipped.
    pub async fn step(&mut self, dt: f32) -> Result<TickEvents> {
        let inbound = self.server.drain_inbound();
        let mut departed = Vec::new();

        let events = {
            let mut sim = self.sim.lock().await;
            for event in inbound {
                match event {
                    Inbound::Input { player, intent } => {
                        if !sim.apply_intent(player, &intent) {
                            debug!(%player, ?intent, "Intent rejected");
                        }
                    }
                    Inbound::Left { player, reason } => {
                        // Reader and writer can both report the same departure.
                        if self.server.peers().remove(player).await {
                            sim.world_mut().remove_player(player);
                            info!(%player, %reason, "Peer disconnected");
                            departed.push(player);
                        }
                    }
                }
            }
            sim.tick(dt)
        };

        let leaves: Vec<_> = departed
            .into_iter()
            .map(|player_id| ServerMessage::PlayerLeave { player_id })
            .collect();
        for message in leaves.iter().chain(&events.messages) {
            if let Err(e) = self.server.broadcast(message, None).await {
                error!(kind = message.kind(), error = %e, "Broadcast failed");
            }
        }
        Ok(events)
    }

    /// Broadcast a full `state_update`. Skipped when nobody is connected.
    pub async fn broadcast_state(&self) -> Result<()> {
        if self.server.peers().is_empty().await {
            return Ok(());
        }
        let snapshot = self.sim.lock().await.world().full_snapshot();
        self.server
            .broadcast(
                &ServerMessage::StateUpdate {
                    data: Box::new(snapshot),
                },
                None,
            )
            .await
    }

    /// Write the world to the configured save path.
    pub async fn save(&self) -> Result<()> {
        let sim = self.sim.lock().await;
        persistence::save(&self.config.save_path, sim.world(), self.mode)
    }

    /// Drive the game until `shutdown` resolves, then save and close.
    ///
    /// Errors inside the loop are logged; they never stop the tick.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let dt = self.config.tick_dt();
        let hash_every = u64::from(self.config.tick_rate.max(1)) * 10;
        let mut ticks = tokio::time::interval(self.config.tick_interval());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut resync = tokio::time::interval(self.config.snapshot_interval());
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticks.tick() => match self.step(dt).await {
                    Ok(events) => {
                        if let Some(status) = events.finished {
                            info!(?status, tick = events.tick, "Game finished");
                        }
                        if events.tick % hash_every == 0 {
                            let hash = self.sim.lock().await.state_hash();
                            debug!(tick = events.tick, hash, "State hash");
                        }
                    }
                    Err(e) => error!(error = %e, "Tick failed"),
                },
                _ = resync.tick() => {
                    if let Err(e) = self.broadcast_state().await {
                        error!(error = %e, "State broadcast failed");
                    }
                }
            }
        }

        info!("Shutting down");
        if let Err(e) = self.save().await {
            error!(error = %e, "Save on shutdown failed");
        }
        self.server.shutdown().await;
        Ok(())
    }
}

// =============================================================================
// Replica side
// =============================================================================

/// Local mirror of a remote game.
pub struct ReplicaSession {
    sim: Simulation,
    client: Client,
    joined: bool,
    tick_dt: f32,
    tick_interval: Duration,
}

impl ReplicaSession {
    /// Connect to `addr` and request to join as `profile`.
    pub async fn connect(config: &ServerConfig, addr: &str, profile: &PlayerProfile) -> Result<Self> {
        config.validate()?;
        let client = Client::connect(addr, profile, config.connect_timeout()).await?;
        Ok(Self {
            sim: Simulation::replica(World::new(config.world.clone())),
            client,
            joined: false,
            tick_dt: config.tick_dt(),
            tick_interval: config.tick_interval(),
        })
    }

    /// Block until the server has sent `initial_state`.
    ///
    /// An `error` message before that is a refusal, e.g. a full server.
    pub async fn wait_until_joined(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.joined {
            let next = tokio::time::timeout_at(deadline, self.client.recv())
                .await
                .map_err(|_| NetError::ConnectTimeout(self.client.server_addr().to_string()))?;
            match next {
                None => return Err(NetError::Closed),
                Some(ServerMessage::Error { message }) => return Err(NetError::Refused(message)),
                Some(message) => self.handle(message),
            }
        }
        Ok(())
    }

    /// Apply everything received so far. Returns how many messages that was.
    pub fn pump(&mut self) -> usize {
        let messages = self.client.drain();
        let count = messages.len();
        for message in messages {
            self.handle(message);
        }
        count
    }

    /// Apply received messages, then advance local interpolation.
    pub fn step(&mut self, dt: f32) -> TickEvents {
        self.pump();
        self.sim.tick(dt)
    }

    /// Send an intent. Own movement is also applied locally right away.
    pub fn send_intent(&mut self, intent: Intent) -> Result<()> {
        if let (Intent::Move { .. }, Some(me)) = (&intent, self.sim.local_player()) {
            self.sim.apply_intent(me, &intent);
        }
        self.client.send_intent(intent)
    }

    /// Id the server assigned, once known.
    #[must_use]
    pub fn player_id(&self) -> Option<PlayerId> {
        self.sim.local_player()
    }

    /// Whether `initial_state` has arrived.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Whether the connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// The mirrored simulation.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Follow the game until `shutdown` resolves or the server goes away.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticks = tokio::time::interval(self.tick_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticks.tick() => {
                    self.step(self.tick_dt);
                    if !self.client.is_connected() {
                        self.pump();
                        info!("Disconnected from server");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle(&mut self, message: ServerMessage) {
        match &message {
            ServerMessage::InitialState { .. } => {
                if !self.joined {
                    info!(player = ?self.sim.local_player(), "Joined game");
                }
                self.joined = true;
            }
            ServerMessage::Error { message } => {
                warn!(%message, "Server reported an error");
                return;
            }
            _ => {}
        }
        self.sim.apply_message(message);
    }
}
