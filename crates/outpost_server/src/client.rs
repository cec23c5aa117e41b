//! TCP client for replicas.
//!
//! Received messages are decoded on a background task and queued; the game
//! loop drains them without blocking. Outgoing messages are queued for a
//! writer task the same way the server does it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use outpost_core::player::PlayerProfile;
use outpost_core::protocol::{ClientMessage, Intent, ServerMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{NetError, Result};
use crate::framing::{encode_message, read_frame, write_frame};
use crate::server::Frame;

/// Connection to an authoritative server.
pub struct Client {
    server: SocketAddr,
    messages: mpsc::UnboundedReceiver<ServerMessage>,
    outbound: mpsc::UnboundedSender<Frame>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Client {
    /// Connect within `timeout` and send a `join_request` for `profile`.
    pub async fn connect(addr: &str, profile: &PlayerProfile, timeout: Duration) -> Result<Self> {
        info!(%addr, "Connecting");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::ConnectTimeout(addr.to_string()))??;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle");
        }
        let server = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let connected = Arc::new(AtomicBool::new(true));
        let (inbox, messages) = mpsc::unbounded_channel();
        let (outbound, pending) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(read_half, inbox, Arc::clone(&connected)));
        let writer = tokio::spawn(write_loop(write_half, pending, Arc::clone(&connected)));

        let client = Self {
            server,
            messages,
            outbound,
            connected,
            reader,
            writer,
        };
        client.send(&ClientMessage::JoinRequest {
            name: profile.name.clone(),
            color_idx: profile.color_index,
        })?;
        info!(%server, "Connected");
        Ok(client)
    }

    /// Server address.
    #[must_use]
    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Whether both directions are still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queue a message for the server.
    pub fn send(&self, message: &ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(NetError::Closed);
        }
        let frame = encode_message(message)?;
        self.outbound.send(frame.into()).map_err(|_| NetError::Closed)
    }

    /// Queue an intent.
    pub fn send_intent(&self, intent: Intent) -> Result<()> {
        self.send(&ClientMessage::Input { payload: intent })
    }

    /// Messages received since the last call. Never blocks.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            out.push(message);
        }
        out
    }

    /// Wait for the next message. `None` once the connection is gone and
    /// everything received has been consumed.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.messages.recv().await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    inbox: mpsc::UnboundedSender<ServerMessage>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(bytes)) => match ServerMessage::from_slice(&bytes) {
                Ok(message) => {
                    if inbox.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring malformed server message"),
            },
            Ok(None) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Connection lost");
                break;
            }
        }
    }
    connected.store(false, Ordering::Release);
}

async fn write_loop(mut writer: OwnedWriteHalf, mut pending: mpsc::UnboundedReceiver<Frame>, connected: Arc<AtomicBool>) {
    while let Some(frame) = pending.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(error = %e, "Send failed");
            connected.store(false, Ordering::Release);
            return;
        }
    }
    let _ = writer.shutdown().await;
}
