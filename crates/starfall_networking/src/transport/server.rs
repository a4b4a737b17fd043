//! Server-side sockets: TCP accept + session tasks, shared UDP socket.

use super::{read_frame, write_frame, Frame, TransportStats, MAX_MALFORMED_FRAMES};
use crate::config::ServerConfig;
use crate::error::{NetError, NetResult};
use crate::protocol::{decode_input, ConnectAck, ControlMessage, PlayerInput};
use crate::MAX_DATAGRAM_SIZE;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use starfall_core::sync::{spsc_queue, Consumer, Producer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch, Notify};

/// Capacity of the session event channel.
const SESSION_EVENT_CAPACITY: usize = 256;

/// Capacity of the outbound command channel.
const COMMAND_CAPACITY: usize = 1024;

/// A decoded input datagram with its source address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InboundInput {
    /// Decoded payload.
    pub input: PlayerInput,
    /// UDP source address.
    pub from: SocketAddr,
}

/// Session lifecycle notifications, TCP tasks -> simulation thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A client completed the handshake.
    Joined {
        /// Assigned player id.
        player_id: u8,
        /// Username from the join request.
        username: String,
        /// TCP peer address (its IP is expected on the UDP channel too).
        addr: SocketAddr,
    },
    /// A client left, was kicked, or its control connection dropped.
    Left {
        /// Player id being released.
        player_id: u8,
    },
}

/// Commands from the simulation thread to the I/O context.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ServerCommand {
    /// Send one datagram. The buffer is moved, not boxed, to keep the tick
    /// allocation-free.
    SendTo {
        /// Target address.
        addr: SocketAddr,
        /// Datagram bytes.
        data: [u8; MAX_DATAGRAM_SIZE],
        /// Valid prefix of `data`.
        len: usize,
    },
    /// Close a player's control connection.
    Kick {
        /// Player to disconnect.
        player_id: u8,
    },
}

/// Hands out player ids `1..=max`, lowest free first.
#[derive(Debug)]
pub struct PlayerIdPool {
    in_use: Vec<bool>,
}

impl PlayerIdPool {
    /// Creates a pool for `max_players` ids.
    #[must_use]
    pub fn new(max_players: u8) -> Self {
        Self {
            in_use: vec![false; usize::from(max_players)],
        }
    }

    /// Takes the lowest free id, or `None` if the server is full.
    pub fn acquire(&mut self) -> Option<u8> {
        let slot = self.in_use.iter().position(|used| !used)?;
        self.in_use[slot] = true;
        u8::try_from(slot + 1).ok()
    }

    /// Returns an id to the pool. Unknown ids are ignored.
    pub fn release(&mut self, player_id: u8) {
        if let Some(used) = usize::from(player_id)
            .checked_sub(1)
            .and_then(|slot| self.in_use.get_mut(slot))
        {
            *used = false;
        }
    }

    /// Number of ids currently handed out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.iter().filter(|used| **used).count()
    }
}

/// State shared by the accept loop and every session task.
struct SessionContext {
    pool: Mutex<PlayerIdPool>,
    kicks: Mutex<HashMap<u8, Arc<Notify>>>,
    events: Sender<SessionEvent>,
    handshake_timeout: Duration,
    stats: Arc<TransportStats>,
}

impl SessionContext {
    fn kick(&self, player_id: u8) {
        if let Some(notify) = self.kicks.lock().get(&player_id) {
            notify.notify_one();
        }
    }
}

/// Simulation-side ends of the server transport.
#[derive(Debug)]
pub struct ServerChannels {
    /// Decoded inputs, in arrival order.
    pub inputs: Consumer<InboundInput>,
    /// Join/leave notifications.
    pub events: Receiver<SessionEvent>,
    /// Outbound commands (use `try_send`).
    pub commands: mpsc::Sender<ServerCommand>,
}

/// Owns the server sockets and their I/O tasks.
///
/// Dropping the transport stops every task.
#[derive(Debug)]
pub struct ServerTransport {
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    stats: Arc<TransportStats>,
    shutdown: watch::Sender<bool>,
}

impl ServerTransport {
    /// Binds both sockets and starts the I/O tasks on the current runtime.
    ///
    /// Both sockets are bound before any connection is accepted.
    ///
    /// # Errors
    ///
    /// [`NetError::Bind`] if either port cannot be bound, or
    /// [`NetError::Config`] for an invalid config.
    pub async fn bind(config: &ServerConfig) -> NetResult<(Self, ServerChannels)> {
        config.validate()?;

        let listener = TcpListener::bind(config.tcp_addr())
            .await
            .map_err(|source| NetError::Bind {
                kind: "TCP",
                addr: config.tcp_addr(),
                source,
            })?;
        let udp = UdpSocket::bind(config.udp_addr())
            .await
            .map_err(|source| NetError::Bind {
                kind: "UDP",
                addr: config.udp_addr(),
                source,
            })?;
        let tcp_addr = listener.local_addr()?;
        let udp_addr = udp.local_addr()?;
        let udp = Arc::new(udp);

        let stats = Arc::new(TransportStats::default());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (input_tx, input_rx) = spsc_queue(config.input_queue_capacity);
        let (event_tx, event_rx) = crossbeam_channel::bounded(SESSION_EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let ctx = Arc::new(SessionContext {
            pool: Mutex::new(PlayerIdPool::new(config.max_players)),
            kicks: Mutex::new(HashMap::new()),
            events: event_tx,
            handshake_timeout: config.handshake_timeout(),
            stats: Arc::clone(&stats),
        });

        tokio::spawn(accept_loop(listener, Arc::clone(&ctx), shutdown_rx.clone()));
        tokio::spawn(udp_receive_loop(
            Arc::clone(&udp),
            input_tx,
            Arc::clone(&stats),
            shutdown_rx.clone(),
        ));
        tokio::spawn(command_loop(udp, command_rx, ctx, shutdown_rx));

        tracing::info!(tcp = %tcp_addr, udp = %udp_addr, "server transport listening");

        Ok((
            Self {
                tcp_addr,
                udp_addr,
                stats,
                shutdown,
            },
            ServerChannels {
                inputs: input_rx,
                events: event_rx,
                commands: command_tx,
            },
        ))
    }

    /// Bound TCP address (resolves port 0).
    #[must_use]
    pub const fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// Bound UDP address (resolves port 0).
    #[must_use]
    pub const fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Stops every I/O task. Open sessions are closed.
    pub fn shutdown(&self) {
        // Receivers may all be gone already.
        let _ = self.shutdown.send(true);
    }
}

impl Drop for ServerTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<SessionContext>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!(%addr, "control connection accepted");
                    tokio::spawn(run_session(stream, addr, Arc::clone(&ctx), shutdown.clone()));
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Waits for a join request, tolerating a few malformed frames.
async fn await_join(stream: &mut TcpStream, addr: SocketAddr, ctx: &SessionContext) -> Option<String> {
    let mut strikes = 0;
    loop {
        match read_frame(stream).await {
            Ok(Frame::Message(ControlMessage::ConnectRequest(request))) => {
                return Some(request.username());
            }
            Ok(Frame::Message(other)) => {
                tracing::debug!(%addr, message = ?other, "ignoring control message before join");
                if matches!(other, ControlMessage::DisconnectRequest) {
                    return None;
                }
            }
            Ok(Frame::Malformed(err)) => {
                ctx.stats.record_malformed();
                strikes += 1;
                tracing::warn!(%addr, error = %err, strikes, "malformed control frame");
                if strikes >= MAX_MALFORMED_FRAMES {
                    return None;
                }
            }
            Ok(Frame::Closed) => return None,
            Err(err) => {
                tracing::debug!(%addr, error = %err, "control read failed");
                return None;
            }
        }
    }
}

async fn run_session(
    mut stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<SessionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let username = match tokio::time::timeout(ctx.handshake_timeout, await_join(&mut stream, addr, &ctx)).await {
        Ok(Some(name)) => name,
        Ok(None) => return,
        Err(_) => {
            tracing::warn!(%addr, "handshake timed out");
            return;
        }
    };

    let Some(player_id) = ctx.pool.lock().acquire() else {
        tracing::warn!(%addr, %username, "server full, refusing connection");
        return;
    };

    if let Err(err) = write_frame(&mut stream, &ControlMessage::ConnectAck(ConnectAck { player_id })).await {
        tracing::warn!(%addr, player_id, error = %err, "failed to send CONNECT_ACK");
        ctx.pool.lock().release(player_id);
        return;
    }

    let kick = Arc::new(Notify::new());
    ctx.kicks.lock().insert(player_id, Arc::clone(&kick));

    let joined = SessionEvent::Joined {
        player_id,
        username: username.clone(),
        addr,
    };
    if let Err(err) = ctx.events.try_send(joined) {
        tracing::error!(player_id, full = matches!(err, TrySendError::Full(_)), "session event channel unavailable");
        ctx.kicks.lock().remove(&player_id);
        ctx.pool.lock().release(player_id);
        return;
    }
    tracing::info!(player_id, %username, %addr, "player joined");

    let mut strikes = 0;
    let reason = loop {
        tokio::select! {
            frame = read_frame(&mut stream) => match frame {
                Ok(Frame::Message(ControlMessage::DisconnectRequest)) => break "disconnect request",
                Ok(Frame::Message(other)) => {
                    tracing::debug!(player_id, message = ?other, "ignoring control message");
                }
                Ok(Frame::Malformed(err)) => {
                    ctx.stats.record_malformed();
                    strikes += 1;
                    tracing::warn!(player_id, error = %err, strikes, "malformed control frame");
                    if strikes >= MAX_MALFORMED_FRAMES {
                        break "too many malformed frames";
                    }
                }
                Ok(Frame::Closed) => break "connection closed",
                Err(_) => break "connection error",
            },
            () = kick.notified() => break "kicked",
            _ = shutdown.changed() => break "server shutdown",
        }
    };

    // Left must be queued before the id is released so a reused id is never
    // announced ahead of its previous owner's departure.
    ctx.kicks.lock().remove(&player_id);
    if ctx.events.try_send(SessionEvent::Left { player_id }).is_err() {
        tracing::error!(player_id, "failed to queue leave event");
    }
    ctx.pool.lock().release(player_id);
    tracing::info!(player_id, %username, reason, "player left");
}

async fn udp_receive_loop(
    socket: Arc<UdpSocket>,
    mut inputs: Producer<InboundInput>,
    stats: Arc<TransportStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) => {
                    stats.record_received();
                    match decode_input(&buffer[..len]) {
                        Ok(input) => {
                            if !inputs.push(InboundInput { input, from }) {
                                stats.record_queue_drop();
                            }
                        }
                        Err(err) => {
                            stats.record_malformed();
                            tracing::debug!(%from, error = %err, "dropping malformed datagram");
                        }
                    }
                }
                // ICMP port-unreachable from a departed client surfaces here.
                Err(err) => tracing::debug!(error = %err, "UDP receive failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn command_loop(
    socket: Arc<UdpSocket>,
    mut commands: mpsc::Receiver<ServerCommand>,
    ctx: Arc<SessionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let command = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = shutdown.changed() => break,
        };
        match command {
            ServerCommand::SendTo { addr, data, len } => match socket.send_to(&data[..len], addr).await {
                Ok(_) => ctx.stats.record_sent(),
                Err(err) => {
                    ctx.stats.record_send_error();
                    tracing::debug!(%addr, error = %err, "UDP send failed");
                }
            },
            ServerCommand::Kick { player_id } => ctx.kick(player_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_hands_out_lowest_free() {
        let mut pool = PlayerIdPool::new(3);
        assert_eq!(pool.acquire(), Some(1));
        assert_eq!(pool.acquire(), Some(2));
        assert_eq!(pool.acquire(), Some(3));
        assert_eq!(pool.acquire(), None);

        pool.release(2);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.acquire(), Some(2));
    }

    #[test]
    fn test_pool_ignores_unknown_ids() {
        let mut pool = PlayerIdPool::new(2);
        pool.release(0);
        pool.release(9);
        assert_eq!(pool.in_use(), 0);
    }
}
