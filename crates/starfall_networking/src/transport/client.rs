//! Client-side sockets: handshake, UDP socket connected to the server.

use super::{read_frame, write_frame, Frame, TransportStats};
use crate::config::ClientConfig;
use crate::error::{NetError, NetResult};
use crate::protocol::{decode_snapshot, ConnectRequest, ControlMessage, PacketWriter, PlayerInput, Snapshot};
use crate::MAX_DATAGRAM_SIZE;
use starfall_core::sync::{spsc_queue, Consumer, Producer};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};

/// Capacity of the outbound command channel.
const OUTBOUND_CAPACITY: usize = 64;

/// Commands from the client simulation to the I/O context.
#[derive(Clone, Copy, Debug)]
enum ClientCommand {
    Input(PlayerInput),
    Disconnect,
}

/// Simulation-side ends of the client transport.
#[derive(Debug)]
pub struct ClientChannels {
    /// Decoded snapshots, in arrival order.
    pub snapshots: Consumer<Snapshot>,
}

/// Owns the client sockets and their I/O tasks.
///
/// Construction performs the TCP handshake; a value of this type always
/// represents an accepted player.
#[derive(Debug)]
pub struct ClientTransport {
    player_id: u8,
    local_udp_addr: SocketAddr,
    connected: Arc<AtomicBool>,
    commands: mpsc::Sender<ClientCommand>,
    stats: Arc<TransportStats>,
    shutdown: watch::Sender<bool>,
}

/// TCP connect, send `CONNECT_REQ`, wait for `CONNECT_ACK`.
async fn handshake(config: &ClientConfig, username: &str) -> NetResult<(TcpStream, u8)> {
    let addr = config.tcp_addr();
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| NetError::Connect { addr, source })?;
    stream.set_nodelay(true)?;

    let request = ControlMessage::ConnectRequest(ConnectRequest::new(username));
    write_frame(&mut stream, &request).await?;

    match read_frame(&mut stream).await? {
        Frame::Message(ControlMessage::ConnectAck(ack)) => Ok((stream, ack.player_id)),
        Frame::Message(other) => {
            tracing::warn!(message = ?other, "unexpected reply to join request");
            Err(NetError::Refused)
        }
        Frame::Malformed(err) => Err(NetError::Handshake(err)),
        Frame::Closed => Err(NetError::Refused),
    }
}

impl ClientTransport {
    /// Joins the server and starts the I/O tasks on the current runtime.
    ///
    /// # Errors
    ///
    /// Any handshake failure: connect error, refusal, malformed reply or
    /// timeout. On error no task is left running.
    pub async fn connect(config: &ClientConfig, username: &str) -> NetResult<(Self, ClientChannels)> {
        config.validate()?;

        let timeout = config.handshake_timeout();
        let (stream, player_id) = tokio::time::timeout(timeout, handshake(config, username))
            .await
            .map_err(|_| NetError::HandshakeTimeout(timeout))??;

        let server_udp = config.udp_addr();
        let local_ip = match server_udp.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let udp = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        udp.connect(server_udp).await?;
        let local_udp_addr = udp.local_addr()?;
        let udp = Arc::new(udp);

        let stats = Arc::new(TransportStats::default());
        let connected = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = spsc_queue(config.snapshot_queue_capacity);
        let (command_tx, command_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (read_half, write_half) = stream.into_split();

        tokio::spawn(snapshot_receive_loop(
            Arc::clone(&udp),
            snapshot_tx,
            Arc::clone(&stats),
            shutdown_rx.clone(),
        ));
        tokio::spawn(control_watch_loop(read_half, Arc::clone(&connected), shutdown_rx.clone()));
        tokio::spawn(outbound_loop(
            udp,
            write_half,
            command_rx,
            Arc::clone(&stats),
            shutdown_rx,
        ));

        tracing::info!(player_id, server = %server_udp, local = %local_udp_addr, "joined server");

        Ok((
            Self {
                player_id,
                local_udp_addr,
                connected,
                commands: command_tx,
                stats,
                shutdown,
            },
            ClientChannels {
                snapshots: snapshot_rx,
            },
        ))
    }

    /// Player id assigned by the server.
    #[must_use]
    pub const fn player_id(&self) -> u8 {
        self.player_id
    }

    /// Local UDP address.
    #[must_use]
    pub const fn local_udp_addr(&self) -> SocketAddr {
        self.local_udp_addr
    }

    /// False once the server closed the control connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Queues one input datagram. Never blocks.
    ///
    /// Returns `false` if the outbound queue is full or closed.
    pub fn send_input(&self, input: PlayerInput) -> bool {
        if self.commands.try_send(ClientCommand::Input(input)).is_ok() {
            return true;
        }
        self.stats.record_queue_drop();
        false
    }

    /// Sends `DISCONNECT_REQ` and closes the control connection.
    pub fn disconnect(&self) {
        if self.commands.try_send(ClientCommand::Disconnect).is_err() {
            // Outbound task is gone or saturated; stop everything directly.
            self.shutdown();
        }
        self.connected.store(false, Ordering::Release);
    }

    /// Stops every I/O task without a goodbye.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}

async fn snapshot_receive_loop(
    socket: Arc<UdpSocket>,
    mut snapshots: Producer<Snapshot>,
    stats: Arc<TransportStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            received = socket.recv(&mut buffer) => match received {
                Ok(len) => {
                    stats.record_received();
                    match decode_snapshot(&buffer[..len]) {
                        Ok(snapshot) => {
                            if !snapshots.push(snapshot) {
                                stats.record_queue_drop();
                            }
                        }
                        Err(err) => {
                            stats.record_malformed();
                            tracing::debug!(error = %err, "dropping malformed datagram");
                        }
                    }
                }
                Err(err) => tracing::debug!(error = %err, "UDP receive failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn control_watch_loop(mut read_half: OwnedReadHalf, connected: Arc<AtomicBool>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            frame = read_frame(&mut read_half) => match frame {
                Ok(Frame::Message(message)) => {
                    tracing::debug!(?message, "ignoring control message");
                }
                Ok(Frame::Malformed(err)) => {
                    tracing::debug!(error = %err, "malformed control frame from server");
                }
                Ok(Frame::Closed) | Err(_) => {
                    tracing::info!("server closed the control connection");
                    connected.store(false, Ordering::Release);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn outbound_loop(
    socket: Arc<UdpSocket>,
    mut write_half: OwnedWriteHalf,
    mut commands: mpsc::Receiver<ClientCommand>,
    stats: Arc<TransportStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut writer = PacketWriter::new();
    loop {
        // Commands first: a dropped transport queues Disconnect right before
        // it closes the shutdown channel.
        let command = tokio::select! {
            biased;
            command = commands.recv() => command,
            _ = shutdown.changed() => break,
        };
        match command {
            Some(ClientCommand::Input(input)) => {
                let sent = match writer.encode_input(input) {
                    Ok(bytes) => socket.send(bytes).await.map(|_| ()),
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to encode input");
                        continue;
                    }
                };
                match sent {
                    Ok(()) => stats.record_sent(),
                    Err(err) => {
                        stats.record_send_error();
                        tracing::debug!(error = %err, "UDP send failed");
                    }
                }
            }
            Some(ClientCommand::Disconnect) | None => {
                if let Err(err) = write_frame(&mut write_half, &ControlMessage::DisconnectRequest).await {
                    tracing::debug!(error = %err, "failed to send DISCONNECT_REQ");
                }
                break;
            }
        }
    }
    // Closing the write half ends the session on the server side.
    drop(write_half);
}
