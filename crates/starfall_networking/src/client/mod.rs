//! # Game Client
//!
//! Client-side simulation: applies server snapshots to a local registry and
//! sends the local player's input once per tick.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────── GameClient::tick ────────────────────┐
//! │ Consumer<Snapshot> ─► ClientSynchronizer ─► Registry     │
//! │ stale replicas     ─► ClientSynchronizer::despawn_stale  │
//! │ local InputState   ─► PlayerInput ─► ClientTransport     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering, audio and prediction are out of scope; they read the registry.

mod synchronizer;

pub use synchronizer::{register_replica_components, ApplyOutcome, ClientSynchronizer};

use crate::config::DEFAULT_REPLICA_TIMEOUT_TICKS;
use crate::protocol::{InputFlags, PlayerInput};
use crate::transport::{ClientChannels, ClientTransport};
use starfall_core::components::InputState;
use starfall_core::{EcsResult, Registry};

/// Per-client counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Snapshots written to the registry.
    pub snapshots_applied: u64,
    /// Snapshots dropped as stale.
    pub snapshots_stale: u64,
    /// Replicas despawned for not being refreshed.
    pub replicas_despawned: u64,
    /// Inputs handed to the transport.
    pub inputs_sent: u64,
    /// Inputs dropped because the outbound queue was full.
    pub inputs_dropped: u64,
}

/// A connected game client.
#[derive(Debug)]
pub struct GameClient {
    transport: ClientTransport,
    channels: ClientChannels,
    registry: Registry,
    synchronizer: ClientSynchronizer,
    input: InputState,
    replica_timeout_ticks: u32,
    tick: u32,
    stats: ClientStats,
}

impl GameClient {
    /// Wraps an already connected transport.
    ///
    /// # Errors
    ///
    /// Component registration failure.
    pub fn new(transport: ClientTransport, channels: ClientChannels) -> EcsResult<Self> {
        let mut registry = Registry::new();
        register_replica_components(&mut registry)?;
        Ok(Self {
            transport,
            channels,
            registry,
            synchronizer: ClientSynchronizer::new(),
            input: InputState::default(),
            replica_timeout_ticks: DEFAULT_REPLICA_TIMEOUT_TICKS,
            tick: 0,
            stats: ClientStats::default(),
        })
    }

    /// Player id assigned by the server.
    #[inline]
    #[must_use]
    pub const fn player_id(&self) -> u8 {
        self.transport.player_id()
    }

    /// False once the server closed the control connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Local view of the world.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Local view of the world, mutably (for despawn rules).
    #[inline]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Snapshot bookkeeping.
    #[inline]
    #[must_use]
    pub const fn synchronizer(&self) -> &ClientSynchronizer {
        &self.synchronizer
    }

    /// Snapshot bookkeeping, mutably (for [`ClientSynchronizer::forget`]).
    #[inline]
    pub fn synchronizer_mut(&mut self) -> &mut ClientSynchronizer {
        &mut self.synchronizer
    }

    /// Underlying transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &ClientTransport {
        &self.transport
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Local ticks run so far.
    #[inline]
    #[must_use]
    pub const fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Sets how long a replica may go unrefreshed, in server ticks per
    /// round-robin pass (see [`ClientSynchronizer::despawn_stale`]).
    pub fn set_replica_timeout(&mut self, ticks: u32) {
        self.replica_timeout_ticks = ticks.max(1);
    }

    /// Sets the keys held by the local player.
    pub fn set_input(&mut self, input: InputState) {
        self.input = input;
    }

    /// Keys held by the local player.
    #[inline]
    #[must_use]
    pub const fn input(&self) -> InputState {
        self.input
    }

    /// Runs one client step: apply pending snapshots, despawn stale
    /// replicas, then send input.
    ///
    /// Does nothing once disconnected.
    ///
    /// # Errors
    ///
    /// Registry contract violations while applying a snapshot.
    pub fn tick(&mut self) -> EcsResult<()> {
        if !self.transport.is_connected() {
            return Ok(());
        }

        let mut applied = false;
        while let Some(snapshot) = self.channels.snapshots.pop() {
            match self.synchronizer.apply(&mut self.registry, &snapshot)? {
                ApplyOutcome::Applied => {
                    applied = true;
                    self.stats.snapshots_applied += 1;
                }
                ApplyOutcome::Stale => self.stats.snapshots_stale += 1,
            }
        }
        // Only fresh server state can prove a replica gone.
        if applied {
            let despawned = self
                .synchronizer
                .despawn_stale(&mut self.registry, self.replica_timeout_ticks);
            self.stats.replicas_despawned += despawned as u64;
        }

        let packet = PlayerInput {
            player_id: self.transport.player_id(),
            input: InputFlags::from_state(&self.input),
        };
        if self.transport.send_input(packet) {
            self.stats.inputs_sent += 1;
        } else {
            self.stats.inputs_dropped += 1;
        }

        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }

    /// Sends `DISCONNECT_REQ` and closes the control connection.
    pub fn disconnect(&mut self) {
        if self.transport.is_connected() {
            tracing::info!(player_id = self.player_id(), "disconnecting");
            self.transport.disconnect();
        }
    }
}
