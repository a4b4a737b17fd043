//! # Game Server
//!
//! The authoritative simulation, run on one dedicated thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── GameServer::tick ───────────────────────────┐
//! │ 1. SessionEvent  ─► spawn / despawn player ships                         │
//! │ 2. InboundInput  ─► SessionTable::accept_input ─► InputState component   │
//! │ 3. systems       ─► input ─► fire ─► integrate ─► clamp                  │
//! │                     ─► hits ─► offscreen despawn                          │
//! │ 4. timeouts      ─► ServerCommand::Kick                                  │
//! │ 5. snapshot      ─► encode once ─► ServerCommand::SendTo per endpoint    │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Performance Requirements
//!
//! - No blocking call inside `tick`: every channel is polled with `try_*`
//! - The snapshot is encoded once per tick into a fixed buffer

mod factory;
mod session;
mod synchronizer;
pub mod systems;
mod tick;

pub use factory::{spawn_player, ActorFactory, ComponentSet, DefaultActorFactory};
pub use session::{InputRejection, Session, SessionTable};
pub use synchronizer::ServerSynchronizer;
pub use systems::{HitBuffers, Playfield};
pub use tick::{TickLoop, TickStats, MAX_CATCH_UP_TICKS};

use crate::config::ServerConfig;
use crate::protocol::PacketWriter;
use crate::transport::{InboundInput, ServerChannels, ServerCommand, SessionEvent};
use crossbeam_channel::TryRecvError;
use starfall_core::components::{
    EntityKind, Health, HitBox, InputState, NetworkId, PlayerControlled, Projectile, Transform, Velocity,
    Weapon,
};
use starfall_core::{EcsResult, Entity, Registry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Interval between status log lines in [`GameServer::run`].
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Distance from the left edge at which players spawn.
const SPAWN_X: f32 = 100.0;

/// Per-server counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Inputs applied to a player.
    pub inputs_applied: u64,
    /// Inputs ignored (unknown player, wrong endpoint, inactive session).
    pub inputs_rejected: u64,
    /// Snapshot datagrams handed to the transport.
    pub snapshots_sent: u64,
    /// Snapshot datagrams dropped because the command queue was full.
    pub snapshots_dropped: u64,
    /// Players kicked for inactivity.
    pub timeouts: u64,
    /// Projectiles fired by players.
    pub shots_fired: u64,
    /// Entities killed by projectile hits, spent projectiles included.
    pub destroyed: u64,
    /// Entities despawned for leaving the playfield.
    pub despawned: u64,
}

/// Registers every component the server simulation uses.
///
/// # Errors
///
/// Fails if one of them is already registered.
pub fn register_components(registry: &mut Registry) -> EcsResult<()> {
    registry.register_component::<Transform>()?;
    registry.register_component::<Velocity>()?;
    registry.register_component::<HitBox>()?;
    registry.register_component::<Health>()?;
    registry.register_component::<EntityKind>()?;
    registry.register_component::<NetworkId>()?;
    registry.register_component::<PlayerControlled>()?;
    registry.register_component::<InputState>()?;
    registry.register_component::<Weapon>()?;
    registry.register_component::<Projectile>()?;
    Ok(())
}

/// The authoritative game server.
pub struct GameServer {
    registry: Registry,
    sessions: SessionTable,
    channels: ServerChannels,
    factory: Box<dyn ActorFactory>,
    synchronizer: ServerSynchronizer,
    writer: PacketWriter,
    shooters: Vec<Entity>,
    hit_buffers: HitBuffers,
    playfield: Playfield,
    max_players: u8,
    timeout_ticks: u32,
    dt: f32,
    tick_rate: u32,
    tick: u32,
    stats: ServerStats,
}

impl std::fmt::Debug for GameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("tick", &self.tick)
            .field("players", &self.sessions.len())
            .field("entities", &self.registry.alive_count())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl GameServer {
    /// Creates a server with the built-in actors.
    ///
    /// # Errors
    ///
    /// Component registration failure.
    pub fn new(config: &ServerConfig, channels: ServerChannels) -> EcsResult<Self> {
        Self::with_factory(config, channels, Box::new(DefaultActorFactory))
    }

    /// Creates a server using `factory` to build actors.
    ///
    /// # Errors
    ///
    /// Component registration failure.
    pub fn with_factory(
        config: &ServerConfig,
        channels: ServerChannels,
        factory: Box<dyn ActorFactory>,
    ) -> EcsResult<Self> {
        let mut registry = Registry::new();
        register_components(&mut registry)?;

        #[allow(clippy::cast_precision_loss)]
        let playfield = Playfield::new(config.playfield_width as f32, config.playfield_height as f32);

        Ok(Self {
            registry,
            sessions: SessionTable::new(config.max_players),
            channels,
            factory,
            synchronizer: ServerSynchronizer::new(),
            writer: PacketWriter::new(),
            shooters: Vec::new(),
            hit_buffers: HitBuffers::new(),
            playfield,
            max_players: config.max_players,
            timeout_ticks: config.timeout_ticks(),
            dt: config.tick_duration().as_secs_f32(),
            tick_rate: config.tick_rate,
            tick: 0,
            stats: ServerStats::default(),
        })
    }

    /// Current tick number.
    #[inline]
    #[must_use]
    pub const fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Server registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Server registry, mutably (spawning scenery, tests).
    #[inline]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Connected players.
    #[inline]
    #[must_use]
    pub const fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Number of connected players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.sessions.len()
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Spawns a replicated actor from the factory.
    ///
    /// Returns `None` for an unknown tag.
    ///
    /// # Errors
    ///
    /// Registry failure; the half-built entity is killed.
    pub fn spawn_actor(&mut self, tag: &str, transform: Transform) -> EcsResult<Option<Entity>> {
        let Some(set) = self.factory.build(tag) else {
            tracing::warn!(tag, "unknown actor tag");
            return Ok(None);
        };
        let entity = self.registry.spawn_entity();
        let built = set
            .with(transform)
            .insert_into(&mut self.registry, entity)
            .and_then(|()| self.synchronizer.assign(&mut self.registry, entity));
        if let Err(err) = built {
            self.registry.kill_entity(entity);
            return Err(err);
        }
        Ok(Some(entity))
    }

    /// Runs one simulation step.
    ///
    /// # Errors
    ///
    /// Registry contract violations (an unregistered component), which
    /// indicate a bug rather than bad input.
    pub fn tick(&mut self) -> EcsResult<()> {
        self.process_session_events()?;
        self.process_inputs()?;

        systems::apply_input(&mut self.registry)?;
        systems::fire_weapons(&mut self.registry, self.dt, &mut self.shooters)?;
        self.spawn_shots()?;
        systems::integrate(&mut self.registry, self.dt)?;
        systems::clamp_players(&mut self.registry, self.playfield)?;
        let destroyed = systems::resolve_hits(&mut self.registry, &mut self.hit_buffers)?;
        let despawned = systems::despawn_offscreen(&mut self.registry, self.playfield, &mut self.hit_buffers)?;
        self.stats.destroyed += destroyed as u64;
        self.stats.despawned += despawned as u64;

        self.check_timeouts();
        self.broadcast_snapshot()?;

        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }

    /// Ticks at the configured rate until `stop` is set.
    ///
    /// # Errors
    ///
    /// The first error returned by [`GameServer::tick`].
    pub fn run(&mut self, stop: &AtomicBool) -> EcsResult<()> {
        let mut tick_loop = TickLoop::new(self.tick_rate);
        let mut last_status = Instant::now();
        tracing::info!(tick_rate = self.tick_rate, max_players = self.max_players, "simulation started");

        while !stop.load(Ordering::Relaxed) {
            while tick_loop.should_tick() {
                let start = tick_loop.begin_tick();
                self.tick()?;
                tick_loop.end_tick(start);
            }
            if last_status.elapsed() >= STATUS_INTERVAL {
                self.log_status(tick_loop.stats());
                tick_loop.reset_stats();
                last_status = Instant::now();
            }
            tick_loop.wait_for_next_tick();
        }

        tracing::info!(tick = self.tick, "simulation stopped");
        Ok(())
    }

    /// Writes one status line.
    pub fn log_status(&self, tick_stats: &TickStats) {
        tracing::info!(
            tick = self.tick,
            players = self.sessions.len(),
            entities = self.registry.alive_count(),
            avg_tick_us = tick_stats.avg_tick_us,
            max_tick_us = tick_stats.max_tick_us,
            late_ticks = tick_stats.late_ticks,
            skipped_ticks = tick_stats.skipped_ticks,
            inputs = self.stats.inputs_applied,
            rejected = self.stats.inputs_rejected,
            shots = self.stats.shots_fired,
            destroyed = self.stats.destroyed,
            "server status"
        );
    }

    fn spawn_point(&self, player_id: u8) -> Transform {
        let lanes = f32::from(self.max_players) + 1.0;
        Transform::at(SPAWN_X, self.playfield.height * f32::from(player_id) / lanes)
    }

    fn process_session_events(&mut self) -> EcsResult<()> {
        loop {
            let event = match self.channels.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    tracing::trace!("session event channel closed");
                    return Ok(());
                }
            };
            match event {
                SessionEvent::Joined {
                    player_id,
                    username,
                    addr,
                } => self.on_joined(player_id, username, addr)?,
                SessionEvent::Left { player_id } => self.on_left(player_id),
            }
        }
    }

    fn on_joined(&mut self, player_id: u8, username: String, addr: std::net::SocketAddr) -> EcsResult<()> {
        // A stale entry means the previous owner's Left was lost.
        self.on_left(player_id);

        let spawn = self.spawn_point(player_id);
        let Some(entity) = spawn_player(&mut self.registry, self.factory.as_ref(), player_id, spawn)? else {
            tracing::error!(player_id, "actor factory has no player actor");
            self.kick(player_id);
            return Ok(());
        };
        let network_id = self.synchronizer.assign(&mut self.registry, entity)?;

        let inserted = self.sessions.insert(Session {
            player_id,
            username,
            entity,
            control_addr: addr,
            udp_addr: None,
            last_input_tick: self.tick,
            connected: true,
        });
        if !inserted {
            tracing::error!(player_id, "player id outside the session table");
            self.registry.kill_entity(entity);
            self.kick(player_id);
            return Ok(());
        }
        tracing::info!(player_id, %entity, network_id = network_id.0, "player spawned");
        Ok(())
    }

    fn on_left(&mut self, player_id: u8) {
        if let Some(session) = self.sessions.remove(player_id) {
            self.registry.kill_entity(session.entity);
            tracing::info!(player_id, username = %session.username, "player despawned");
        }
    }

    fn spawn_shots(&mut self) -> EcsResult<()> {
        let mut shooters = std::mem::take(&mut self.shooters);
        let result = shooters.iter().try_for_each(|&ship| self.spawn_shot(ship));
        shooters.clear();
        self.shooters = shooters;
        result
    }

    fn spawn_shot(&mut self, ship: Entity) -> EcsResult<()> {
        let muzzle = self.registry.get_component::<Transform>(ship)?.position();
        let owner = self.registry.try_get::<PlayerControlled>(ship).map(|p| p.player_id);
        let Some(bullet) = self.spawn_actor("projectile", Transform::at(muzzle.x, muzzle.y))? else {
            return Ok(());
        };
        let direction = if owner.is_some() { 1.0 } else { -1.0 };
        self.registry
            .add_component(bullet, Velocity::new(direction * systems::PROJECTILE_SPEED, 0.0))?;
        self.registry.add_component(
            bullet,
            Projectile {
                damage: systems::PROJECTILE_DAMAGE,
                owner,
            },
        )?;
        self.stats.shots_fired += 1;
        tracing::trace!(?owner, %bullet, "shot fired");
        Ok(())
    }

    fn process_inputs(&mut self) -> EcsResult<()> {
        while let Some(InboundInput { input, from }) = self.channels.inputs.pop() {
            let entity = match self.sessions.accept_input(input.player_id, from, self.tick) {
                Ok(session) if self.registry.is_alive(session.entity) => session.entity,
                Ok(_) => {
                    self.stats.inputs_rejected += 1;
                    tracing::trace!(player_id = input.player_id, "input for a destroyed ship");
                    continue;
                }
                Err(reason) => {
                    self.stats.inputs_rejected += 1;
                    tracing::trace!(player_id = input.player_id, %from, ?reason, "input ignored");
                    continue;
                }
            };
            self.registry.add_component(entity, input.input.to_state())?;
            self.stats.inputs_applied += 1;
        }
        Ok(())
    }

    fn check_timeouts(&mut self) {
        let expired: Vec<u8> = self.sessions.timed_out(self.tick, self.timeout_ticks).collect();
        for player_id in expired {
            if !self.kick(player_id) {
                // Retried next tick.
                continue;
            }
            if let Some(session) = self.sessions.get_mut(player_id) {
                session.connected = false;
            }
            self.stats.timeouts += 1;
            tracing::warn!(player_id, timeout_ticks = self.timeout_ticks, "player timed out");
        }
    }

    fn kick(&self, player_id: u8) -> bool {
        self.channels
            .commands
            .try_send(ServerCommand::Kick { player_id })
            .is_ok()
    }

    fn broadcast_snapshot(&mut self) -> EcsResult<()> {
        if self.sessions.iter().all(|s| s.udp_addr.is_none()) {
            return Ok(());
        }

        let snapshot = self.synchronizer.build_snapshot(&self.registry, self.tick)?;
        if let Err(err) = self.writer.encode_snapshot(&snapshot) {
            tracing::warn!(tick = self.tick, error = %err, "failed to encode snapshot");
            return Ok(());
        }
        let (data, len) = self.writer.to_datagram();

        for addr in self.sessions.iter().filter_map(|s| s.udp_addr) {
            let command = ServerCommand::SendTo { addr, data, len };
            if self.channels.commands.try_send(command).is_ok() {
                self.stats.snapshots_sent += 1;
            } else {
                self.stats.snapshots_dropped += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InputFlags, PlayerInput};
    use starfall_core::sync::{spsc_queue, Producer};
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    struct Harness {
        server: GameServer,
        inputs: Producer<InboundInput>,
        events: crossbeam_channel::Sender<SessionEvent>,
        commands: mpsc::Receiver<ServerCommand>,
    }

    fn harness(config: &ServerConfig) -> Harness {
        let (inputs, input_rx) = spsc_queue(64);
        let (events, event_rx) = crossbeam_channel::bounded(16);
        let (command_tx, commands) = mpsc::channel(64);
        let channels = ServerChannels {
            inputs: input_rx,
            events: event_rx,
            commands: command_tx,
        };
        Harness {
            server: GameServer::new(config, channels).unwrap(),
            inputs,
            events,
            commands,
        }
    }

    fn control_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn udp_addr() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    fn join(h: &Harness, player_id: u8) {
        h.events
            .send(SessionEvent::Joined {
                player_id,
                username: format!("pilot{player_id}"),
                addr: control_addr(),
            })
            .unwrap();
    }

    #[test]
    fn test_join_spawns_player() {
        let mut h = harness(&ServerConfig::default());
        join(&h, 1);
        h.server.tick().unwrap();

        assert_eq!(h.server.player_count(), 1);
        let session = h.server.sessions().get(1).unwrap();
        assert_eq!(session.username, "pilot1");
        let registry = h.server.registry();
        assert_eq!(registry.component::<EntityKind>(session.entity), &EntityKind::Player);
        assert_eq!(registry.component::<PlayerControlled>(session.entity).player_id, 1);
        assert!(registry.has_component::<NetworkId>(session.entity));
        // No endpoint known yet, so nothing is sent.
        assert!(h.commands.try_recv().is_err());
    }

    #[test]
    fn test_input_moves_player_and_snapshot_is_sent() {
        let mut h = harness(&ServerConfig::default());
        join(&h, 1);
        h.server.tick().unwrap();
        let entity = h.server.sessions().get(1).unwrap().entity;
        let x_before = h.server.registry().component::<Transform>(entity).x;

        assert!(h.inputs.push(InboundInput {
            input: PlayerInput {
                player_id: 1,
                input: InputFlags(InputFlags::RIGHT),
            },
            from: udp_addr(),
        }));
        h.server.tick().unwrap();

        assert_eq!(h.server.stats().inputs_applied, 1);
        assert!(h.server.registry().component::<Transform>(entity).x > x_before);
        match h.commands.try_recv() {
            Ok(ServerCommand::SendTo { addr, data, len }) => {
                assert_eq!(addr, udp_addr());
                let snapshot = crate::protocol::decode_snapshot(&data[..len]).unwrap();
                assert_eq!(snapshot.tick, 1);
                assert_eq!(snapshot.records().len(), 1);
            }
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_input_from_unknown_player_is_ignored() {
        let mut h = harness(&ServerConfig::default());
        h.inputs.push(InboundInput {
            input: PlayerInput {
                player_id: 3,
                input: InputFlags(InputFlags::UP),
            },
            from: udp_addr(),
        });
        h.server.tick().unwrap();
        assert_eq!(h.server.stats().inputs_rejected, 1);
        assert_eq!(h.server.registry().alive_count(), 0);
    }

    #[test]
    fn test_leave_despawns_player() {
        let mut h = harness(&ServerConfig::default());
        join(&h, 2);
        h.server.tick().unwrap();
        let entity = h.server.sessions().get(2).unwrap().entity;

        h.events.send(SessionEvent::Left { player_id: 2 }).unwrap();
        h.server.tick().unwrap();
        assert_eq!(h.server.player_count(), 0);
        assert!(!h.server.registry().is_alive(entity));
    }

    #[test]
    fn test_silent_player_is_kicked_once() {
        let config = ServerConfig {
            tick_rate: 10,
            player_timeout_ms: 300,
            ..ServerConfig::default()
        };
        let mut h = harness(&config);
        join(&h, 1);
        for _ in 0..5 {
            h.server.tick().unwrap();
        }

        assert!(matches!(h.commands.try_recv(), Ok(ServerCommand::Kick { player_id: 1 })));
        assert!(h.commands.try_recv().is_err());
        assert_eq!(h.server.stats().timeouts, 1);
        assert_eq!(h.server.player_count(), 0);
    }

    #[test]
    fn test_spawn_actor_is_replicated() {
        let mut h = harness(&ServerConfig::default());
        let enemy = h.server.spawn_actor("enemy", Transform::at(500.0, 500.0)).unwrap().unwrap();
        assert!(h.server.registry().has_component::<NetworkId>(enemy));
        assert!(h.server.spawn_actor("dragon", Transform::default()).unwrap().is_none());
    }

    #[test]
    fn test_shot_damages_enemy_in_front() {
        let mut h = harness(&ServerConfig::default());
        join(&h, 1);
        h.server.tick().unwrap();
        let ship = h.server.sessions().get(1).unwrap().entity;
        let muzzle = h.server.registry().component::<Transform>(ship).position();
        let enemy = h
            .server
            .spawn_actor("enemy", Transform::at(muzzle.x + 100.0, muzzle.y))
            .unwrap()
            .unwrap();

        assert!(h.inputs.push(InboundInput {
            input: PlayerInput {
                player_id: 1,
                input: InputFlags(InputFlags::SHOOT),
            },
            from: udp_addr(),
        }));
        for _ in 0..30 {
            h.server.tick().unwrap();
            if h.server.registry().component::<Health>(enemy).current < 30 {
                break;
            }
        }

        // Holding the button fires once.
        assert_eq!(h.server.stats().shots_fired, 1);
        assert_eq!(h.server.registry().component::<Health>(enemy).current, 30 - systems::PROJECTILE_DAMAGE);
        assert_eq!(h.server.stats().destroyed, 1);
        assert!(h.server.registry().query::<(Projectile,)>().unwrap().next().is_none());
    }

    #[test]
    fn test_offscreen_enemy_is_despawned() {
        let mut h = harness(&ServerConfig::default());
        let lost = h.server.spawn_actor("enemy", Transform::at(-1000.0, 10.0)).unwrap().unwrap();
        let kept = h.server.spawn_actor("enemy", Transform::at(10.0, 10.0)).unwrap().unwrap();
        h.server.tick().unwrap();

        assert!(!h.server.registry().is_alive(lost));
        assert!(h.server.registry().is_alive(kept));
        assert_eq!(h.server.stats().despawned, 1);
    }
}
