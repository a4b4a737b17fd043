//! # Configuration
//!
//! Plain values loaded once at startup and passed into constructors.
//!
//! ```toml
//! # server.toml
//! bind_address = "0.0.0.0"
//! tcp_port = 50000
//! udp_port = 50000
//! tick_rate = 60
//! max_players = 4
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use crate::error::ConfigError;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default TCP control port.
pub const DEFAULT_TCP_PORT: u16 = 50_000;
/// Default UDP gameplay port.
pub const DEFAULT_UDP_PORT: u16 = 50_000;
/// Default simulation rate.
pub const DEFAULT_TICK_RATE: u32 = 60;
/// Default player cap.
pub const DEFAULT_MAX_PLAYERS: u8 = 4;
/// Server-side input queue capacity.
pub const DEFAULT_INPUT_QUEUE: usize = 4096;
/// Client-side snapshot queue capacity.
pub const DEFAULT_SNAPSHOT_QUEUE: usize = 256;
/// Silence after which a player is dropped.
pub const DEFAULT_PLAYER_TIMEOUT_MS: u64 = 5_000;
/// Time allowed for the TCP handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;
/// Default replica staleness limit, in server ticks.
pub const DEFAULT_REPLICA_TIMEOUT_TICKS: u32 = 10;

/// Reads and parses a TOML file.
fn load_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_port(field: &'static str, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(invalid(field, "port must be non-zero"));
    }
    Ok(())
}

fn check_tick_rate(tick_rate: u32) -> Result<(), ConfigError> {
    if !(1..=1000).contains(&tick_rate) {
        return Err(invalid("tick_rate", format!("{tick_rate} is outside 1..=1000")));
    }
    Ok(())
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address both sockets bind to.
    pub bind_address: IpAddr,
    /// TCP control port.
    pub tcp_port: u16,
    /// UDP gameplay port.
    pub udp_port: u16,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Maximum simultaneous players (ids 1..=max).
    pub max_players: u8,
    /// Capacity of the inbound input queue.
    pub input_queue_capacity: usize,
    /// Milliseconds without input before a player is dropped.
    pub player_timeout_ms: u64,
    /// Milliseconds a new connection has to send its join request.
    pub handshake_timeout_ms: u64,
    /// Width of the playfield players are clamped to.
    pub playfield_width: u32,
    /// Height of the playfield players are clamped to.
    pub playfield_height: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            max_players: DEFAULT_MAX_PLAYERS,
            input_queue_capacity: DEFAULT_INPUT_QUEUE,
            player_timeout_ms: DEFAULT_PLAYER_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            playfield_width: 1920,
            playfield_height: 1080,
        }
    }
}

impl ServerConfig {
    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Read, parse or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    ///
    /// Port 0 is accepted here and asks the OS for an ephemeral port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_tick_rate(self.tick_rate)?;
        if self.max_players == 0 {
            return Err(invalid("max_players", "at least one player slot is required"));
        }
        if self.input_queue_capacity == 0 {
            return Err(invalid("input_queue_capacity", "capacity must be non-zero"));
        }
        if self.player_timeout_ms == 0 {
            return Err(invalid("player_timeout_ms", "timeout must be non-zero"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(invalid("handshake_timeout_ms", "timeout must be non-zero"));
        }
        if self.playfield_width == 0 || self.playfield_height == 0 {
            return Err(invalid("playfield_width", "playfield must have a non-zero size"));
        }
        Ok(())
    }

    /// TCP listen address.
    #[must_use]
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.tcp_port)
    }

    /// UDP bind address.
    #[must_use]
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.udp_port)
    }

    /// Duration of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }

    /// Player timeout expressed in ticks (at least one).
    #[must_use]
    pub fn timeout_ticks(&self) -> u32 {
        let ticks = self.player_timeout_ms.saturating_mul(u64::from(self.tick_rate)) / 1000;
        u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server address.
    pub server_address: IpAddr,
    /// Server TCP control port.
    pub tcp_port: u16,
    /// Server UDP gameplay port.
    pub udp_port: u16,
    /// Local simulation ticks per second.
    pub tick_rate: u32,
    /// Capacity of the inbound snapshot queue.
    pub snapshot_queue_capacity: usize,
    /// Milliseconds allowed for connect + `CONNECT_ACK`.
    pub handshake_timeout_ms: u64,
    /// Server ticks a replica may go unrefreshed before it is despawned,
    /// per round-robin pass over the world.
    pub replica_timeout_ticks: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            snapshot_queue_capacity: DEFAULT_SNAPSHOT_QUEUE,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            replica_timeout_ticks: DEFAULT_REPLICA_TIMEOUT_TICKS,
        }
    }
}

impl ClientConfig {
    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Read, parse or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_port("tcp_port", self.tcp_port)?;
        check_port("udp_port", self.udp_port)?;
        check_tick_rate(self.tick_rate)?;
        if self.snapshot_queue_capacity == 0 {
            return Err(invalid("snapshot_queue_capacity", "capacity must be non-zero"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(invalid("handshake_timeout_ms", "timeout must be non-zero"));
        }
        if self.replica_timeout_ticks == 0 {
            return Err(invalid("replica_timeout_ticks", "timeout must be non-zero"));
        }
        Ok(())
    }

    /// Server TCP address.
    #[must_use]
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.tcp_port)
    }

    /// Server UDP address.
    #[must_use]
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.udp_port)
    }

    /// Duration of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let server = ServerConfig::default();
        server.validate().unwrap();
        assert_eq!(server.tcp_port, 50_000);
        assert_eq!(server.udp_port, 50_000);
        assert_eq!(server.max_players, 4);
        assert_eq!(server.timeout_ticks(), 300);
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let server: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(server, ServerConfig::default());
        let client: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(client, ClientConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let server: ServerConfig = toml::from_str(
            r#"
            bind_address = "127.0.0.1"
            tcp_port = 4242
            max_players = 2
            "#,
        )
        .unwrap();
        assert_eq!(server.tcp_addr(), "127.0.0.1:4242".parse().unwrap());
        assert_eq!(server.udp_port, DEFAULT_UDP_PORT);
        assert_eq!(server.max_players, 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<ServerConfig>("tcp_prot = 1").is_err());
    }

    #[test]
    fn test_invalid_values() {
        let zero_port = ClientConfig {
            udp_port: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(
            zero_port.validate(),
            Err(ConfigError::Invalid { field: "udp_port", .. })
        ));

        let fast = ClientConfig {
            tick_rate: 5000,
            ..ClientConfig::default()
        };
        assert!(matches!(
            fast.validate(),
            Err(ConfigError::Invalid { field: "tick_rate", .. })
        ));

        let nobody = ServerConfig {
            max_players: 0,
            ..ServerConfig::default()
        };
        assert!(nobody.validate().is_err());
    }

    #[test]
    fn test_server_accepts_ephemeral_ports() {
        let server = ServerConfig {
            tcp_port: 0,
            udp_port: 0,
            ..ServerConfig::default()
        };
        server.validate().unwrap();
    }

    #[test]
    fn test_shipped_configs_match_defaults() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config");
        assert_eq!(ServerConfig::load(format!("{dir}/server.toml")).unwrap(), ServerConfig::default());
        assert_eq!(ClientConfig::load(format!("{dir}/client.toml")).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_zero_replica_timeout_rejected() {
        let config = ClientConfig {
            replica_timeout_ticks: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
