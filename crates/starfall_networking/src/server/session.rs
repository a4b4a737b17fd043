//! # Session Table
//!
//! Per-player state owned by the simulation thread.
//!
//! ## Design
//!
//! - Fixed slots indexed by player id (`1..=max_players`); id 0 is never
//!   handed out and means "unauthenticated"
//! - The UDP endpoint is learned from the first input datagram whose source
//!   IP matches the TCP peer; later datagrams from other endpoints are ignored
//! - Timeouts are measured in ticks since the last accepted input

use starfall_core::Entity;
use std::net::SocketAddr;

/// One connected player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Assigned player id.
    pub player_id: u8,
    /// Username from the join request.
    pub username: String,
    /// Player entity in the server registry.
    pub entity: Entity,
    /// TCP peer address.
    pub control_addr: SocketAddr,
    /// UDP endpoint, once known.
    pub udp_addr: Option<SocketAddr>,
    /// Tick of the last accepted input (join tick until the first one).
    pub last_input_tick: u32,
    /// False once the player left; queued inputs are then ignored.
    pub connected: bool,
}

impl Session {
    /// Ticks since the last accepted input.
    #[inline]
    #[must_use]
    pub const fn idle_ticks(&self, now: u32) -> u32 {
        now.wrapping_sub(self.last_input_tick)
    }
}

/// Why an input datagram was not attributed to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRejection {
    /// No connected session under that player id.
    UnknownPlayer,
    /// Source IP differs from the player's TCP peer.
    ForeignAddress,
    /// Source differs from the endpoint learned earlier.
    EndpointMismatch,
}

/// Fixed-size table of sessions.
#[derive(Debug)]
pub struct SessionTable {
    slots: Vec<Option<Session>>,
}

impl SessionTable {
    /// Creates a table for ids `1..=max_players`.
    #[must_use]
    pub fn new(max_players: u8) -> Self {
        Self {
            slots: vec![None; usize::from(max_players)],
        }
    }

    #[inline]
    fn slot(player_id: u8) -> Option<usize> {
        usize::from(player_id).checked_sub(1)
    }

    /// Registers a player. Returns false if the id is out of range.
    ///
    /// An existing entry under the same id is replaced.
    pub fn insert(&mut self, session: Session) -> bool {
        let Some(slot) = Self::slot(session.player_id).and_then(|i| self.slots.get_mut(i)) else {
            return false;
        };
        *slot = Some(session);
        true
    }

    /// Removes a player, returning its session.
    pub fn remove(&mut self, player_id: u8) -> Option<Session> {
        Self::slot(player_id)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take)
    }

    /// Looks up a player.
    #[must_use]
    pub fn get(&self, player_id: u8) -> Option<&Session> {
        Self::slot(player_id)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    /// Looks up a player mutably.
    pub fn get_mut(&mut self, player_id: u8) -> Option<&mut Session> {
        Self::slot(player_id)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::as_mut)
    }

    /// Attributes an input datagram to its session.
    ///
    /// On success the session's UDP endpoint is learned (first datagram) and
    /// its input age is reset.
    ///
    /// # Errors
    ///
    /// The reason the datagram must be ignored.
    pub fn accept_input(&mut self, player_id: u8, from: SocketAddr, tick: u32) -> Result<&Session, InputRejection> {
        let session = match self.get_mut(player_id) {
            Some(session) if session.connected => session,
            _ => return Err(InputRejection::UnknownPlayer),
        };
        match session.udp_addr {
            Some(known) if known != from => return Err(InputRejection::EndpointMismatch),
            Some(_) => {}
            None => {
                if from.ip() != session.control_addr.ip() {
                    return Err(InputRejection::ForeignAddress);
                }
                session.udp_addr = Some(from);
            }
        }
        session.last_input_tick = tick;
        Ok(session)
    }

    /// Connected sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten().filter(|s| s.connected)
    }

    /// Ids of connected players idle for at least `timeout_ticks`.
    pub fn timed_out(&self, now: u32, timeout_ticks: u32) -> impl Iterator<Item = u8> + '_ {
        self.iter()
            .filter(move |s| s.idle_ticks(now) >= timeout_ticks)
            .map(|s| s.player_id)
    }

    /// Number of connected players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True if nobody is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
