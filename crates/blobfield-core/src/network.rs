//! Interfaces to the transport layer.
//!
//! The gamefield never touches sockets. A transport registers each client as a
//! [`ClientConnection`], feeds decoded [`ClientMessage`]s to
//! [`Gamefield::on_message`](crate::Gamefield::on_message), and encodes the
//! [`ServerMessage`]s handed to [`ClientConnection::emit`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntitySnapshot};
use crate::telemetry::StatsReport;

/// Identity of a client connection.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a `ConnectionId` from a transport-assigned value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected client.
///
/// `emit` is called from the simulation thread while gamefield locks are held;
/// implementations must queue the message and return without calling back
/// into the gamefield.
pub trait ClientConnection: Send + Sync {
    /// Connection identity.
    fn id(&self) -> ConnectionId;

    /// Deliver a message to the client.
    fn emit(&self, message: &ServerMessage);
}

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start playing under a display name
    Start {
        /// Display name
        name: String,
    },
    /// Stop playing; the connection stays open
    Leave,
    /// Ask for a [`ServerMessage::Stats`] report
    GetStats,
    /// Move the steering target
    Pointer {
        /// Target x
        x: f32,
        /// Target y
        y: f32,
    },
    /// Eject mass toward the pointer
    Shoot,
}

/// Messages the gamefield sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Complete live set
    SetElements {
        /// Every live entity
        elements: Vec<EntitySnapshot>,
    },
    /// Incremental diff since the last broadcast
    UpdateElements {
        /// Entities indexed this tick
        added: Vec<EntitySnapshot>,
        /// Entities destroyed since the last broadcast
        removed: Vec<EntityId>,
        /// Entities that moved or resized
        changed: Vec<EntitySnapshot>,
    },
    /// The session is live
    Started,
    /// The balls the receiving player controls
    PlayerBalls {
        /// Ball ids
        balls: Vec<EntityId>,
    },
    /// Timing and population report
    Stats(StatsReport),
}
