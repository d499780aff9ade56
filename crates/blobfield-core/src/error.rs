//! Error types for the gamefield.

use std::path::PathBuf;

use quadrant::QuadtreeError;
use thiserror::Error;

use crate::entity::EntityId;
use crate::network::ConnectionId;

/// Errors reported by [`Gamefield`](crate::Gamefield) operations.
#[derive(Debug, Error)]
pub enum GamefieldError {
    /// `destroy` was called on an entity that is already deleted.
    #[error("entity {0} was destroyed twice")]
    DoubleDestroy(EntityId),

    /// The spatial index rejected an operation.
    #[error(transparent)]
    Index(#[from] QuadtreeError),

    /// A message arrived for a connection that never joined.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// A player action arrived before the connection started a session.
    #[error("connection {0} has no player session")]
    NoSession(ConnectionId),

    /// Options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Options file could not be read.
    #[error("failed to read options from {path}: {source}")]
    OptionsIo {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Options JSON could not be parsed.
    #[error("failed to parse options: {0}")]
    OptionsParse(#[from] serde_json::Error),

    /// The tick loop thread could not be started.
    #[error("failed to spawn the tick loop thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result alias for gamefield operations.
pub type GamefieldResult<T> = Result<T, GamefieldError>;
