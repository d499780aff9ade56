//! # Blobfield Core
//!
//! Tick-driven simulation core for the Blobfield arena server.
//!
//! A [`Gamefield`] owns the authoritative entity collection and a
//! [`quadrant::Quadtree`] over it, and advances both at a fixed rate on a
//! dedicated loop thread. Everything that happens off that thread (players
//! joining, shooting, entities being created or destroyed) goes through
//! staging buffers that the tick drains in bulk, so the index only ever
//! changes on the simulation thread.
//!
//! ## Tick phases
//!
//! 1. **Update**: advance every live entity, re-home those that moved
//! 2. **Drain new**: index and publish staged creations
//! 3. **Collide**: scan the index, let the gameplay rules decide who eats whom
//! 4. **Players**: steer every player's balls toward their pointer
//! 5. **Spawn**: top up consumables, obstacles and pickups
//! 6. **Drain deleted**: collect staged destructions
//! 7. **Broadcast**: full snapshot on an interval, otherwise an incremental diff
//! 8. **Teardown**: physically remove destroyed entities
//! 9. **Telemetry**: record phase durations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use blobfield_core::{Gamefield, GamefieldOptions};
//!
//! let field = Gamefield::new(GamefieldOptions::from_path("arena.json")?)?;
//! field.on_join(connection)?;
//! field.on_message(id, ClientMessage::Start { name: "blob".into() })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export quadrant for spatial queries
pub use quadrant;

pub mod entity;
pub mod error;
pub mod gamefield;
pub mod network;
pub mod options;
pub mod player;
pub mod rules;
pub mod spawn;
pub mod staging;
pub mod telemetry;

mod run_loop;

pub use entity::{ChangeFlags, Color, Entity, EntityId, EntityKind, EntitySnapshot, EntityState};
pub use error::{GamefieldError, GamefieldResult};
pub use gamefield::{BroadcastKind, Gamefield, TickReport};
pub use network::{ClientConnection, ClientMessage, ConnectionId, ServerMessage};
pub use options::{CollisionStrategy, GameplayOptions, GamefieldOptions, PlayerOptions, SpawnOptions};
pub use player::Player;
pub use spawn::SpawnCategory;
pub use telemetry::{StatsReport, TickTiming};

#[cfg(test)]
mod tests;
