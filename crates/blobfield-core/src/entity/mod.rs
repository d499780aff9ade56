//! World entities.
//!
//! - [`EntityId`]: unique, never reused identifier
//! - [`EntityKind`]: closed set of entity categories
//! - [`EntityState`]: position, size, change flags and the kind-specific [`Body`]
//! - [`Entity`]: the shared handle stored in the live collection and the index
//!
//! Entities are shared as `Arc<Entity>` between the live collection, the
//! quadtree, player sessions and the staging buffers. Mutable state sits
//! behind a lock; the deletion flag is atomic and monotonic.

pub mod components;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use glam::Vec2;
use parking_lot::{Mutex, MutexGuard};
use quadrant::{NodeId, SpatialElement};
use serde::{Deserialize, Serialize};

pub use components::{BallBody, Body, Color, ProjectileBody};

use crate::network::ConnectionId;

/// Unique identifier for an entity.
///
/// Ids are handed out by the gamefield in increasing order and never reused,
/// so ordering by id is ordering by creation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new `EntityId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Entity category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Player-controlled ball
    Ball,
    /// Mass ejected by a ball
    Projectile,
    /// Static hazard
    Obstacle,
    /// Food
    Consumable,
    /// Bonus food
    Pickup,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ball => write!(f, "Ball"),
            Self::Projectile => write!(f, "Projectile"),
            Self::Obstacle => write!(f, "Obstacle"),
            Self::Consumable => write!(f, "Consumable"),
            Self::Pickup => write!(f, "Pickup"),
        }
    }
}

impl Body {
    /// Returns the kind this body belongs to.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Ball(_) => EntityKind::Ball,
            Self::Projectile(_) => EntityKind::Projectile,
            Self::Obstacle => EntityKind::Obstacle,
            Self::Consumable => EntityKind::Consumable,
            Self::Pickup => EntityKind::Pickup,
        }
    }
}

bitflags! {
    /// What changed on an entity since it was last broadcast.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ChangeFlags: u8 {
        /// Position moved
        const POSITION = 1;
        /// Size changed
        const SIZE = 1 << 1;
    }
}

/// Mutable entity state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    /// World position
    pub position: Vec2,
    /// Bounding radius
    pub size: f32,
    /// Changes not yet reported
    pub changes: ChangeFlags,
    /// Kind-specific state
    pub body: Body,
}

impl EntityState {
    /// Move the entity, flagging the change if the position differs.
    pub fn move_to(&mut self, position: Vec2) {
        if position != self.position {
            self.position = position;
            self.changes |= ChangeFlags::POSITION;
        }
    }

    /// Resize the entity, flagging the change if the size differs.
    pub fn resize(&mut self, size: f32) {
        if size != self.size {
            self.size = size;
            self.changes |= ChangeFlags::SIZE;
        }
    }
}

/// A world entity.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    deleted: AtomicBool,
    region: Mutex<Option<NodeId>>,
    state: Mutex<EntityState>,
}

impl Entity {
    /// Creates a live, unindexed entity.
    #[must_use]
    pub fn new(id: EntityId, position: Vec2, size: f32, body: Body) -> Self {
        Self {
            id,
            kind: body.kind(),
            deleted: AtomicBool::new(false),
            region: Mutex::new(None),
            state: Mutex::new(EntityState {
                position,
                size,
                changes: ChangeFlags::empty(),
                body,
            }),
        }
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Whether `destroy` has been called on this entity.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Set the deletion flag. Returns true if it was already set.
    pub(crate) fn mark_deleted(&self) -> bool {
        self.deleted.swap(true, Ordering::AcqRel)
    }

    /// Lock the mutable state.
    pub fn state(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock()
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.state.lock().position
    }

    /// Current size.
    #[must_use]
    pub fn size(&self) -> f32 {
        self.state.lock().size
    }

    /// Player session the entity belongs to.
    #[must_use]
    pub fn owner(&self) -> Option<ConnectionId> {
        self.state.lock().body.owner()
    }

    /// Report and clear the pending change flags.
    pub fn take_changes(&self) -> ChangeFlags {
        std::mem::take(&mut self.state.lock().changes)
    }

    /// Client-facing view of the entity.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        let state = self.state.lock();
        EntitySnapshot {
            id: self.id,
            kind: self.kind,
            x: state.position.x,
            y: state.position.y,
            size: state.size,
            color: state.body.color(),
            owner: state.body.owner(),
        }
    }
}

impl SpatialElement for Entity {
    fn element_id(&self) -> u64 {
        self.id.as_u64()
    }

    fn position(&self) -> Vec2 {
        Entity::position(self)
    }

    fn size(&self) -> f32 {
        Entity::size(self)
    }

    fn is_deleted(&self) -> bool {
        Entity::is_deleted(self)
    }

    fn region(&self) -> Option<NodeId> {
        *self.region.lock()
    }

    fn set_region(&self, region: Option<NodeId>) {
        *self.region.lock() = region;
    }
}

/// Serialisable view of an entity sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity id
    pub id: EntityId,
    /// Entity kind
    pub kind: EntityKind,
    /// Position x
    pub x: f32,
    /// Position y
    pub y: f32,
    /// Bounding radius
    pub size: f32,
    /// Colour, for balls and projectiles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Owning player, for balls and projectiles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ConnectionId>,
}
