//! Per-kind entity state.
//!
//! Each [`EntityKind`](super::EntityKind) carries one body struct holding the
//! state only that kind needs. Position and size live on
//! [`EntityState`](super::EntityState) because every kind has them.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::network::ConnectionId;

/// RGB colour.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub [u8; 3]);

impl Color {
    /// Creates a colour from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({self})")
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// A player-controlled ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallBody {
    /// Owning player session
    pub owner: ConnectionId,
    /// Player colour
    pub color: Color,
    /// Point the ball steers toward
    pub target: Vec2,
}

/// Mass ejected by a ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileBody {
    /// Player that shot it
    pub owner: Option<ConnectionId>,
    /// Colour of the shooter
    pub color: Color,
    /// Unit travel direction
    pub heading: Vec2,
    /// Current speed
    pub speed: f32,
    /// Seconds left before it expires
    pub remaining: f32,
}

/// Kind-specific entity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// Player ball
    Ball(BallBody),
    /// Ejected mass
    Projectile(ProjectileBody),
    /// Static hazard; absorbs projectiles
    Obstacle,
    /// Food
    Consumable,
    /// Bonus food
    Pickup,
}

impl Body {
    /// Returns the ball body, if this is a ball.
    #[must_use]
    pub const fn as_ball(&self) -> Option<&BallBody> {
        match self {
            Self::Ball(ball) => Some(ball),
            _ => None,
        }
    }

    /// Returns a mutable ball body, if this is a ball.
    #[must_use]
    pub fn as_ball_mut(&mut self) -> Option<&mut BallBody> {
        match self {
            Self::Ball(ball) => Some(ball),
            _ => None,
        }
    }

    /// Returns the projectile body, if this is a projectile.
    #[must_use]
    pub const fn as_projectile(&self) -> Option<&ProjectileBody> {
        match self {
            Self::Projectile(projectile) => Some(projectile),
            _ => None,
        }
    }

    /// Colour shown to clients, for kinds that have one.
    #[must_use]
    pub const fn color(&self) -> Option<Color> {
        match self {
            Self::Ball(ball) => Some(ball.color),
            Self::Projectile(projectile) => Some(projectile.color),
            _ => None,
        }
    }

    /// Player session the entity belongs to.
    #[must_use]
    pub const fn owner(&self) -> Option<ConnectionId> {
        match self {
            Self::Ball(ball) => Some(ball.owner),
            Self::Projectile(projectile) => projectile.owner,
            _ => None,
        }
    }
}
