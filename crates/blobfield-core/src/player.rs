//! Player sessions.

use std::sync::Arc;

use glam::Vec2;

use crate::entity::{Color, Entity, EntityId};
use crate::network::ConnectionId;

/// A started player session.
///
/// The session holds shares of its balls; the gamefield detaches a ball when
/// it is destroyed.
#[derive(Debug)]
pub struct Player {
    connection: ConnectionId,
    name: String,
    color: Color,
    pointer: Vec2,
    balls: Vec<Arc<Entity>>,
}

impl Player {
    /// Create a session with no balls.
    #[must_use]
    pub fn new(connection: ConnectionId, name: impl Into<String>, color: Color, pointer: Vec2) -> Self {
        Self {
            connection,
            name: name.into(),
            color,
            pointer,
            balls: Vec::new(),
        }
    }

    /// Owning connection.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Player colour.
    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    /// Current steering target.
    #[must_use]
    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    /// Move the steering target.
    pub fn set_pointer(&mut self, pointer: Vec2) {
        self.pointer = pointer;
    }

    /// Balls this player controls.
    #[must_use]
    pub fn balls(&self) -> &[Arc<Entity>] {
        &self.balls
    }

    /// Ids of the controlled balls.
    #[must_use]
    pub fn ball_ids(&self) -> Vec<EntityId> {
        self.balls.iter().map(|ball| ball.id()).collect()
    }

    /// Take control of a ball.
    pub fn add_ball(&mut self, ball: Arc<Entity>) {
        self.balls.push(ball);
    }

    /// Release a ball. Returns false if this player did not control it.
    pub fn remove_ball(&mut self, id: EntityId) -> bool {
        let before = self.balls.len();
        self.balls.retain(|ball| ball.id() != id);
        self.balls.len() != before
    }

    /// Release every ball.
    pub fn take_balls(&mut self) -> Vec<Arc<Entity>> {
        std::mem::take(&mut self.balls)
    }

    /// Point every ball at the current pointer.
    pub fn steer(&self) {
        for ball in &self.balls {
            if let Some(body) = ball.state().body.as_ball_mut() {
                body.target = self.pointer;
            }
        }
    }
}
