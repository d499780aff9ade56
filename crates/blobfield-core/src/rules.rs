//! Gameplay rules: how entities move and who eats whom.
//!
//! These are the minimal rules of an agar-style arena. They are kept apart
//! from the gamefield so that a different rule set can replace them without
//! touching staging, indexing or broadcasting.

use glam::Vec2;
use quadrant::Rect;

use crate::entity::{Body, Entity, EntityKind, EntityState};
use crate::options::GamefieldOptions;

/// Result of advancing one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The entity's lifetime ran out; the gamefield destroys it.
    pub expired: bool,
}

/// Advance one entity by `elapsed` seconds.
///
/// Balls steer toward their target, slower the larger they are. Projectiles
/// coast along their heading, decelerating until their lifetime runs out.
/// Everything else is static. Positions stay inside `world`.
pub fn update(state: &mut EntityState, elapsed: f32, world: Rect, options: &GamefieldOptions) -> UpdateOutcome {
    match &mut state.body {
        Body::Ball(ball) => {
            let offset = ball.target - state.position;
            let distance = offset.length();
            if distance <= f32::EPSILON {
                return UpdateOutcome::default();
            }
            let speed = options.player.base_speed * (options.player.start_size / state.size).sqrt();
            let step = (speed * elapsed).min(distance);
            let position = clamp_to(world, state.position + offset / distance * step);
            state.move_to(position);
            UpdateOutcome::default()
        }
        Body::Projectile(projectile) => {
            projectile.remaining -= elapsed;
            let travel = projectile.heading * projectile.speed * elapsed;
            projectile.speed = (projectile.speed - options.gameplay.projectile_deceleration * elapsed).max(0.0);
            let expired = projectile.remaining <= 0.0;
            let position = clamp_to(world, state.position + travel);
            state.move_to(position);
            UpdateOutcome { expired }
        }
        Body::Obstacle | Body::Consumable | Body::Pickup => UpdateOutcome::default(),
    }
}

/// Try to have `eater` consume `prey`.
///
/// Returns true if `prey` was eaten; the caller then destroys it. The eater
/// grows by the prey's area (balls only, capped at `max_ball_size`):
///
/// - balls eat consumables, pickups and foreign projectiles smaller than
///   themselves
/// - balls eat foreign balls and obstacles smaller by `eat_ratio`
/// - obstacles absorb projectiles without growing
pub fn try_eat(eater: &Entity, prey: &Entity, options: &GamefieldOptions) -> bool {
    if eater.is_deleted() || prey.is_deleted() || eater.id() == prey.id() {
        return false;
    }
    let gameplay = &options.gameplay;
    let prey_size = prey.size();
    let prey_owner = prey.owner();

    let mut state = eater.state();
    let eater_size = state.size;
    let foreign = prey_owner.is_none() || prey_owner != state.body.owner();

    let growth = match (eater.kind(), prey.kind()) {
        (EntityKind::Ball, EntityKind::Consumable) if eater_size > prey_size => prey_size * prey_size,
        (EntityKind::Ball, EntityKind::Pickup) if eater_size > prey_size => {
            prey_size * prey_size * gameplay.pickup_growth
        }
        (EntityKind::Ball, EntityKind::Projectile) if foreign && eater_size > prey_size => prey_size * prey_size,
        (EntityKind::Ball, EntityKind::Ball | EntityKind::Obstacle)
            if foreign && eater_size >= prey_size * gameplay.eat_ratio =>
        {
            prey_size * prey_size
        }
        (EntityKind::Obstacle, EntityKind::Projectile) => 0.0,
        _ => return false,
    };

    if eater.kind() == EntityKind::Ball && growth > 0.0 {
        let size = (eater_size * eater_size + growth).sqrt().min(gameplay.max_ball_size);
        state.resize(size);
    }
    true
}

/// Pull a point inside `world`.
#[must_use]
pub fn clamp_to(world: Rect, point: Vec2) -> Vec2 {
    point.clamp(world.origin, world.max())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BallBody, Color, EntityId, ProjectileBody};
    use crate::network::ConnectionId;

    fn options() -> GamefieldOptions {
        GamefieldOptions {
            width: 500.0,
            height: 500.0,
            ..Default::default()
        }
    }

    fn ball(id: u64, owner: u64, position: Vec2, size: f32) -> Entity {
        Entity::new(
            EntityId::new(id),
            position,
            size,
            Body::Ball(BallBody {
                owner: ConnectionId::new(owner),
                color: Color::new(1, 2, 3),
                target: position,
            }),
        )
    }

    fn projectile(id: u64, owner: u64, size: f32) -> Entity {
        Entity::new(
            EntityId::new(id),
            Vec2::new(100.0, 100.0),
            size,
            Body::Projectile(ProjectileBody {
                owner: Some(ConnectionId::new(owner)),
                color: Color::new(1, 2, 3),
                heading: Vec2::X,
                speed: 100.0,
                remaining: 0.5,
            }),
        )
    }

    fn plain(id: u64, body: Body, size: f32) -> Entity {
        Entity::new(EntityId::new(id), Vec2::new(100.0, 100.0), size, body)
    }

    #[test]
    fn test_ball_steers_toward_target() {
        let options = options();
        let entity = ball(1, 1, Vec2::new(100.0, 100.0), options.player.start_size);
        entity.state().body.as_ball_mut().unwrap().target = Vec2::new(400.0, 100.0);

        let outcome = update(&mut entity.state(), 0.1, options.world(), &options);
        assert!(!outcome.expired);
        let moved = entity.position();
        assert!((moved.x - (100.0 + options.player.base_speed * 0.1)).abs() < 1e-3);
        assert_eq!(moved.y, 100.0);
        assert!(!entity.take_changes().is_empty());
    }

    #[test]
    fn test_ball_stops_at_target_and_slows_with_size() {
        let options = options();
        let small = ball(1, 1, Vec2::new(100.0, 100.0), 10.0);
        let large = ball(2, 1, Vec2::new(100.0, 100.0), 40.0);
        for entity in [&small, &large] {
            entity.state().body.as_ball_mut().unwrap().target = Vec2::new(110.0, 100.0);
        }
        update(&mut small.state(), 1.0, options.world(), &options);
        update(&mut large.state(), 0.01, options.world(), &options);
        assert_eq!(small.position(), Vec2::new(110.0, 100.0));
        assert!(large.position().x < 101.0);
    }

    #[test]
    fn test_projectile_decelerates_and_expires() {
        let options = options();
        let entity = projectile(1, 1, 5.0);
        let first = update(&mut entity.state(), 0.25, options.world(), &options);
        assert!(!first.expired);
        assert!(entity.position().x > 100.0);

        let second = update(&mut entity.state(), 0.3, options.world(), &options);
        assert!(second.expired);
    }

    #[test]
    fn test_positions_stay_in_world() {
        let options = options();
        let entity = ball(1, 1, Vec2::new(495.0, 5.0), 10.0);
        entity.state().body.as_ball_mut().unwrap().target = Vec2::new(900.0, -300.0);
        update(&mut entity.state(), 10.0, options.world(), &options);
        assert!(options.world().contains(entity.position()));
    }

    #[test]
    fn test_ball_eats_smaller_food() {
        let options = options();
        let eater = ball(1, 1, Vec2::new(100.0, 100.0), 10.0);
        let food = plain(2, Body::Consumable, 2.0);
        assert!(try_eat(&eater, &food, &options));
        assert!((eater.size() - (104.0f32).sqrt()).abs() < 1e-4);
        assert!(!try_eat(&food, &eater, &options));
    }

    #[test]
    fn test_ball_versus_ball_needs_ratio() {
        let options = options();
        let big = ball(1, 1, Vec2::new(100.0, 100.0), 20.0);
        let close = ball(2, 2, Vec2::new(100.0, 100.0), 18.0);
        let small = ball(3, 2, Vec2::new(100.0, 100.0), 10.0);
        let sibling = ball(4, 1, Vec2::new(100.0, 100.0), 5.0);
        assert!(!try_eat(&big, &close, &options));
        assert!(try_eat(&big, &small, &options));
        assert!(!try_eat(&big, &sibling, &options));
    }

    #[test]
    fn test_own_projectiles_are_not_eaten() {
        let options = options();
        let shooter = ball(1, 1, Vec2::new(100.0, 100.0), 20.0);
        let own = projectile(2, 1, 5.0);
        let foreign = projectile(3, 2, 5.0);
        assert!(!try_eat(&shooter, &own, &options));
        assert!(try_eat(&shooter, &foreign, &options));
    }

    #[test]
    fn test_obstacle_absorbs_projectile_without_growing() {
        let options = options();
        let obstacle = plain(1, Body::Obstacle, 25.0);
        let shot = projectile(2, 1, 5.0);
        assert!(try_eat(&obstacle, &shot, &options));
        assert_eq!(obstacle.size(), 25.0);
        assert!(obstacle.take_changes().is_empty());
    }

    #[test]
    fn test_growth_is_capped() {
        let mut options = options();
        options.gameplay.max_ball_size = 12.0;
        let eater = ball(1, 1, Vec2::new(100.0, 100.0), 11.5);
        let pickup = plain(2, Body::Pickup, 4.0);
        assert!(try_eat(&eater, &pickup, &options));
        assert_eq!(eater.size(), 12.0);
    }

    #[test]
    fn test_deleted_entities_are_not_eaten() {
        let options = options();
        let eater = ball(1, 1, Vec2::new(100.0, 100.0), 10.0);
        let food = plain(2, Body::Consumable, 2.0);
        food.mark_deleted();
        assert!(!try_eat(&eater, &food, &options));
    }
}
