//! Gamefield configuration.
//!
//! Options are plain `serde` structs. Every field has a default, so a JSON file
//! only needs to name what it changes:
//!
//! ```json
//! { "width": 4000, "height": 4000, "consumable": { "spawn_rate": 25, "max": 600 } }
//! ```

use std::path::Path;

use quadrant::{QuadtreeConfig, Rect};
use serde::{Deserialize, Serialize};

use crate::entity::Color;
use crate::error::{GamefieldError, GamefieldResult};
use crate::spawn::SpawnCategory;

/// Spawn policy for one entity category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnOptions {
    /// Spawns per second while below `max`
    pub spawn_rate: f32,
    /// Target live population
    pub max: u32,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            spawn_rate: 1.0,
            max: 10,
        }
    }
}

impl SpawnOptions {
    /// Create a spawn policy.
    #[must_use]
    pub const fn new(spawn_rate: f32, max: u32) -> Self {
        Self { spawn_rate, max }
    }
}

/// Player cosmetics and ball handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// Colours a new player is randomly given
    pub palette: Vec<Color>,
    /// Size of a freshly started ball
    pub start_size: f32,
    /// Ball speed at `start_size`; larger balls are slower
    pub base_speed: f32,
    /// Balls below this size cannot shoot
    pub min_shoot_size: f32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            palette: vec![
                Color::new(0xe6, 0x39, 0x46),
                Color::new(0x2a, 0x9d, 0x8f),
                Color::new(0xe9, 0xc4, 0x6a),
                Color::new(0x45, 0x7b, 0x9d),
                Color::new(0x9b, 0x5d, 0xe5),
                Color::new(0xf4, 0xa2, 0x61),
            ],
            start_size: 10.0,
            base_speed: 150.0,
            min_shoot_size: 20.0,
        }
    }
}

/// Entity sizes and the tuning of the eat rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayOptions {
    /// Consumable size
    pub consumable_size: f32,
    /// Pickup size
    pub pickup_size: f32,
    /// Obstacle size
    pub obstacle_size: f32,
    /// Projectile size; a shooting ball loses this much area
    pub projectile_size: f32,
    /// Launch speed of a projectile
    pub projectile_speed: f32,
    /// Speed a projectile loses per second
    pub projectile_deceleration: f32,
    /// Seconds a projectile lives
    pub projectile_lifetime: f32,
    /// How many times larger a ball must be to eat another ball or an obstacle
    pub eat_ratio: f32,
    /// Area multiplier applied when a ball eats a pickup
    pub pickup_growth: f32,
    /// Balls stop growing at this size
    pub max_ball_size: f32,
}

impl Default for GameplayOptions {
    fn default() -> Self {
        Self {
            consumable_size: 2.0,
            pickup_size: 4.0,
            obstacle_size: 25.0,
            projectile_size: 5.0,
            projectile_speed: 400.0,
            projectile_deceleration: 300.0,
            projectile_lifetime: 1.5,
            eat_ratio: 1.25,
            pickup_growth: 4.0,
            max_ball_size: 200.0,
        }
    }
}

/// How the tick finds colliding pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionStrategy {
    /// Neighbour-aware quadtree scan
    #[default]
    Quadtree,
    /// Exhaustive pairwise check; diagnostic only
    BruteForce,
}

/// Complete gamefield configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamefieldOptions {
    /// World width
    pub width: f32,
    /// World height
    pub height: f32,
    /// Elements a quadtree leaf holds before splitting
    pub node_capacity: usize,
    /// Deepest quadtree level
    pub max_depth: u8,
    /// Ticks per second
    pub tick_rate: f32,
    /// Seconds between full snapshots
    pub full_snapshot_interval: f32,
    /// Samples kept for the stats averages
    pub telemetry_window: usize,
    /// Consumable spawn policy
    pub consumable: SpawnOptions,
    /// Obstacle spawn policy
    pub obstacle: SpawnOptions,
    /// Pickup spawn policy
    pub pickup: SpawnOptions,
    /// Player options
    pub player: PlayerOptions,
    /// Gameplay tuning
    pub gameplay: GameplayOptions,
    /// Collision pair search
    pub collision_strategy: CollisionStrategy,
    /// RNG seed; drawn from the OS when absent
    pub seed: Option<u64>,
    /// Abort on caller-contract violations instead of only logging them
    pub strict_invariants: bool,
    /// Start the tick loop when a client joins; turn off to drive `tick` by hand
    pub autostart: bool,
}

impl Default for GamefieldOptions {
    fn default() -> Self {
        Self {
            width: 2000.0,
            height: 2000.0,
            node_capacity: 8,
            max_depth: 10,
            tick_rate: 30.0,
            full_snapshot_interval: 1.0,
            telemetry_window: 60,
            consumable: SpawnOptions::new(10.0, 200),
            obstacle: SpawnOptions::new(0.5, 10),
            pickup: SpawnOptions::new(0.2, 5),
            player: PlayerOptions::default(),
            gameplay: GameplayOptions::default(),
            collision_strategy: CollisionStrategy::default(),
            seed: None,
            strict_invariants: cfg!(debug_assertions),
            autostart: true,
        }
    }
}

impl GamefieldOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::OptionsParse`] for malformed JSON and
    /// [`GamefieldError::InvalidOptions`] if the result fails validation.
    pub fn from_json_str(json: &str) -> GamefieldResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::OptionsIo`] if the file cannot be read, and
    /// the errors of [`Self::from_json_str`] otherwise.
    pub fn from_path(path: impl AsRef<Path>) -> GamefieldResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| GamefieldError::OptionsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// World bounds.
    #[must_use]
    pub fn world(&self) -> Rect {
        Rect::world(self.width, self.height)
    }

    /// Quadtree configuration derived from these options.
    #[must_use]
    pub fn quadtree_config(&self) -> QuadtreeConfig {
        QuadtreeConfig {
            bounds: self.world(),
            capacity: self.node_capacity,
            max_depth: self.max_depth,
        }
    }

    /// Spawn policy of a category.
    #[must_use]
    pub fn spawn(&self, category: SpawnCategory) -> SpawnOptions {
        match category {
            SpawnCategory::Consumable => self.consumable,
            SpawnCategory::Obstacle => self.obstacle,
            SpawnCategory::Pickup => self.pickup,
        }
    }

    /// Check the options describe a playable world.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::InvalidOptions`] naming the first bad field.
    pub fn validate(&self) -> GamefieldResult<()> {
        self.quadtree_config()
            .validate()
            .map_err(|err| GamefieldError::InvalidOptions(err.to_string()))?;

        let invalid = |message: String| Err(GamefieldError::InvalidOptions(message));
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return invalid(format!("tick_rate must be positive, got {}", self.tick_rate));
        }
        if !(self.full_snapshot_interval.is_finite() && self.full_snapshot_interval > 0.0) {
            return invalid("full_snapshot_interval must be positive".into());
        }
        if self.telemetry_window == 0 {
            return invalid("telemetry_window must be at least 1".into());
        }
        for category in SpawnCategory::ALL {
            let spawn = self.spawn(category);
            if !(spawn.spawn_rate.is_finite() && spawn.spawn_rate >= 0.0) {
                return invalid(format!("{category} spawn_rate must be finite and non-negative"));
            }
        }
        if self.player.palette.is_empty() {
            return invalid("player palette must not be empty".into());
        }

        let world_side = self.width.min(self.height);
        let gameplay = &self.gameplay;
        let sizes = [
            ("player.start_size", self.player.start_size),
            ("gameplay.consumable_size", gameplay.consumable_size),
            ("gameplay.pickup_size", gameplay.pickup_size),
            ("gameplay.obstacle_size", gameplay.obstacle_size),
            ("gameplay.projectile_size", gameplay.projectile_size),
            ("gameplay.max_ball_size", gameplay.max_ball_size),
        ];
        for (name, size) in sizes {
            if !(size.is_finite() && size > 0.0 && size <= world_side) {
                return invalid(format!("{name} must be in (0, {world_side}], got {size}"));
            }
        }
        if gameplay.max_ball_size < self.player.start_size {
            return invalid("gameplay.max_ball_size must be at least player.start_size".into());
        }
        if self.player.min_shoot_size <= gameplay.projectile_size {
            return invalid(format!(
                "player.min_shoot_size must exceed gameplay.projectile_size ({}), got {}",
                gameplay.projectile_size, self.player.min_shoot_size
            ));
        }
        if gameplay.eat_ratio < 1.0 {
            return invalid(format!("gameplay.eat_ratio must be at least 1, got {}", gameplay.eat_ratio));
        }
        Ok(())
    }
}
