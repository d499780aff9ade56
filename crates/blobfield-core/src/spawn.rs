//! Periodic spawn policy.
//!
//! Each category accumulates elapsed time independently. Once its timer passes
//! `1 / spawn_rate` the timer resets, and one entity spawns if the category is
//! below its configured maximum.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Entity categories with a population target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnCategory {
    /// Food
    Consumable,
    /// Static hazards
    Obstacle,
    /// Bonus food
    Pickup,
}

impl SpawnCategory {
    /// All categories in spawn order.
    pub const ALL: [SpawnCategory; 3] = [SpawnCategory::Consumable, SpawnCategory::Obstacle, SpawnCategory::Pickup];

    /// Category of an entity kind, if it has one.
    #[must_use]
    pub const fn of(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Consumable => Some(Self::Consumable),
            EntityKind::Obstacle => Some(Self::Obstacle),
            EntityKind::Pickup => Some(Self::Pickup),
            EntityKind::Ball | EntityKind::Projectile => None,
        }
    }

    /// Entity kind spawned for this category.
    #[must_use]
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::Consumable => EntityKind::Consumable,
            Self::Obstacle => EntityKind::Obstacle,
            Self::Pickup => EntityKind::Pickup,
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SpawnCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consumable => write!(f, "consumable"),
            Self::Obstacle => write!(f, "obstacle"),
            Self::Pickup => write!(f, "pickup"),
        }
    }
}

/// Live population per category.
///
/// Incremented by the factories on any thread, decremented by `destroy`.
#[derive(Debug, Default)]
pub struct CategoryCounters {
    counts: [AtomicU32; 3],
}

impl CategoryCounters {
    /// Current population of a category.
    #[must_use]
    pub fn get(&self, category: SpawnCategory) -> u32 {
        self.counts[category.slot()].load(Ordering::Acquire)
    }

    /// Count one more entity.
    pub fn increment(&self, category: SpawnCategory) {
        self.counts[category.slot()].fetch_add(1, Ordering::AcqRel);
    }

    /// Count one fewer entity. Saturates at zero.
    pub fn decrement(&self, category: SpawnCategory) {
        // Err only when already zero
        let _ = self.counts[category.slot()].fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            count.checked_sub(1)
        });
    }
}

/// Per-category spawn timers. Owned by the simulation thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnTimers {
    elapsed: [f32; 3],
}

impl SpawnTimers {
    /// Advance a category's timer.
    ///
    /// Returns true when the timer passed `1 / spawn_rate`, in which case it is
    /// reset. A zero rate never fires.
    pub fn advance(&mut self, category: SpawnCategory, elapsed: f32, spawn_rate: f32) -> bool {
        let timer = &mut self.elapsed[category.slot()];
        *timer += elapsed;
        if *timer > spawn_rate.recip() {
            *timer = 0.0;
            true
        } else {
            false
        }
    }

    /// Accumulated time of a category.
    #[must_use]
    pub fn elapsed(&self, category: SpawnCategory) -> f32 {
        self.elapsed[category.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_after_period() {
        let mut timers = SpawnTimers::default();
        assert!(!timers.advance(SpawnCategory::Obstacle, 0.25, 2.0));
        assert!(!timers.advance(SpawnCategory::Obstacle, 0.2, 2.0));
        assert!(timers.advance(SpawnCategory::Obstacle, 0.1, 2.0));
        assert_eq!(timers.elapsed(SpawnCategory::Obstacle), 0.0);
        assert_eq!(timers.elapsed(SpawnCategory::Pickup), 0.0);
    }

    #[test]
    fn test_zero_rate_never_fires() {
        let mut timers = SpawnTimers::default();
        for _ in 0..100 {
            assert!(!timers.advance(SpawnCategory::Pickup, 10.0, 0.0));
        }
    }

    #[test]
    fn test_counters_saturate() {
        let counters = CategoryCounters::default();
        counters.increment(SpawnCategory::Consumable);
        counters.decrement(SpawnCategory::Consumable);
        counters.decrement(SpawnCategory::Consumable);
        assert_eq!(counters.get(SpawnCategory::Consumable), 0);
        counters.increment(SpawnCategory::Pickup);
        assert_eq!(counters.get(SpawnCategory::Pickup), 1);
        assert_eq!(counters.get(SpawnCategory::Obstacle), 0);
    }

    #[test]
    fn test_category_kinds() {
        for category in SpawnCategory::ALL {
            assert_eq!(SpawnCategory::of(category.kind()), Some(category));
        }
        assert_eq!(SpawnCategory::of(EntityKind::Ball), None);
    }
}
