//! Rolling tick timing window.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Phase durations of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickTiming {
    /// Entity updates plus draining staged creations
    pub update: Duration,
    /// Collision scan and resolution
    pub collision: Duration,
    /// Everything else: players, spawning, broadcast, teardown
    pub other: Duration,
}

impl TickTiming {
    /// Sum of all phases.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.update + self.collision + self.other
    }
}

/// Bounded window of recent tick timings. The oldest sample is evicted once
/// the window is full.
#[derive(Debug, Clone)]
pub struct TickTelemetry {
    window: usize,
    samples: VecDeque<TickTiming>,
}

impl TickTelemetry {
    /// Create an empty window holding at most `window` samples.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::with_capacity(window.max(1) + 1),
        }
    }

    /// Record one tick.
    pub fn record(&mut self, timing: TickTiming) {
        self.samples.push_back(timing);
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }
    }

    /// Samples currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no tick has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average phase durations in milliseconds: `(update, collision, other)`.
    /// All zero for an empty window.
    #[must_use]
    pub fn averages_ms(&self) -> (f64, f64, f64) {
        if self.samples.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.samples.len() as f64;
        let average = |phase: fn(&TickTiming) -> Duration| {
            self.samples.iter().map(|sample| phase(sample).as_secs_f64() * 1000.0).sum::<f64>() / count
        };
        (
            average(|sample| sample.update),
            average(|sample| sample.collision),
            average(|sample| sample.other),
        )
    }
}

/// Stats report sent to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Average update phase, milliseconds
    pub update_ms: f64,
    /// Average collision phase, milliseconds
    pub collision_ms: f64,
    /// Average remainder, milliseconds
    pub other_ms: f64,
    /// Live entities
    pub elements: u32,
    /// Started players
    pub players: u32,
}
