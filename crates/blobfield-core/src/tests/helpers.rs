//! Test helpers: option presets, a recording client and small factories.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::entity::EntityId;
use crate::gamefield::Gamefield;
use crate::network::{ClientConnection, ConnectionId, ServerMessage};
use crate::options::{GamefieldOptions, SpawnOptions};

// =============================================================================
// Options
// =============================================================================

/// Options for hand-driven tests.
///
/// A 500 x 500 world with small quadtree leaves, a fixed seed, no spawning, no
/// autostart and full snapshots effectively disabled. Contract violations are
/// reported as errors rather than aborting.
pub fn test_options() -> GamefieldOptions {
    GamefieldOptions {
        width: 500.0,
        height: 500.0,
        node_capacity: 4,
        max_depth: 8,
        tick_rate: 100.0,
        full_snapshot_interval: 1000.0,
        consumable: SpawnOptions::new(0.0, 0),
        obstacle: SpawnOptions::new(0.0, 0),
        pickup: SpawnOptions::new(0.0, 0),
        seed: Some(7),
        strict_invariants: false,
        autostart: false,
        ..Default::default()
    }
}

/// A gamefield built from [`test_options`].
pub fn test_field() -> Gamefield {
    Gamefield::new(test_options()).unwrap()
}

// =============================================================================
// Connections
// =============================================================================

/// A client that records every message it is sent.
pub struct RecordingConnection {
    id: ConnectionId,
    messages: Mutex<Vec<ServerMessage>>,
}

impl RecordingConnection {
    /// Creates a connection with the given raw id.
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            messages: Mutex::new(Vec::new()),
        })
    }

    /// Messages received so far.
    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.lock().clone()
    }

    /// Take and forget the messages received so far.
    pub fn take(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl ClientConnection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn emit(&self, message: &ServerMessage) {
        self.messages.lock().push(message.clone());
    }
}

/// A client whose next `emit` panics once armed, like a transport failing
/// mid-broadcast.
pub struct FailingConnection {
    id: ConnectionId,
    armed: AtomicBool,
}

impl FailingConnection {
    /// Creates a disarmed connection with the given raw id.
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            armed: AtomicBool::new(false),
        })
    }

    /// Make the next `emit` panic.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }
}

impl ClientConnection for FailingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn emit(&self, _message: &ServerMessage) {
        if self.armed.swap(false, Ordering::AcqRel) {
            panic!("connection {} failed while sending", self.id);
        }
    }
}

/// Join a recording client and return it.
pub fn join(field: &Gamefield, id: u64) -> Arc<RecordingConnection> {
    let connection = RecordingConnection::new(id);
    field.on_join(connection.clone()).unwrap();
    connection
}

// =============================================================================
// Queries
// =============================================================================

/// Ids of the live entities in id order.
pub fn live_ids(field: &Gamefield) -> Vec<EntityId> {
    field.entities().iter().map(|entity| entity.id()).collect()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
