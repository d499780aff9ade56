//! The authoritative simulation.
//!
//! # Threading
//!
//! Any thread may call the factories, [`Gamefield::destroy`] and the session
//! handlers. Only the tick touches the live collection and the quadtree; the
//! factories and `destroy` reach it through staging buffers drained once per
//! tick.
//!
//! Locks are always taken in the order world, sessions, clients, telemetry.
//! The RNG and the staging buffers are leaves: nothing else is locked while
//! they are held.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use quadrant::{Quadtree, QuadtreeError, QuadtreeStats};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::entity::{BallBody, Body, ChangeFlags, Color, Entity, EntityId, EntityKind, EntitySnapshot, ProjectileBody};
use crate::error::{GamefieldError, GamefieldResult};
use crate::network::{ClientConnection, ClientMessage, ConnectionId, ServerMessage};
use crate::options::{CollisionStrategy, GamefieldOptions};
use crate::player::Player;
use crate::rules;
use crate::run_loop;
use crate::spawn::{CategoryCounters, SpawnCategory, SpawnTimers};
use crate::staging::StagingBuffer;
use crate::telemetry::{StatsReport, TickTelemetry, TickTiming};

// =============================================================================
// Shared state
// =============================================================================

/// State owned by the simulation thread.
struct World {
    /// Live entities in id order
    entities: BTreeMap<EntityId, Arc<Entity>>,
    /// Spatial index over `entities`
    index: Quadtree<Arc<Entity>>,
    /// Per-category spawn timers
    spawn_timers: SpawnTimers,
    /// Seconds since the last full snapshot
    snapshot_timer: f32,
    /// Destroyed entities awaiting teardown. Survives a tick that fails
    /// midway, so the next tick retries them.
    teardown: Vec<Arc<Entity>>,
}

pub(crate) struct Shared {
    options: GamefieldOptions,
    next_id: AtomicU64,
    rng: Mutex<ChaCha8Rng>,
    new_entities: StagingBuffer<Arc<Entity>>,
    deleted_entities: StagingBuffer<Arc<Entity>>,
    counters: CategoryCounters,
    world: Mutex<World>,
    sessions: Mutex<HashMap<ConnectionId, Player>>,
    clients: RwLock<HashMap<ConnectionId, Arc<dyn ClientConnection>>>,
    telemetry: Mutex<TickTelemetry>,
    live_entities: AtomicUsize,
    index_nodes: AtomicUsize,
    ticks: AtomicU64,
    running: AtomicBool,
    generation: AtomicU64,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
}

// =============================================================================
// Gamefield
// =============================================================================

/// Which broadcast a tick sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    /// `SetElements` with the whole live set
    Full,
    /// `UpdateElements` with the tick's diff
    Diff,
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Entities indexed this tick
    pub added: usize,
    /// Entities torn down this tick
    pub removed: usize,
    /// Entities that moved or resized during the update phase
    pub changed: usize,
    /// Live entities after teardown
    pub live: usize,
    /// Broadcast sent, if any
    pub broadcast: Option<BroadcastKind>,
    /// Phase durations
    pub timing: TickTiming,
}

/// Handle to a running arena.
///
/// Cloning the handle shares the same arena. The loop thread holds only a weak
/// reference, so the arena shuts down by itself once every handle is dropped;
/// call [`Gamefield::shutdown`] to stop and join it deterministically.
#[derive(Clone)]
pub struct Gamefield {
    shared: Arc<Shared>,
}

impl fmt::Debug for Gamefield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gamefield")
            .field("tick", &self.tick_count())
            .field("live", &self.live_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Gamefield {
    /// Creates an empty arena. The tick loop is not started.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::InvalidOptions`] if the options fail
    /// validation.
    pub fn new(options: GamefieldOptions) -> GamefieldResult<Self> {
        options.validate()?;
        let index = Quadtree::new(options.quadtree_config())?;
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let window = options.telemetry_window;

        Ok(Self {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                rng: Mutex::new(rng),
                new_entities: StagingBuffer::new(),
                deleted_entities: StagingBuffer::new(),
                counters: CategoryCounters::default(),
                world: Mutex::new(World {
                    entities: BTreeMap::new(),
                    index,
                    spawn_timers: SpawnTimers::default(),
                    snapshot_timer: 0.0,
                    teardown: Vec::new(),
                }),
                sessions: Mutex::new(HashMap::new()),
                clients: RwLock::new(HashMap::new()),
                telemetry: Mutex::new(TickTelemetry::new(window)),
                live_entities: AtomicUsize::new(0),
                index_nodes: AtomicUsize::new(1),
                ticks: AtomicU64::new(0),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                loop_thread: Mutex::new(None),
                options,
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Active options.
    #[must_use]
    pub fn options(&self) -> &GamefieldOptions {
        &self.shared.options
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// Live entities as of the end of the last tick.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared.live_entities.load(Ordering::Acquire)
    }

    /// Population of a spawn category, staged entities included.
    #[must_use]
    pub fn category_count(&self, category: SpawnCategory) -> u32 {
        self.shared.counters.get(category)
    }

    /// Started player sessions.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    /// Registered connections.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.shared.clients.read().len()
    }

    /// Whether the tick loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Ball ids of a player session.
    #[must_use]
    pub fn player_balls(&self, connection: ConnectionId) -> Option<Vec<EntityId>> {
        self.shared.sessions.lock().get(&connection).map(Player::ball_ids)
    }

    /// A live (indexed) entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.shared.world.lock().entities.get(&id).cloned()
    }

    /// All live entities in id order.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.shared.world.lock().entities.values().cloned().collect()
    }

    /// Quadtree structure statistics.
    #[must_use]
    pub fn index_stats(&self) -> QuadtreeStats {
        self.shared.world.lock().index.stats()
    }

    /// Verify the index against the live collection.
    ///
    /// Only meaningful between ticks: checks the quadtree's structural
    /// invariants and that it holds exactly the live entities.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::Index`] describing the first violation.
    pub fn check_index(&self) -> GamefieldResult<()> {
        let world = self.shared.world.lock();
        world.index.check_invariants()?;
        let indexed = world.index.element_count();
        if indexed != world.entities.len() {
            return Err(QuadtreeError::Invariant(format!(
                "index holds {indexed} elements but {} entities are live",
                world.entities.len()
            ))
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Create a player ball.
    pub fn create_ball(&self, owner: ConnectionId, color: Color, position: Vec2) -> Arc<Entity> {
        let body = Body::Ball(BallBody {
            owner,
            color,
            target: position,
        });
        self.stage(position, self.shared.options.player.start_size, body)
    }

    /// Create a projectile travelling along `heading`.
    pub fn create_projectile(
        &self,
        owner: Option<ConnectionId>,
        color: Color,
        position: Vec2,
        heading: Vec2,
    ) -> Arc<Entity> {
        let gameplay = &self.shared.options.gameplay;
        let body = Body::Projectile(ProjectileBody {
            owner,
            color,
            heading: heading.try_normalize().unwrap_or(Vec2::X),
            speed: gameplay.projectile_speed,
            remaining: gameplay.projectile_lifetime,
        });
        self.stage(position, gameplay.projectile_size, body)
    }

    /// Create an obstacle.
    pub fn create_obstacle(&self, position: Vec2) -> Arc<Entity> {
        self.stage(position, self.shared.options.gameplay.obstacle_size, Body::Obstacle)
    }

    /// Create a consumable.
    pub fn create_consumable(&self, position: Vec2) -> Arc<Entity> {
        self.stage(position, self.shared.options.gameplay.consumable_size, Body::Consumable)
    }

    /// Create a pickup.
    pub fn create_pickup(&self, position: Vec2) -> Arc<Entity> {
        self.stage(position, self.shared.options.gameplay.pickup_size, Body::Pickup)
    }

    /// Create one entity of a category at a uniformly random position.
    pub fn spawn_random(&self, category: SpawnCategory) -> Arc<Entity> {
        let position = self.random_position();
        match category {
            SpawnCategory::Consumable => self.create_consumable(position),
            SpawnCategory::Obstacle => self.create_obstacle(position),
            SpawnCategory::Pickup => self.create_pickup(position),
        }
    }

    fn stage(&self, position: Vec2, size: f32, body: Body) -> Arc<Entity> {
        let id = EntityId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let entity = Arc::new(Entity::new(id, position, size, body));
        if let Some(category) = SpawnCategory::of(entity.kind()) {
            self.shared.counters.increment(category);
        }
        self.shared.new_entities.push(Arc::clone(&entity));
        entity
    }

    fn random_position(&self) -> Vec2 {
        let mut rng = self.shared.rng.lock();
        self.shared.options.world().sample(|| rng.gen::<f32>())
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Mark an entity deleted and stage it for teardown.
    ///
    /// The entity stays in the live collection and the index until the end of
    /// the current (or next) tick, flagged so scans skip it. A destroyed ball
    /// is detached from its player, who is sent their remaining balls.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::DoubleDestroy`] if the entity was already
    /// destroyed. This is a caller bug: it is logged, and aborts when
    /// `strict_invariants` is set.
    pub fn destroy(&self, entity: &Arc<Entity>) -> GamefieldResult<()> {
        if entity.mark_deleted() {
            error!(entity = %entity.id(), kind = %entity.kind(), "entity destroyed twice");
            self.contract_violation(format_args!("entity {} destroyed twice", entity.id()));
            return Err(GamefieldError::DoubleDestroy(entity.id()));
        }

        self.shared.deleted_entities.push(Arc::clone(entity));
        if let Some(category) = SpawnCategory::of(entity.kind()) {
            self.shared.counters.decrement(category);
        }
        if entity.kind() == EntityKind::Ball {
            if let Some(owner) = entity.owner() {
                self.detach_ball(owner, entity.id());
            }
        }
        Ok(())
    }

    fn detach_ball(&self, owner: ConnectionId, ball: EntityId) {
        let balls = {
            let mut sessions = self.shared.sessions.lock();
            let Some(player) = sessions.get_mut(&owner) else {
                return;
            };
            if !player.remove_ball(ball) {
                return;
            }
            player.ball_ids()
        };
        debug!(connection = %owner, ball = %ball, remaining = balls.len(), "ball detached from player");
        self.send_to(owner, &ServerMessage::PlayerBalls { balls });
    }

    fn contract_violation(&self, what: fmt::Arguments<'_>) {
        assert!(!self.shared.options.strict_invariants, "contract violation: {what}");
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the arena by `elapsed` seconds.
    ///
    /// Normally driven by the loop thread; call it directly to step the arena
    /// by hand.
    #[allow(clippy::too_many_lines)]
    pub fn tick(&self, elapsed: f32) -> TickReport {
        let shared = &*self.shared;
        let options = &shared.options;
        let bounds = options.world();
        let started = Instant::now();
        let mut guard = shared.world.lock();
        let world = &mut *guard;

        // Update every live entity; results come back in id order
        let updates: Vec<(Arc<Entity>, ChangeFlags, bool)> = world
            .entities
            .par_iter()
            .filter(|(_, entity)| !entity.is_deleted())
            .filter_map(|(_, entity)| {
                let mut state = entity.state();
                let outcome = rules::update(&mut state, elapsed, bounds, options);
                let changes = std::mem::take(&mut state.changes);
                drop(state);
                (!changes.is_empty() || outcome.expired).then(|| (Arc::clone(entity), changes, outcome.expired))
            })
            .collect();

        let mut changed = Vec::new();
        for (entity, changes, expired) in updates {
            if !changes.is_empty() {
                if let Err(err) = world.index.update_region(&entity) {
                    error!(entity = %entity.id(), %err, "moved entity could not be re-homed");
                    self.contract_violation(format_args!("entity {} left the index: {err}", entity.id()));
                }
                changed.push(Arc::clone(&entity));
            }
            if expired {
                if let Err(err) = self.destroy(&entity) {
                    warn!(entity = %entity.id(), %err, "expired entity was already destroyed");
                }
            }
        }

        // Drain staged creations
        let mut added = Vec::new();
        for entity in shared.new_entities.drain() {
            if entity.is_deleted() {
                // Destroyed before it was ever indexed; teardown skips it
                continue;
            }
            if world.index.insert(&entity) {
                world.entities.insert(entity.id(), Arc::clone(&entity));
                added.push(entity);
            } else {
                let position = entity.position();
                error!(
                    entity = %entity.id(),
                    kind = %entity.kind(),
                    x = position.x,
                    y = position.y,
                    "staged entity does not fit the world"
                );
                if let Err(err) = self.destroy(&entity) {
                    warn!(entity = %entity.id(), %err, "rejected entity was already destroyed");
                }
            }
        }
        let update_time = started.elapsed();

        // Collide
        let collision_started = Instant::now();
        let mut eaters: Vec<Arc<Entity>> = Vec::new();
        let mut on_collision = |a: &Arc<Entity>, b: &Arc<Entity>| {
            if let Some(eater) = self.resolve_collision(a, b) {
                eaters.push(Arc::clone(eater));
            }
        };
        match options.collision_strategy {
            CollisionStrategy::Quadtree => world.index.for_each_collision(&mut on_collision),
            CollisionStrategy::BruteForce => {
                let live: Vec<Arc<Entity>> = world.entities.values().cloned().collect();
                for (a, b) in quadrant::brute_force_pairs(&live) {
                    let pair = (
                        world.entities.get(&EntityId::new(a)),
                        world.entities.get(&EntityId::new(b)),
                    );
                    if let (Some(a), Some(b)) = pair {
                        if !a.is_deleted() && !b.is_deleted() {
                            on_collision(a, b);
                        }
                    }
                }
            }
        }
        // Eaters grew; move them to a node that still accepts them
        for eater in eaters.iter().filter(|eater| !eater.is_deleted()) {
            if let Err(err) = world.index.update_region(eater) {
                error!(entity = %eater.id(), %err, "grown entity could not be re-homed");
                self.contract_violation(format_args!("entity {} left the index: {err}", eater.id()));
            }
        }
        let collision_time = collision_started.elapsed();

        // Players
        for player in shared.sessions.lock().values() {
            player.steer();
        }

        // Spawn
        for category in SpawnCategory::ALL {
            let policy = options.spawn(category);
            if world.spawn_timers.advance(category, elapsed, policy.spawn_rate)
                && shared.counters.get(category) < policy.max
            {
                let entity = self.spawn_random(category);
                debug!(entity = %entity.id(), %category, "spawned");
            }
        }

        // Drain staged destructions
        world.teardown.extend(shared.deleted_entities.drain());

        // Broadcast
        world.snapshot_timer += elapsed;
        let broadcast = if world.snapshot_timer > options.full_snapshot_interval {
            world.snapshot_timer = 0.0;
            self.broadcast(&ServerMessage::SetElements {
                elements: live_snapshots(&world.entities),
            });
            Some(BroadcastKind::Full)
        } else if !(added.is_empty() && world.teardown.is_empty() && changed.is_empty()) {
            let visible = |entities: &[Arc<Entity>]| -> Vec<EntitySnapshot> {
                entities
                    .iter()
                    .filter(|entity| !entity.is_deleted())
                    .map(|entity| entity.snapshot())
                    .collect()
            };
            self.broadcast(&ServerMessage::UpdateElements {
                added: visible(&added),
                removed: world.teardown.iter().map(|entity| entity.id()).collect(),
                changed: visible(&changed),
            });
            Some(BroadcastKind::Diff)
        } else {
            None
        };

        // Teardown
        let removed = std::mem::take(&mut world.teardown);
        for entity in &removed {
            if world.entities.remove(&entity.id()).is_none() {
                debug!(entity = %entity.id(), "destroyed entity was never indexed");
                continue;
            }
            if !world.index.remove(entity) {
                error!(entity = %entity.id(), "destroyed entity was missing from the index");
            }
        }

        let live = world.entities.len();
        shared.live_entities.store(live, Ordering::Release);
        shared.index_nodes.store(world.index.node_count(), Ordering::Release);

        let total = started.elapsed();
        let timing = TickTiming {
            update: update_time,
            collision: collision_time,
            other: total.saturating_sub(update_time + collision_time),
        };
        shared.telemetry.lock().record(timing);
        let tick = shared.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        drop(guard);

        TickReport {
            tick,
            added: added.len(),
            removed: removed.len(),
            changed: changed.len(),
            live,
            broadcast,
            timing,
        }
    }

    /// Apply the eat rules to a colliding pair. Returns the eater, if any.
    fn resolve_collision<'a>(&self, a: &'a Arc<Entity>, b: &'a Arc<Entity>) -> Option<&'a Arc<Entity>> {
        let options = &self.shared.options;
        let (eater, prey) = if rules::try_eat(a, b, options) {
            (a, b)
        } else if rules::try_eat(b, a, options) {
            (b, a)
        } else {
            return None;
        };
        if let Err(err) = self.destroy(prey) {
            debug!(entity = %prey.id(), %err, "eaten entity was already destroyed");
        }
        Some(eater)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Register a client: send it a full snapshot, add it to the broadcast
    /// set and start the tick loop if `autostart` is set.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::Spawn`] if the loop thread cannot be started.
    pub fn on_join(&self, connection: Arc<dyn ClientConnection>) -> GamefieldResult<()> {
        let id = connection.id();
        connection.emit(&self.full_snapshot());
        let clients = {
            let mut clients = self.shared.clients.write();
            clients.insert(id, connection);
            clients.len()
        };
        info!(connection = %id, clients, "client joined");

        if self.shared.options.autostart {
            self.start()?;
        }
        Ok(())
    }

    /// Route a message from a registered client.
    ///
    /// # Errors
    ///
    /// - [`GamefieldError::UnknownConnection`] if the client never joined.
    /// - [`GamefieldError::NoSession`] for player actions before `Start`.
    pub fn on_message(&self, connection: ConnectionId, message: ClientMessage) -> GamefieldResult<()> {
        if !self.shared.clients.read().contains_key(&connection) {
            return Err(GamefieldError::UnknownConnection(connection));
        }
        match message {
            ClientMessage::Start { name } => {
                self.on_start(connection, &name);
                Ok(())
            }
            ClientMessage::Leave => {
                self.on_leave(connection);
                Ok(())
            }
            ClientMessage::GetStats => {
                let report = self.get_stats();
                self.send_to(connection, &ServerMessage::Stats(report));
                Ok(())
            }
            ClientMessage::Pointer { x, y } => self.set_pointer(connection, Vec2::new(x, y)),
            ClientMessage::Shoot => self.shoot(connection),
        }
    }

    /// Start a player session with one ball at a random position.
    ///
    /// An existing session of the same connection is ended first. The client
    /// receives its ball ids and then `Started`.
    pub fn on_start(&self, connection: ConnectionId, name: &str) {
        if self.shared.sessions.lock().contains_key(&connection) {
            self.on_leave(connection);
        }

        let color = {
            let mut rng = self.shared.rng.lock();
            self.shared
                .options
                .player
                .palette
                .choose(&mut *rng)
                .copied()
                .unwrap_or(Color::new(0xff, 0xff, 0xff))
        };
        let position = self.random_position();
        let ball = self.create_ball(connection, color, position);

        let mut player = Player::new(connection, name, color, position);
        player.add_ball(ball);
        let balls = player.ball_ids();
        self.shared.sessions.lock().insert(connection, player);
        info!(connection = %connection, player = name, %color, "player started");

        self.send_to(connection, &ServerMessage::PlayerBalls { balls });
        self.send_to(connection, &ServerMessage::Started);
    }

    /// End a player session, destroying its balls. The connection stays
    /// registered. Returns false if there was no session.
    pub fn on_leave(&self, connection: ConnectionId) -> bool {
        let Some(mut player) = self.shared.sessions.lock().remove(&connection) else {
            return false;
        };
        for ball in player.take_balls() {
            if ball.is_deleted() {
                continue;
            }
            if let Err(err) = self.destroy(&ball) {
                warn!(connection = %connection, ball = %ball.id(), %err, "ball vanished while leaving");
            }
        }
        info!(connection = %connection, player = player.name(), "player left");
        true
    }

    /// Forget a connection. Ends its session, and stops the tick loop once no
    /// client remains.
    pub fn on_disconnect(&self, connection: ConnectionId) {
        self.on_leave(connection);
        let remaining = {
            let mut clients = self.shared.clients.write();
            clients.remove(&connection);
            clients.len()
        };
        info!(connection = %connection, remaining, "client disconnected");
        if remaining == 0 {
            self.stop();
        }
    }

    /// Move a player's steering target. The target is clamped to the world.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::NoSession`] if the connection has not started.
    pub fn set_pointer(&self, connection: ConnectionId, pointer: Vec2) -> GamefieldResult<()> {
        let mut sessions = self.shared.sessions.lock();
        let player = sessions
            .get_mut(&connection)
            .ok_or(GamefieldError::NoSession(connection))?;
        player.set_pointer(rules::clamp_to(self.shared.options.world(), pointer));
        Ok(())
    }

    /// Every ball of the player at or above the minimum shooting size ejects a
    /// projectile toward the pointer, paying its area.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::NoSession`] if the connection has not started.
    pub fn shoot(&self, connection: ConnectionId) -> GamefieldResult<()> {
        let options = &self.shared.options;
        let shot_size = options.gameplay.projectile_size;
        let sessions = self.shared.sessions.lock();
        let player = sessions.get(&connection).ok_or(GamefieldError::NoSession(connection))?;

        let mut shots = 0;
        for ball in player.balls() {
            let (origin, heading) = {
                let mut state = ball.state();
                if state.size < options.player.min_shoot_size {
                    continue;
                }
                let heading = (player.pointer() - state.position).try_normalize().unwrap_or(Vec2::X);
                let remaining = (state.size * state.size - shot_size * shot_size).max(0.0).sqrt();
                state.resize(remaining);
                (state.position + heading * (state.size + shot_size), heading)
            };
            let origin = rules::clamp_to(options.world(), origin);
            self.create_projectile(Some(connection), player.color(), origin, heading);
            shots += 1;
        }
        debug!(connection = %connection, shots, "player shot");
        Ok(())
    }

    /// Current stats: phase averages over the telemetry window, live entity
    /// count and player count. Also logged together with the index node count.
    #[must_use]
    pub fn get_stats(&self) -> StatsReport {
        let (update_ms, collision_ms, other_ms) = self.shared.telemetry.lock().averages_ms();
        let elements = u32::try_from(self.live_count()).unwrap_or(u32::MAX);
        let players = u32::try_from(self.player_count()).unwrap_or(u32::MAX);
        let nodes = self.shared.index_nodes.load(Ordering::Acquire);
        info!(update_ms, collision_ms, other_ms, elements, players, nodes, "timings");
        StatsReport {
            update_ms,
            collision_ms,
            other_ms,
            elements,
            players,
        }
    }

    fn full_snapshot(&self) -> ServerMessage {
        let world = self.shared.world.lock();
        ServerMessage::SetElements {
            elements: live_snapshots(&world.entities),
        }
    }

    fn send_to(&self, connection: ConnectionId, message: &ServerMessage) {
        if let Some(client) = self.shared.clients.read().get(&connection) {
            client.emit(message);
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        for client in self.shared.clients.read().values() {
            client.emit(message);
        }
    }

    // =========================================================================
    // Loop control
    // =========================================================================

    /// Start the tick loop if it is not running.
    ///
    /// Consumables are first topped up to their maximum. A loop thread left
    /// over from an earlier `stop` is joined before the new one starts.
    ///
    /// # Errors
    ///
    /// Returns [`GamefieldError::Spawn`] if the thread cannot be created.
    pub fn start(&self) -> GamefieldResult<()> {
        let shared = &self.shared;
        let mut slot = shared.loop_thread.lock();
        if shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let generation = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        shared.running.store(true, Ordering::Release);
        if let Some(previous) = slot.take() {
            run_loop::join(previous);
        }

        self.prefill();
        match run_loop::spawn(Arc::downgrade(shared), generation) {
            Ok(handle) => *slot = Some(handle),
            Err(err) => {
                shared.running.store(false, Ordering::Release);
                error!(%err, "failed to start the tick loop");
                return Err(GamefieldError::Spawn(err));
            }
        }
        info!(generation, tick_rate = shared.options.tick_rate, "tick loop started");
        Ok(())
    }

    /// Ask the tick loop to stop after its current tick. The thread is joined
    /// on the next `start` or on `shutdown`.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!(tick = self.tick_count(), "tick loop stopping");
        }
    }

    /// Stop the tick loop and wait for its thread to exit.
    pub fn shutdown(&self) {
        let mut slot = self.shared.loop_thread.lock();
        self.stop();
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = slot.take() {
            run_loop::join(handle);
        }
    }

    /// Whether the loop of `generation` should keep going.
    pub(crate) fn loop_is_current(&self, generation: u64) -> bool {
        self.shared.running.load(Ordering::Acquire) && self.shared.generation.load(Ordering::Acquire) == generation
    }

    /// Tick period at the configured rate.
    pub(crate) fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(self.shared.options.tick_rate.recip())
    }

    fn prefill(&self) {
        let max = self.shared.options.consumable.max;
        let mut spawned = 0u32;
        while self.category_count(SpawnCategory::Consumable) < max {
            self.spawn_random(SpawnCategory::Consumable);
            spawned += 1;
        }
        if spawned > 0 {
            debug!(spawned, "consumables pre-filled");
        }
    }
}

fn live_snapshots(entities: &BTreeMap<EntityId, Arc<Entity>>) -> Vec<EntitySnapshot> {
    entities
        .values()
        .filter(|entity| !entity.is_deleted())
        .map(|entity| entity.snapshot())
        .collect()
}
