//! Headless Blobfield runner.
//!
//! Builds a gamefield, connects a handful of in-process bots that wander and
//! shoot, and lets the tick loop run for a fixed time. Useful for profiling
//! the tick and for watching the logs without a transport in front.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use blobfield_core::{
    ClientConnection, ClientMessage, CollisionStrategy, ConnectionId, EntityId, Gamefield, GamefieldOptions,
    ServerMessage, StatsReport,
};
use clap::Parser;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Interface
// ============================================================================

/// Run a Blobfield arena with bot players
#[derive(Debug, Parser)]
#[command(name = "blobfield-headless", version)]
struct Args {
    /// Gamefield options file (JSON); defaults when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of bot players
    #[arg(short, long, default_value_t = 8)]
    bots: u32,

    /// Seconds to run
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    /// Seed for the gamefield and the bots
    #[arg(long)]
    seed: Option<u64>,

    /// Use the exhaustive pairwise collision check
    #[arg(long)]
    brute_force: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json_format: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry
            .with(fmt::layer().json().with_thread_names(true))
            .try_init()
            .context("installing the log subscriber")?;
    } else {
        registry
            .with(fmt::layer().with_thread_names(true))
            .try_init()
            .context("installing the log subscriber")?;
    }
    Ok(())
}

// ============================================================================
// Bots
// ============================================================================

/// An in-process client that remembers what the gamefield told it.
struct BotConnection {
    id: ConnectionId,
    started: AtomicBool,
    balls: Mutex<Vec<EntityId>>,
    last_stats: Mutex<Option<StatsReport>>,
    received: AtomicU64,
}

impl BotConnection {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            started: AtomicBool::new(false),
            balls: Mutex::new(Vec::new()),
            last_stats: Mutex::new(None),
            received: AtomicU64::new(0),
        })
    }

    fn name(&self) -> String {
        format!("bot-{}", self.id)
    }

    /// Started, then lost every ball.
    fn is_dead(&self) -> bool {
        self.started.load(Ordering::Acquire) && self.balls.lock().is_empty()
    }
}

impl ClientConnection for BotConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn emit(&self, message: &ServerMessage) {
        self.received.fetch_add(1, Ordering::Relaxed);
        match message {
            ServerMessage::PlayerBalls { balls } => *self.balls.lock() = balls.clone(),
            ServerMessage::Started => self.started.store(true, Ordering::Release),
            ServerMessage::Stats(report) => *self.last_stats.lock() = Some(*report),
            ServerMessage::SetElements { .. } | ServerMessage::UpdateElements { .. } => {}
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(if args.debug { "debug" } else { "info" }, args.json_logs)?;

    let mut options = match &args.config {
        Some(path) => {
            GamefieldOptions::from_path(path).with_context(|| format!("loading options from {}", path.display()))?
        }
        None => GamefieldOptions::default(),
    };
    if args.seed.is_some() {
        options.seed = args.seed;
    }
    if args.brute_force {
        options.collision_strategy = CollisionStrategy::BruteForce;
    }
    let world = options.world();
    let field = Gamefield::new(options).context("building the gamefield")?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let bots: Vec<Arc<BotConnection>> = (1..=args.bots).map(|i| BotConnection::new(u64::from(i))).collect();
    for bot in &bots {
        field.on_join(bot.clone())?;
        field.on_message(bot.id, ClientMessage::Start { name: bot.name() })?;
    }
    field.start()?;
    info!(bots = bots.len(), seconds = args.seconds, "headless run started");

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut next_stats = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        for bot in &bots {
            if bot.is_dead() {
                info!(bot = %bot.id, "bot was eaten; restarting");
                field.on_message(bot.id, ClientMessage::Start { name: bot.name() })?;
                continue;
            }
            if rng.gen_bool(0.3) {
                let target = world.sample(|| rng.gen::<f32>());
                field.on_message(bot.id, ClientMessage::Pointer { x: target.x, y: target.y })?;
            }
            if rng.gen_bool(0.05) {
                field.on_message(bot.id, ClientMessage::Shoot)?;
            }
        }

        if Instant::now() >= next_stats {
            next_stats += Duration::from_secs(1);
            if let Some(bot) = bots.first() {
                field.on_message(bot.id, ClientMessage::GetStats)?;
            } else {
                let _ = field.get_stats();
            }
        }
        thread::sleep(Duration::from_millis(100));
    }

    for bot in &bots {
        debug!(
            bot = %bot.id,
            received = bot.received.load(Ordering::Relaxed),
            stats = ?bot.last_stats.lock().as_ref(),
            "disconnecting"
        );
        field.on_disconnect(bot.id);
    }
    field.shutdown();

    let stats = field.get_stats();
    let index = field.index_stats();
    info!(
        ticks = field.tick_count(),
        elements = stats.elements,
        nodes = index.node_count,
        depth = index.depth,
        "headless run finished"
    );
    Ok(())
}
