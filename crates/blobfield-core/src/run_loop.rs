//! The fixed-rate tick loop thread.
//!
//! The thread holds only a weak reference to the gamefield and upgrades it
//! once per iteration. It exits when the gamefield is dropped, when it is
//! stopped, or when a newer loop generation has been started.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::gamefield::{Gamefield, Shared};

/// Budget left over below which the loop skips sleeping.
const MIN_SLEEP: Duration = Duration::from_millis(1);

pub(crate) fn spawn(shared: Weak<Shared>, generation: u64) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("blobfield-tick-{generation}"))
        .spawn(move || run(&shared, generation))
}

/// Join a loop thread, unless called from that very thread.
pub(crate) fn join(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        error!("tick loop thread panicked");
    }
}

fn run(shared: &Weak<Shared>, generation: u64) {
    let mut last = Instant::now();
    loop {
        let Some(strong) = shared.upgrade() else {
            debug!(generation, "gamefield dropped");
            break;
        };
        let field = Gamefield::from_shared(strong);
        if !field.loop_is_current(generation) {
            break;
        }
        let period = field.tick_period();

        let started = Instant::now();
        let elapsed = started.duration_since(last);
        last = started;
        // A failed tick is logged and the loop carries on with the next one
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| field.tick(elapsed.as_secs_f32()))) {
            error!(tick = field.tick_count() + 1, reason = panic_reason(payload.as_ref()), "tick panicked");
        }
        drop(field);

        let spent = started.elapsed();
        match period.checked_sub(spent) {
            Some(remaining) if remaining > MIN_SLEEP => thread::sleep(remaining),
            Some(_) => {}
            None => warn!(
                spent_ms = spent.as_secs_f64() * 1000.0,
                budget_ms = period.as_secs_f64() * 1000.0,
                "tick overran its budget"
            ),
        }
    }
    info!(generation, "tick loop exited");
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
