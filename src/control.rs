//! Control-plane threads for aggregation waits and timers.
//!
//! Bulk waits (`wait_all`) and `within` timers must never run on the shared
//! bounded worker pool: if the pool has exactly N slots and N of the watched
//! futures are themselves pool-submitted tasks, routing the wait through the
//! pool as an (N+1)-th task would starve it and deadlock. Blocking waits are
//! therefore spawned here, on dedicated named OS threads that are not
//! governed by the pool's slot budget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::future::Future;
use crate::promise::Promise;

static CONTROL_THREAD_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Spawns a named control-plane thread.
pub(crate) fn spawn<F>(label: &str, body: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    let sequence = CONTROL_THREAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    thread::Builder::new()
        .name(format!("yakusoku-control-{label}-{sequence}"))
        .spawn(body)
        .expect("failed to spawn control-plane thread")
}

/// Returns a future that resolves to `()` after `duration`, backed by a
/// control-plane thread rather than a pool slot.
pub(crate) fn timer(duration: Duration) -> Future<()> {
    let promise = Promise::new();
    let writer = promise.clone();
    // Detached on purpose; the promise keeps the thread's work observable.
    let _ = spawn("timer", move || {
        thread::sleep(duration);
        writer
            .set_value(())
            .expect("timer promise is resolved exactly once");
    });
    promise.future()
}
