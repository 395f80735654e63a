//! The bounded worker pool and the process-wide pool registry.
//!
//! [`WorkerPool`] is a fixed-size pool of OS threads draining a FIFO job
//! queue. Its size, set at construction, bounds how many
//! [`Promise::call`](crate::Promise::call)-submitted tasks run truly in
//! parallel. Aggregation waits and timers deliberately bypass the pool (see
//! [`control`](crate::control)-plane threads) so that they can never starve
//! it.
//!
//! The registry holds the single current pool used for asynchronous
//! dispatch. Replacing it shuts down the previous pool first. The hot-swap
//! is *not* synchronized against concurrent submitters beyond "read the
//! current reference, then act": callers must not replace the pool while
//! depending on pending work from the old one.

use std::error;
use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};

use crate::error::panic_message;

/// Errors produced by [`WorkerPool`] construction and submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool size was set to zero; a pool needs at least one worker.
    InvalidSize,

    /// The pool has been shut down and no longer accepts work.
    ShutDown,
}

impl fmt::Display for PoolError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize => {
                write!(formatter, "worker pool size must be greater than 0")
            }
            Self::ShutDown => {
                write!(formatter, "worker pool is shut down and rejects new work")
            }
        }
    }
}

impl error::Error for PoolError {}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

/// A bounded pool of worker threads draining a FIFO job queue.
///
/// Submitted jobs are queued without backpressure and executed by the first
/// free worker. [`shutdown`](WorkerPool::shutdown) stops intake, drains the
/// jobs already queued, and joins the workers; it is idempotent. Dropping
/// the pool shuts it down.
pub struct WorkerPool {
    size: usize,
    inner: Mutex<PoolInner>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool with `size` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0. Use [`try_new`](Self::try_new) for a
    /// non-panicking version.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::try_new(size).expect("worker pool size must be greater than 0")
    }

    /// Tries to create a pool with `size` worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] if `size` is 0.
    pub fn try_new(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size)
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("yakusoku-worker-{index}"))
                    .spawn(move || worker_loop(&receiver))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Ok(Self {
            size,
            inner: Mutex::new(PoolInner {
                sender: Some(sender),
                workers,
            }),
        })
    }

    /// Returns the fixed number of worker threads.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns whether the pool has stopped accepting work.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().sender.is_none()
    }

    /// Schedules `job` for asynchronous execution on a free worker.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] if the pool no longer accepts work.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.lock();
        match inner.sender.as_ref() {
            Some(sender) => sender
                .send(Box::new(job))
                .map_err(|_| PoolError::ShutDown),
            None => Err(PoolError::ShutDown),
        }
    }

    /// Stops accepting new work, drains the queue and joins the workers.
    ///
    /// Idempotent. Must not be called from one of the pool's own worker
    /// threads: joining the calling thread would deadlock.
    pub fn shutdown(&self) {
        let (sender, workers) = {
            let mut inner = self.inner.lock();
            (inner.sender.take(), mem::take(&mut inner.workers))
        };
        drop(sender);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked before shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = receiver.lock().recv();
        match job {
            Ok(job) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                    tracing::error!(
                        payload = %panic_message(payload.as_ref()),
                        "worker job panicked; the worker keeps running"
                    );
                }
            }
            Err(_) => break,
        }
    }
}

// =============================================================================
// Pool registry
// =============================================================================

static CURRENT_POOL: RwLock<Option<Arc<WorkerPool>>> = RwLock::new(None);

/// Returns the process-wide current worker pool, creating the default pool
/// (one worker per logical CPU) on first use.
pub fn executor() -> Arc<WorkerPool> {
    if let Some(pool) = CURRENT_POOL.read().as_ref() {
        return Arc::clone(pool);
    }
    let mut slot = CURRENT_POOL.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(WorkerPool::new(num_cpus::get().max(1)))))
}

/// Replaces the process-wide current worker pool, shutting down the
/// previous pool first, and returns the new one.
///
/// All `call`/background work is scheduled against whichever pool is
/// current at submission time. The swap itself is not atomic with respect
/// to concurrent submitters; do not replace the pool while depending on
/// pending work from the old one.
pub fn set_executor(pool: WorkerPool) -> Arc<WorkerPool> {
    let pool = Arc::new(pool);
    let previous = CURRENT_POOL.write().replace(Arc::clone(&pool));
    if let Some(previous) = previous {
        previous.shutdown();
    }
    pool
}
