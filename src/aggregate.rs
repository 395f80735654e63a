//! Aggregation over collections of futures: `collect`, `join`, `select`
//! and `wait_all`.
//!
//! All aggregators are callback-driven: they register completion callbacks
//! on their inputs and resolve an output promise from those callbacks, so
//! constructing an aggregate never blocks and never consumes a worker pool
//! slot. The one aggregator that genuinely has to block, [`wait_all`]
//! with its bulk deadline, parks on a dedicated control-plane thread
//! instead of the pool.
//!
//! [`wait_all`]: crate::Promise::wait_all

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::control;
use crate::error::Error;
use crate::future::Future;
use crate::promise::Promise;

/// Shared accumulator behind [`Promise::collect`]. Slots keep the input
/// order regardless of completion order.
struct Gather<T> {
    remaining: usize,
    slots: Vec<Option<T>>,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Combines `futures` into one future of all their values, in input
    /// order.
    ///
    /// The result succeeds only once every input has succeeded. The first
    /// failure *to resolve* (chronologically, not positionally) fails the
    /// result immediately with that error; later resolutions are discarded.
    /// An empty input resolves immediately to an empty vector.
    pub fn collect(futures: Vec<Future<T>>) -> Future<Vec<T>> {
        if futures.is_empty() {
            return Promise::value(Vec::new());
        }

        let output = Promise::<Vec<T>>::new();
        let gather = Arc::new(Mutex::new(Gather {
            remaining: futures.len(),
            slots: vec![None; futures.len()],
        }));

        for (index, future) in futures.into_iter().enumerate() {
            let output = output.clone();
            let gather = Arc::clone(&gather);
            future.respond(move |outcome| match outcome {
                Ok(value) => {
                    let values = {
                        let mut gather = gather.lock();
                        gather.slots[index] = Some(value);
                        gather.remaining -= 1;
                        if gather.remaining == 0 {
                            Some(
                                gather
                                    .slots
                                    .iter_mut()
                                    .map(|slot| slot.take().expect("every slot is filled"))
                                    .collect::<Vec<_>>(),
                            )
                        } else {
                            None
                        }
                    };
                    if let Some(values) = values {
                        output.complete_if_pending(Ok(values));
                    }
                }
                Err(error) => {
                    output.complete_if_pending(Err(error));
                }
            });
        }

        output.future()
    }

    /// Like [`collect`](Self::collect) but discards the values: resolves to
    /// `()` once every input has succeeded, or with the chronologically
    /// first failure.
    pub fn join(futures: Vec<Future<T>>) -> Future<()> {
        Self::collect(futures).unit()
    }

    /// Resolves as soon as any input resolves, successfully or not, to the
    /// pair of the winning future and the remaining futures in input order.
    ///
    /// The winner is returned as a (resolved) future rather than unwrapped,
    /// so a losing-side failure stays inspectable by the caller. The
    /// remaining futures may themselves already be resolved by the time the
    /// caller looks at them.
    ///
    /// An empty input fails immediately with [`Error::SelectOnEmpty`].
    pub fn select(futures: Vec<Future<T>>) -> Future<(Future<T>, Vec<Future<T>>)> {
        if futures.is_empty() {
            return Promise::exception(Error::SelectOnEmpty);
        }

        let output = Promise::new();
        let entries = Arc::new(futures);
        for index in 0..entries.len() {
            let output = output.clone();
            let entries = Arc::clone(&entries);
            entries[index].clone().respond(move |_| {
                let winner = entries[index].clone();
                let remaining = entries
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != index)
                    .map(|(_, future)| future.clone())
                    .collect();
                output.complete_if_pending(Ok((winner, remaining)));
            });
        }

        output.future()
    }

    /// Waits for all of `futures` to resolve, or for `timeout` to elapse if
    /// one is given, then resolves to the `(resolved, unresolved)` partition
    /// of the inputs. Without a timeout the second partition is empty.
    ///
    /// The bulk wait parks on a control-plane thread, never on a pool slot,
    /// so waiting on pool-submitted futures cannot starve the pool.
    pub fn wait_all(
        futures: Vec<Future<T>>,
        timeout: Option<Duration>,
    ) -> Future<(Vec<Future<T>>, Vec<Future<T>>)> {
        let output = Promise::new();
        let sink = output.clone();
        let _ = control::spawn("wait-all", move || {
            let (sender, receiver) = mpsc::channel::<()>();
            for future in &futures {
                let sender = sender.clone();
                future.respond(move |_| {
                    // The receiver is gone once the deadline fired; a missed
                    // notification is then irrelevant.
                    let _ = sender.send(());
                });
            }
            drop(sender);

            let deadline = timeout.map(|timeout| Instant::now() + timeout);
            let mut pending = futures.len();
            while pending > 0 {
                let notified = match deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        now < deadline && receiver.recv_timeout(deadline - now).is_ok()
                    }
                    None => receiver.recv().is_ok(),
                };
                if !notified {
                    break;
                }
                pending -= 1;
            }

            let (resolved, unresolved): (Vec<_>, Vec<_>) = futures
                .into_iter()
                .partition(|future| future.is_defined());
            sink.set_value((resolved, unresolved))
                .expect("wait-all promise is resolved exactly once");
        });
        output.future()
    }
}
