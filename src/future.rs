//! The read-only view of a promise and the combinator engine.
//!
//! A [`Future`] is a capability view bound to exactly one
//! [`Promise`](crate::Promise): it shares the promise's resolution cell and
//! forwards every read, but carries no write operations at all, so resolving
//! through a `Future` is a compile error rather than a runtime failure.
//!
//! Every combinator here is built on two primitives:
//!
//! - [`respond`](Future::respond) registers a post-resolution callback;
//! - [`transform`](Future::transform) produces a new promise from the
//!   resolved outcome.
//!
//! Combinator construction never blocks: each call registers a callback and
//! returns immediately. Blocking happens only in [`get`](Future::get) and
//! [`get_for`](Future::get_for), or on whichever thread performs the
//! resolving write.
//!
//! # Examples
//!
//! ```rust
//! use yakusoku::Promise;
//!
//! let future = Promise::value(2)
//!     .map(|n| n * 10)
//!     .flat_map(|n| Promise::value(n + 1));
//! assert_eq!(future.get(), Ok(21));
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use static_assertions::assert_impl_all;

use crate::cell::ResolveCell;
use crate::control;
use crate::error::{Error, Outcome};
use crate::promise::Promise;

/// Read-only view of a promise.
///
/// Cloning a `Future` clones the view, not the result: all clones observe
/// the same single resolution.
pub struct Future<T> {
    pub(crate) cell: Arc<ResolveCell<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Future")
            .field("defined", &self.cell.is_defined())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    pub(crate) fn from_cell(cell: Arc<ResolveCell<T>>) -> Self {
        Self { cell }
    }

    /// Returns whether the two views are bound to the same promise.
    #[must_use]
    pub fn shares_cell_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    // =========================================================================
    // Blocking reads and probes
    // =========================================================================

    /// Blocks the calling thread until resolved; returns the value on
    /// success or the original error on failure.
    ///
    /// # Errors
    ///
    /// The failure the promise was resolved with.
    pub fn get(&self) -> Outcome<T> {
        self.cell.get()
    }

    /// Like [`get`](Self::get) with a deadline.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if `timeout` elapses while still pending,
    /// otherwise the failure the promise was resolved with.
    pub fn get_for(&self, timeout: Duration) -> Outcome<T> {
        self.cell.get_for(timeout)
    }

    /// Zero-wait read: returns the resolved value, or `default` on any
    /// non-success outcome (still pending, or failed), swallowing the error.
    pub fn get_or_else(&self, default: T) -> T {
        match self.cell.peek() {
            Some(Ok(value)) => value,
            _ => default,
        }
    }

    /// Returns whether the promise has resolved, successfully or not.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.cell.is_defined()
    }

    /// `Some(true)` on success, `Some(false)` on failure, `None` while
    /// still pending.
    #[must_use]
    pub fn is_success(&self) -> Option<bool> {
        self.cell.peek().map(|outcome| outcome.is_ok())
    }

    /// `Some(true)` on failure, `Some(false)` on success, `None` while
    /// still pending.
    #[must_use]
    pub fn is_failure(&self) -> Option<bool> {
        self.is_success().map(|success| !success)
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Registers `callback` to run once resolved; returns a view clone for
    /// chaining.
    ///
    /// The callback fires exactly once, after resolution, in registration
    /// order for this promise, on the resolving thread; if the promise is
    /// already resolved it fires synchronously on the calling thread. A
    /// panicking callback is a defect: it is logged loudly and isolated,
    /// never absorbed into the promise chain.
    pub fn respond<F>(&self, callback: F) -> Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.cell.respond(Box::new(callback));
        self.clone()
    }

    /// Once resolved, applies `transformation` to the outcome to obtain an
    /// inner future, and pipes that future's resolution into the returned
    /// one. A panic inside `transformation` fails the returned future with
    /// the wrapped panic.
    pub fn transform<U, F>(&self, transformation: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> Future<U> + Send + 'static,
    {
        let output = Promise::new();
        let sink = output.clone();
        self.respond(move |outcome| {
            match catch_unwind(AssertUnwindSafe(|| transformation(outcome))) {
                Ok(inner) => {
                    sink.update(inner);
                }
                Err(payload) => {
                    sink.set_exception(Error::from_panic(payload.as_ref()))
                        .expect("transform output is resolved exactly once");
                }
            }
        });
        output.future()
    }

    // =========================================================================
    // Transforming combinators
    // =========================================================================

    /// If this future succeeds with `v`, adopts the future returned by
    /// `binder(v)`; failures propagate untouched without calling `binder`.
    pub fn flat_map<U, F>(&self, binder: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.transform(move |outcome| match outcome {
            Ok(value) => binder(value),
            Err(error) => Promise::exception(error),
        })
    }

    /// Alias of [`flat_map`](Self::flat_map).
    pub fn and_then<U, F>(&self, binder: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        self.flat_map(binder)
    }

    /// Synchronous value transform; failures pass through without calling
    /// `mapper`.
    pub fn map<U, F>(&self, mapper: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.flat_map(move |value| Promise::value(mapper(value)))
    }

    /// If this future fails, adopts the future returned by
    /// `recovery(error)`; successes pass through without calling `recovery`.
    pub fn rescue<F>(&self, recovery: F) -> Self
    where
        F: FnOnce(Error) -> Future<T> + Send + 'static,
    {
        self.transform(move |outcome| match outcome {
            Ok(value) => Promise::value(value),
            Err(error) => recovery(error),
        })
    }

    /// Like [`rescue`](Self::rescue) but `recovery` returns a plain value,
    /// wrapped as success.
    pub fn handle<F>(&self, recovery: F) -> Self
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.rescue(move |error| Promise::value(recovery(error)))
    }

    /// Succeeds unchanged only if `predicate(&value)` holds; otherwise
    /// fails with [`Error::FilteredOut`] carrying the rejected value's
    /// `Debug` rendering. Failures pass through.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        T: fmt::Debug,
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        self.flat_map(move |value| {
            if predicate(&value) {
                Promise::value(value)
            } else {
                Promise::exception(Error::FilteredOut(format!("{value:?}")))
            }
        })
    }

    /// Discards a successful value, resolving to `()`; failures propagate
    /// unchanged.
    pub fn unit(&self) -> Future<()> {
        self.map(|_| ())
    }

    /// Races this future against a control-plane timer. If the timer wins,
    /// the result fails with [`Error::Timeout`]. The computation behind this
    /// future is **not** cancelled; it keeps running and its eventual result
    /// is simply discarded.
    pub fn within(&self, duration: Duration) -> Self {
        let deadline = control::timer(duration)
            .flat_map(move |()| Promise::exception(Error::Timeout(duration)));
        self.or([deadline])
    }

    /// Resolves to whichever of `self` and `others` finishes soonest,
    /// successfully or otherwise.
    pub fn or<I>(&self, others: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut entries = vec![self.clone()];
        entries.extend(others);
        Promise::select(entries).flat_map(|(winner, _)| winner)
    }

    /// Alias of [`or`](Self::or).
    pub fn select_one<I>(&self, others: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        self.or(others)
    }

    /// Combines this future's value with the values of `others` into one
    /// future of a vector, in `[self] + others` order.
    pub fn join_with<I>(&self, others: I) -> Future<Vec<T>>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut entries = vec![self.clone()];
        entries.extend(others);
        Promise::collect(entries)
    }

    // =========================================================================
    // Fire-and-forget callbacks
    // =========================================================================

    /// Runs `effect` on completion regardless of outcome; the outcome is not
    /// altered. Returns a view clone for chaining.
    pub fn ensure<F>(&self, effect: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.respond(move |_| effect())
    }

    /// Runs `effect` with the value only if this future succeeds. Returns a
    /// view clone for chaining on the original future.
    pub fn on_success<F>(&self, effect: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.respond(move |outcome| {
            if let Ok(value) = outcome {
                effect(value);
            }
        })
    }

    /// Alias of [`on_success`](Self::on_success).
    pub fn for_each<F>(&self, effect: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_success(effect)
    }

    /// Runs `effect` with the error only if this future fails. Returns a
    /// view clone for chaining on the original future.
    pub fn on_failure<F>(&self, effect: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.respond(move |outcome| {
            if let Err(error) = outcome {
                effect(error);
            }
        })
    }

    /// On completion, copies this future's outcome into `target` through its
    /// write operations. A target that is already resolved is a defect and
    /// fails loudly instead of being silently caught.
    pub fn proxy_to(&self, target: &Promise<T>) -> Self {
        let target = target.clone();
        self.respond(move |outcome| {
            if let Err(error) = target.complete(outcome) {
                panic!("proxy_to target already resolved: {error}");
            }
        })
    }
}

assert_impl_all!(Future<i32>: Send, Sync, Clone);
assert_impl_all!(Future<String>: Send, Sync, Clone);
