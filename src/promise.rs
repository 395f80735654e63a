//! The writable completion handle.
//!
//! A [`Promise`] owns a resolution cell and enforces at-most-one resolution:
//! the `Pending -> Success`/`Pending -> Failure` transition happens exactly
//! once, and the winning resolution is irrevocable. The read capability is
//! split out into [`Future`]: a promise dereferences to its read-only view,
//! so every probe and combinator is available on both, while the write
//! operations ([`set_value`](Promise::set_value),
//! [`set_exception`](Promise::set_exception), [`update`](Promise::update),
//! [`update_if_empty`](Promise::update_if_empty)) exist only here.
//!
//! # Examples
//!
//! Filling a promise from a worker and handing out the read-only view:
//!
//! ```rust
//! use yakusoku::Promise;
//! use std::thread;
//!
//! let promise = Promise::new();
//! let writer = promise.clone();
//! thread::spawn(move || {
//!     writer.set_value("done").expect("first resolution wins");
//! });
//! assert_eq!(promise.future().get(), Ok("done"));
//! ```

use std::convert::Infallible;
use std::error;
use std::fmt;
use std::ops::Deref;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use static_assertions::assert_impl_all;

use crate::cell::ResolveCell;
use crate::error::{Error, Outcome};
use crate::executor;
use crate::future::Future;

/// Writable single-assignment completion handle.
///
/// Cloning a `Promise` clones the handle; all clones resolve the same cell,
/// and only the first resolution wins.
pub struct Promise<T> {
    view: Future<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Promise")
            .field("defined", &self.view.cell.is_defined())
            .finish_non_exhaustive()
    }
}

/// A promise implements the whole read capability of its bound [`Future`].
///
/// Write operations are inherent to `Promise` and do not exist on the
/// deref target, so a `Future` can never resolve the cell.
impl<T> Deref for Promise<T> {
    type Target = Future<T>;

    fn deref(&self) -> &Future<T> {
        &self.view
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates a new unresolved promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            view: Future::from_cell(Arc::new(ResolveCell::new())),
        }
    }

    /// Returns the read-only view bound to this promise.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        self.view.clone()
    }

    // =========================================================================
    // Write operations
    // =========================================================================

    /// Resolves this promise successfully with `value`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyResolved`] if a resolution already won; the existing
    /// state is left untouched.
    pub fn set_value(&self, value: T) -> Result<(), Error> {
        self.complete(Ok(value))
    }

    /// Resolves this promise as failed with `error`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyResolved`] if a resolution already won; the existing
    /// state is left untouched.
    pub fn set_exception(&self, error: Error) -> Result<(), Error> {
        self.complete(Err(error))
    }

    pub(crate) fn complete(&self, outcome: Outcome<T>) -> Result<(), Error> {
        self.view.cell.complete(outcome)
    }

    /// Resolves only if still pending; the double-resolution race is
    /// expected and tolerated here.
    pub(crate) fn complete_if_pending(&self, outcome: Outcome<T>) -> bool {
        self.complete(outcome).is_ok()
    }

    /// Unconditionally adopts `other`'s eventual outcome. Resolving this
    /// promise through any other path first is a defect and fails loudly.
    pub fn update(&self, other: Future<T>) -> Self {
        let sink = self.clone();
        other.respond(move |outcome| {
            if let Err(error) = sink.complete(outcome) {
                panic!("update target already resolved: {error}");
            }
        });
        self.clone()
    }

    /// Adopts `other`'s eventual outcome only if this promise is still
    /// pending by then; otherwise the proxied write is silently discarded.
    pub fn update_if_empty(&self, other: Future<T>) -> Self {
        let sink = self.clone();
        other.respond(move |outcome| {
            sink.complete_if_pending(outcome);
        });
        self.clone()
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Builds an already-successful future holding `value`.
    pub fn value(value: T) -> Future<T> {
        let promise = Self::new();
        promise
            .set_value(value)
            .expect("fresh promise is resolved exactly once");
        promise.future()
    }

    /// Builds an already-failed future holding `error`.
    pub fn exception(error: Error) -> Future<T> {
        let promise = Self::new();
        promise
            .set_exception(error)
            .expect("fresh promise is resolved exactly once");
        promise.future()
    }

    /// Invokes `task` synchronously on the calling thread and returns an
    /// already-resolved future. Errors and panics raised inside `task` are
    /// wrapped as [`Error::Wrapped`] with captured context.
    pub fn eval<E, F>(task: F) -> Future<T>
    where
        E: error::Error + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let promise = Self::new();
        promise
            .complete(run_guarded(task))
            .expect("fresh promise is resolved exactly once");
        promise.future()
    }

    /// Submits `task` to the current worker pool and returns a future that
    /// resolves when it completes, with the same error wrapping as
    /// [`eval`](Self::eval). The pool current *at submission time* is used.
    pub fn call<E, F>(task: F) -> Future<T>
    where
        E: error::Error + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let promise = Self::new();
        let sink = promise.clone();
        let submitted = executor::executor().submit(move || {
            sink.complete(run_guarded(task))
                .expect("call promise is resolved exactly once");
        });
        if let Err(rejection) = submitted {
            promise
                .complete(Err(Error::wrapped(rejection)))
                .expect("fresh promise is resolved exactly once");
        }
        promise.future()
    }
}

impl Promise<()> {
    /// Schedules a task on the current pool that sleeps for `duration`, then
    /// resolves to `()`.
    pub fn wait(duration: Duration) -> Future<()> {
        Self::call(move || {
            thread::sleep(duration);
            Ok::<(), Infallible>(())
        })
    }
}

fn run_guarded<T, E, F>(task: F) -> Outcome<T>
where
    E: error::Error + Send + Sync + 'static,
    F: FnOnce() -> Result<T, E>,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Error::wrapped(error)),
        Err(payload) => Err(Error::from_panic(payload.as_ref())),
    }
}

assert_impl_all!(Promise<i32>: Send, Sync, Clone);
assert_impl_all!(Promise<String>: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[rstest]
    fn value_round_trips() {
        assert_eq!(Promise::value(42).get(), Ok(42));
    }

    #[rstest]
    fn exception_round_trips() {
        let future = Promise::<i32>::exception(Error::wrapped(std::fmt::Error));
        assert_eq!(future.get(), Err(Error::wrapped(std::fmt::Error)));
    }

    #[rstest]
    #[case::value_then_value(Ok(1), Ok(2))]
    #[case::value_then_exception(Ok(1), Err(Error::SelectOnEmpty))]
    #[case::exception_then_value(Err(Error::SelectOnEmpty), Ok(2))]
    #[case::exception_then_exception(Err(Error::SelectOnEmpty), Err(Error::SelectOnEmpty))]
    fn second_resolution_always_fails(#[case] first: Outcome<i32>, #[case] second: Outcome<i32>) {
        let promise = Promise::new();
        assert!(promise.complete(first.clone()).is_ok());
        assert_eq!(promise.complete(second), Err(Error::AlreadyResolved));
        assert_eq!(promise.get(), first);
    }

    #[rstest]
    fn eval_wraps_user_errors() {
        let future = Promise::<i32>::eval(|| Err(std::fmt::Error));
        let error = future.get().unwrap_err();
        assert!(matches!(error, Error::Wrapped { .. }));
        let source = std::error::Error::source(&error).unwrap();
        assert!(source.downcast_ref::<std::fmt::Error>().is_some());
    }

    #[rstest]
    fn eval_wraps_panics() {
        let future = Promise::<i32>::eval(|| -> Result<i32, Infallible> { panic!("kaboom") });
        let error = future.get().unwrap_err();
        assert!(error.to_string().contains("kaboom"));
    }

    #[rstest]
    fn eval_runs_synchronously() {
        let future = Promise::eval(|| Ok::<_, Infallible>(5));
        assert!(future.is_defined());
        assert_eq!(future.get(), Ok(5));
    }

    #[rstest]
    fn call_resolves_on_the_pool() {
        let future = Promise::call(|| Ok::<_, Infallible>(6));
        assert_eq!(future.get_for(Duration::from_secs(5)), Ok(6));
    }

    #[rstest]
    fn update_adopts_other_outcome() {
        let source = Promise::new();
        let target = Promise::new();
        target.update(source.future());
        source.set_value(3).unwrap();
        assert_eq!(target.get(), Ok(3));
    }

    #[rstest]
    fn update_if_empty_discards_when_already_resolved() {
        let source = Promise::new();
        let target = Promise::new();
        target.set_value(1).unwrap();
        target.update_if_empty(source.future());
        source.set_value(2).unwrap();
        assert_eq!(target.get(), Ok(1));
    }

    #[rstest]
    fn update_if_empty_fills_a_pending_promise() {
        let source = Promise::<i32>::new();
        let target = Promise::new();
        target.update_if_empty(source.future());
        source.set_exception(Error::SelectOnEmpty).unwrap();
        assert_eq!(target.get(), Err(Error::SelectOnEmpty));
    }

    #[rstest]
    fn promise_exposes_read_capability_by_deref() {
        let promise = Promise::new();
        assert!(!promise.is_defined());
        let doubled = promise.map(|n: i32| n * 2);
        promise.set_value(4).unwrap();
        assert_eq!(doubled.get(), Ok(8));
    }

    #[rstest]
    fn respond_fires_exactly_once_per_registrant() {
        let fired = Arc::new(AtomicUsize::new(0));
        let promise = Promise::new();
        for _ in 0..3 {
            let fired = Arc::clone(&fired);
            promise.respond(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        promise.set_value(()).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }
}
