//! The single-assignment resolution cell shared by `Promise` and `Future`.
//!
//! A [`ResolveCell`] holds `Pending` or a terminal [`Outcome`], guarded by a
//! mutex that is held only for the `Pending -> Done` transition and state
//! reads. Completion callbacks registered while pending are dispatched in
//! registration order, exactly once, on the resolving thread, *after* the
//! lock is released; a callback may therefore register further callbacks or
//! resolve other promises without self-deadlocking on the cell lock.
//! Callbacks registered after resolution fire synchronously on the
//! registering thread.
//!
//! # Callback panics
//!
//! A panic inside a completion callback is a programming defect in the
//! callback: the cell it responded to has already been resolved, so there is
//! no promise left to fail. The panic is caught, logged loudly, and dispatch
//! continues with the remaining callbacks so that every registered callback
//! still fires exactly once. (The original design terminated the whole
//! process here; isolating the defect to the offending callback is a
//! deliberate softening.)

use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::error::{Error, Outcome, panic_message};

/// A registered completion callback. Receives its own clone of the
/// terminal outcome.
pub(crate) type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

enum State<T> {
    Pending,
    Done(Outcome<T>),
}

struct Inner<T> {
    state: State<T>,
    callbacks: SmallVec<[Callback<T>; 2]>,
}

/// A thread-safe, single-assignment container for an [`Outcome`].
pub(crate) struct ResolveCell<T> {
    inner: Mutex<Inner<T>>,
    resolved: Condvar,
}

impl<T: Clone + Send + 'static> ResolveCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Pending,
                callbacks: SmallVec::new(),
            }),
            resolved: Condvar::new(),
        }
    }

    /// Attempts the `Pending -> Done` transition.
    ///
    /// On success, wakes every blocked reader and dispatches all registered
    /// callbacks in registration order on the calling thread. Fails with
    /// [`Error::AlreadyResolved`] if the cell is already terminal, leaving
    /// the existing state untouched.
    pub(crate) fn complete(&self, outcome: Outcome<T>) -> Result<(), Error> {
        let callbacks = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, State::Done(_)) {
                return Err(Error::AlreadyResolved);
            }
            inner.state = State::Done(outcome.clone());
            self.resolved.notify_all();
            mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            dispatch(callback, outcome.clone());
        }
        Ok(())
    }

    /// Registers a completion callback.
    ///
    /// If the cell is already terminal the callback fires synchronously and
    /// immediately on the registering thread.
    pub(crate) fn respond(&self, callback: Callback<T>) {
        let outcome = {
            let mut inner = self.inner.lock();
            match &inner.state {
                State::Pending => {
                    inner.callbacks.push(callback);
                    return;
                }
                State::Done(outcome) => outcome.clone(),
            }
        };
        dispatch(callback, outcome);
    }

    /// Blocks the calling thread until the cell is terminal.
    pub(crate) fn get(&self) -> Outcome<T> {
        let mut inner = self.inner.lock();
        self.resolved
            .wait_while(&mut inner, |inner| matches!(inner.state, State::Pending));
        match &inner.state {
            State::Done(outcome) => outcome.clone(),
            State::Pending => unreachable!("woken while still pending"),
        }
    }

    /// Blocks until the cell is terminal or `timeout` elapses; fails with
    /// [`Error::Timeout`] if the deadline passes while still pending.
    pub(crate) fn get_for(&self, timeout: Duration) -> Outcome<T> {
        let mut inner = self.inner.lock();
        let _ = self.resolved.wait_while_for(
            &mut inner,
            |inner| matches!(inner.state, State::Pending),
            timeout,
        );
        match &inner.state {
            State::Done(outcome) => outcome.clone(),
            State::Pending => Err(Error::Timeout(timeout)),
        }
    }

    /// Non-blocking read of the terminal outcome, if any.
    pub(crate) fn peek(&self) -> Option<Outcome<T>> {
        match &self.inner.lock().state {
            State::Done(outcome) => Some(outcome.clone()),
            State::Pending => None,
        }
    }

}

impl<T> ResolveCell<T> {
    pub(crate) fn is_defined(&self) -> bool {
        matches!(self.inner.lock().state, State::Done(_))
    }
}

/// Runs one callback, isolating panics to the callback itself.
fn dispatch<T>(callback: Callback<T>, outcome: Outcome<T>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        tracing::error!(
            payload = %panic_message(payload.as_ref()),
            "completion callback panicked; the resolution it responded to is already committed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[rstest]
    fn starts_pending() {
        let cell = ResolveCell::<i32>::new();
        assert!(!cell.is_defined());
        assert!(cell.peek().is_none());
    }

    #[rstest]
    fn complete_commits_exactly_once() {
        let cell = ResolveCell::new();
        assert!(cell.complete(Ok(1)).is_ok());
        assert!(matches!(
            cell.complete(Ok(2)),
            Err(Error::AlreadyResolved)
        ));
        assert_eq!(cell.get(), Ok(1));
    }

    #[rstest]
    fn callbacks_fire_in_registration_order() {
        let cell = ResolveCell::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for index in 0..4 {
            let order = Arc::clone(&order);
            cell.respond(Box::new(move |_| order.lock().push(index)));
        }
        cell.complete(Ok(())).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[rstest]
    fn late_callback_fires_synchronously() {
        let cell = ResolveCell::new();
        cell.complete(Ok(7)).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        cell.respond(Box::new(move |outcome| {
            observer.store(outcome.unwrap(), Ordering::SeqCst);
        }));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[rstest]
    fn callback_panic_does_not_starve_later_callbacks() {
        let cell = ResolveCell::new();
        let fired = Arc::new(AtomicUsize::new(0));
        cell.respond(Box::new(|_| panic!("defective callback")));
        let observer = Arc::clone(&fired);
        cell.respond(Box::new(move |_| {
            observer.fetch_add(1, Ordering::SeqCst);
        }));
        cell.complete(Ok(())).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn get_blocks_until_resolved() {
        let cell = Arc::new(ResolveCell::new());
        let writer = Arc::clone(&cell);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.complete(Ok(42)).unwrap();
        });
        assert_eq!(cell.get(), Ok(42));
        handle.join().unwrap();
    }

    #[rstest]
    fn get_for_times_out_while_pending() {
        let cell = ResolveCell::<i32>::new();
        let outcome = cell.get_for(Duration::from_millis(10));
        assert!(matches!(outcome, Err(Error::Timeout(_))));
        assert!(!cell.is_defined());
    }

    #[rstest]
    fn concurrent_completion_has_one_winner() {
        let cell = Arc::new(ResolveCell::new());
        let successes: Vec<bool> = (0..8)
            .map(|index| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.complete(Ok(index)).is_ok())
            })
            .map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(successes.iter().filter(|won| **won).count(), 1);
        assert!(cell.is_defined());
    }
}
