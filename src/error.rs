//! Error types for promise resolution and combinators.
//!
//! This module provides the crate-wide [`Error`] enum and the [`Outcome`]
//! alias used for every resolved promise state. Errors are cheap to clone
//! because a resolved outcome is broadcast to every reader and every
//! registered callback; wrapped user errors are shared behind an `Arc`.
//!
//! # Wrapped user errors
//!
//! Errors returned (or panics raised) by user functions passed to
//! [`Promise::eval`](crate::Promise::eval) and
//! [`Promise::call`](crate::Promise::call) are carried as
//! [`Error::Wrapped`]: a tagged wrapper holding the original error plus the
//! backtrace captured when it was wrapped. Callers can keep discriminating
//! on the original error through [`std::error::Error::source`] and
//! downcasting:
//!
//! ```rust
//! use yakusoku::Promise;
//!
//! let future = Promise::eval(|| Err::<i32, _>(std::fmt::Error));
//! let error = future.get().unwrap_err();
//! let source = std::error::Error::source(&error).expect("wrapped errors carry a source");
//! assert!(source.downcast_ref::<std::fmt::Error>().is_some());
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The resolved state of a promise: a value or a crate [`Error`].
pub type Outcome<T> = Result<T, Error>;

/// Errors produced by promise resolution, blocking reads and combinators.
#[derive(Debug, Clone)]
pub enum Error {
    /// A second resolution was attempted on an already-resolved promise.
    ///
    /// The first resolution wins and is left untouched.
    AlreadyResolved,

    /// A blocking read or a [`within`](crate::Future::within) race exceeded
    /// its deadline. Carries the deadline that was exceeded.
    Timeout(Duration),

    /// A value was rejected by [`filter`](crate::Future::filter).
    ///
    /// Carries the `Debug` rendering of the rejected value.
    FilteredOut(String),

    /// [`Promise::select`](crate::Promise::select) was called with zero
    /// inputs; selection over nothing is undefined.
    SelectOnEmpty,

    /// An error raised inside a user function passed to `eval`/`call`,
    /// tagged with the backtrace captured at wrap time. The original error
    /// stays reachable through [`std::error::Error::source`].
    Wrapped {
        /// Backtrace captured when the error was wrapped.
        context: String,
        /// The original error.
        source: Arc<dyn error::Error + Send + Sync>,
    },
}

impl Error {
    /// Wraps a user error, capturing the current backtrace as context.
    pub fn wrapped<E>(source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Self::Wrapped {
            context: Backtrace::capture().to_string(),
            source: Arc::new(source),
        }
    }

    /// Converts a caught panic payload into a wrapped [`PanicError`].
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::wrapped(PanicError {
            message: panic_message(payload),
        })
    }

    /// Returns the captured backtrace context of a wrapped error.
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Wrapped { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    /// Kind-wise equality. Wrapped errors compare by their rendered source;
    /// the captured backtrace context is ignored.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AlreadyResolved, Self::AlreadyResolved)
            | (Self::SelectOnEmpty, Self::SelectOnEmpty) => true,
            (Self::Timeout(left), Self::Timeout(right)) => left == right,
            (Self::FilteredOut(left), Self::FilteredOut(right)) => left == right,
            (Self::Wrapped { source: left, .. }, Self::Wrapped { source: right, .. }) => {
                left.to_string() == right.to_string()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyResolved => {
                write!(
                    formatter,
                    "promise is already resolved; its state cannot be set again"
                )
            }
            Self::Timeout(duration) => {
                write!(formatter, "promise did not resolve within {duration:?}")
            }
            Self::FilteredOut(value) => {
                write!(formatter, "value {value} was filtered out")
            }
            Self::SelectOnEmpty => {
                write!(formatter, "select requires at least one future")
            }
            Self::Wrapped { source, .. } => {
                write!(formatter, "wrapped error: {source}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Wrapped { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

/// A panic caught inside a user function or completion callback,
/// preserved as an error with the stringified payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Returns the stringified panic payload.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "panicked: {}", self.message)
    }
}

impl error::Error for PanicError {}

/// Renders a panic payload for logging and error wrapping.
///
/// Panic payloads are almost always `&str` or `String`; anything else is
/// reported as opaque.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn already_resolved_display() {
        let message = Error::AlreadyResolved.to_string();
        assert!(message.contains("already resolved"));
    }

    #[rstest]
    fn timeout_display_mentions_duration() {
        let message = Error::Timeout(Duration::from_millis(50)).to_string();
        assert!(message.contains("50ms"));
    }

    #[rstest]
    fn filtered_out_display_carries_value() {
        let message = Error::FilteredOut("3".to_owned()).to_string();
        assert_eq!(message, "value 3 was filtered out");
    }

    #[rstest]
    fn select_on_empty_display() {
        let message = Error::SelectOnEmpty.to_string();
        assert!(message.contains("at least one future"));
    }

    #[rstest]
    fn wrapped_preserves_original_identity() {
        let error = Error::wrapped(std::fmt::Error);
        let source = std::error::Error::source(&error).expect("wrapped errors carry a source");
        assert!(source.downcast_ref::<std::fmt::Error>().is_some());
    }

    #[rstest]
    fn wrapped_captures_context() {
        let error = Error::wrapped(std::fmt::Error);
        assert!(error.context().is_some());
        assert!(Error::AlreadyResolved.context().is_none());
    }

    #[rstest]
    fn panic_message_renders_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new("boom".to_owned());
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[rstest]
    fn errors_are_cloneable() {
        let error = Error::wrapped(std::fmt::Error);
        let cloned = error.clone();
        assert_eq!(error.to_string(), cloned.to_string());
    }
}
