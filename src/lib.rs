//! # yakusoku
//!
//! Composable blocking promises and futures for thread-based concurrency.
//!
//! ## Overview
//!
//! This library provides a promise/future pair built for plain OS threads,
//! with no async runtime:
//!
//! - **Promise**: a writable single-assignment handle; the first resolution
//!   wins and is irrevocable
//! - **Future**: the read-only view of a promise, carrying blocking reads,
//!   non-blocking probes and the combinator engine
//! - **Combinators**: `map`, `flat_map`, `rescue`, `handle`, `filter`,
//!   `ensure`, `within`, `or` and friends, all registered as completion
//!   callbacks so chaining never blocks
//! - **Aggregation**: `collect`, `join`, `select` and `wait_all` over
//!   collections of futures
//! - **Execution**: a bounded [`WorkerPool`] with a process-wide registry,
//!   plus dedicated control-plane threads for timers and bulk waits so that
//!   waiting can never starve the pool
//!
//! ## Example
//!
//! ```rust
//! use yakusoku::prelude::*;
//!
//! let future = Promise::call(|| Ok::<_, std::convert::Infallible>(6))
//!     .map(|n| n * 7)
//!     .filter(|n| *n > 0);
//! assert_eq!(future.get(), Ok(42));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types.
///
/// # Usage
///
/// ```rust
/// use yakusoku::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Outcome, PanicError};
    pub use crate::executor::{WorkerPool, executor, set_executor};
    pub use crate::future::Future;
    pub use crate::promise::Promise;
}

mod aggregate;
mod cell;
mod control;
pub mod error;
pub mod executor;
pub mod future;
pub mod promise;

pub use error::{Error, Outcome, PanicError};
pub use executor::{PoolError, WorkerPool, executor, set_executor};
pub use future::Future;
pub use promise::Promise;
