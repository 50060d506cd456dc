//! Promises and futures for threaded code
//!
//! Picture yourself in a situation where you want to delegate work to another
//! thread, a timer, or some I/O completion callback. You know that the work
//! is going to take some time, and you have other things to do meanwhile, so
//! you would rather not wait for its completion. But at some point, you will
//! want to do something with its result, or with the error which prevented
//! it from existing.
//!
//! This crate handles this with the classic promise/future pair. Whoever does
//! the work holds a `Promise`, which is resolved exactly once with a value or
//! an error. Whoever wants the result holds the matching `Future`, which can
//! be:
//!
//! - Chained onto (`then`, `map`, `and_then`...), scheduling code to run once
//!   the result is there, on the resolving thread or on some `Scheduler`.
//! - Waited upon, blocking the calling thread for a bounded amount of time.
//! - Given up upon after some delay (`on_timeout`), which walks back up a
//!   chain of continuations to the result it depends on.
//! - Combined with other futures (`all`, `any`, `first_n`...).
//!
//! When several consumers are interested in the same result, a
//! `SharedPromise` hands out as many futures as needed.
//!
//! Failures are values: errors returned or panics raised by continuations
//! travel down the chain as `AsyncError`s inside a `Try`, and never unwind
//! through the thread which happened to run the continuation. Misuse of the
//! API, such as retrieving the future of a promise twice, panics.
//!
//! There is no global runtime. Thread pools, timers and execution contexts
//! are created explicitly and passed to whatever needs them.

pub mod combinators;
pub mod error;
pub mod executor;
pub mod future;
pub mod outcome;
pub mod promise;
pub mod shared_promise;
mod state;
pub mod status;

#[cfg(test)]
mod test_utils;

pub use crate::combinators::{all, all2, all3, all4, all5, all6, any,
                             first_matching, first_n, first_n_matching};
pub use crate::error::{AsyncError, Result};
pub use crate::executor::{spawn, spawn_after, ExecutionContext, Executor,
                          InlineScheduler, Scheduler, Task, ThreadPool,
                          ThreadPoolBuilder, Timer};
pub use crate::future::Future;
pub use crate::outcome::Try;
pub use crate::promise::Promise;
pub use crate::shared_promise::SharedPromise;
pub use crate::status::Progress;
