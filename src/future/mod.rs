//! Consumer side of an asynchronous result
//!
//! A `Future` is the handle through which the result of an asynchronous
//! operation is observed. There are three ways to go about it:
//!
//! - Chaining, in the `chain` submodule, schedules code to run once the
//!   result is available and produces the future of that code's result.
//!   This never blocks, and is the most general synchronization mechanism.
//! - Blocking, in the `blocking` submodule, waits for the result on the
//!   calling thread. This is easy to use and reason about, but should be
//!   used sparingly, and never on the thread which will resolve the
//!   corresponding promise.
//! - Timeouts, in the `timeout` submodule, let a consumer give up on a
//!   result which takes too long to arrive.
//!
//! Every observation consumes the future: a result has exactly one consumer.
//! Use a `SharedPromise` when several parties are interested in it.

mod blocking;
mod chain;
mod timeout;

use crate::error::AsyncError;
use crate::outcome::Try;
use crate::promise::Promise;
use crate::state::{Continuation, SharedState};
use crate::status::Progress;
use std::fmt;
use std::sync::Arc;
use tracing::debug;


/// Consumer interface, used to observe or transform an asynchronous result
#[must_use = "a future does nothing unless its result is observed"]
pub struct Future<T: Send + 'static> {
    /// Shared state cell, absent on default-constructed (invalid) futures
    state: Option<Arc<SharedState<T>>>,
}
//
impl<T: Send + 'static> Future<T> {
    /// Build the consumer side of a shared state cell
    pub(crate) fn from_state(state: Arc<SharedState<T>>) -> Self {
        Future { state: Some(state) }
    }

    /// Create a future which already holds a value
    pub fn ready(value: T) -> Self {
        Self::from_try(Try::Value(value))
    }

    /// Create a future which already holds an error
    pub fn failed(error: AsyncError) -> Self {
        Self::from_try(Try::Error(error))
    }

    /// Create a future which already holds a result
    pub fn from_try(result: Try<T>) -> Self {
        let promise = Promise::new();
        let future = promise.get_future();
        promise.set_try(result);
        future
    }

    /// Check if this future is attached to a result at all
    ///
    /// Only default-constructed futures are invalid. Observing them is a bug.
    ///
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Check whether the result is settled (set, or abandoned by a timeout)
    ///
    /// A timeout which went through this future without reaching a pending
    /// upstream result does not make it ready: that result still gets
    /// through.
    ///
    /// # Panics
    ///
    /// Panics if the future is invalid.
    ///
    pub fn is_ready(&self) -> bool {
        self.shared().is_settled()
    }

    /// Current progress of the result
    ///
    /// # Panics
    ///
    /// Panics if the future is invalid.
    ///
    pub fn progress(&self) -> Progress {
        self.shared().progress()
    }

    fn shared(&self) -> &Arc<SharedState<T>> {
        match self.state {
            Some(ref state) => state,
            None => panic!("Observed an invalid (default-constructed) future"),
        }
    }

    /// Give up the consumer handle, keeping the shared state cell
    pub(crate) fn into_state(self) -> Arc<SharedState<T>> {
        match self.state {
            Some(state) => state,
            None => panic!("Observed an invalid (default-constructed) future"),
        }
    }

    /// Run some code once the result is available, on the resolving thread
    pub(crate) fn subscribe(self, continuation: Continuation<T>) {
        self.into_state().subscribe(continuation)
    }

    /// Resolve some promise with this future's result, whenever it comes
    ///
    /// The promise is simply dropped (and thus broken) if this future is
    /// invalid.
    ///
    pub(crate) fn forward(self, promise: Promise<T>) {
        if !self.valid() {
            debug!("Continuation produced an invalid future, breaking promise");
            return;
        }
        self.subscribe(Box::new(move |result| promise.set_try(result)))
    }
}
//
impl<T: Send + 'static> Default for Future<T> {
    /// Create an invalid future, which is not attached to any result
    fn default() -> Self {
        Future { state: None }
    }
}
//
impl<T: Send + 'static> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = self.state.as_ref().map(|state| state.progress());
        f.debug_struct("Future").field("progress", &progress).finish()
    }
}
