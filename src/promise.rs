//! Producer side of an asynchronous result
//!
//! A `Promise` is the write-once handle through which whoever performs some
//! asynchronous work eventually publishes its result. It is typically moved
//! to a worker thread, a timer or an I/O completion callback, while the
//! paired `Future` is handed to the code which wants the result.
//!
//! Resolving a promise consumes it, so a given promise can only ever write
//! once. If a promise is dropped without being resolved, its future is
//! resolved with `AsyncError::BrokenPromise`, so that consumers never hang
//! waiting for a producer which is gone.

use crate::error::{AsyncError, Result};
use crate::future::Future;
use crate::outcome::Try;
use crate::state::{CancelPropagator, SharedState};
use std::fmt;
use std::sync::Arc;


/// Producer interface, used to publish the result of an asynchronous
/// operation
pub struct Promise<T: Send + 'static> {
    /// Shared state cell, released once the promise is resolved
    state: Option<Arc<SharedState<T>>>,
}
//
impl<T: Send + 'static> Promise<T> {
    /// Create a new promise, whose future still has to be retrieved
    pub fn new() -> Self {
        Promise { state: Some(Arc::new(SharedState::root())) }
    }

    /// Create a promise for a step chained onto another result
    pub(crate) fn chained(propagator: CancelPropagator) -> Self {
        Promise { state: Some(Arc::new(SharedState::chained(propagator))) }
    }

    /// Get the future associated with this promise
    ///
    /// # Panics
    ///
    /// Asking for the future twice is a bug, and panics with the
    /// `AsyncError::AlreadyRetrieved` message. See `try_get_future` for a
    /// non-panicking alternative.
    ///
    pub fn get_future(&self) -> Future<T> {
        match self.try_get_future() {
            Ok(future) => future,
            Err(error) => panic!("{}", error),
        }
    }

    /// Get the future associated with this promise, if nobody did already
    pub fn try_get_future(&self) -> Result<Future<T>> {
        let state = self.state();
        if state.mark_retrieved() {
            Ok(Future::from_state(state.clone()))
        } else {
            Err(AsyncError::AlreadyRetrieved)
        }
    }

    /// Check whether the result is settled (set, or abandoned by a timeout)
    pub fn is_ready(&self) -> bool {
        self.state().is_settled()
    }

    /// Resolve the promise with a value
    pub fn set_value(self, value: T) {
        self.set_try(Try::Value(value))
    }

    /// Resolve the promise with an error
    pub fn set_error(self, error: AsyncError) {
        self.set_try(Try::Error(error))
    }

    /// Resolve the promise with a result
    ///
    /// If a timeout already abandoned the result, the write is ignored: the
    /// first outcome wins. Any continuation registered on the future runs
    /// on this thread, after the result was published.
    ///
    pub fn set_try(mut self, result: Try<T>) {
        if let Some(state) = self.state.take() {
            debug_assert!(!result.is_empty(),
                          "Resolving a promise with an empty result");
            state.complete(result);
        }
    }

    fn state(&self) -> &Arc<SharedState<T>> {
        match self.state {
            Some(ref state) => state,
            None => unreachable!("Promise used after being resolved"),
        }
    }
}
//
impl Promise<()> {
    /// Resolve a payload-less promise, meaning "done without error"
    pub fn complete(self) {
        self.set_value(())
    }
}
//
impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}
//
impl<T: Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progress = self.state.as_ref().map(|state| state.progress());
        f.debug_struct("Promise").field("progress", &progress).finish()
    }
}
//
impl<T: Send + 'static> Drop for Promise<T> {
    /// If the promise is dropped before being resolved, notify the consumer
    /// in order to prevent it from hanging
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.abandon();
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Progress;
    use std::thread;
    use std::time::Duration;

    /// Check the initial state of a promise
    #[test]
    fn initial_state() {
        let promise = Promise::<u32>::new();
        assert!(!promise.is_ready());
        assert_eq!(promise.state().progress(), Progress::Pending);
        assert!(promise.state().is_root());
    }

    /// Check that the future can only be retrieved once
    #[test]
    fn retrieve_once() {
        let promise = Promise::<String>::new();
        let future = promise.try_get_future();
        assert!(future.is_ok());
        assert!(matches!(promise.try_get_future(),
                         Err(AsyncError::AlreadyRetrieved)));
    }

    /// Check that retrieving the future twice is treated as a bug
    #[test]
    #[should_panic(expected = "future already retrieved")]
    fn retrieve_twice_panics() {
        let promise = Promise::<()>::new();
        let _first = promise.get_future();
        let _second = promise.get_future();
    }

    /// Check that values and errors reach the future
    #[test]
    fn resolution() {
        let promise = Promise::new();
        let future = promise.get_future();
        promise.set_value(17);
        assert_eq!(future.wait(Duration::from_secs(1)).unwrap(), 17);

        let promise = Promise::<u8>::new();
        let future = promise.get_future();
        promise.set_error(AsyncError::msg("failure"));
        assert!(matches!(future.wait(Duration::from_secs(1)),
                         Err(AsyncError::Failed(_))));

        let promise = Promise::new();
        let future = promise.get_future();
        promise.complete();
        assert!(future.wait(Duration::from_secs(1)).is_ok());
    }

    /// Check that a dropped promise breaks its future
    #[test]
    fn broken_promise() {
        let promise = Promise::<u8>::new();
        let future = promise.get_future();
        thread::spawn(move || drop(promise)).join().unwrap();
        assert!(matches!(future.wait(Duration::from_secs(1)),
                         Err(AsyncError::BrokenPromise)));
    }
}
