//! Multicast producer
//!
//! A `SharedPromise` publishes one result to any number of consumers. Each
//! call to `get_future()` produces a fresh future: consumers which subscribed
//! before the result was set get it as soon as it is, and consumers arriving
//! later get a future which already holds it.
//!
//! Unlike a plain promise, a shared promise is resolved through a shared
//! reference, so that it can live in a struct or behind an `Arc`. Resolving
//! it twice is a bug.

use crate::error::{AsyncError, Result};
use crate::future::Future;
use crate::outcome::Try;
use crate::promise::Promise;
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use tracing::trace;


/// Producer interface which fans a single result out to many consumers
pub struct SharedPromise<T: Clone + Send + 'static> {
    state: Mutex<State<T>>,
}
//
struct State<T: Send + 'static> {
    /// Result, once it has been set
    result: Option<Try<T>>,

    /// Producers of the futures handed out before the result was set
    subscribers: Vec<Promise<T>>,
}
//
impl<T: Clone + Send + 'static> SharedPromise<T> {
    /// Create an unresolved shared promise
    pub fn new() -> Self {
        SharedPromise {
            state: Mutex::new(State { result: None, subscribers: Vec::new() }),
        }
    }

    /// Get a new future of the result
    pub fn get_future(&self) -> Future<T> {
        let mut state = self.state.lock();
        match state.result {
            Some(ref result) => Future::from_try(result.clone()),
            None => {
                let promise = Promise::new();
                let future = promise.get_future();
                state.subscribers.push(promise);
                future
            },
        }
    }

    /// Check if the result was set
    pub fn is_fulfilled(&self) -> bool {
        self.state.lock().result.is_some()
    }

    /// Resolve with a value
    ///
    /// # Panics
    ///
    /// Panics with the `AsyncError::DoubleSet` message if the shared promise
    /// was already resolved.
    ///
    pub fn set_value(&self, value: T) {
        self.set_try(Try::Value(value))
    }

    /// Resolve with an error (panics if already resolved)
    pub fn set_error(&self, error: AsyncError) {
        self.set_try(Try::Error(error))
    }

    /// Resolve with a result (panics if already resolved)
    pub fn set_try(&self, result: Try<T>) {
        if let Err(error) = self.try_set_try(result) {
            panic!("{}", error);
        }
    }

    /// Resolve with a value, if nobody did already
    pub fn try_set_value(&self, value: T) -> Result<()> {
        self.try_set_try(Try::Value(value))
    }

    /// Resolve with an error, if nobody did already
    pub fn try_set_error(&self, error: AsyncError) -> Result<()> {
        self.try_set_try(Try::Error(error))
    }

    /// Resolve with a result, if nobody did already
    pub fn try_set_try(&self, result: Try<T>) -> Result<()> {
        // Record the result and collect the subscribers
        let subscribers = {
            let mut state = self.state.lock();
            if state.result.is_some() {
                return Err(AsyncError::DoubleSet);
            }
            state.result = Some(result.clone());
            mem::take(&mut state.subscribers)
        };

        // Fan the result out, outside of the lock since continuations run
        trace!(subscribers = subscribers.len(), "Fanning out shared result");
        for promise in subscribers {
            promise.set_try(result.clone());
        }
        Ok(())
    }
}
//
impl SharedPromise<()> {
    /// Resolve a payload-less shared promise (panics if already resolved)
    pub fn complete(&self) {
        self.set_value(())
    }
}
//
impl<T: Clone + Send + 'static> Default for SharedPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}
//
impl<T: Clone + Send + 'static> fmt::Debug for SharedPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SharedPromise")
            .field("fulfilled", &state.result.is_some())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
