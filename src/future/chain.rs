//! Continuation-based result processing
//!
//! Chaining schedules some code to run once a result is available, and
//! immediately hands back the future of that code's own result. Nothing ever
//! blocks: if the source result is already there, the continuation is
//! dispatched right away, otherwise it is stored in the source cell and
//! dispatched by whoever resolves it.
//!
//! Continuations come in three shapes:
//!
//! - `then` and friends receive the source result as a `Try<T>` and may thus
//!   recover from errors.
//! - `then_run` and friends take no argument, and only run when the source
//!   succeeded. Errors flow past them to the downstream future.
//! - `then_future` and friends return another future, which gets flattened:
//!   the downstream future resolves once the returned one does.
//!
//! Each of them has an `_on` variant which runs the continuation on a
//! scheduler or execution context instead of the resolving thread. Errors
//! and panics of continuations never unwind through that thread, they end up
//! in the downstream future instead.

use crate::error::{AsyncError, Result};
use crate::executor::Executor;
use crate::future::Future;
use crate::outcome::{self, Try};
use crate::promise::Promise;
use crate::state::SharedState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::trace;


impl<T: Send + 'static> Future<T> {
    /// Run a continuation on the source result, on the resolving thread
    ///
    /// # Panics
    ///
    /// Panics if the future is invalid.
    ///
    pub fn then<U, F>(self, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce(Try<T>) -> Result<U> + Send + 'static
    {
        self.then_on(Executor::Inline, f)
    }

    /// Run a continuation on the source result, on some executor
    pub fn then_on<U, F, E>(self, executor: E, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce(Try<T>) -> Result<U> + Send + 'static,
              E: Into<Executor>
    {
        self.attach(executor.into(), move |result, promise| {
            promise.set_try(Try::capture(move || f(result)))
        })
    }

    /// Run a continuation once the source succeeded, on the resolving thread
    pub fn then_run<U, F>(self, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce() -> Result<U> + Send + 'static
    {
        self.then_run_on(Executor::Inline, f)
    }

    /// Run a continuation once the source succeeded, on some executor
    pub fn then_run_on<U, F, E>(self, executor: E, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce() -> Result<U> + Send + 'static,
              E: Into<Executor>
    {
        self.attach(executor.into(), move |result, promise| {
            match result.check() {
                Ok(()) => promise.set_try(Try::capture(f)),
                Err(error) => promise.set_error(error),
            }
        })
    }

    /// Run a future-returning continuation, on the resolving thread
    pub fn then_future<U, F>(self, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce(Try<T>) -> Future<U> + Send + 'static
    {
        self.then_future_on(Executor::Inline, f)
    }

    /// Run a future-returning continuation, on some executor
    ///
    /// The downstream future resolves with whatever the returned future
    /// resolves to. The final hop, from the returned future to the
    /// downstream one, happens on the thread resolving the former.
    ///
    pub fn then_future_on<U, F, E>(self, executor: E, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce(Try<T>) -> Future<U> + Send + 'static,
              E: Into<Executor>
    {
        self.attach(executor.into(), move |result, promise| {
            match panic::catch_unwind(AssertUnwindSafe(move || f(result))) {
                Ok(inner) => inner.forward(promise),
                Err(payload) => promise.set_error(AsyncError::Panicked(
                    outcome::panic_message(payload.as_ref())
                )),
            }
        })
    }

    /// Transform the value, letting errors through
    pub fn map<U, F>(self, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce(T) -> U + Send + 'static
    {
        self.then(move |result| result.get().map(f))
    }

    /// Start another asynchronous operation with the value, letting errors
    /// through
    pub fn and_then<U, F>(self, f: F) -> Future<U>
        where U: Send + 'static,
              F: FnOnce(T) -> Future<U> + Send + 'static
    {
        self.then_future(move |result| match result.get() {
            Ok(value) => f(value),
            Err(error) => Future::failed(error),
        })
    }

    // Hook a promise-resolving job onto this future's result
    //
    // If the result is already there, the job is dispatched immediately and
    // the downstream cell is a root of its own. Otherwise the job waits in
    // the source cell, and the downstream cell remembers how to forward a
    // cancellation request to the source.
    //
    fn attach<U, J>(self, executor: Executor, job: J) -> Future<U>
        where U: Send + 'static,
              J: FnOnce(Try<T>, Promise<U>) + Send + 'static
    {
        let source = self.into_state();
        let mut inner = source.lock();

        if let Some(result) = SharedState::take_settled(&mut inner,
                                                         source.is_root()) {
            drop(inner);
            trace!(?executor, "Source already settled, dispatching now");
            let promise = Promise::new();
            let future = promise.get_future();
            executor.dispatch(promise, move |promise| job(result, promise));
            return future;
        }

        let upstream = Arc::downgrade(&source);
        let promise = Promise::chained(Box::new(move |on_timeout| {
            if let Some(parent) = upstream.upgrade() {
                parent.request_cancel(on_timeout);
            }
        }));
        let future = promise.get_future();
        debug_assert!(inner.continuation.is_none(),
                      "A continuation was already registered");
        inner.continuation = Some(Box::new(move |result| {
            executor.dispatch(promise, move |promise| job(result, promise))
        }));
        future
    }
}


impl<U: Send + 'static> Future<Future<U>> {
    /// Collapse a future of a future into a future of the inner result
    ///
    /// Errors from either level end up in the resulting future.
    ///
    #[doc(alias = "unwrap")]
    pub fn flatten(self) -> Future<U> {
        self.then_future(|result| match result.get() {
            Ok(inner) => inner,
            Err(error) => Future::failed(error),
        })
    }
}
