//! Blocking-based result retrieval
//!
//! This module provides a way to get a result by blocking until it is
//! available. This synchronization mechanism is easy to use and reason about,
//! but should be used with care as the unpredictable application delays that
//! it introduces can be harmful to performance.
//!
//! It also comes with a deadlock hazard which is not checked for: a thread
//! which waits for a result must never be the one which is supposed to
//! produce it. This includes waiting from a continuation which runs on the
//! pool or context thread that will later resolve the awaited promise.

use crate::error::{AsyncError, Result};
use crate::future::Future;
use crate::outcome::Try;
use crate::status::Progress;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;


impl<T: Send + 'static> Future<T> {
    /// Wait for the result, for at most a certain amount of time
    ///
    /// If the result is already there, it is returned immediately. Otherwise,
    /// the calling thread blocks until the result arrives or the timeout
    /// elapses, in which case `AsyncError::WaitTimeout` is returned. A
    /// timeout which cannot be represented as a deadline (such as
    /// `Duration::MAX`) means waiting forever.
    ///
    /// # Panics
    ///
    /// Panics if the future is invalid.
    ///
    pub fn wait(self, timeout: Duration) -> Result<T> {
        // Check the current state of the result
        let state = self.into_state();
        let waiter = Arc::new(Waiter {
            result: Mutex::new(None),
            ready_cv: Condvar::new(),
        });
        {
            let mut inner = state.lock();
            match inner.progress {
                Progress::Done => {
                    inner.progress = Progress::Consumed;
                    return mem::take(&mut inner.result).get();
                },
                Progress::TimedOut if state.is_root() => {
                    return Err(AsyncError::TimedOut);
                },
                Progress::Consumed => return Err(AsyncError::EmptyResult),
                Progress::Pending | Progress::TimedOut => {},
            }

            // If it's not there yet, ask to be notified when it arrives
            let c_waiter = waiter.clone();
            debug_assert!(inner.continuation.is_none(),
                          "A continuation was already registered");
            inner.continuation = Some(Box::new(move |result| {
                *c_waiter.result.lock() = Some(result);
                c_waiter.ready_cv.notify_all();
            }));
        }

        // Block until the result arrives or the deadline is reached
        trace!(?timeout, "Blocking on a pending result");
        let deadline = Instant::now().checked_add(timeout);
        let mut result = waiter.result.lock();
        while result.is_none() {
            match deadline {
                Some(deadline) => {
                    if waiter.ready_cv.wait_until(&mut result, deadline)
                                      .timed_out() {
                        break;
                    }
                },
                None => waiter.ready_cv.wait(&mut result),
            }
        }

        // Hand over the result, if any
        match result.take() {
            Some(result) => {
                let mut inner = state.lock();
                if inner.progress == Progress::Done {
                    inner.progress = Progress::Consumed;
                }
                result.get()
            },
            None => Err(AsyncError::WaitTimeout(timeout)),
        }
    }
}


/// Rendez-vous point between a blocked thread and the resolving thread
struct Waiter<T> {
    /// Result, once it has been handed over (mutex-protected)
    result: Mutex<Option<Try<T>>>,

    /// Condition variable used to wake up the blocked thread
    ready_cv: Condvar,
}
