//! State shared between a promise, its future, and continuations
//!
//! Every asynchronous result lives in one of these cells. The producer side
//! (`Promise`) writes the result, the consumer side (`Future`) registers a
//! continuation or blocks on it, and both may race each other from different
//! threads. A single mutex guards the progress, the result and the
//! continuation as one unit: whichever side arrives second is the one which
//! runs the continuation, always after releasing the lock.
//!
//! Cells created by chaining a step onto a pending future additionally know
//! how to forward a cancellation request to the cell they depend on, so that
//! a timeout requested at the end of a chain can reach its root.

use crate::error::AsyncError;
use crate::outcome::{self, Try};
use crate::status::Progress;
use parking_lot::{Mutex, MutexGuard};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};


/// Code to be run once a result becomes available
pub(crate) type Continuation<T> = Box<dyn FnOnce(Try<T>) + Send + 'static>;

/// Code to be run when a timeout abandons a pending result
pub(crate) type TimeoutCallback = Box<dyn FnOnce() + Send + 'static>;

/// Forwards a cancellation request to the cell a chained cell depends on
pub(crate) type CancelPropagator =
    Box<dyn Fn(TimeoutCallback) + Send + Sync + 'static>;


/// Shared state cell
pub(crate) struct SharedState<T> {
    /// Progress, result and continuation (mutex-protected)
    inner: Mutex<Inner<T>>,

    /// Link to the upstream cell, absent on root cells
    cancel_propagator: Option<CancelPropagator>,

    /// Whether the paired future has been handed out
    retrieved: AtomicBool,
}
//
pub(crate) struct Inner<T> {
    /// Where the result stands
    pub progress: Progress,

    /// The result itself, meaningful once progress is Done
    pub result: Try<T>,

    /// Code to run once the result is available
    pub continuation: Option<Continuation<T>>,
}
//
impl<T: Send + 'static> SharedState<T> {
    /// Create a root cell, as owned by a freshly created promise
    pub fn root() -> Self {
        Self::with_propagator(None)
    }

    /// Create a cell which depends on another one through chaining
    pub fn chained(propagator: CancelPropagator) -> Self {
        Self::with_propagator(Some(propagator))
    }

    fn with_propagator(cancel_propagator: Option<CancelPropagator>) -> Self {
        SharedState {
            inner: Mutex::new(Inner {
                progress: Progress::Pending,
                result: Try::Empty,
                continuation: None,
            }),
            cancel_propagator,
            retrieved: AtomicBool::new(false),
        }
    }

    /// Root cells are those which were not created by chaining
    pub fn is_root(&self) -> bool {
        self.cancel_propagator.is_none()
    }

    /// Lock the cell
    pub fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock()
    }

    /// Current progress of the result
    pub fn progress(&self) -> Progress {
        self.inner.lock().progress
    }

    /// Check whether the result is settled for good
    ///
    /// A timed out chained cell does not count: its upstream step may still
    /// complete it.
    ///
    pub fn is_settled(&self) -> bool {
        match self.progress() {
            Progress::Pending => false,
            Progress::TimedOut => self.is_root(),
            Progress::Done | Progress::Consumed => true,
        }
    }

    /// Flip the "future retrieved" flag, telling if we were first to do so
    pub fn mark_retrieved(&self) -> bool {
        self.retrieved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Set the result, telling whether the write took effect
    ///
    /// The first write wins on root cells: writes arriving after a timeout
    /// abandoned the result are ignored. Chained cells may still be written
    /// after a timeout request went through them without reaching a pending
    /// root, which is how their upstream step completes normally.
    ///
    pub fn complete(&self, result: Try<T>) -> bool {
        let inner = self.inner.lock();
        match inner.progress {
            Progress::Pending => {},
            Progress::TimedOut if !self.is_root() => {},
            progress => {
                debug!(?progress, "Ignoring write to an already settled result");
                return false;
            },
        }
        Self::resolve(inner, result);
        true
    }

    /// Resolve a result whose producer went away without writing it
    pub fn abandon(&self) {
        let inner = self.inner.lock();
        let reason = match inner.progress {
            Progress::Pending => AsyncError::BrokenPromise,
            Progress::TimedOut if !self.is_root() => AsyncError::TimedOut,
            _ => return,
        };
        debug!(%reason, "Producer dropped before resolving its promise");
        Self::resolve(inner, Try::Error(reason));
    }

    // Store the result or hand it to the continuation, outside of the lock
    fn resolve(mut inner: MutexGuard<'_, Inner<T>>, result: Try<T>) {
        inner.progress = Progress::Done;
        match inner.continuation.take() {
            Some(continuation) => {
                drop(inner);
                trace!("Running continuation on the resolving thread");
                continuation(result);
            },
            None => inner.result = result,
        }
    }

    /// Register the continuation, or run it right away if we are late
    ///
    /// An abandoned root hands `TimedOut` to late subscribers, since its
    /// real result will never come.
    ///
    pub fn subscribe(&self, continuation: Continuation<T>) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.continuation.is_none(),
                      "A continuation was already registered");
        if let Some(result) = Self::take_settled(&mut inner, self.is_root()) {
            drop(inner);
            continuation(result);
        } else {
            inner.continuation = Some(continuation);
        }
    }

    /// Extract the result if it can be observed right now
    pub fn take_settled(inner: &mut Inner<T>, is_root: bool) -> Option<Try<T>> {
        match inner.progress {
            Progress::Done => Some(mem::take(&mut inner.result)),
            Progress::TimedOut if is_root => {
                Some(Try::Error(AsyncError::TimedOut))
            },
            Progress::Consumed => Some(Try::Error(AsyncError::EmptyResult)),
            Progress::Pending | Progress::TimedOut => None,
        }
    }

    /// Process a cancellation request, walking up to the root if needed
    ///
    /// If this cell is not pending anymore, the request has arrived too late
    /// and is dropped. Otherwise the cell is marked as timed out, and either
    /// the request is forwarded upstream, or this is the root and the result
    /// gets abandoned: the timeout callback runs, then whoever subscribed to
    /// the result learns that it timed out.
    ///
    pub fn request_cancel(&self, on_timeout: TimeoutCallback) {
        let mut inner = self.inner.lock();
        if inner.progress != Progress::Pending {
            trace!(progress = ?inner.progress,
                   "Cancellation request arrived after the result settled");
            return;
        }
        inner.progress = Progress::TimedOut;

        match self.cancel_propagator {
            Some(ref propagate) => {
                drop(inner);
                trace!("Forwarding cancellation request upstream");
                propagate(on_timeout);
            },
            None => {
                let continuation = inner.continuation.take();
                drop(inner);
                debug!("Abandoning pending result after timeout");
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(on_timeout))
                {
                    warn!(panic = %outcome::panic_message(payload.as_ref()),
                          "Timeout callback panicked");
                }
                if let Some(continuation) = continuation {
                    continuation(Try::Error(AsyncError::TimedOut));
                }
            },
        }
    }
}
