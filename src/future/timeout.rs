//! Giving up on results which take too long
//!
//! A timeout does not abort the producer's work, which keeps running and may
//! still try to publish its result. What it does is mark the result as
//! abandoned, walking up the chain of continuations to the root result, so
//! that everyone downstream stops waiting for it.
//!
//! Since each cell only knows the cell it was chained onto, a timeout is only
//! meaningful when attached to the last future of a chain. Attaching it to
//! an intermediate future is not possible anyway, as chaining consumes it.

use crate::executor::{Scheduler, Task};
use crate::future::Future;
use std::time::Duration;
use tracing::warn;


impl<T: Send + 'static> Future<T> {
    /// Give up on the result if it does not arrive within some delay
    ///
    /// Once the delay has elapsed, a cancellation request is run on the
    /// scheduler. If the root result is still pending at that point, it is
    /// abandoned, `callback` runs, and whoever observes this future gets
    /// `AsyncError::TimedOut`. If the result arrived first, nothing happens.
    ///
    /// # Panics
    ///
    /// Panics if the future is invalid.
    ///
    pub fn on_timeout<S, F>(self,
                            delay: Duration,
                            callback: F,
                            scheduler: &S) -> Future<T>
        where S: Scheduler + ?Sized,
              F: FnOnce() + Send + 'static
    {
        let state = self.shared().clone();
        let request: Task = Box::new(move || {
            state.request_cancel(Box::new(callback))
        });
        if let Err(error) = scheduler.schedule_later(delay, request) {
            warn!(%error, "Could not arm timeout, result may wait forever");
        }
        self
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::AsyncError;
    use crate::executor::{ExecutionContext, Timer};
    use crate::outcome::Try;
    use crate::promise::Promise;
    use crate::status::Progress;
    use crate::test_utils::init_test_logging;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Check that a timeout abandons a result which never arrives
    #[test]
    fn timeout_fires() {
        init_test_logging();
        let timer = Timer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let c_fired = fired.clone();

        let promise = Promise::<u8>::new();
        let future = promise.get_future().on_timeout(
            Duration::from_millis(20),
            move || { c_fired.fetch_add(1, Ordering::SeqCst); },
            &timer
        );
        while fired.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(future.is_ready());
        assert!(matches!(future.wait(WAIT), Err(AsyncError::TimedOut)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // The producer's late write goes nowhere
        promise.set_value(1);
    }

    /// Check that a result arriving first wins over the timeout
    #[test]
    fn result_wins() {
        let timer = Timer::new();
        let promise = Promise::new();
        let future = promise.get_future().on_timeout(
            Duration::from_millis(20),
            || panic!("timeout callback ran"),
            &timer
        );
        promise.set_value(7);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(future.progress(), Progress::Done);
        assert_eq!(future.wait(WAIT).unwrap(), 7);
    }

    /// Check that timeouts walk up a chain of continuations
    #[test]
    fn timeout_through_chain() {
        let timer = Timer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let c_fired = fired.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let c_seen = seen.clone();

        let promise = Promise::<u8>::new();
        let future = promise.get_future()
            .then(move |result: Try<u8>| {
                assert!(matches!(result, Try::Error(AsyncError::TimedOut)));
                c_seen.fetch_add(1, Ordering::SeqCst);
                result.get()
            })
            .map(|x| x + 1)
            .on_timeout(Duration::from_millis(20),
                        move || { c_fired.fetch_add(1, Ordering::SeqCst); },
                        &timer);

        assert!(matches!(future.wait(WAIT), Err(AsyncError::TimedOut)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        drop(promise);
    }

    /// Check that a timeout stops at a step which already ran
    #[test]
    fn timeout_after_root_resolved() {
        let timer = Timer::new();
        let root = Promise::<u8>::new();
        let inner = Promise::<u8>::new();
        let inner_future = inner.get_future();
        let future = root.get_future()
            .then_future(move |_| inner_future)
            .on_timeout(Duration::from_millis(20),
                        || panic!("timeout callback ran"),
                        &timer);
        root.set_value(1);

        // The request marks the downstream cell, but finds nothing pending
        // upstream, so the real result still gets through later on
        thread::sleep(Duration::from_millis(50));
        assert_eq!(future.progress(), Progress::TimedOut);
        assert!(!future.is_ready());
        inner.set_value(2);
        assert!(future.is_ready());
        assert_eq!(future.wait(WAIT).unwrap(), 2);
    }

    /// Check that timeouts can fire on an execution context
    #[test]
    fn timeout_on_context() {
        let context = ExecutionContext::new("timeout-test").unwrap();
        let handle = context.handle();
        let on_context = Arc::new(AtomicUsize::new(0));
        let c_on_context = on_context.clone();

        let promise = Promise::<()>::new();
        let future = promise.get_future().on_timeout(
            Duration::from_millis(10),
            move || {
                if handle.is_current() {
                    c_on_context.fetch_add(1, Ordering::SeqCst);
                }
            },
            &context
        );
        assert!(matches!(future.wait(WAIT), Err(AsyncError::TimedOut)));
        assert_eq!(on_context.load(Ordering::SeqCst), 1);
    }
}
