//! Aggregation of many asynchronous results
//!
//! These functions take a set of futures and produce a single future which
//! resolves once enough of the inputs did, for some definition of enough:
//! all of them, the first one, the first N of them, or the first one(s)
//! whose result passes a predicate.
//!
//! Inputs are consumed and must be valid futures. Results are reported as
//! `Try`s, tagged with the position of their input where relevant, so an
//! aggregate only fails when a predicate-based search comes up short.
//! Results arriving after the aggregate resolved are ignored.

use crate::error::AsyncError;
use crate::future::Future;
use crate::outcome::{self, Try};
use crate::promise::Promise;
use parking_lot::Mutex;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;


/// Wait for every input, reporting their results in input order
///
/// This never fails, and never short-circuits on errors. An empty input
/// resolves immediately to an empty vector.
///
pub fn all<T, I>(futures: I) -> Future<Vec<Try<T>>>
    where T: Send + 'static,
          I: IntoIterator<Item = Future<T>>
{
    let futures = futures.into_iter().collect::<Vec<_>>();
    if futures.is_empty() {
        return Future::ready(Vec::new());
    }

    let (aggregate, future) = Aggregate::start(Counted {
        results: futures.iter().map(|_| Try::Empty).collect::<Vec<_>>(),
        remaining: futures.len(),
    });
    for (index, input) in futures.into_iter().enumerate() {
        let aggregate = aggregate.clone();
        input.subscribe(Box::new(move |result| {
            aggregate.update(|state| {
                state.results[index] = result;
                state.countdown()
            })
        }));
    }
    future
}


// Heterogeneous variants of all(), resolving to a tuple of results
macro_rules! all_tuple {
    ($(#[$attr:meta])* $name:ident($($input:ident: $ty:ident => $slot:tt),+)) => {
        $(#[$attr])*
        pub fn $name<$($ty),+>($($input: Future<$ty>),+)
            -> Future<($(Try<$ty>,)+)>
            where $($ty: Send + 'static),+
        {
            let (aggregate, future) = Aggregate::start(Counted {
                results: ($(Try::<$ty>::Empty,)+),
                remaining: [$(stringify!($input)),+].len(),
            });
            $(
                let c_aggregate = aggregate.clone();
                $input.subscribe(Box::new(move |result| {
                    c_aggregate.update(|state| {
                        state.results.$slot = result;
                        state.countdown()
                    })
                }));
            )+
            future
        }
    };
}

all_tuple!(
    /// Wait for two futures of possibly different types
    all2(first: A => 0, second: B => 1)
);

all_tuple!(
    /// Wait for three futures of possibly different types
    all3(first: A => 0, second: B => 1, third: C => 2)
);

all_tuple!(
    /// Wait for four futures of possibly different types
    all4(first: A => 0, second: B => 1, third: C => 2, fourth: D => 3)
);

all_tuple!(
    /// Wait for five futures of possibly different types
    all5(first: A => 0, second: B => 1, third: C => 2, fourth: D => 3,
         fifth: E => 4)
);

all_tuple!(
    /// Wait for six futures of possibly different types
    all6(first: A => 0, second: B => 1, third: C => 2, fourth: D => 3,
         fifth: E => 4, sixth: F => 5)
);


/// Wait for the first input to resolve, reporting its index and result
///
/// An empty input resolves immediately to `(0, Try::Empty)`, which no
/// actual input can produce.
///
pub fn any<T, I>(futures: I) -> Future<(usize, Try<T>)>
    where T: Send + 'static,
          I: IntoIterator<Item = Future<T>>
{
    let futures = futures.into_iter().collect::<Vec<_>>();
    if futures.is_empty() {
        return Future::ready((0, Try::Empty));
    }

    let (aggregate, future) = Aggregate::start(());
    for (index, input) in futures.into_iter().enumerate() {
        let aggregate = aggregate.clone();
        input.subscribe(Box::new(move |result| {
            aggregate.update(|_| Some(Try::Value((index, result))))
        }));
    }
    future
}


/// Wait for the first `n` inputs to resolve, in completion order
///
/// If there are fewer than `n` inputs, all of them are waited for.
///
pub fn first_n<T, I>(n: usize, futures: I) -> Future<Vec<(usize, Try<T>)>>
    where T: Send + 'static,
          I: IntoIterator<Item = Future<T>>
{
    let futures = futures.into_iter().collect::<Vec<_>>();
    let needed = n.min(futures.len());
    if needed == 0 {
        return Future::ready(Vec::new());
    }

    let (aggregate, future) = Aggregate::start(Vec::with_capacity(needed));
    for (index, input) in futures.into_iter().enumerate() {
        let aggregate = aggregate.clone();
        input.subscribe(Box::new(move |result| {
            aggregate.update(|completed| {
                completed.push((index, result));
                if completed.len() == needed {
                    Some(Try::Value(mem::take(completed)))
                } else {
                    None
                }
            })
        }));
    }
    future
}


/// Wait for the first input whose result satisfies a predicate
///
/// Fails with `AsyncError::NoSatisfyingResult` once every input resolved
/// without a match. An empty input resolves immediately to
/// `(0, Try::Empty)`. A panicking predicate counts as a mismatch.
///
pub fn first_matching<T, I, P>(futures: I, predicate: P)
    -> Future<(usize, Try<T>)>
    where T: Send + 'static,
          I: IntoIterator<Item = Future<T>>,
          P: Fn(&Try<T>) -> bool + Send + Sync + 'static
{
    let futures = futures.into_iter().collect::<Vec<_>>();
    if futures.is_empty() {
        return Future::ready((0, Try::Empty));
    }

    let predicate = Arc::new(predicate);
    let (aggregate, future) = Aggregate::start(futures.len());
    for (index, input) in futures.into_iter().enumerate() {
        let aggregate = aggregate.clone();
        let predicate = predicate.clone();
        input.subscribe(Box::new(move |result| {
            let matched = check(&*predicate, &result);
            aggregate.update(|remaining| {
                *remaining -= 1;
                if matched {
                    Some(Try::Value((index, result)))
                } else if *remaining == 0 {
                    Some(Try::Error(AsyncError::NoSatisfyingResult))
                } else {
                    None
                }
            })
        }));
    }
    future
}


/// Wait for the first `n` inputs whose result satisfies a predicate
///
/// If there are fewer than `n` inputs, all of them must match. Fails with
/// `AsyncError::InsufficientSatisfyingResults` once every input resolved
/// with fewer matches than that, in which case the partial matches are
/// discarded.
///
pub fn first_n_matching<T, I, P>(n: usize, futures: I, predicate: P)
    -> Future<Vec<(usize, Try<T>)>>
    where T: Send + 'static,
          I: IntoIterator<Item = Future<T>>,
          P: Fn(&Try<T>) -> bool + Send + Sync + 'static
{
    let futures = futures.into_iter().collect::<Vec<_>>();
    let needed = n.min(futures.len());
    if needed == 0 {
        return Future::ready(Vec::new());
    }

    let predicate = Arc::new(predicate);
    let (aggregate, future) = Aggregate::start(Counted {
        results: Vec::with_capacity(needed),
        remaining: futures.len(),
    });
    for (index, input) in futures.into_iter().enumerate() {
        let aggregate = aggregate.clone();
        let predicate = predicate.clone();
        input.subscribe(Box::new(move |result| {
            let matched = check(&*predicate, &result);
            aggregate.update(|state| {
                state.remaining -= 1;
                if matched {
                    state.results.push((index, result));
                }
                if state.results.len() == needed {
                    Some(Try::Value(mem::take(&mut state.results)))
                } else if state.remaining == 0 {
                    Some(Try::Error(
                        AsyncError::InsufficientSatisfyingResults {
                            needed,
                            found: state.results.len(),
                        }
                    ))
                } else {
                    None
                }
            })
        }));
    }
    future
}


// Run a predicate, which runs on the resolving thread and must not unwind it
fn check<T, P>(predicate: &P, result: &Try<T>) -> bool
    where P: Fn(&Try<T>) -> bool
{
    panic::catch_unwind(AssertUnwindSafe(|| predicate(result)))
        .unwrap_or_else(|payload| {
            warn!(panic = %outcome::panic_message(payload.as_ref()),
                  "Combinator predicate panicked, treating as a mismatch");
            false
        })
}


/// Shared record of an aggregate operation, updated as inputs resolve
struct Aggregate<S, R: Send + 'static> {
    inner: Mutex<AggregateInner<S, R>>,
}
//
struct AggregateInner<S, R: Send + 'static> {
    /// Progress of the aggregation
    state: S,

    /// Producer of the aggregate result, gone once it was resolved
    promise: Option<Promise<R>>,
}
//
impl<S, R: Send + 'static> Aggregate<S, R> {
    /// Set up an aggregate operation and get the future of its result
    fn start(state: S) -> (Arc<Self>, Future<R>) {
        let promise = Promise::new();
        let future = promise.get_future();
        let aggregate = Aggregate {
            inner: Mutex::new(AggregateInner {
                state,
                promise: Some(promise),
            }),
        };
        (Arc::new(aggregate), future)
    }

    /// Account for an input's result, resolving the aggregate if `f` says so
    ///
    /// Updates arriving after the aggregate was resolved are ignored.
    ///
    fn update<F>(&self, f: F)
        where F: FnOnce(&mut S) -> Option<Try<R>>
    {
        let finished = {
            let mut inner = self.inner.lock();
            if inner.promise.is_none() {
                return;
            }
            match f(&mut inner.state) {
                Some(result) => inner.promise.take().map(|p| (p, result)),
                None => None,
            }
        };
        if let Some((promise, result)) = finished {
            promise.set_try(result);
        }
    }
}


/// Results gathered so far, and number of inputs still to come
struct Counted<R> {
    results: R,
    remaining: usize,
}
//
impl<R: Default> Counted<R> {
    /// Account for one more input, handing out the results after the last
    fn countdown(&mut self) -> Option<Try<R>> {
        self.remaining -= 1;
        if self.remaining == 0 {
            Some(Try::Value(mem::take(&mut self.results)))
        } else {
            None
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::time::Duration;

    /// Build a set of pending inputs
    fn pending<T: Send + 'static>(n: usize) -> (Vec<Promise<T>>, Vec<Future<T>>) {
        let promises = (0..n).map(|_| Promise::new()).collect::<Vec<_>>();
        let futures = promises.iter().map(Promise::get_future).collect();
        (promises, futures)
    }

    /// Check that all() reports every result in input order
    #[test]
    fn all_in_order() {
        init_test_logging();
        let (mut promises, futures) = pending::<&str>(3);
        let aggregate = all(futures);

        let third = promises.pop().unwrap();
        let second = promises.pop().unwrap();
        let first = promises.pop().unwrap();
        third.set_value("b");
        first.set_value("a");
        assert!(!aggregate.is_ready());
        second.set_error(AsyncError::msg("e"));

        let results = aggregate.wait(Duration::ZERO).unwrap();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Try::Value("a")));
        assert!(matches!(results[1], Try::Error(AsyncError::Failed(_))));
        assert!(matches!(results[2], Try::Value("b")));
    }

    /// Check all() on settled and empty inputs
    #[test]
    fn all_edge_cases() {
        let results = all(vec![Future::ready(1), Future::ready(2)])
            .wait(Duration::ZERO).unwrap();
        assert!(matches!(results[..], [Try::Value(1), Try::Value(2)]));

        let results = all(Vec::<Future<u8>>::new()).wait(Duration::ZERO);
        assert!(results.unwrap().is_empty());
    }

    /// Check the heterogeneous variants of all()
    #[test]
    fn all_tuples() {
        let promise = Promise::new();
        let aggregate = all2(Future::ready(1u8), promise.get_future());
        assert!(!aggregate.is_ready());
        promise.set_value("two");
        let (first, second) = aggregate.wait(Duration::ZERO).unwrap();
        assert!(matches!(first, Try::Value(1)));
        assert!(matches!(second, Try::Value("two")));

        let (a, b, c) = all3(Future::ready(()),
                             Future::<u32>::failed(AsyncError::TimedOut),
                             Future::ready('c'))
            .wait(Duration::ZERO).unwrap();
        assert!(a.has_value());
        assert!(matches!(b, Try::Error(AsyncError::TimedOut)));
        assert!(matches!(c, Try::Value('c')));
    }

    /// Check that the widest heterogeneous all() waits for every input
    #[test]
    fn all_six() {
        let last = Promise::<Vec<u8>>::new();
        let aggregate = all6(Future::ready(1u8),
                             Future::ready("two"),
                             Future::<u16>::failed(AsyncError::msg("three")),
                             Future::ready(4.0f64),
                             Future::ready(Some(5i32)),
                             last.get_future());
        assert!(!aggregate.is_ready());
        last.set_value(vec![6]);
        let (a, b, c, d, e, f) = aggregate.wait(Duration::ZERO).unwrap();
        assert!(matches!(a, Try::Value(1)));
        assert!(matches!(b, Try::Value("two")));
        assert!(c.has_error());
        assert!(matches!(d, Try::Value(x) if x == 4.0));
        assert!(matches!(e, Try::Value(Some(5))));
        assert_eq!(f.get().unwrap(), vec![6]);

        let (a, b, c, d) = all4(Future::ready(()), Future::ready(2u8),
                                Future::ready('c'), Future::ready(4u64))
            .wait(Duration::ZERO).unwrap();
        assert!(a.has_value() && b.has_value());
        assert!(c.has_value() && d.has_value());
        let (_, _, _, _, e) = all5(Future::ready(()), Future::ready(()),
                                   Future::ready(()), Future::ready(()),
                                   Future::<()>::failed(AsyncError::TimedOut))
            .wait(Duration::ZERO).unwrap();
        assert!(matches!(e, Try::Error(AsyncError::TimedOut)));
    }

    /// Check that any() reports the first input to resolve
    #[test]
    fn any_first() {
        let (promises, futures) = pending::<u8>(3);
        let aggregate = any(futures);
        let mut promises = promises.into_iter();
        let first = promises.next().unwrap();
        let second = promises.next().unwrap();
        second.set_value(2);
        first.set_value(1);

        let (index, result) = aggregate.wait(Duration::ZERO).unwrap();
        assert_eq!(index, 1);
        assert!(matches!(result, Try::Value(2)));
    }

    /// Check any() on empty inputs
    #[test]
    fn any_empty() {
        let (index, result) = any(Vec::<Future<u8>>::new())
            .wait(Duration::ZERO).unwrap();
        assert_eq!(index, 0);
        assert!(result.is_empty());
    }

    /// Check that first_n() reports completions in order, and only n of them
    #[test]
    fn first_n_completions() {
        let (promises, futures) = pending::<u8>(3);
        let aggregate = first_n(2, futures);
        let mut promises = promises.into_iter().map(Some).collect::<Vec<_>>();
        for &index in &[2, 0, 1] {
            if let Some(promise) = promises[index].take() {
                promise.set_value(index as u8);
            }
        }
        let results = aggregate.wait(Duration::ZERO).unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[..], [(2, Try::Value(2)), (0, Try::Value(0))]));

        // Asking for more than available waits for everything
        let results = first_n(5, vec![Future::ready(1), Future::ready(2)])
            .wait(Duration::ZERO).unwrap();
        assert_eq!(results.len(), 2);
        let results = first_n(0, vec![Future::ready(1)])
            .wait(Duration::ZERO).unwrap();
        assert!(results.is_empty());
    }

    /// Check first_matching()
    #[test]
    fn first_matching_results() {
        let fail = || Future::<u8>::failed(AsyncError::msg("fail"));
        let (index, result) = first_matching(
            vec![fail(), fail(), Future::ready(3)],
            Try::has_value
        ).wait(Duration::ZERO).unwrap();
        assert_eq!(index, 2);
        assert!(matches!(result, Try::Value(3)));

        let outcome = first_matching(vec![fail(), fail()], Try::has_value)
            .wait(Duration::ZERO);
        assert!(matches!(outcome, Err(AsyncError::NoSatisfyingResult)));

        let (index, result) = first_matching(Vec::<Future<u8>>::new(),
                                             Try::has_value)
            .wait(Duration::ZERO).unwrap();
        assert_eq!(index, 0);
        assert!(result.is_empty());
    }

    /// Check that panicking predicates count as mismatches
    #[test]
    fn panicking_predicate() {
        let outcome = first_matching(vec![Future::ready(1u8)],
                                     |_: &Try<u8>| panic!("bad predicate"))
            .wait(Duration::ZERO);
        assert!(matches!(outcome, Err(AsyncError::NoSatisfyingResult)));
    }

    /// Check first_n_matching()
    #[test]
    fn first_n_matching_results() {
        let fail = || Future::<u8>::failed(AsyncError::msg("fail"));
        let results = first_n_matching(
            2,
            vec![Future::ready(1), fail(), Future::ready(2), Future::ready(3)],
            Try::has_value
        ).wait(Duration::ZERO).unwrap();
        assert!(matches!(results[..], [(0, Try::Value(1)), (2, Try::Value(2))]));

        let outcome = first_n_matching(2, vec![fail(), Future::ready(1), fail()],
                                       Try::has_value)
            .wait(Duration::ZERO);
        match outcome {
            Err(AsyncError::InsufficientSatisfyingResults { needed, found }) => {
                assert_eq!((needed, found), (2, 1));
            },
            other => panic!("Unexpected result {:?}", other),
        }
    }

    /// Check that first_n_matching() only gives up once every input resolved
    #[test]
    fn first_n_matching_waits_for_all_inputs() {
        let (promises, futures) = pending::<u8>(3);
        let aggregate = first_n_matching(3, futures, Try::has_value);
        let mut promises = promises.into_iter();
        let first = promises.next().unwrap();
        let second = promises.next().unwrap();
        let third = promises.next().unwrap();

        // Success is out of reach after the first failure, but more matches
        // may still come in
        first.set_error(AsyncError::msg("fail"));
        assert!(!aggregate.is_ready());
        second.set_value(2);
        assert!(!aggregate.is_ready());

        // The error reports every match that was found
        third.set_value(3);
        assert!(aggregate.is_ready());
        assert!(matches!(aggregate.wait(Duration::ZERO),
                         Err(AsyncError::InsufficientSatisfyingResults {
                             needed: 3,
                             found: 2,
                         })));
    }
}
