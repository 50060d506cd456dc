//! Schedulers and continuation executors
//!
//! Whenever continuations are used, one important design issue is to decide
//! where they should be executed.
//!
//! The traditional answer is to run them directly on whichever thread
//! resolves the result, as part of the resolution process. This approach,
//! known as inline execution, has minimal scheduling overhead, but it also
//! means that long-running continuations stall the producer, and that
//! continuations which must run on a specific thread cannot be expressed.
//!
//! For this reason, continuations can also be redirected to a `Scheduler`,
//! which is anything that can run a task now or after some delay. This
//! module provides a few of them:
//!
//! - `ThreadPool` runs tasks on a fixed set of worker threads
//! - `ExecutionContext` runs tasks on one dedicated thread, and lets
//!   continuations which are already running there proceed inline
//! - `Timer` runs tasks on its own thread once their deadline has passed,
//!   and is what the other schedulers use for delayed tasks
//! - `InlineScheduler` runs tasks right away on the calling thread

mod context;
mod inline;
mod thread_pool;
mod timer;

pub use self::context::{ContextHandle, ExecutionContext};
pub use self::inline::InlineScheduler;
pub use self::thread_pool::{PoolHandle, ThreadPool, ThreadPoolBuilder};
pub use self::timer::{Timer, TimerHandle};

use crate::error::Result;
use crate::future::Future;
use crate::outcome::{self, Try};
use crate::promise::Promise;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;


/// Unit of work accepted by schedulers
pub type Task = Box<dyn FnOnce() + Send + 'static>;


/// Something which can run tasks, either as soon as possible or later on
///
/// Both methods fail with `AsyncError::SchedulerShutdown` once the scheduler
/// does not accept work anymore, in which case the task is dropped without
/// having run.
///
pub trait Scheduler: Send + Sync {
    /// Run a task as soon as possible
    fn schedule(&self, task: Task) -> Result<()>;

    /// Run a task once some delay has elapsed
    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()>;
}


/// Where a continuation should run
#[derive(Clone)]
pub enum Executor {
    /// On whichever thread makes the result available
    Inline,

    /// On some scheduler
    Scheduler(Arc<dyn Scheduler>),

    /// On the thread of an execution context, inline if already there
    Context(ContextHandle),
}
//
impl Executor {
    /// Run a job which resolves some promise, wherever this executor says
    ///
    /// If the executor refuses the job, the promise is resolved with the
    /// reason of the refusal.
    ///
    pub(crate) fn dispatch<U, J>(&self, promise: Promise<U>, job: J)
        where U: Send + 'static,
              J: FnOnce(Promise<U>) + Send + 'static
    {
        match self {
            Executor::Inline => job(promise),
            Executor::Scheduler(scheduler) => {
                submit(&**scheduler, None, promise, job)
            },
            Executor::Context(context) => {
                if context.is_current() {
                    job(promise)
                } else {
                    submit(context, None, promise, job)
                }
            },
        }
    }
}
//
impl Default for Executor {
    fn default() -> Self {
        Executor::Inline
    }
}
//
impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Inline => f.write_str("Inline"),
            Executor::Scheduler(_) => f.write_str("Scheduler(..)"),
            Executor::Context(context) => {
                f.debug_tuple("Context").field(context).finish()
            },
        }
    }
}
//
impl From<Arc<dyn Scheduler>> for Executor {
    fn from(scheduler: Arc<dyn Scheduler>) -> Self {
        Executor::Scheduler(scheduler)
    }
}
//
impl From<PoolHandle> for Executor {
    fn from(pool: PoolHandle) -> Self {
        Executor::Scheduler(Arc::new(pool))
    }
}
//
impl<'a> From<&'a ThreadPool> for Executor {
    fn from(pool: &'a ThreadPool) -> Self {
        pool.handle().into()
    }
}
//
impl From<TimerHandle> for Executor {
    fn from(timer: TimerHandle) -> Self {
        Executor::Scheduler(Arc::new(timer))
    }
}
//
impl<'a> From<&'a Timer> for Executor {
    fn from(timer: &'a Timer) -> Self {
        timer.handle().into()
    }
}
//
impl From<InlineScheduler> for Executor {
    fn from(scheduler: InlineScheduler) -> Self {
        Executor::Scheduler(Arc::new(scheduler))
    }
}
//
impl From<ContextHandle> for Executor {
    fn from(context: ContextHandle) -> Self {
        Executor::Context(context)
    }
}
//
impl<'a> From<&'a ExecutionContext> for Executor {
    fn from(context: &'a ExecutionContext) -> Self {
        Executor::Context(context.handle())
    }
}


/// Run a computation on a scheduler and get the future of its result
///
/// Errors and panics of the computation end up in the future. If the
/// scheduler refuses the work, the future holds the reason of the refusal.
///
pub fn spawn<S, T, F>(scheduler: &S, f: F) -> Future<T>
    where S: Scheduler + ?Sized,
          T: Send + 'static,
          F: FnOnce() -> Result<T> + Send + 'static
{
    let promise = Promise::new();
    let future = promise.get_future();
    submit(scheduler, None, promise, move |promise| {
        promise.set_try(Try::capture(f))
    });
    future
}


/// Run a computation on a scheduler after some delay
pub fn spawn_after<S, T, F>(scheduler: &S, delay: Duration, f: F) -> Future<T>
    where S: Scheduler + ?Sized,
          T: Send + 'static,
          F: FnOnce() -> Result<T> + Send + 'static
{
    let promise = Promise::new();
    let future = promise.get_future();
    submit(scheduler, Some(delay), promise, move |promise| {
        promise.set_try(Try::capture(f))
    });
    future
}


// Hand a promise-resolving job to a scheduler
//
// The promise stays reachable from here until the scheduler has accepted the
// job, so that a refusal can be reported through it.
//
fn submit<S, U, J>(scheduler: &S,
                   delay: Option<Duration>,
                   promise: Promise<U>,
                   job: J)
    where S: Scheduler + ?Sized,
          U: Send + 'static,
          J: FnOnce(Promise<U>) + Send + 'static
{
    let slot = Arc::new(Mutex::new(Some(promise)));
    let task_slot = slot.clone();
    let task: Task = Box::new(move || {
        if let Some(promise) = task_slot.lock().take() {
            job(promise);
        }
    });

    let submitted = match delay {
        Some(delay) => scheduler.schedule_later(delay, task),
        None => scheduler.schedule(task),
    };
    if let Err(error) = submitted {
        warn!(%error, "Scheduler refused a task");
        if let Some(promise) = slot.lock().take() {
            promise.set_error(error);
        }
    }
}


// Run a task on a scheduler thread, which must survive the task panicking
fn run_task(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        warn!(panic = %outcome::panic_message(payload.as_ref()),
              "Scheduled task panicked");
    }
}
