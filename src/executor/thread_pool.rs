//! Fixed-size thread pool
//!
//! Tasks go to a single FIFO queue, shared by every worker thread under one
//! lock. Workers are spawned on the first submission (or an explicit call to
//! `start()`), after which the size of the pool is fixed. Delayed tasks wait
//! in a timer, which pushes them into the queue once they come due.
//!
//! Shutting the pool down stops it from accepting tasks, but every task which
//! was already queued still runs before the workers exit.

use super::{run_task, spawn, Scheduler, Task, Timer, TimerHandle};
use crate::error::{AsyncError, Result};
use crate::future::Future;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, trace, warn};


/// Number of worker threads used when nothing else is specified
pub const DEFAULT_THREADS: usize = 8;

/// Largest supported number of worker threads
pub const MAX_THREADS: usize = 512;


/// Configuration of a thread pool
#[derive(Clone, Debug)]
pub struct ThreadPoolBuilder {
    num_threads: usize,
    name_prefix: String,
    timer: Option<TimerHandle>,
}
//
impl ThreadPoolBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        ThreadPoolBuilder {
            num_threads: DEFAULT_THREADS,
            name_prefix: "promise-pool".to_owned(),
            timer: None,
        }
    }

    /// Number of worker threads, clamped to 1..=MAX_THREADS
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = clamp_threads(num_threads);
        self
    }

    /// Prefix of worker thread names, which get suffixed with an index
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Use a shared timer for delayed tasks, instead of a private one
    pub fn timer(mut self, timer: TimerHandle) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Build the pool. Workers are not started yet.
    pub fn build(self) -> ThreadPool {
        let (own_timer, timer) = match self.timer {
            Some(timer) => (None, timer),
            None => {
                let timer = Timer::with_name(format!("{}-timer",
                                                     self.name_prefix));
                let handle = timer.handle();
                (Some(timer), handle)
            },
        };
        ThreadPool {
            handle: PoolHandle {
                shared: Arc::new(PoolShared {
                    state: Mutex::new(PoolState {
                        tasks: VecDeque::new(),
                        workers: Vec::new(),
                        worker_ids: Vec::new(),
                        num_threads: self.num_threads,
                        started: false,
                        shutdown: false,
                    }),
                    work_cv: Condvar::new(),
                    timer,
                    name_prefix: self.name_prefix,
                }),
            },
            own_timer,
        }
    }
}
//
impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}


/// Owner of a thread pool, which shuts it down and joins it when dropped
pub struct ThreadPool {
    /// Shared pool state
    handle: PoolHandle,

    /// Timer for delayed tasks, if not shared with someone else
    own_timer: Option<Timer>,
}
//
impl ThreadPool {
    /// Create a pool with a certain number of worker threads
    pub fn new(num_threads: usize) -> Self {
        ThreadPoolBuilder::new().num_threads(num_threads).build()
    }

    /// Start configuring a pool
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// Get a cloneable handle which can submit tasks to this pool
    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Change the number of worker threads
    ///
    /// This only works before the workers have been started, and tells
    /// whether the change took effect.
    ///
    pub fn set_num_threads(&self, num_threads: usize) -> bool {
        let mut state = self.handle.shared.state.lock();
        if state.started {
            debug!(pool = %self.handle.shared.name_prefix,
                   "Pool already started, keeping its size");
            return false;
        }
        state.num_threads = clamp_threads(num_threads);
        true
    }

    /// Spawn the worker threads now rather than on the first submission
    pub fn start(&self) -> Result<()> {
        let mut state = self.handle.shared.state.lock();
        if state.shutdown {
            return Err(AsyncError::SchedulerShutdown);
        }
        self.handle.ensure_started(&mut state)
    }

    /// Run a computation on the pool and get the future of its result
    ///
    /// If the pool was shut down, the future holds
    /// `AsyncError::SchedulerShutdown`.
    ///
    pub fn execute<T, F>(&self, f: F) -> Future<T>
        where T: Send + 'static,
              F: FnOnce() -> Result<T> + Send + 'static
    {
        spawn(&self.handle, f)
    }

    /// Number of worker threads (configured, or running once started)
    pub fn worker_threads(&self) -> usize {
        self.handle.worker_threads()
    }

    /// Number of tasks waiting for a worker
    pub fn pending_tasks(&self) -> usize {
        self.handle.pending_tasks()
    }

    /// Truth that the pool does not accept tasks anymore
    pub fn is_shutdown(&self) -> bool {
        self.handle.is_shutdown()
    }

    /// Truth that the current thread is one of this pool's workers
    pub fn is_worker_thread(&self) -> bool {
        self.handle.is_worker_thread()
    }

    /// Stop accepting tasks, then wait for the queued ones to run
    ///
    /// This is idempotent. When called from a worker thread, the workers are
    /// told to stop but cannot be joined.
    ///
    pub fn join_all(&self) {
        let shared = &self.handle.shared;
        let workers = {
            let mut state = shared.state.lock();
            state.shutdown = true;
            if state.worker_ids.contains(&thread::current().id()) {
                warn!(pool = %shared.name_prefix,
                      "Pool joined from one of its workers, not joining");
                shared.work_cv.notify_all();
                return;
            }
            state.workers.drain(..).collect::<Vec<_>>()
        };
        shared.work_cv.notify_all();

        if workers.is_empty() {
            return;
        }
        for worker in workers {
            if worker.join().is_err() {
                warn!(pool = %shared.name_prefix, "Worker thread panicked");
            }
        }
        debug!(pool = %shared.name_prefix, "Thread pool stopped");
    }
}
//
impl Default for ThreadPool {
    fn default() -> Self {
        ThreadPoolBuilder::new().build()
    }
}
//
impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadPool").field(&self.handle).finish()
    }
}
//
impl Scheduler for ThreadPool {
    fn schedule(&self, task: Task) -> Result<()> {
        self.handle.schedule(task)
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        self.handle.schedule_later(delay, task)
    }
}
//
impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join_all();
        if let Some(timer) = self.own_timer.take() {
            timer.shutdown();
        }
    }
}


/// Cloneable handle to a thread pool
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<PoolShared>,
}
//
impl PoolHandle {
    /// Number of worker threads (configured, or running once started)
    pub fn worker_threads(&self) -> usize {
        let state = self.shared.state.lock();
        if state.started {
            state.worker_ids.len()
        } else {
            state.num_threads
        }
    }

    /// Number of tasks waiting for a worker
    pub fn pending_tasks(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Truth that the pool does not accept tasks anymore
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Truth that the current thread is one of this pool's workers
    pub fn is_worker_thread(&self) -> bool {
        self.shared.state.lock().worker_ids.contains(&thread::current().id())
    }

    // Spawn the workers if this was not done yet
    fn ensure_started(&self, state: &mut PoolState) -> Result<()> {
        if state.started {
            return Ok(());
        }
        state.started = true;
        for index in 0..state.num_threads {
            let shared = self.shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.shared.name_prefix, index))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(worker) => {
                    state.worker_ids.push(worker.thread().id());
                    state.workers.push(worker);
                },
                Err(error) if index > 0 => {
                    warn!(pool = %self.shared.name_prefix, %error,
                          spawned = index,
                          "Could not spawn every worker, running short");
                    break;
                },
                Err(error) => {
                    state.started = false;
                    return Err(AsyncError::failed(error));
                },
            }
        }
        debug!(pool = %self.shared.name_prefix,
               workers = state.worker_ids.len(),
               "Thread pool started");
        Ok(())
    }
}
//
impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PoolHandle")
            .field("name_prefix", &self.shared.name_prefix)
            .field("num_threads", &state.num_threads)
            .field("pending_tasks", &state.tasks.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}
//
impl Scheduler for PoolHandle {
    fn schedule(&self, task: Task) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(AsyncError::SchedulerShutdown);
        }
        self.ensure_started(&mut state)?;
        state.tasks.push_back(task);
        drop(state);
        self.shared.work_cv.notify_one();
        Ok(())
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        if self.is_shutdown() {
            return Err(AsyncError::SchedulerShutdown);
        }
        let pool = Arc::downgrade(&self.shared);
        self.shared.timer.schedule_later(delay, Box::new(move || {
            forward_to_pool(&pool, task)
        }))
    }
}


/// State shared between a pool, its handles and its workers
struct PoolShared {
    /// Queue and worker bookkeeping (mutex-protected)
    state: Mutex<PoolState>,

    /// Condition variable used to wake up workers
    work_cv: Condvar,

    /// Timer used for delayed tasks
    timer: TimerHandle,

    /// Prefix of worker thread names
    name_prefix: String,
}
//
struct PoolState {
    /// Tasks waiting for a worker
    tasks: VecDeque<Task>,

    /// Join handles of the workers, until someone joins them
    workers: Vec<JoinHandle<()>>,

    /// Identifiers of the workers
    worker_ids: Vec<ThreadId>,

    /// Number of workers to spawn on startup
    num_threads: usize,

    /// Whether the workers were spawned
    started: bool,

    /// Whether the pool stopped accepting tasks
    shutdown: bool,
}


fn clamp_threads(num_threads: usize) -> usize {
    num_threads.clamp(1, MAX_THREADS)
}


// Move a delayed task which came due into the pool's queue
fn forward_to_pool(pool: &Weak<PoolShared>, task: Task) {
    let shared = match pool.upgrade() {
        Some(shared) => shared,
        None => {
            debug!("Delayed task came due after its pool was dropped");
            return;
        },
    };
    let handle = PoolHandle { shared };
    if let Err(error) = handle.schedule(task) {
        warn!(pool = %handle.shared.name_prefix, %error,
              "Delayed task came due after pool shutdown");
    }
}


// Body of the worker threads
fn worker_loop(shared: &PoolShared) {
    let mut state = shared.state.lock();
    loop {
        if let Some(task) = state.tasks.pop_front() {
            trace!(pool = %shared.name_prefix, "Running pool task");
            MutexGuard::unlocked(&mut state, || run_task(task));
        } else if state.shutdown {
            break;
        } else {
            shared.work_cv.wait(&mut state);
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    /// Check the builder configuration
    #[test]
    fn builder() {
        let pool = ThreadPool::builder().num_threads(0).build();
        assert_eq!(pool.worker_threads(), 1);
        let pool = ThreadPool::builder().num_threads(100_000).build();
        assert_eq!(pool.worker_threads(), MAX_THREADS);
        let pool = ThreadPool::default();
        assert_eq!(pool.worker_threads(), DEFAULT_THREADS);
        assert_eq!(pool.pending_tasks(), 0);
        assert!(!pool.is_shutdown());
    }

    /// Check that workers start lazily, after which the size is fixed
    #[test]
    fn lazy_start() {
        let pool = ThreadPool::new(2);
        assert!(pool.handle.shared.state.lock().workers.is_empty());
        assert!(pool.set_num_threads(3));

        pool.start().unwrap();
        assert_eq!(pool.worker_threads(), 3);
        assert!(!pool.set_num_threads(5));
        assert_eq!(pool.worker_threads(), 3);
    }

    /// Check that every task runs exactly once
    #[test]
    fn counter() {
        init_test_logging();
        let pool = ThreadPool::new(8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10_000 {
            let c_counter = counter.clone();
            pool.schedule(Box::new(move || {
                c_counter.fetch_add(1, Ordering::Relaxed);
            })).unwrap();
        }
        pool.join_all();
        assert_eq!(counter.load(Ordering::Relaxed), 10_000);
        assert_eq!(pool.pending_tasks(), 0);
    }

    /// Check that workers get distinct, prefixed names
    #[test]
    fn thread_names() {
        let pool = ThreadPool::builder().num_threads(4)
                                        .name_prefix("named")
                                        .build();
        let names = Arc::new(Mutex::new(HashSet::new()));
        for _ in 0..100 {
            let c_names = names.clone();
            pool.schedule(Box::new(move || {
                let name = thread::current().name().map(str::to_owned);
                c_names.lock().insert(name.unwrap_or_default());
            })).unwrap();
        }
        pool.join_all();
        let names = names.lock();
        assert!(!names.is_empty() && names.len() <= 4);
        assert!(names.iter().all(|name| name.starts_with("named-")));
    }

    /// Check delayed tasks
    #[test]
    fn schedule_later() {
        let pool = ThreadPool::new(2);
        let handle = pool.handle();
        let (tx, rx) = mpsc::channel();
        pool.schedule_later(Duration::from_millis(30), Box::new(move || {
            tx.send(handle.is_worker_thread()).unwrap();
        })).unwrap();
        assert!(rx.recv_timeout(WAIT).unwrap());
    }

    /// Check that a shared timer can serve several pools
    #[test]
    fn shared_timer() {
        let timer = Timer::new();
        let pools = [
            ThreadPool::builder().timer(timer.handle()).build(),
            ThreadPool::builder().timer(timer.handle()).build(),
        ];
        let (tx, rx) = mpsc::channel();
        for pool in &pools {
            let tx = tx.clone();
            pool.schedule_later(Duration::from_millis(10), Box::new(move || {
                tx.send(()).unwrap();
            })).unwrap();
        }
        for _ in 0..2 {
            rx.recv_timeout(WAIT).unwrap();
        }
    }

    /// Check that computations can be run on the pool
    #[test]
    fn execute() {
        let pool = ThreadPool::new(2);
        let future = pool.execute(|| Ok(6 * 7));
        assert_eq!(future.wait(WAIT).unwrap(), 42);

        let future: Future<u8> = pool.execute(|| panic!("task exploded"));
        assert!(matches!(future.wait(WAIT), Err(AsyncError::Panicked(_))));
    }

    /// Check that panicking tasks do not kill the workers
    #[test]
    fn survives_panics() {
        let pool = ThreadPool::new(1);
        pool.schedule(Box::new(|| panic!("task exploded"))).unwrap();
        let future = pool.execute(|| Ok("still alive"));
        assert_eq!(future.wait(WAIT).unwrap(), "still alive");
    }

    /// Check the behavior after shutdown
    #[test]
    fn after_shutdown() {
        let pool = ThreadPool::new(2);
        pool.join_all();
        pool.join_all();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.schedule(Box::new(|| {})),
                         Err(AsyncError::SchedulerShutdown)));
        assert!(matches!(pool.schedule_later(Duration::ZERO, Box::new(|| {})),
                         Err(AsyncError::SchedulerShutdown)));
        assert!(matches!(pool.start(), Err(AsyncError::SchedulerShutdown)));
        assert!(matches!(pool.execute(|| Ok(())).wait(WAIT),
                         Err(AsyncError::SchedulerShutdown)));
    }

    /// Check that joining from a worker does not deadlock
    #[test]
    fn join_from_worker() {
        let pool = Arc::new(ThreadPool::new(1));
        let c_pool = pool.clone();
        let future = pool.execute(move || {
            c_pool.join_all();
            Ok(c_pool.is_shutdown())
        });
        assert!(future.wait(WAIT).unwrap());
    }
}
