//! Delayed task execution
//!
//! A `Timer` owns one background thread, started on the first submission,
//! which sleeps until the earliest deadline among its queued tasks and runs
//! tasks whose deadline has passed. Tasks with equal deadlines run in
//! submission order. Since they all share one thread, timer tasks are
//! expected to be short: other schedulers only use it to hand their delayed
//! tasks over to their own queue.
//!
//! Once the timer is shut down, tasks which did not come due yet are
//! discarded without running.

use super::{run_task, Scheduler, Task};
use crate::error::{AsyncError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};


/// Deadline used for delays which overflow the clock
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);


/// Owner of a timer thread, which shuts it down when dropped
pub struct Timer {
    handle: TimerHandle,
}
//
impl Timer {
    /// Create a timer with the default thread name
    pub fn new() -> Self {
        Self::with_name("promise-timer")
    }

    /// Create a timer whose thread has a certain name
    pub fn with_name(name: impl Into<String>) -> Self {
        Timer {
            handle: TimerHandle {
                shared: Arc::new(TimerShared {
                    state: Mutex::new(TimerState {
                        queue: BinaryHeap::new(),
                        next_seq: 0,
                        shutdown: false,
                        thread: None,
                    }),
                    wakeup_cv: Condvar::new(),
                    name: name.into(),
                }),
            },
        }
    }

    /// Get a handle which can submit tasks to this timer
    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    /// Stop the timer thread, discarding tasks which did not come due yet
    ///
    /// This is idempotent. When called from a timer task, the timer thread
    /// is told to stop but cannot be joined.
    ///
    pub fn shutdown(&self) {
        let thread = {
            let mut state = self.handle.shared.state.lock();
            state.shutdown = true;
            state.thread.take()
        };
        self.handle.shared.wakeup_cv.notify_all();

        if let Some(thread) = thread {
            if thread.thread().id() == thread::current().id() {
                warn!(timer = %self.handle.shared.name,
                      "Timer shut down from its own thread, not joining");
                return;
            }
            if thread.join().is_err() {
                warn!(timer = %self.handle.shared.name, "Timer thread panicked");
            }
            debug!(timer = %self.handle.shared.name, "Timer thread stopped");
        }
    }
}
//
impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
//
impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Timer").field(&self.handle).finish()
    }
}
//
impl Scheduler for Timer {
    fn schedule(&self, task: Task) -> Result<()> {
        self.handle.schedule(task)
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        self.handle.schedule_later(delay, task)
    }
}
//
impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}


/// Cloneable handle to a timer
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}
//
impl TimerHandle {
    /// Number of tasks waiting for their deadline
    pub fn pending_tasks(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Truth that the timer does not accept tasks anymore
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    // Queue a task for a certain deadline, starting the thread if needed
    fn submit(&self, deadline: Instant, task: Task) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(AsyncError::SchedulerShutdown);
        }
        if state.thread.is_none() {
            let shared = self.shared.clone();
            let thread = thread::Builder::new()
                .name(self.shared.name.clone())
                .spawn(move || timer_loop(&shared))
                .map_err(AsyncError::failed)?;
            debug!(timer = %self.shared.name, "Timer thread started");
            state.thread = Some(thread);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Entry { deadline, seq, task });
        drop(state);
        self.shared.wakeup_cv.notify_one();
        Ok(())
    }
}
//
impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("name", &self.shared.name)
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}
//
impl Scheduler for TimerHandle {
    fn schedule(&self, task: Task) -> Result<()> {
        self.submit(Instant::now(), task)
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        let now = Instant::now();
        let deadline = now.checked_add(delay)
                          .unwrap_or_else(|| now + FAR_FUTURE);
        self.submit(deadline, task)
    }
}


/// State shared between a timer, its handles and its thread
struct TimerShared {
    /// Queue and thread bookkeeping (mutex-protected)
    state: Mutex<TimerState>,

    /// Condition variable used to wake up the timer thread
    wakeup_cv: Condvar,

    /// Name of the timer thread
    name: String,
}
//
struct TimerState {
    /// Tasks, earliest deadline first
    queue: BinaryHeap<Entry>,

    /// Submission counter, used to keep equal deadlines in order
    next_seq: u64,

    /// Whether the timer stopped accepting tasks
    shutdown: bool,

    /// Timer thread, once started
    thread: Option<JoinHandle<()>>,
}


/// Queued task
struct Entry {
    deadline: Instant,
    seq: u64,
    task: Task,
}
//
// BinaryHeap is a max-heap, so the order is reversed to pop the earliest
// deadline (then the earliest submission) first
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
             .then_with(|| other.seq.cmp(&self.seq))
    }
}
//
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
//
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
//
impl Eq for Entry {}


// Body of the timer thread
fn timer_loop(shared: &TimerShared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let next_deadline = state.queue.peek().map(|entry| entry.deadline);
        match next_deadline {
            Some(deadline) if deadline <= Instant::now() => {
                if let Some(entry) = state.queue.pop() {
                    trace!(timer = %shared.name, "Running timer task");
                    MutexGuard::unlocked(&mut state, || run_task(entry.task));
                }
            },
            Some(deadline) => {
                shared.wakeup_cv.wait_until(&mut state, deadline);
            },
            None => shared.wakeup_cv.wait(&mut state),
        }
    }

    // Dropping tasks may resolve promises, which must not happen under the lock
    let discarded = mem::take(&mut state.queue);
    drop(state);
    if !discarded.is_empty() {
        debug!(timer = %shared.name, count = discarded.len(),
               "Discarding timer tasks which did not come due");
    }
    drop(discarded);
}
