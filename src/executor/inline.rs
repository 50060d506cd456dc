//! Inline scheduler, implementing synchronous task execution
//!
//! This scheduler follows the traditional pattern of directly executing tasks
//! on the thread which submits them. It has no scheduling overhead, but
//! submitters are stalled for as long as the task runs, so it is best kept
//! for short tasks. Delayed tasks still need a thread to wait on, and go
//! through a timer.

use super::{run_task, Scheduler, Task, Timer, TimerHandle};
use crate::error::Result;
use std::time::Duration;


/// Scheduler which runs tasks right away on the calling thread
#[derive(Debug)]
pub struct InlineScheduler {
    /// Timer used for delayed tasks
    timer: TimerHandle,

    /// Owned timer, if the timer is not shared with someone else
    _own_timer: Option<Timer>,
}
//
impl InlineScheduler {
    /// Create an inline scheduler with a private timer
    pub fn new() -> Self {
        let timer = Timer::with_name("inline-timer");
        InlineScheduler {
            timer: timer.handle(),
            _own_timer: Some(timer),
        }
    }

    /// Create an inline scheduler which uses a shared timer
    pub fn with_timer(timer: TimerHandle) -> Self {
        InlineScheduler { timer, _own_timer: None }
    }
}
//
impl Default for InlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}
//
impl Scheduler for InlineScheduler {
    fn schedule(&self, task: Task) -> Result<()> {
        run_task(task);
        Ok(())
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        self.timer.schedule_later(delay, task)
    }
}
