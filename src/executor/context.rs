//! Execution contexts
//!
//! Some continuations must run on one particular thread, for example because
//! they touch state which is owned by that thread. An `ExecutionContext` is
//! a dedicated thread which runs whatever is posted to it, in order.
//!
//! When a continuation targeted at a context is dispatched from the context
//! thread itself, it runs inline instead of taking a round trip through the
//! queue.

use super::{Scheduler, Task, ThreadPool, PoolHandle};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;


/// Owner of a dedicated thread, which is joined when dropped
pub struct ExecutionContext {
    pool: ThreadPool,
    name: Arc<str>,
}
//
impl ExecutionContext {
    /// Start a context, whose thread gets a certain name
    pub fn new(name: &str) -> Result<Self> {
        let pool = ThreadPool::builder().num_threads(1)
                                        .name_prefix(name)
                                        .build();
        pool.start()?;
        Ok(ExecutionContext { pool, name: name.into() })
    }

    /// Get a cloneable handle to this context
    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            pool: self.pool.handle(),
            name: self.name.clone(),
        }
    }

    /// Truth that the calling thread is the context thread
    pub fn is_current(&self) -> bool {
        self.pool.is_worker_thread()
    }

    /// Name of the context
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting tasks, run the queued ones, and join the thread
    pub fn shutdown(&self) {
        self.pool.join_all()
    }
}
//
impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext").field("name", &self.name).finish()
    }
}
//
impl Scheduler for ExecutionContext {
    fn schedule(&self, task: Task) -> Result<()> {
        self.pool.schedule(task)
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        self.pool.schedule_later(delay, task)
    }
}


/// Cloneable handle to an execution context
#[derive(Clone)]
pub struct ContextHandle {
    pool: PoolHandle,
    name: Arc<str>,
}
//
impl ContextHandle {
    /// Truth that the calling thread is the context thread
    pub fn is_current(&self) -> bool {
        self.pool.is_worker_thread()
    }

    /// Name of the context
    pub fn name(&self) -> &str {
        &self.name
    }
}
//
impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle").field("name", &self.name).finish()
    }
}
//
impl Scheduler for ContextHandle {
    fn schedule(&self, task: Task) -> Result<()> {
        self.pool.schedule(task)
    }

    fn schedule_later(&self, delay: Duration, task: Task) -> Result<()> {
        self.pool.schedule_later(delay, task)
    }
}
