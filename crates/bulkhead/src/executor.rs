//! Executor abstraction: "accept a unit of work for asynchronous execution".
//!
//! [`AsyncSemaphore`](crate::AsyncSemaphore) schedules its drain steps on one,
//! and [`BoundedExecutor`](crate::BoundedExecutor) drains onto a shared one.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;

use crate::error::ExecutorError;

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync + 'static {
    /// Hand `task` off for execution. An error means the task will never run.
    fn execute(&self, task: Task) -> Result<(), ExecutorError>;
}

impl<F> Executor for F
where
    F: Fn(Task) -> Result<(), ExecutorError> + Send + Sync + 'static,
{
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        self(task)
    }
}

/// Runs every task inline on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        task();
        Ok(())
    }
}

/// Runs tasks on a tokio runtime's blocking pool, so tasks may block.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor for the runtime the caller is running on.
    pub fn current() -> Result<Self, ExecutorError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ExecutorError::rejected(e.to_string()))
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

/// Starts a fresh named OS thread per task.
#[derive(Debug)]
pub struct ThreadExecutor {
    name: String,
    spawned: AtomicUsize,
}

impl ThreadExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spawned: AtomicUsize::new(0),
        }
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        std::thread::Builder::new()
            .name(format!("{}-{}", self.name, id))
            .spawn(task)
            .map(drop)
            .map_err(|e| ExecutorError::rejected(format!("failed to spawn thread: {e}")))
    }
}
