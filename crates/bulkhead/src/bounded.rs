//! Thread-bounded view over a shared executor.
//!
//! Many `BoundedExecutor`s can share one core executor while each keeps its
//! own cap on how many of its drain loops occupy the core at once. Tasks of
//! one instance start in submission order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

use crate::error::{ExecutorError, panic_message};
use crate::executor::{Executor, Task};

struct BoundedInner {
    queue: SegQueue<Task>,
    /// Queued tasks plus the ones currently running.
    queue_size: AtomicUsize,
    failed: AtomicBool,
    core: Arc<dyn Executor>,
    max_threads: usize,
}

#[derive(Clone)]
pub struct BoundedExecutor {
    inner: Arc<BoundedInner>,
}

impl std::fmt::Debug for BoundedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedExecutor")
            .field("max_threads", &self.inner.max_threads)
            .field("queue_size", &self.inner.queue_size.load(Ordering::Relaxed))
            .field("failed", &self.inner.failed.load(Ordering::Relaxed))
            .finish()
    }
}

impl BoundedExecutor {
    /// # Panics
    ///
    /// Panics if `max_threads` is zero.
    pub fn new(core: Arc<dyn Executor>, max_threads: usize) -> Self {
        assert!(max_threads > 0, "max_threads must be greater than zero");
        Self {
            inner: Arc::new(BoundedInner {
                queue: SegQueue::new(),
                queue_size: AtomicUsize::new(0),
                failed: AtomicBool::new(false),
                core,
                max_threads,
            }),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    /// Whether the core executor has rejected a drain loop. A failed
    /// instance refuses every later task.
    pub fn is_failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }
}

impl Executor for BoundedExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        let inner = &self.inner;
        if inner.failed.load(Ordering::Acquire) {
            return Err(ExecutorError::Failed(
                "core executor previously rejected a drain loop".to_string(),
            ));
        }

        inner.queue.push(task);
        if inner.queue_size.fetch_add(1, Ordering::AcqRel) < inner.max_threads {
            let drainer = Arc::clone(inner);
            if let Err(e) = inner.core.execute(Box::new(move || drainer.drain())) {
                inner.failed.store(true, Ordering::Release);
                tracing::error!(
                    error = %e,
                    max_threads = inner.max_threads,
                    "Core executor rejected drain loop, bounded executor is now failed"
                );
                return Err(ExecutorError::Failed(e.to_string()));
            }
            tracing::debug!(max_threads = inner.max_threads, "Started drain loop");
        }
        Ok(())
    }
}

impl BoundedInner {
    fn drain(&self) {
        loop {
            match self.queue.pop() {
                Some(task) => {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                        tracing::error!(
                            panic = %panic_message(payload.as_ref()),
                            "Task panicked in bounded executor"
                        );
                    }
                }
                None => tracing::error!("Bug: drain loop found no queued task"),
            }
            if self.queue_size.fetch_sub(1, Ordering::AcqRel) <= self.max_threads {
                return;
            }
        }
    }
}
