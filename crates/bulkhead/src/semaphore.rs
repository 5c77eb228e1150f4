//! Async task limiter.
//!
//! `AsyncSemaphore` guarantees that no more than `max_permits` submitter
//! invocations are in flight at once. It relies on the future returned by the
//! submitter to know when a task has finished, so the submitter should do the
//! bulk of its work asynchronously. Tasks are started in submission order;
//! they complete in whatever order their futures do.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use crate::error::FutureError;
use crate::executor::Executor;
use crate::future::{
    SettableFuture, all_as_list_with_cancellation_on_failure, immediate_cancelled_future,
    immediate_failed_future,
};

type Submitter<T, R> = dyn Fn(T) -> anyhow::Result<SettableFuture<R>> + Send + Sync + 'static;

struct QueuedTask<T, R> {
    task: T,
    completion: SettableFuture<R>,
}

struct SemaphoreInner<T, R> {
    queued: SegQueue<QueuedTask<T, R>>,
    /// Tasks admitted to run plus tasks waiting in `queued`.
    counter: AtomicUsize,
    max_permits: usize,
    executor: Arc<dyn Executor>,
    submitter: Box<Submitter<T, R>>,
}

pub struct AsyncSemaphore<T, R> {
    inner: Arc<SemaphoreInner<T, R>>,
}

impl<T, R> Clone for AsyncSemaphore<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R> AsyncSemaphore<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    /// # Panics
    ///
    /// Panics if `max_permits` is zero.
    pub fn new<F>(max_permits: usize, executor: Arc<dyn Executor>, submitter: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<SettableFuture<R>> + Send + Sync + 'static,
    {
        assert!(max_permits > 0, "must have at least one permit");
        Self {
            inner: Arc::new(SemaphoreInner {
                queued: SegQueue::new(),
                counter: AtomicUsize::new(0),
                max_permits,
                executor,
                submitter: Box::new(submitter),
            }),
        }
    }

    pub fn max_permits(&self) -> usize {
        self.inner.max_permits
    }

    /// Queue `task`; the returned future completes with the submitter's
    /// result. Cancelling it before the task starts skips the submitter.
    pub fn submit(&self, task: T) -> SettableFuture<R> {
        let completion = SettableFuture::new();
        self.inner.queued.push(QueuedTask {
            task,
            completion: completion.clone(),
        });
        self.inner.acquire_permit();
        completion
    }
}

impl<T, R> SemaphoreInner<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    fn acquire_permit(self: &Arc<Self>) {
        if self.counter.fetch_add(1, Ordering::AcqRel) < self.max_permits {
            // Not every permit has been handed out yet
            self.schedule_next();
        }
    }

    fn release_permit(self: &Arc<Self>) {
        if self.counter.fetch_sub(1, Ordering::AcqRel) > self.max_permits {
            // Backlog remains beyond what the permits cover
            self.schedule_next();
        }
    }

    fn schedule_next(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        if let Err(e) = self.executor.execute(Box::new(move || inner.run_next())) {
            tracing::warn!(error = %e, "Submission executor rejected drain step, running inline");
            self.run_next();
        }
    }

    fn run_next(self: &Arc<Self>) {
        let Some(QueuedTask { task, completion }) = self.queued.pop() else {
            tracing::error!("Bug: drain step found no queued task");
            return;
        };

        if !completion.is_done() {
            completion.set_future(&self.submit_task(task));
        }

        let inner = Arc::clone(self);
        completion.add_listener(move || inner.release_permit());
    }

    fn submit_task(&self, task: T) -> SettableFuture<R> {
        match catch_unwind(AssertUnwindSafe(|| (self.submitter)(task))) {
            Ok(Ok(future)) => future,
            Ok(Err(e)) => immediate_failed_future(FutureError::failed(e)),
            Err(payload) => {
                let error = FutureError::from_panic(payload);
                tracing::warn!(%error, "Submitter panicked");
                immediate_failed_future(error)
            }
        }
    }
}

/// Run every task through `submitter` with at most `max_concurrency` in
/// flight, collecting the values in task order.
///
/// If any task fails or is cancelled the result does too, and every other
/// task is cancelled. Cancelling the result cancels running tasks and keeps
/// pending ones from being submitted at all.
pub fn process_all<T, R, F>(
    tasks: Vec<T>,
    submitter: F,
    max_concurrency: usize,
    executor: Arc<dyn Executor>,
) -> SettableFuture<Vec<R>>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(T) -> anyhow::Result<SettableFuture<R>> + Send + Sync + 'static,
{
    let result = SettableFuture::new();
    let guard = result.clone();
    let semaphore = AsyncSemaphore::new(max_concurrency, executor, move |task| {
        if guard.is_cancelled() {
            // Cancellation tends to race with later submissions; checking here
            // saves submitting work nobody is waiting for.
            return Ok(immediate_cancelled_future());
        }
        submitter(task)
    });

    let futures = tasks.into_iter().map(|task| semaphore.submit(task)).collect();
    result.set_future(&all_as_list_with_cancellation_on_failure(futures));
    result
}

/// Outcome of [`process_all_to_completion`].
#[derive(Debug, Clone)]
pub struct PartialResults<R> {
    values: Vec<Option<R>>,
    failures: BTreeMap<usize, FutureError>,
}

impl<R> PartialResults<R> {
    /// One entry per task, in task order; `None` where the task failed.
    pub fn values(&self) -> &[Option<R>] {
        &self.values
    }

    /// What made each failed task fail, keyed by task index.
    pub fn failures(&self) -> &BTreeMap<usize, FutureError> {
        &self.failures
    }

    pub fn succeeded(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_values(self) -> Vec<Option<R>> {
        self.values
    }
}

/// Run every task through `submitter` with at most `max_concurrency` in
/// flight, letting every task finish even when some fail.
///
/// Cancelling the result cancels every task and keeps pending ones from
/// being submitted.
pub fn process_all_to_completion<T, R, F>(
    tasks: Vec<T>,
    submitter: F,
    max_concurrency: usize,
    executor: Arc<dyn Executor>,
) -> SettableFuture<PartialResults<R>>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(T) -> anyhow::Result<SettableFuture<R>> + Send + Sync + 'static,
{
    let result = SettableFuture::new();
    let guard = result.clone();
    let semaphore = AsyncSemaphore::new(max_concurrency, executor, move |task| {
        if guard.is_cancelled() {
            return Ok(immediate_cancelled_future());
        }
        submitter(task)
    });

    let count = tasks.len();
    let futures: Arc<[SettableFuture<R>]> = tasks
        .into_iter()
        .map(|task| semaphore.submit(task))
        .collect::<Vec<_>>()
        .into();
    if count == 0 {
        result.set(PartialResults {
            values: Vec::new(),
            failures: BTreeMap::new(),
        });
        return result;
    }

    let collected = Arc::new(Mutex::new(PartialResults {
        values: vec![None; count],
        failures: BTreeMap::new(),
    }));
    let remaining = Arc::new(AtomicUsize::new(count));
    for (index, future) in futures.iter().enumerate() {
        let result = result.clone();
        let collected = Arc::clone(&collected);
        let remaining = Arc::clone(&remaining);
        future.add_callback(move |outcome| {
            {
                let mut collected = collected.lock();
                match outcome {
                    Ok(value) => collected.values[index] = Some(value),
                    Err(error) => {
                        collected.failures.insert(index, error);
                    }
                }
            }
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let report = std::mem::replace(
                    &mut *collected.lock(),
                    PartialResults {
                        values: Vec::new(),
                        failures: BTreeMap::new(),
                    },
                );
                result.set(report);
            }
        });
    }

    let watched = result.clone();
    result.add_listener(move || {
        if let Some(interrupted) = watched.cancellation() {
            for future in futures.iter() {
                future.cancel(interrupted);
            }
        }
    });
    result
}
