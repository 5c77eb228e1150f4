//! Helpers for building and combining [`SettableFuture`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::settable::{Completion, SettableFuture};
use crate::error::FutureError;

pub fn immediate_future<T>(value: T) -> SettableFuture<T> {
    let future = SettableFuture::new();
    future.set(value);
    future
}

pub fn immediate_failed_future<T>(error: FutureError) -> SettableFuture<T> {
    let future = SettableFuture::new();
    future.set_future_error(error);
    future
}

pub fn immediate_cancelled_future<T>() -> SettableFuture<T> {
    let future = SettableFuture::new();
    future.cancel(false);
    future
}

/// Forward every outcome of `source` into `destination`, and cancel `source`
/// (with `may_interrupt`) if `destination` is cancelled first.
///
/// Unlike [`SettableFuture::set_future`], `destination` stays settable.
pub fn mirror<T>(
    source: &SettableFuture<T>,
    destination: &SettableFuture<T>,
    may_interrupt: bool,
) where
    T: Clone + Send + 'static,
{
    let target = destination.clone();
    let from = source.clone();
    source.add_listener(move || {
        if let Some(completion) = from.completion() {
            target.complete(completion, false);
        }
    });

    let watched = destination.clone();
    let source = source.clone();
    destination.add_listener(move || {
        if watched.is_cancelled() {
            source.cancel(may_interrupt);
        }
    });
}

/// A view of `future` that completes with it, but whose cancellation is not
/// passed back to `future`.
pub fn non_cancellation_propagating<T>(future: &SettableFuture<T>) -> SettableFuture<T>
where
    T: Clone + Send + 'static,
{
    let view = SettableFuture::new();
    let target = view.clone();
    let from = future.clone();
    future.add_listener(move || {
        if let Some(completion) = from.completion() {
            target.complete(completion, false);
        }
    });
    view
}

/// Ordered values of every input. Fails (or cancels) as soon as any input
/// does; cancelling the result cancels every input.
pub fn all_as_list<T>(futures: Vec<SettableFuture<T>>) -> SettableFuture<Vec<T>>
where
    T: Clone + Send + 'static,
{
    collect_all(futures, false)
}

/// Like [`all_as_list`], and additionally cancels every other input as soon
/// as one input fails or is cancelled.
pub fn all_as_list_with_cancellation_on_failure<T>(
    futures: Vec<SettableFuture<T>>,
) -> SettableFuture<Vec<T>>
where
    T: Clone + Send + 'static,
{
    collect_all(futures, true)
}

fn collect_all<T>(
    futures: Vec<SettableFuture<T>>,
    cancel_on_failure: bool,
) -> SettableFuture<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if futures.is_empty() {
        return immediate_future(Vec::new());
    }

    let result = SettableFuture::new();
    let inputs: Arc<[SettableFuture<T>]> = futures.into();
    let values: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; inputs.len()]));
    let remaining = Arc::new(AtomicUsize::new(inputs.len()));

    for (index, input) in inputs.iter().enumerate() {
        let result = result.clone();
        let values = Arc::clone(&values);
        let remaining = Arc::clone(&remaining);
        let siblings = Arc::clone(&inputs);
        input.add_callback(move |outcome| match outcome {
            Ok(value) => {
                values.lock()[index] = Some(value);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let collected = std::mem::take(&mut *values.lock())
                        .into_iter()
                        .flatten()
                        .collect();
                    result.set(collected);
                }
            }
            Err(error) => {
                result.set_future_error(error);
                if cancel_on_failure {
                    for sibling in siblings.iter() {
                        sibling.cancel(false);
                    }
                }
            }
        });
    }

    let watched = result.clone();
    result.add_listener(move || {
        if let Some(interrupted) = watched.cancellation() {
            for input in inputs.iter() {
                input.cancel(interrupted);
            }
        }
    });
    result
}

/// Completes with the outcome of whichever input completes first.
/// Cancelling the result does not affect the inputs.
///
/// # Panics
///
/// Panics if `futures` is empty.
pub fn first_completed<T>(futures: &[SettableFuture<T>]) -> SettableFuture<T>
where
    T: Clone + Send + 'static,
{
    assert!(!futures.is_empty(), "futures is empty");
    let result = SettableFuture::new();
    for future in futures {
        let target = result.clone();
        let from = future.clone();
        future.add_listener(move || {
            if let Some(completion) = from.completion() {
                target.complete(completion, false);
            }
        });
    }
    result
}

/// Fail with [`FutureError::TimedOut`] unless `future` completes within
/// `timeout`. On timeout the input is cancelled with interruption. The timer
/// runs on the given tokio runtime.
pub fn with_timeout<T>(
    future: &SettableFuture<T>,
    timeout: Duration,
    runtime: &Handle,
) -> SettableFuture<T>
where
    T: Clone + Send + 'static,
{
    let result = SettableFuture::new();

    let target = result.clone();
    let from = future.clone();
    future.add_listener(move || {
        if let Some(completion) = from.completion() {
            target.complete(completion, false);
        }
    });

    let expiring = result.clone();
    let input = future.clone();
    let timer = runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        if expiring.complete(Completion::Failed(FutureError::TimedOut(timeout)), false) {
            input.cancel(true);
        }
    });

    let watched = result.clone();
    let input = future.clone();
    result.add_listener(move || {
        timer.abort();
        if let Some(interrupted) = watched.cancellation() {
            input.cancel(interrupted);
        }
    });
    result
}
