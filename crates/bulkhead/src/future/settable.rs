//! Single-assignment future with listeners, cancellation, and forwarding.
//!
//! A `SettableFuture` is a cloneable handle; every clone observes the same
//! slot. The first of `set`, `set_error`, or `cancel` wins and every later
//! attempt reports `false`. Listeners run exactly once, on the thread that
//! completes the future, in the order they were registered.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{FutureError, panic_message};

type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Terminal state of a future.
#[derive(Clone)]
pub(crate) enum Completion<T> {
    Value(T),
    Failed(FutureError),
    Cancelled { interrupted: bool },
}

impl<T> Completion<T> {
    fn into_result(self) -> Result<T, FutureError> {
        match self {
            Completion::Value(value) => Ok(value),
            Completion::Failed(error) => Err(error),
            Completion::Cancelled { .. } => Err(FutureError::Cancelled),
        }
    }
}

enum State<T> {
    Pending {
        listeners: Vec<Listener>,
        /// Keyed by the polling handle so a dropped handle can take its waker back.
        wakers: Vec<(u64, Waker)>,
        /// Set by `set_future`: only the source (or a cancel) may complete us.
        forwarding: bool,
    },
    Done(Completion<T>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    completed: Condvar,
    next_waiter: AtomicU64,
}

pub struct SettableFuture<T> {
    inner: Arc<Inner<T>>,
    /// Waker slot of this handle, assigned on first poll.
    waiter: Option<u64>,
}

impl<T> Clone for SettableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            waiter: None,
        }
    }
}

impl<T> Default for SettableFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SettableFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.lock() {
            State::Pending { .. } => "pending",
            State::Done(Completion::Value(_)) => "succeeded",
            State::Done(Completion::Failed(_)) => "failed",
            State::Done(Completion::Cancelled { .. }) => "cancelled",
        };
        f.debug_struct("SettableFuture").field("state", &state).finish()
    }
}

impl<T> SettableFuture<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    listeners: Vec::new(),
                    wakers: Vec::new(),
                    forwarding: false,
                }),
                completed: Condvar::new(),
                next_waiter: AtomicU64::new(0),
            }),
            waiter: None,
        }
    }

    /// Complete with a value. Returns `false` if already complete or forwarding.
    pub fn set(&self, value: T) -> bool {
        self.complete(Completion::Value(value), false)
    }

    /// Complete with a failure. Returns `false` if already complete or forwarding.
    pub fn set_error<E>(&self, error: E) -> bool
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        self.complete(Completion::Failed(FutureError::failed(error)), false)
    }

    /// Complete with a specific [`FutureError`] without wrapping it.
    ///
    /// `FutureError::Cancelled` is treated as `cancel(false)`.
    pub fn set_future_error(&self, error: FutureError) -> bool {
        match error {
            FutureError::Cancelled => self.cancel(false),
            other => self.complete(Completion::Failed(other), false),
        }
    }

    /// Cancel the future. `may_interrupt` is recorded and can be read back
    /// with [`was_interrupted`](Self::was_interrupted) by the running work.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.complete(
            Completion::Cancelled {
                interrupted: may_interrupt,
            },
            false,
        )
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            &*self.inner.state.lock(),
            State::Done(Completion::Cancelled { .. })
        )
    }

    pub fn was_interrupted(&self) -> bool {
        matches!(
            &*self.inner.state.lock(),
            State::Done(Completion::Cancelled { interrupted: true })
        )
    }

    /// Run `listener` once this future completes. Runs immediately on the
    /// calling thread if it already has.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if let State::Pending { listeners, .. } = &mut *state {
                listeners.push(Box::new(listener));
                return;
            }
        }
        run_listener(Box::new(listener));
    }

    /// `Some(interrupted)` once cancelled.
    pub(crate) fn cancellation(&self) -> Option<bool> {
        match &*self.inner.state.lock() {
            State::Done(Completion::Cancelled { interrupted }) => Some(*interrupted),
            _ => None,
        }
    }

    /// Whether two handles refer to the same future.
    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        match &*self.inner.state.lock() {
            State::Pending { wakers, .. } => wakers.len(),
            State::Done(_) => 0,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Single point of completion. `forwarded` lets the source of a
    /// `set_future` complete a future that refuses ordinary setters.
    pub(crate) fn complete(&self, completion: Completion<T>, forwarded: bool) -> bool {
        let is_cancel = matches!(completion, Completion::Cancelled { .. });
        let (listeners, wakers) = {
            let mut state = self.inner.state.lock();
            let (listeners, wakers) = match &mut *state {
                State::Done(_) => return false,
                State::Pending {
                    forwarding: true, ..
                } if !forwarded && !is_cancel => return false,
                State::Pending {
                    listeners, wakers, ..
                } => (std::mem::take(listeners), std::mem::take(wakers)),
            };
            *state = State::Done(completion);
            (listeners, wakers)
        };

        self.inner.completed.notify_all();
        for (_, waker) in wakers {
            waker.wake();
        }
        for listener in listeners {
            run_listener(listener);
        }
        true
    }
}

impl<T: Clone> SettableFuture<T> {
    /// Snapshot of the outcome, or `None` while pending.
    pub fn try_get(&self) -> Option<Result<T, FutureError>> {
        self.completion().map(Completion::into_result)
    }

    /// Block the calling thread until the future completes.
    pub fn get(&self) -> Result<T, FutureError> {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(completion) = &*state {
                return completion.clone().into_result();
            }
            self.inner.completed.wait(&mut state);
        }
    }

    /// Block for at most `timeout`. `None` means the future is still pending.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<T, FutureError>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(completion) = &*state {
                return Some(completion.clone().into_result());
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .completed
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return match &*state {
                            State::Done(completion) => Some(completion.clone().into_result()),
                            State::Pending { .. } => None,
                        };
                    }
                }
                None => self.inner.completed.wait(&mut state),
            }
        }
    }

    /// Run `callback` with the outcome once this future completes.
    pub fn add_callback<F>(&self, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<T, FutureError>) + Send + 'static,
    {
        let this = self.clone();
        self.add_listener(move || {
            if let Some(outcome) = this.try_get() {
                callback(outcome);
            }
        });
    }

    /// Complete this future with whatever `source` completes with.
    ///
    /// From now on `set` and `set_error` on this future return `false`.
    /// Cancelling this future cancels `source` with the same interrupt flag.
    /// Returns `false`, without touching `source`, if this future is already
    /// complete or forwarding; if it was cancelled, `source` is cancelled too.
    pub fn set_future(&self, source: &SettableFuture<T>) -> bool
    where
        T: Send + 'static,
    {
        let cancelled = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending { forwarding, .. } if !*forwarding => {
                    *forwarding = true;
                    None
                }
                State::Done(Completion::Cancelled { interrupted }) => Some(*interrupted),
                _ => return false,
            }
        };
        if let Some(interrupted) = cancelled {
            source.cancel(interrupted);
            return false;
        }

        let target = self.clone();
        let from = source.clone();
        source.add_listener(move || {
            if let Some(completion) = from.completion() {
                target.complete(completion, true);
            }
        });

        let this = self.clone();
        let source = source.clone();
        self.add_listener(move || {
            if let Some(interrupted) = this.cancellation() {
                source.cancel(interrupted);
            }
        });
        true
    }

    pub(crate) fn completion(&self) -> Option<Completion<T>> {
        match &*self.inner.state.lock() {
            State::Done(completion) => Some(completion.clone()),
            State::Pending { .. } => None,
        }
    }
}

impl<T: Clone> Future for SettableFuture<T> {
    type Output = Result<T, FutureError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.inner.state.lock();
        match &mut *state {
            State::Done(completion) => Poll::Ready(completion.clone().into_result()),
            State::Pending { wakers, .. } => {
                let key = *this
                    .waiter
                    .get_or_insert_with(|| this.inner.next_waiter.fetch_add(1, Ordering::Relaxed));
                match wakers.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, waker)) => waker.clone_from(cx.waker()),
                    None => wakers.push((key, cx.waker().clone())),
                }
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SettableFuture<T> {
    fn drop(&mut self) {
        let Some(key) = self.waiter else {
            return;
        };
        if let State::Pending { wakers, .. } = &mut *self.inner.state.lock() {
            wakers.retain(|(k, _)| *k != key);
        }
    }
}

fn run_listener(listener: Listener) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(listener)) {
        tracing::warn!(
            panic = %panic_message(payload.as_ref()),
            "Future listener panicked"
        );
    }
}
