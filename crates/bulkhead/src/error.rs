//! Error types shared by the futures layer and the executors.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Failure cause carried by a failed future. Shared so every holder of the
/// future observes the same error.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Why a future did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FutureError {
    #[error("future was cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(Cause),

    #[error("future timed out after {0:?}")]
    TimedOut(Duration),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl FutureError {
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::Failed(Arc::from(error.into()))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The executor refused this one task.
    #[error("task rejected: {0}")]
    Rejected(String),

    /// The executor is permanently unusable; every later task is refused.
    #[error("executor failed: {0}")]
    Failed(String),
}

impl ExecutorError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
