//! Settable futures and the helpers that compose them.
//!
//! Every primitive in this crate reports completion through
//! [`SettableFuture`]: the async limiter hands one back per task, and the
//! bounded queue uses them as one-shot wake-up signals.

mod compose;
mod settable;

pub use compose::{
    all_as_list, all_as_list_with_cancellation_on_failure, first_completed,
    immediate_cancelled_future, immediate_failed_future, immediate_future, mirror,
    non_cancellation_propagating, with_timeout,
};
pub use settable::SettableFuture;
