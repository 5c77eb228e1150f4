//! bulkhead: admission control for work competing over a scarce resource.
//!
//! - [`AsyncSemaphore`] caps how many asynchronous tasks are in flight.
//! - [`BoundedExecutor`] caps how many threads of a shared executor one
//!   workload may occupy.
//! - [`DynamicSizeBoundQueue`] bounds a FIFO queue by total element weight.
//!
//! All three report completion through [`SettableFuture`].

pub mod bounded;
pub mod config;
pub mod error;
pub mod executor;
pub mod future;
pub mod queue;
pub mod semaphore;
pub mod ticker;

pub use bounded::BoundedExecutor;
pub use config::{ConfigError, LimitsConfig};
pub use error::{ExecutorError, FutureError};
pub use executor::{DirectExecutor, Executor, Task, ThreadExecutor, TokioExecutor};
pub use future::SettableFuture;
pub use queue::{DynamicSizeBoundQueue, Offered, QueueError};
pub use semaphore::{AsyncSemaphore, PartialResults, process_all, process_all_to_completion};
pub use ticker::{ManualTicker, SystemTicker, Ticker};
