//! Monotonic clock used for timeout accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time in nanoseconds. Only differences between two
/// readings are meaningful.
pub trait Ticker: Send + Sync + 'static {
    fn read(&self) -> u64;
}

/// Wall-clock ticker backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemTicker {
    origin: Instant,
}

impl SystemTicker {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for SystemTicker {
    fn read(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Ticker that only moves when told to. Useful for deterministic timeouts.
#[derive(Debug, Default)]
pub struct ManualTicker {
    nanos: AtomicU64,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(delta))
            });
    }
}

impl Ticker for ManualTicker {
    fn read(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_ticker_is_monotonic() {
        let ticker = SystemTicker::new();
        let first = ticker.read();
        std::thread::sleep(Duration::from_millis(2));
        assert!(ticker.read() > first);
    }

    #[test]
    fn manual_ticker_advances_only_on_request() {
        let ticker = ManualTicker::new();
        assert_eq!(ticker.read(), 0);
        ticker.advance(Duration::from_micros(3));
        assert_eq!(ticker.read(), 3_000);
        assert_eq!(ticker.read(), 3_000);
    }
}
