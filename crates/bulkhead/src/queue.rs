//! FIFO queue bounded by the total weight of its elements rather than their
//! count.
//!
//! Every element is weighed once, when it is offered. An ordinary element is
//! admitted only if the total stays below `max_size`. An element weighing
//! `max_size` or more is admitted whenever the total is below `max_size`, so
//! it can never starve. Without
//! [`force_put`](DynamicSizeBoundQueue::force_put) the resident weight stays
//! below `max_size` plus the heaviest element.
//!
//! Blocking callers never sleep on a condition variable. They obtain the
//! signal future for the opposite event, retry once, and only then wait on
//! the signal. Each signal fires at most once and is replaced by a fresh one.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use crate::future::{SettableFuture, non_cancellation_propagating};
use crate::ticker::{SystemTicker, Ticker};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("forced element of weight {weight} overflows queue size {size}")]
    Overflow { size: u64, weight: u64 },
}

/// Outcome of [`DynamicSizeBoundQueue::offer_with_backoff`].
#[derive(Debug)]
#[must_use]
pub enum Offered<T> {
    Accepted,
    /// The queue had no room. `space_available` completes after the next
    /// removal; cancelling it only stops this caller from being notified.
    Backoff {
        element: T,
        space_available: SettableFuture<()>,
    },
}

struct Weighed<T> {
    element: T,
    weight: u64,
}

/// Lazily created wake-up future for "the next enqueue" or "the next dequeue".
#[derive(Default)]
struct Signal {
    slot: Mutex<Option<SettableFuture<()>>>,
}

impl Signal {
    fn subscribe(&self) -> SettableFuture<()> {
        self.slot.lock().get_or_insert_with(SettableFuture::new).clone()
    }

    fn notify(&self) {
        let waiters = self.slot.lock().take();
        if let Some(waiters) = waiters {
            waiters.set(());
        }
    }
}

type Weigher<T> = dyn Fn(&T) -> NonZeroU64 + Send + Sync + 'static;

#[cfg(test)]
type AwaitHook<T> = Box<dyn Fn(&DynamicSizeBoundQueue<T>) + Send + Sync + 'static>;

/// Called right before a blocked caller starts waiting on a signal.
#[cfg(test)]
struct AwaitHooks<T> {
    dequeue: Option<AwaitHook<T>>,
    enqueue: Option<AwaitHook<T>>,
}

#[cfg(test)]
impl<T> Default for AwaitHooks<T> {
    fn default() -> Self {
        Self {
            dequeue: None,
            enqueue: None,
        }
    }
}

pub struct DynamicSizeBoundQueue<T> {
    queue: SegQueue<Weighed<T>>,
    size: AtomicU64,
    max_size: u64,
    weigher: Box<Weigher<T>>,
    ticker: Arc<dyn Ticker>,
    enqueued: Signal,
    dequeued: Signal,
    #[cfg(test)]
    hooks: AwaitHooks<T>,
}

impl<T> std::fmt::Debug for DynamicSizeBoundQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicSizeBoundQueue")
            .field("size", &self.size())
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl<T> DynamicSizeBoundQueue<T> {
    /// # Panics
    ///
    /// Panics if `max_size` is zero.
    pub fn new<F>(max_size: u64, weigher: F) -> Self
    where
        F: Fn(&T) -> NonZeroU64 + Send + Sync + 'static,
    {
        Self::with_ticker(max_size, weigher, Arc::new(SystemTicker::new()))
    }

    /// Like [`new`](Self::new), measuring timeouts with `ticker`.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is zero.
    pub fn with_ticker<F>(max_size: u64, weigher: F, ticker: Arc<dyn Ticker>) -> Self
    where
        F: Fn(&T) -> NonZeroU64 + Send + Sync + 'static,
    {
        assert!(max_size > 0, "max_size must be positive");
        Self {
            queue: SegQueue::new(),
            size: AtomicU64::new(0),
            max_size,
            weigher: Box::new(weigher),
            ticker,
            enqueued: Signal::default(),
            dequeued: Signal::default(),
            #[cfg(test)]
            hooks: AwaitHooks::default(),
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Total weight of the queued elements.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueue `element` if there is room, handing it back otherwise.
    pub fn offer(&self, element: T) -> Result<(), T> {
        let weight = self.weigh(&element);
        self.offer_weighed(element, weight)
    }

    /// Like [`offer`](Self::offer), waiting up to `timeout` for room.
    pub fn offer_timeout(&self, element: T, timeout: Duration) -> Result<(), T> {
        let weight = self.weigh(&element);
        let mut remaining = nanos(timeout);
        let mut element = element;
        loop {
            element = match self.offer_weighed(element, weight) {
                Ok(()) => return Ok(()),
                Err(element) => element,
            };
            let space = self.dequeued.subscribe();
            // Check again in case the dequeue happened before we subscribed
            element = match self.offer_weighed(element, weight) {
                Ok(()) => return Ok(()),
                Err(element) => element,
            };

            let start = self.ticker.read();
            if remaining == 0 {
                return Err(element);
            }
            self.before_dequeue_wait();
            if space.get_timeout(Duration::from_nanos(remaining)).is_none() {
                return Err(element);
            }
            remaining = remaining.saturating_sub(self.ticker.read().saturating_sub(start));
        }
    }

    /// Enqueue `element`, blocking the calling thread until there is room.
    pub fn put(&self, element: T) {
        let weight = self.weigh(&element);
        let mut element = element;
        loop {
            element = match self.offer_weighed(element, weight) {
                Ok(()) => return,
                Err(element) => element,
            };
            let space = self.dequeued.subscribe();
            element = match self.offer_weighed(element, weight) {
                Ok(()) => return,
                Err(element) => element,
            };
            self.before_dequeue_wait();
            let _ = space.get();
        }
    }

    /// Enqueue `element` if there is room. Otherwise hand it back with a
    /// future that completes once something is removed.
    pub fn offer_with_backoff(&self, element: T) -> Offered<T> {
        let weight = self.weigh(&element);
        let element = match self.offer_weighed(element, weight) {
            Ok(()) => return Offered::Accepted,
            Err(element) => element,
        };
        let space = self.dequeued.subscribe();
        match self.offer_weighed(element, weight) {
            Ok(()) => Offered::Accepted,
            Err(element) => Offered::Backoff {
                element,
                space_available: non_cancellation_propagating(&space),
            },
        }
    }

    /// Enqueue `element` regardless of the bound.
    ///
    /// Fails, without inserting, only if the total weight would overflow.
    pub fn force_put(&self, element: T) -> Result<(), QueueError> {
        let weight = self.weigh(&element);
        self.size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                size.checked_add(weight)
            })
            .map_err(|size| QueueError::Overflow { size, weight })?;
        self.queue.push(Weighed { element, weight });
        self.enqueued.notify();
        Ok(())
    }

    /// Remove the oldest element, or `None` if the queue is empty.
    pub fn poll(&self) -> Option<T> {
        let Weighed { element, weight } = self.queue.pop()?;
        self.release(weight);
        self.dequeued.notify();
        Some(element)
    }

    /// Like [`poll`](Self::poll), waiting up to `timeout` for an element.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        let mut remaining = nanos(timeout);
        loop {
            if let Some(element) = self.poll() {
                return Some(element);
            }
            let arrival = self.enqueued.subscribe();
            // Check again in case the enqueue happened before we subscribed
            if let Some(element) = self.poll() {
                return Some(element);
            }

            let start = self.ticker.read();
            if remaining == 0 {
                return None;
            }
            self.before_enqueue_wait();
            arrival.get_timeout(Duration::from_nanos(remaining))?;
            remaining = remaining.saturating_sub(self.ticker.read().saturating_sub(start));
        }
    }

    /// Remove the oldest element, blocking the calling thread until there is one.
    pub fn take(&self) -> T {
        loop {
            if let Some(element) = self.poll() {
                return element;
            }
            let arrival = self.enqueued.subscribe();
            if let Some(element) = self.poll() {
                return element;
            }
            self.before_enqueue_wait();
            let _ = arrival.get();
        }
    }

    /// Async form of [`put`](Self::put). Dropping the returned future stops
    /// waiting and drops `element` without enqueueing it.
    pub async fn put_async(&self, element: T) {
        let weight = self.weigh(&element);
        let mut element = element;
        loop {
            element = match self.offer_weighed(element, weight) {
                Ok(()) => return,
                Err(element) => element,
            };
            let space = self.dequeued.subscribe();
            element = match self.offer_weighed(element, weight) {
                Ok(()) => return,
                Err(element) => element,
            };
            let _ = space.await;
        }
    }

    /// Async form of [`take`](Self::take). Dropping the returned future stops
    /// waiting without removing anything.
    pub async fn take_async(&self) -> T {
        loop {
            if let Some(element) = self.poll() {
                return element;
            }
            let arrival = self.enqueued.subscribe();
            if let Some(element) = self.poll() {
                return element;
            }
            let _ = arrival.await;
        }
    }

    fn weigh(&self, element: &T) -> u64 {
        (self.weigher)(element).get()
    }

    fn offer_weighed(&self, element: T, weight: u64) -> Result<(), T> {
        if !self.try_reserve(weight) {
            return Err(element);
        }
        self.queue.push(Weighed { element, weight });
        self.enqueued.notify();
        Ok(())
    }

    fn try_reserve(&self, weight: u64) -> bool {
        if self.size.load(Ordering::Acquire) >= self.max_size {
            return false;
        }

        let Ok(previous) = self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                size.checked_add(weight)
            })
        else {
            // Overflow: the element still fits once the queue drains
            return false;
        };

        // Elements at or above the bound are admitted while the total is below it
        if previous + weight >= self.max_size && weight < self.max_size {
            self.release(weight);
            // A waiter may have been turned away by our reservation alone
            self.dequeued.notify();
            return false;
        }
        true
    }

    fn release(&self, weight: u64) {
        let previous = self.size.fetch_sub(weight, Ordering::AcqRel);
        debug_assert!(previous >= weight, "queue size went negative");
    }

    fn before_dequeue_wait(&self) {
        #[cfg(test)]
        {
            if let Some(hook) = &self.hooks.dequeue {
                hook(self);
            }
        }
    }

    fn before_enqueue_wait(&self) {
        #[cfg(test)]
        {
            if let Some(hook) = &self.hooks.enqueue {
                hook(self);
            }
        }
    }
}

#[cfg(test)]
impl<T> DynamicSizeBoundQueue<T> {
    /// Run `hook` whenever a producer is about to wait for a dequeue.
    fn on_dequeue_wait<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.hooks.dequeue = Some(Box::new(hook));
        self
    }

    /// Run `hook` whenever a consumer is about to wait for an enqueue.
    fn on_enqueue_wait<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.hooks.enqueue = Some(Box::new(hook));
        self
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticker::ManualTicker;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    /// Queue of numbers where each number is its own weight.
    fn by_value(max_size: u64) -> DynamicSizeBoundQueue<u64> {
        DynamicSizeBoundQueue::new(max_size, |v: &u64| {
            NonZeroU64::new(*v).unwrap_or(NonZeroU64::MIN)
        })
    }

    fn drain(queue: &DynamicSizeBoundQueue<u64>) -> Vec<u64> {
        std::iter::from_fn(|| queue.poll()).collect()
    }

    #[test]
    fn offer_and_poll_in_fifo_order() {
        let queue = by_value(10);
        assert!(queue.is_empty());
        assert_eq!(queue.poll(), None);

        assert_eq!(queue.offer(3), Ok(()));
        assert_eq!(queue.offer(1), Ok(()));
        assert_eq!(queue.offer(2), Ok(()));
        assert_eq!(queue.size(), 6);
        assert!(!queue.is_empty());

        assert_eq!(drain(&queue), vec![3, 1, 2]);
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn third_heavy_offer_waits_for_a_poll() {
        let queue = by_value(10);
        assert_eq!(queue.offer(4), Ok(()));
        assert_eq!(queue.offer(4), Ok(()));
        assert_eq!(queue.offer(4), Err(4));
        assert_eq!(queue.size(), 8);

        assert_eq!(queue.poll(), Some(4));
        assert_eq!(queue.size(), 4);
        assert_eq!(queue.offer(4), Ok(()));
        assert_eq!(queue.size(), 8);
    }

    #[test]
    fn total_stays_below_max_size() {
        let queue = by_value(10);
        assert_eq!(queue.offer(5), Ok(()));
        assert_eq!(queue.offer(5), Err(5));
        assert_eq!(queue.offer(4), Ok(()));
        assert_eq!(queue.size(), 9);
        assert_eq!(queue.offer(1), Err(1));
    }

    #[test]
    fn oversized_element_enters_whenever_there_is_room() {
        let queue = by_value(10);
        assert_eq!(queue.offer(25), Ok(()));
        assert_eq!(queue.size(), 25);
        assert_eq!(queue.offer(1), Err(1));

        assert_eq!(queue.poll(), Some(25));
        assert_eq!(queue.offer(3), Ok(()));
        assert_eq!(queue.offer(25), Ok(()));
        assert_eq!(queue.size(), 28);
        assert_eq!(queue.offer(10), Err(10));

        assert_eq!(drain(&queue), vec![3, 25]);
        assert_eq!(queue.offer(10), Ok(()));
        assert_eq!(queue.size(), 10);
    }

    #[test]
    fn oversized_element_is_not_starved_by_small_traffic() {
        let queue = by_value(10);
        let mut admitted = false;
        for _ in 0..1000 {
            assert_eq!(queue.offer(1), Ok(()));
            if queue.offer(11).is_ok() {
                admitted = true;
                break;
            }
            assert_eq!(queue.offer(1), Ok(()));
            queue.poll();
        }
        assert!(admitted);
        assert!(queue.size() < queue.max_size() + 11);
    }

    #[test]
    fn overflowing_offer_is_rejected_until_drained() {
        let queue = by_value(u64::MAX);
        assert_eq!(queue.offer(u64::MAX - 1), Ok(()));
        assert_eq!(queue.offer(2), Err(2));

        let err = queue.force_put(2).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"forced element of weight 2 overflows queue size 18446744073709551614"
        );
        assert_eq!(queue.size(), u64::MAX - 1);

        assert_eq!(drain(&queue), vec![u64::MAX - 1]);
        assert_eq!(queue.offer(2), Ok(()));
    }

    #[test]
    fn force_put_exceeds_max_size_until_poll() {
        let queue = by_value(10);
        assert_eq!(queue.offer(10), Ok(()));
        queue.force_put(5).unwrap();
        assert_eq!(queue.size(), 15);
        assert!(queue.size() > queue.max_size());

        assert_eq!(queue.poll(), Some(10));
        assert_eq!(queue.size(), 5);
        assert_eq!(drain(&queue), vec![5]);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn weight_is_taken_once_at_submission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        // Every call reports a bigger weight than the last
        let queue = DynamicSizeBoundQueue::new(100, move |_: &&str| {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            NonZeroU64::new(n).unwrap_or(NonZeroU64::MIN)
        });
        assert_eq!(queue.offer("a"), Ok(()));
        assert_eq!(queue.offer("b"), Ok(()));
        queue.force_put("c").unwrap();
        assert_eq!(queue.size(), 6);

        assert_eq!(queue.poll(), Some("a"));
        assert_eq!(queue.poll(), Some("b"));
        assert_eq!(queue.poll(), Some("c"));
        assert_eq!(queue.size(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn put_blocks_until_space_frees_up() {
        let (waiting, waited) = mpsc::channel();
        let waiting = Mutex::new(waiting);
        let queue = Arc::new(by_value(5).on_dequeue_wait(move |_| {
            let _ = waiting.lock().send(());
        }));
        assert_eq!(queue.offer(5), Ok(()));

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.put(3))
        };
        waited.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(queue.size(), 5);

        assert_eq!(queue.poll(), Some(5));
        producer.join().unwrap();
        assert_eq!(drain(&queue), vec![3]);
    }

    #[test]
    fn take_blocks_until_an_element_arrives() {
        let (waiting, waited) = mpsc::channel();
        let waiting = Mutex::new(waiting);
        let queue = Arc::new(by_value(5).on_enqueue_wait(move |_| {
            let _ = waiting.lock().send(());
        }));

        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.take())
        };
        waited.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(queue.offer(2), Ok(()));
        assert_eq!(consumer.join().unwrap(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn timed_operations_give_up() {
        let queue = by_value(3);
        assert_eq!(queue.poll_timeout(Duration::from_millis(10)), None);
        assert_eq!(queue.poll_timeout(Duration::ZERO), None);

        assert_eq!(queue.offer_timeout(3, Duration::ZERO), Ok(()));
        assert_eq!(queue.offer_timeout(1, Duration::from_millis(10)), Err(1));
        assert_eq!(queue.offer_timeout(1, Duration::ZERO), Err(1));
        assert_eq!(queue.poll_timeout(Duration::from_millis(10)), Some(3));
    }

    #[test]
    fn timed_operations_succeed_when_woken() {
        let queue = Arc::new(by_value(3));
        assert_eq!(queue.offer(3), Ok(()));

        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.poll()
            })
        };
        assert_eq!(queue.offer_timeout(2, Duration::from_secs(30)), Ok(()));
        assert_eq!(consumer.join().unwrap(), Some(3));

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.force_put(1)
            })
        };
        assert_eq!(queue.poll_timeout(Duration::from_secs(30)), Some(2));
        producer.join().unwrap().unwrap();
        assert_eq!(queue.poll_timeout(Duration::from_secs(30)), Some(1));
    }

    #[test]
    fn timeout_budget_is_measured_with_the_ticker() {
        let ticker = Arc::new(ManualTicker::new());
        let clock = Arc::clone(&ticker);
        let queue = DynamicSizeBoundQueue::with_ticker(
            1,
            |_: &u64| NonZeroU64::MIN,
            Arc::clone(&ticker) as Arc<dyn Ticker>,
        )
        .on_dequeue_wait(move |queue| {
            // Burn the whole budget, then wake the producer without making room
            clock.advance(Duration::from_secs(60));
            let _ = queue.poll();
            let _ = queue.force_put(3);
        });
        assert_eq!(queue.offer(1), Ok(()));

        let started = Instant::now();
        assert_eq!(queue.offer_timeout(2, Duration::from_secs(30)), Err(2));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(drain(&queue), vec![3]);
    }

    #[test]
    fn offer_with_backoff_hands_the_element_back() {
        let queue = by_value(4);
        assert!(matches!(queue.offer_with_backoff(4), Offered::Accepted));

        let Offered::Backoff {
            element,
            space_available,
        } = queue.offer_with_backoff(2)
        else {
            panic!("full queue accepted an element");
        };
        assert_eq!(element, 2);
        assert!(!space_available.is_done());

        assert_eq!(queue.poll(), Some(4));
        assert!(space_available.is_done());
        assert!(matches!(queue.offer_with_backoff(element), Offered::Accepted));
    }

    #[test]
    fn cancelling_backoff_future_leaves_other_waiters_armed() {
        let queue = by_value(4);
        queue.offer(4).unwrap();

        let backoff = |queue: &DynamicSizeBoundQueue<u64>| match queue.offer_with_backoff(1) {
            Offered::Backoff {
                space_available, ..
            } => space_available,
            Offered::Accepted => panic!("full queue accepted an element"),
        };
        let cancelled = backoff(&queue);
        let kept = backoff(&queue);

        assert!(cancelled.cancel(true));
        assert!(!kept.is_done());
        // The shared signal is still the same pending future
        assert!(!queue.dequeued.subscribe().is_done());

        assert_eq!(queue.poll(), Some(4));
        assert!(kept.is_done());
        assert!(kept.try_get().unwrap().is_ok());
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn producers_and_consumer_round_trip_everything() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;
        const HEAVIEST: u64 = 5;

        let queue = Arc::new(DynamicSizeBoundQueue::new(16, |item: &(usize, usize)| {
            NonZeroU64::new(item.1 as u64 % HEAVIEST + 1).unwrap_or(NonZeroU64::MIN)
        }));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        queue.put((producer, seq));
                    }
                })
            })
            .collect();

        let mut next = [0usize; PRODUCERS];
        let mut removed_weight = 0;
        for _ in 0..PRODUCERS * PER_PRODUCER {
            let (producer, seq) = queue.take();
            assert_eq!(seq, next[producer], "producer {producer} out of order");
            next[producer] += 1;
            removed_weight += seq as u64 % HEAVIEST + 1;
        }
        for producer in producers {
            producer.join().unwrap();
        }

        let expected: u64 = (0..PER_PRODUCER as u64).map(|s| s % HEAVIEST + 1).sum();
        assert_eq!(removed_weight, expected * PRODUCERS as u64);
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_put_waits_for_async_take() {
        let queue = Arc::new(by_value(2));
        queue.put_async(2).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.put_async(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.take_async().await, 2);
        producer.await.unwrap();
        assert_eq!(queue.take_async().await, 1);
    }

    #[tokio::test]
    async fn dropping_async_waiters_leaves_queue_untouched() {
        let queue = by_value(2);
        for _ in 0..20 {
            let timed_out =
                tokio::time::timeout(Duration::from_millis(1), queue.take_async()).await;
            assert!(timed_out.is_err());
        }
        assert_eq!(queue.enqueued.subscribe().waiter_count(), 0);

        queue.offer(2).unwrap();
        for _ in 0..20 {
            let timed_out =
                tokio::time::timeout(Duration::from_millis(1), queue.put_async(1)).await;
            assert!(timed_out.is_err());
        }
        assert_eq!(queue.dequeued.subscribe().waiter_count(), 0);
        assert_eq!(queue.size(), 2);
        assert_eq!(drain(&queue), vec![2]);
    }

    #[test]
    #[should_panic(expected = "max_size must be positive")]
    fn zero_max_size_is_rejected() {
        by_value(0);
    }
}
