//! bulkhead-soak: push each primitive through a burst of work and report what
//! the limits looked like from the inside.
//!
//! Limits come from `BULKHEAD_*` (see `LimitsConfig::from_env`); the number of
//! work items per primitive comes from `BULKHEAD_SOAK_TASKS`.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use bulkhead::{
    AsyncSemaphore, BoundedExecutor, DynamicSizeBoundQueue, Executor, LimitsConfig, Offered,
    SettableFuture, TokioExecutor, process_all_to_completion,
};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_TASKS: usize = 1000;

/// Directives used when `RUST_LOG` is unset. `BULKHEAD_LOG` picks one level
/// for the library and this harness; other crates stay at warn.
fn soak_directives(level: Option<&str>) -> String {
    let level = match level.map(str::trim) {
        Some("warning") => LevelFilter::WARN,
        Some(value) => value.parse().unwrap_or(LevelFilter::INFO),
        None => LevelFilter::INFO,
    };
    format!("warn,bulkhead={level},bulkhead_soak={level}")
}

/// Logs go to stderr; stdout carries only the JSON summary.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(soak_directives(
            std::env::var("BULKHEAD_LOG").ok().as_deref(),
        ))
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init();
    if let Err(e) = installed {
        eprintln!("bulkhead-soak: keeping existing tracing subscriber: {e}");
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    limits: LimitsConfig,
    tasks: usize,
    semaphore: SemaphoreRun,
    bounded_executor: ExecutorRun,
    queue: QueueRun,
}

#[derive(Debug, Serialize)]
struct SemaphoreRun {
    succeeded: usize,
    failed: usize,
    peak_in_flight: usize,
    batch_succeeded: usize,
    batch_failed: usize,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct ExecutorRun {
    completed: usize,
    peak_running: usize,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct QueueRun {
    transferred: usize,
    weight_in: u64,
    weight_out: u64,
    peak_size: u64,
    backoffs: usize,
    elapsed_ms: u128,
}

/// Tracks how many of something are active and the most ever seen at once.
#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Pretend remote call: resolves after a short jittered delay, failing every
/// 97th request.
fn remote_call(id: usize, gauge: Arc<Gauge>) -> anyhow::Result<SettableFuture<usize>> {
    let reply = SettableFuture::new();
    let complete = reply.clone();
    gauge.enter();
    tokio::runtime::Handle::try_current()
        .context("remote calls need a tokio runtime")?
        .spawn(async move {
            tokio::time::sleep(Duration::from_micros((id % 7) as u64 * 150)).await;
            gauge.exit();
            if id % 97 == 96 {
                complete.set_error(format!("request {id} refused"));
            } else {
                complete.set(id * 2);
            }
        });
    Ok(reply)
}

async fn run_semaphore(limits: &LimitsConfig, tasks: usize) -> anyhow::Result<SemaphoreRun> {
    let started = Instant::now();
    let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::current()?);
    let gauge = Arc::new(Gauge::default());

    let calls = Arc::clone(&gauge);
    let semaphore = AsyncSemaphore::new(limits.max_permits, Arc::clone(&executor), move |id| {
        remote_call(id, Arc::clone(&calls))
    });
    let results = futures::future::join_all((0..tasks).map(|id| semaphore.submit(id))).await;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    debug!(succeeded, "Semaphore submissions finished");

    let calls = Arc::clone(&gauge);
    let batch = process_all_to_completion(
        (0..tasks).collect(),
        move |id| remote_call(id, Arc::clone(&calls)),
        limits.max_permits,
        executor,
    )
    .await?;

    Ok(SemaphoreRun {
        succeeded,
        failed: tasks - succeeded,
        peak_in_flight: gauge.peak(),
        batch_succeeded: batch.succeeded(),
        batch_failed: batch.failures().len(),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

async fn run_bounded_executor(limits: &LimitsConfig, tasks: usize) -> anyhow::Result<ExecutorRun> {
    let started = Instant::now();
    let executor = BoundedExecutor::new(Arc::new(TokioExecutor::current()?), limits.max_threads);
    let gauge = Arc::new(Gauge::default());

    let mut done = Vec::with_capacity(tasks);
    for id in 0..tasks {
        let finished = SettableFuture::new();
        let (signal, gauge) = (finished.clone(), Arc::clone(&gauge));
        executor.execute(Box::new(move || {
            gauge.enter();
            std::thread::sleep(Duration::from_micros((id % 5) as u64 * 100));
            gauge.exit();
            signal.set(id);
        }))?;
        done.push(finished);
    }
    let completed = futures::future::join_all(done)
        .await
        .into_iter()
        .filter(Result::is_ok)
        .count();

    Ok(ExecutorRun {
        completed,
        peak_running: gauge.peak(),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

async fn run_queue(limits: &LimitsConfig, tasks: usize) -> anyhow::Result<QueueRun> {
    let started = Instant::now();
    let queue = Arc::new(DynamicSizeBoundQueue::new(
        limits.max_queue_size,
        |payload: &Vec<u8>| {
            NonZeroU64::new(payload.len() as u64).unwrap_or(NonZeroU64::MIN)
        },
    ));
    // Payloads sized so roughly eight fill the queue
    let unit = usize::try_from(limits.max_queue_size / 8)
        .unwrap_or(usize::MAX)
        .clamp(1, 64 * 1024);
    let peak_size = Arc::new(AtomicU64::new(0));
    let backoffs = Arc::new(AtomicUsize::new(0));

    let producer = {
        let (queue, peak_size, backoffs) = (
            Arc::clone(&queue),
            Arc::clone(&peak_size),
            Arc::clone(&backoffs),
        );
        tokio::spawn(async move {
            let mut weight_in = 0u64;
            for id in 0..tasks {
                let mut payload = vec![0u8; unit + id % unit.max(2)];
                weight_in += payload.len() as u64;
                loop {
                    match queue.offer_with_backoff(payload) {
                        Offered::Accepted => break,
                        Offered::Backoff {
                            element,
                            space_available,
                        } => {
                            backoffs.fetch_add(1, Ordering::Relaxed);
                            let _ = space_available.await;
                            payload = element;
                        }
                    }
                }
                peak_size.fetch_max(queue.size(), Ordering::Relaxed);
            }
            weight_in
        })
    };

    let mut weight_out = 0u64;
    for _ in 0..tasks {
        let payload = queue.take_async().await;
        weight_out += payload.len() as u64;
    }
    let weight_in = producer.await.context("queue producer panicked")?;

    Ok(QueueRun {
        transferred: tasks,
        weight_in,
        weight_out,
        peak_size: peak_size.load(Ordering::Relaxed),
        backoffs: backoffs.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let limits = LimitsConfig::from_env()?;
    let tasks = match std::env::var("BULKHEAD_SOAK_TASKS") {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid BULKHEAD_SOAK_TASKS: {value:?}"))?,
        Err(_) => DEFAULT_TASKS,
    };
    info!(
        max_permits = limits.max_permits,
        max_threads = limits.max_threads,
        max_queue_size = limits.max_queue_size,
        tasks,
        "Starting soak run"
    );

    let semaphore = run_semaphore(&limits, tasks).await?;
    info!(peak = semaphore.peak_in_flight, "Semaphore run complete");
    let bounded_executor = run_bounded_executor(&limits, tasks).await?;
    info!(peak = bounded_executor.peak_running, "Bounded executor run complete");
    let queue = run_queue(&limits, tasks).await?;
    info!(peak = queue.peak_size, "Queue run complete");

    let summary = Summary {
        limits,
        tasks,
        semaphore,
        bounded_executor,
        queue,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
