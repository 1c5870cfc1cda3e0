//! Bounded-concurrency batch executor.
//!
//! Applies one async operation across a collection of items under a
//! semaphore bound, with an optional per-item wall-clock deadline.
//! Item failures and timeouts are isolated: they are logged at debug
//! level and dropped from the result list, never aborting the batch.
//! Outcomes flow through an mpsc channel into a single aggregating
//! loop, which also publishes a monotonically increasing
//! completed-count as [`BatchProgress`] events.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, info};
use uuid::Uuid;

use oxidock_common::{OxidockError, Result};

/// Default worker count: 3/4 of the logical cores, at least one.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cores * 3 / 4).max(1)
}

/// Execution parameters for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Human-readable job name, used in logs and progress events.
    pub job_name: String,
    /// Upper bound on concurrently executing items. Must be positive.
    pub workers: usize,
    /// Per-item wall-clock deadline. `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn new(job_name: impl Into<String>, workers: usize) -> Self {
        Self {
            job_name: job_name.into(),
            workers,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Progress event emitted after each item completes (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub job_id: Uuid,
    pub job_name: String,
    pub completed: usize,
    pub total: usize,
}

/// Runs `op` once per item across a bounded pool of concurrent tasks.
///
/// Returns the results of the items that completed successfully within
/// the deadline, in completion order. An item whose operation errors or
/// times out is counted and dropped; only an invalid configuration
/// (zero workers) fails the whole batch.
pub async fn run_batch<T, R, F, Fut>(
    op: F,
    items: Vec<T>,
    options: &BatchOptions,
    progress_tx: Option<broadcast::Sender<BatchProgress>>,
) -> Result<Vec<R>>
where
    T: Debug + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    if options.workers == 0 {
        return Err(OxidockError::Config(
            "batch worker count must be positive".to_string(),
        ));
    }

    let job_id = Uuid::new_v4();
    let total = items.len();
    info!(
        job = %options.job_name,
        total,
        workers = options.workers,
        timeout = ?options.timeout,
        "Starting batch"
    );

    let semaphore = Arc::new(Semaphore::new(options.workers));
    let (tx, mut rx) = mpsc::channel::<(String, Result<R>)>(total.max(1));
    let timeout = options.timeout;

    for item in items {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        let op = op.clone();
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("batch semaphore closed");
            let desc = format!("{item:?}");
            let outcome = match timeout {
                Some(deadline) => match tokio::time::timeout(deadline, op(item)).await {
                    Ok(result) => result,
                    Err(_) => Err(OxidockError::TaskTimeout(deadline)),
                },
                None => op(item).await,
            };
            let _ = tx.send((desc, outcome)).await;
        });
    }
    drop(tx);

    let mut results = Vec::new();
    let mut completed = 0usize;
    while let Some((desc, outcome)) = rx.recv().await {
        completed += 1;
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => debug!(item = %desc, error = %e, "Batch item dropped"),
        }
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(BatchProgress {
                job_id,
                job_name: options.job_name.clone(),
                completed,
                total,
            });
        }
    }

    info!(
        job = %options.job_name,
        succeeded = results.len(),
        failed = total - results.len(),
        "Batch complete"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn opts(workers: usize) -> BatchOptions {
        BatchOptions::new("test", workers)
    }

    #[tokio::test]
    async fn all_items_succeed_regardless_of_worker_count() {
        for workers in [1, 2, 8] {
            let items: Vec<u32> = (0..10).collect();
            let mut results = run_batch(
                |n: u32| async move { Ok::<_, OxidockError>(n * 2) },
                items,
                &opts(workers),
                None,
            )
            .await
            .unwrap();
            results.sort_unstable();
            assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn failing_items_are_dropped_without_aborting() {
        let items: Vec<u32> = (0..10).collect();
        let results = run_batch(
            |n: u32| async move {
                if n % 3 == 0 {
                    Err(OxidockError::Task(format!("item {n}")))
                } else {
                    Ok(n)
                }
            },
            items,
            &opts(4),
            None,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|n| n % 3 != 0));
    }

    #[tokio::test]
    async fn timed_out_items_return_nothing_and_complete_promptly() {
        let items: Vec<u32> = (0..4).collect();
        let options = opts(2).with_timeout(Some(Duration::from_millis(50)));
        let started = Instant::now();
        let results = run_batch(
            |_n: u32| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, OxidockError>(())
            },
            items,
            &options,
            None,
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn zero_workers_is_a_configuration_error() {
        let result = run_batch(
            |n: u32| async move { Ok::<_, OxidockError>(n) },
            vec![1, 2],
            &opts(0),
            None,
        )
        .await;
        assert!(matches!(result, Err(OxidockError::Config(_))));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_bound() {
        static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let items: Vec<u32> = (0..20).collect();
        let results = run_batch(
            |_n: u32| async move {
                let now = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
                PEAK.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, OxidockError>(())
            },
            items,
            &opts(3),
            None,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 20);
        assert!(PEAK.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn progress_count_is_monotonic_and_reaches_total() {
        let (tx, mut rx) = broadcast::channel(64);
        let items: Vec<u32> = (0..8).collect();
        run_batch(
            |n: u32| async move { Ok::<_, OxidockError>(n) },
            items,
            &opts(2),
            Some(tx),
        )
        .await
        .unwrap();

        let mut last = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.completed > last);
            assert_eq!(event.total, 8);
            last = event.completed;
        }
        assert_eq!(last, 8);
    }

    #[test]
    fn default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }
}
