//! Request Batcher
//!
//! Coalesces many small logical requests into fewer network calls. Entries
//! are keyed by id with last-write-wins deduplication; a batch is submitted
//! when it reaches `batch_size` or when the `batch_delay` timer fires.
//! A batch whose every retry fails is silently re-queued, never surfaced to
//! the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::RouterError;

/// Batching thresholds and retry backoff parameters.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Pending-entry count that triggers an immediate flush.
    pub batch_size: usize,
    /// How long a partially filled batch waits before flushing.
    pub batch_delay: Duration,
    /// Retries after the initial processing attempt.
    pub max_retries: u32,
    /// Base unit for backoff (`base_delay * 2^attempt + random(0, base_delay)`).
    pub base_delay: Duration,
    /// Upper bound on a single backoff sleep.
    pub max_delay: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_millis(500),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// One pending logical request.
#[derive(Debug, Clone)]
pub struct BatchItem<T> {
    pub id: String,
    pub payload: T,
    pub enqueued_at: DateTime<Utc>,
    /// Failed batch attempts this item has lived through.
    pub retries: u32,
}

type Processor<T> =
    Arc<dyn Fn(Vec<BatchItem<T>>) -> BoxFuture<'static, Result<(), RouterError>> + Send + Sync>;

/// Deduplicating, time/size-triggered batch submitter.
pub struct RequestBatcher<T> {
    config: BatcherConfig,
    processor: Processor<T>,
    pending: Arc<Mutex<Vec<BatchItem<T>>>>,
    /// Monotonic timer generation. A scheduled flush only runs if its epoch
    /// is still current, so stale timers expire instead of being aborted and
    /// an in-progress flush can never be cancelled mid-batch.
    timer_epoch: Arc<AtomicU64>,
}

impl<T> Clone for RequestBatcher<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            processor: self.processor.clone(),
            pending: self.pending.clone(),
            timer_epoch: self.timer_epoch.clone(),
        }
    }
}

impl<T> RequestBatcher<T>
where
    T: Clone + Send + 'static,
{
    pub fn new<F, Fut>(config: BatcherConfig, processor: F) -> Self
    where
        F: Fn(Vec<BatchItem<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RouterError>> + Send + 'static,
    {
        Self {
            config,
            processor: Arc::new(move |items| Box::pin(processor(items))),
            pending: Arc::new(Mutex::new(Vec::new())),
            timer_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue one item. Re-adding an existing id replaces the pending entry
    /// and resets its position (last write wins).
    pub async fn add(&self, id: impl Into<String>, payload: T) {
        let id = id.into();
        let flush_now = {
            let mut pending = self.pending.lock().await;
            pending.retain(|item| item.id != id);
            pending.push(BatchItem {
                id,
                payload,
                enqueued_at: Utc::now(),
                retries: 0,
            });
            pending.len() >= self.config.batch_size
        };

        if flush_now {
            self.invalidate_timer();
            self.drain_and_process().await;
        } else {
            self.restart_timer();
        }
    }

    /// Cancel any pending timer and force an immediate drain-and-process
    /// cycle.
    pub async fn flush(&self) {
        self.invalidate_timer();
        self.drain_and_process().await;
    }

    /// Discard pending items without processing.
    pub async fn clear(&self) {
        self.invalidate_timer();
        self.pending.lock().await.clear();
    }

    /// Number of entries waiting for the next flush.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn invalidate_timer(&self) -> u64 {
        self.timer_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn restart_timer(&self) {
        let epoch = self.invalidate_timer();
        let batcher = self.clone();
        tokio::spawn(async move {
            sleep(batcher.config.batch_delay).await;
            if batcher.timer_epoch.load(Ordering::SeqCst) == epoch {
                batcher.drain_and_process().await;
            }
        });
    }

    async fn drain_and_process(&self) {
        let items = {
            let mut pending = self.pending.lock().await;
            std::mem::take(&mut *pending)
        };
        if items.is_empty() {
            return;
        }
        self.process_with_retry(items).await;
    }

    async fn process_with_retry(&self, mut items: Vec<BatchItem<T>>) {
        for attempt in 0..=self.config.max_retries {
            match (self.processor)(items.clone()).await {
                Ok(()) => {
                    tracing::debug!(count = items.len(), "batch processed");
                    return;
                }
                Err(err) => {
                    if attempt == self.config.max_retries {
                        tracing::warn!(
                            count = items.len(),
                            error = %err,
                            "batch failed after all retries, re-queueing items"
                        );
                        self.requeue(items).await;
                        return;
                    }
                    let delay = self.retry_delay(attempt);
                    tracing::debug!(attempt, ?delay, error = %err, "batch attempt failed, retrying");
                    sleep(delay).await;
                    for item in &mut items {
                        item.retries += 1;
                    }
                }
            }
        }
    }

    /// Terminal failure: the originals go back to the front of the pending
    /// set. An id re-added while the flush was in flight keeps its newer
    /// entry.
    async fn requeue(&self, items: Vec<BatchItem<T>>) {
        let mut pending = self.pending.lock().await;
        let mut restored: Vec<BatchItem<T>> = items
            .into_iter()
            .filter(|item| !pending.iter().any(|newer| newer.id == item.id))
            .collect();
        restored.append(&mut pending);
        *pending = restored;
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as u64;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt));
        let jitter = rand::thread_rng().gen_range(0..=base.max(1));
        Duration::from_millis(exponential.saturating_add(jitter)).min(self.config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    #[derive(Default)]
    struct Capture {
        batches: StdMutex<Vec<Vec<BatchItem<u32>>>>,
        attempts: AtomicU32,
        fail: AtomicBool,
    }

    impl Capture {
        fn failing() -> Arc<Self> {
            let capture = Arc::new(Self::default());
            capture.fail.store(true, Ordering::SeqCst);
            capture
        }

        fn batcher(self: &Arc<Self>, config: BatcherConfig) -> RequestBatcher<u32> {
            let capture = self.clone();
            RequestBatcher::new(config, move |items| {
                let capture = capture.clone();
                async move {
                    capture.attempts.fetch_add(1, Ordering::SeqCst);
                    if capture.fail.load(Ordering::SeqCst) {
                        return Err(RouterError::Transport("batch endpoint down".into()));
                    }
                    capture.batches.lock().unwrap().push(items);
                    Ok(())
                }
            })
        }

        fn processed(&self) -> Vec<Vec<BatchItem<u32>>> {
            self.batches.lock().unwrap().clone()
        }
    }

    fn quick_config() -> BatcherConfig {
        BatcherConfig {
            batch_size: 10,
            batch_delay: Duration::from_secs(60),
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn re_adding_an_id_keeps_only_the_newest_payload() {
        let capture = Arc::new(Capture::default());
        let batcher = capture.batcher(quick_config());

        batcher.add("item", 1).await;
        batcher.add("item", 2).await;
        batcher.flush().await;

        let batches = capture.processed();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].payload, 2);
    }

    #[tokio::test]
    async fn reaching_batch_size_flushes_immediately() {
        let capture = Arc::new(Capture::default());
        let batcher = capture.batcher(BatcherConfig {
            batch_size: 2,
            ..quick_config()
        });

        batcher.add("a", 1).await;
        assert!(capture.processed().is_empty());
        batcher.add("b", 2).await;

        let batches = capture.processed();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batcher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn timer_flushes_a_partial_batch() {
        let capture = Arc::new(Capture::default());
        let batcher = capture.batcher(BatcherConfig {
            batch_delay: Duration::from_millis(20),
            ..quick_config()
        });

        batcher.add("a", 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let batches = capture.processed();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].payload, 1);
    }

    #[tokio::test]
    async fn terminal_failure_requeues_all_items_for_a_later_flush() {
        let capture = Capture::failing();
        let batcher = capture.batcher(quick_config());

        batcher.add("a", 1).await;
        batcher.add("b", 2).await;
        batcher.flush().await;

        // Initial attempt plus max_retries.
        assert_eq!(capture.attempts.load(Ordering::SeqCst), 3);
        assert!(capture.processed().is_empty());
        assert_eq!(batcher.pending_len().await, 2);

        capture.fail.store(false, Ordering::SeqCst);
        batcher.flush().await;

        let batches = capture.processed();
        assert_eq!(batches.len(), 1);
        let ids: Vec<&str> = batches[0].iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        // Items carried their retry counts through the failed attempts.
        assert!(batches[0].iter().all(|item| item.retries == 2));
        assert_eq!(batcher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn retry_counters_increment_per_failed_attempt() {
        let capture = Capture::failing();
        let observed = Arc::new(StdMutex::new(Vec::new()));
        let observed_clone = observed.clone();
        let capture_clone = capture.clone();
        let batcher = RequestBatcher::new(quick_config(), move |items: Vec<BatchItem<u32>>| {
            let observed = observed_clone.clone();
            let capture = capture_clone.clone();
            async move {
                capture.attempts.fetch_add(1, Ordering::SeqCst);
                observed
                    .lock()
                    .unwrap()
                    .push(items.iter().map(|item| item.retries).collect::<Vec<_>>());
                Err(RouterError::Transport("down".into()))
            }
        });

        batcher.add("a", 1).await;
        batcher.flush().await;

        let retries = observed.lock().unwrap().clone();
        assert_eq!(retries, vec![vec![0], vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn clear_discards_without_processing() {
        let capture = Arc::new(Capture::default());
        let batcher = capture.batcher(quick_config());

        batcher.add("a", 1).await;
        batcher.clear().await;
        batcher.flush().await;

        assert!(capture.processed().is_empty());
        assert_eq!(batcher.pending_len().await, 0);
    }

    #[test]
    fn retry_delay_is_exponential_with_bounded_jitter() {
        let batcher = RequestBatcher::<u32>::new(
            BatcherConfig {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(10),
                ..BatcherConfig::default()
            },
            |_| async { Ok(()) },
        );

        for attempt in 0..3u32 {
            let delay = batcher.retry_delay(attempt);
            let floor = Duration::from_millis(100 * 2u64.pow(attempt));
            let ceiling = floor + Duration::from_millis(100);
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
        }
    }

    #[test]
    fn retry_delay_is_capped_at_max_delay() {
        let batcher = RequestBatcher::<u32>::new(
            BatcherConfig {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_millis(150),
                ..BatcherConfig::default()
            },
            |_| async { Ok(()) },
        );
        assert_eq!(batcher.retry_delay(5), Duration::from_millis(150));
    }
}
