//! Bounded keyed executor: work submitted under the same key always runs
//! on the same shard, and therefore serially with respect to other work on
//! that key, while unrelated keys run fully in parallel. Implemented as a
//! fixed array of bounded `tokio::mpsc` channels with one consumer task
//! per channel; the key is hashed (via `fnv`, for reproducibility) to pick
//! the shard.

use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use fnv::FnvHasher;
use tokio::sync::mpsc;

pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct KeyedExecutor {
    senders: Vec<mpsc::Sender<Job>>,
}

impl KeyedExecutor {
    /// `shards` consumer tasks, each backed by a bounded channel of
    /// `queue_size` pending jobs.
    pub fn new(shards: usize, queue_size: usize) -> Self {
        let shards = shards.max(1);
        let mut senders = Vec::with_capacity(shards);

        for _ in 0..shards {
            let (tx, mut rx) = mpsc::channel::<Job>(queue_size.max(1));
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    job.await;
                }
            });
            senders.push(tx);
        }

        Self { senders }
    }

    /// Submit a job keyed by `key`. Returns `false` on backpressure (the
    /// shard's queue is full); the caller should log and move on to the
    /// next key rather than retry in a tight loop.
    pub fn submit<K: Hash>(&self, key: &K, job: Job) -> bool {
        let shard = self.shard_for(key);
        self.senders[shard].try_send(job).is_ok()
    }

    fn shard_for<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = FnvHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_runs_serially() {
        let executor = KeyedExecutor::new(4, 16);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            executor.submit(
                &"same-key",
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    order.lock().unwrap().push(i);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn distinct_keys_all_execute() {
        let executor = KeyedExecutor::new(4, 16);
        let count = Arc::new(AtomicUsize::new(0));

        for i in 0..20 {
            let count = count.clone();
            executor.submit(
                &i,
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn full_queue_reports_backpressure() {
        let executor = KeyedExecutor::new(1, 1);
        // Fill the one slot with a long-running job, then overflow it.
        executor.submit(
            &"k",
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }),
        );
        let mut saw_backpressure = false;
        for _ in 0..10 {
            let accepted = executor.submit(&"k", Box::pin(async move {}));
            if !accepted {
                saw_backpressure = true;
                break;
            }
        }
        assert!(saw_backpressure);
    }
}
