//! Push processor: dedup/conflict-merge on `pendingTasks`, single-in-flight
//! delivery per client address on `pushingTasks`, and bounded retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::model::Datum;

use super::error::Error;
use super::task::{PushTask, TaskKey};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Wire-shaped payload handed to `PushTransport::push`. Carries enough for
/// a real transport to serialize; the merge across `datumMap` has already
/// happened by the time this is built.
#[derive(Debug, Clone)]
pub struct PushPayload {
    pub data_center: String,
    pub push_version: i64,
    pub fetch_seq_start: i64,
    pub fetch_seq_end: i64,
    pub datums: Vec<Datum>,
}

#[derive(Debug, Clone, Default)]
pub struct PushAck;

/// The client-facing push RPC. A real deployment substitutes a transport
/// that actually talks to the session's client connection; tests use
/// `NoopPushTransport` or a scripted stand-in.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(&self, addr: &str, payload: PushPayload) -> Result<PushAck, Error>;
}

/// Always succeeds. Useful for exercising the processor's bookkeeping in
/// isolation from any real client connection.
pub struct NoopPushTransport;

#[async_trait]
impl PushTransport for NoopPushTransport {
    async fn push(&self, _addr: &str, _payload: PushPayload) -> Result<PushAck, Error> {
        Ok(PushAck)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PushProcessorConfig {
    pub retry_max: u32,
    pub retry_expire_ms: i64,
}

pub struct PushProcessor {
    pending_tasks: DashMap<TaskKey, Arc<PushTask>>,
    pushing_tasks: DashMap<String, Arc<PushTask>>,
    merge_lock: Mutex<()>,
    pub(crate) wake: Notify,
    transport: Arc<dyn PushTransport>,
    config: PushProcessorConfig,
    stop_push_switch: std::sync::atomic::AtomicBool,
    retry_exhausted: AtomicU64,
}

impl PushProcessor {
    pub fn new(transport: Arc<dyn PushTransport>, config: PushProcessorConfig) -> Arc<Self> {
        Arc::new(Self {
            pending_tasks: DashMap::new(),
            pushing_tasks: DashMap::new(),
            merge_lock: Mutex::new(()),
            wake: Notify::new(),
            transport,
            config,
            stop_push_switch: std::sync::atomic::AtomicBool::new(false),
            retry_exhausted: AtomicU64::new(0),
        })
    }

    pub fn set_stop_push_switch(&self, stop: bool) {
        self.stop_push_switch.store(stop, Ordering::SeqCst);
    }

    pub fn pending_len(&self) -> usize {
        self.pending_tasks.len()
    }

    pub fn is_pushing(&self, addr: &str) -> bool {
        self.pushing_tasks.contains_key(addr)
    }

    pub(crate) fn due_pending_keys(&self, now: i64) -> Vec<TaskKey> {
        self.pending_tasks
            .iter()
            .filter(|e| e.value().is_due(now))
            .map(|e| e.key().clone())
            .collect()
    }

    pub(crate) fn take_pending(&self, key: &TaskKey) -> Option<Arc<PushTask>> {
        self.pending_tasks.remove(key).map(|(_, v)| v)
    }

    pub(crate) fn return_pending(&self, key: TaskKey, task: Arc<PushTask>) {
        self.pending_tasks.entry(key).or_insert(task);
    }

    /// Merge `task` into `pendingTasks`. Returns whether it was accepted
    /// (a dropped, overlapping task returns `false`).
    pub fn fire_push(&self, mut task: PushTask) -> bool {
        let key = task.key.clone();

        match self.pending_tasks.entry(key.clone()) {
            Entry::Vacant(v) => {
                let no_delay = task.no_delay;
                v.insert(Arc::new(task));
                if no_delay {
                    self.wake.notify_one();
                }
                return true;
            }
            Entry::Occupied(_) => {}
        }

        let _guard = self.merge_lock.lock();
        let prev = self.pending_tasks.get(&key).map(|e| e.clone());

        let accepted = match prev {
            None => {
                self.pending_tasks.insert(key.clone(), Arc::new(task.clone()));
                true
            }
            Some(prev) => {
                if task.fetch_seq_start > prev.fetch_seq_end {
                    task.expire_timestamp_ms = prev.expire_timestamp_ms;
                    self.pending_tasks.insert(key.clone(), Arc::new(task.clone()));
                    true
                } else {
                    info!(
                        client_addr = %key.client_addr,
                        data_center = %key.data_center,
                        new_start = task.fetch_seq_start,
                        prev_end = prev.fetch_seq_end,
                        "[ConflictMerge] dropping overlapping/stale push task"
                    );
                    false
                }
            }
        };

        if accepted && task.no_delay {
            self.wake.notify_one();
        }
        accepted
    }

    /// Re-fire `task` with `no_delay` set, without counting it against the
    /// retry budget. Used when `check_pushing` finds a strictly-after task
    /// arriving while another push is in flight for the same address.
    fn requeue_waiting(&self, task: &Arc<PushTask>) {
        let mut next = (**task).clone();
        next.no_delay = true;
        self.fire_push(next);
    }

    /// Bounded retry after a transport failure. Exhausted tasks are
    /// dropped and logged, never silently retried forever.
    fn retry(&self, task: &Arc<PushTask>) {
        if task.retry_count + 1 > self.config.retry_max {
            self.retry_exhausted.fetch_add(1, Ordering::Relaxed);
            warn!(
                client_addr = %task.key.client_addr,
                retry_count = task.retry_count,
                "push retries exhausted, dropping task"
            );
            return;
        }

        let mut next = (**task).clone();
        next.retry_count += 1;
        next.expire_timestamp_ms = now_ms() + self.config.retry_expire_ms;
        next.no_delay = true;
        self.fire_push(next);
    }

    pub fn retry_exhausted_count(&self) -> u64 {
        self.retry_exhausted.load(Ordering::Relaxed)
    }

    /// Commit path: called from the watchdog's keyed executor, one task at
    /// a time per `clientAddr`.
    pub async fn commit(self: &Arc<Self>, task: Arc<PushTask>) {
        if self.stop_push_switch.load(Ordering::SeqCst) {
            return;
        }

        let addr = task.key.client_addr.clone();
        let data_center = task.key.data_center.clone();

        match self.pushing_tasks.get(&addr).map(|e| e.clone()) {
            None => {
                let consents = task
                    .subscribers
                    .iter()
                    .all(|s| s.check_version(&data_center, task.fetch_seq_start));
                if !consents {
                    debug!(%addr, "push abandoned: a subscriber already advanced past this fetch sequence");
                    return;
                }
            }
            Some(current) => {
                if task.fetch_seq_start > current.fetch_seq_end {
                    self.requeue_waiting(&task);
                } else {
                    debug!(%addr, "[ConflictMerge] dropping push overlapping an in-flight push");
                }
                return;
            }
        }

        let payload = PushPayload {
            data_center: data_center.clone(),
            push_version: task.push_version,
            fetch_seq_start: task.fetch_seq_start,
            fetch_seq_end: task.fetch_seq_end,
            datums: task.datums.clone(),
        };

        self.pushing_tasks.insert(addr.clone(), task.clone());

        match self.transport.push(&addr, payload).await {
            Ok(_ack) => {
                for subscriber in &task.subscribers {
                    subscriber.check_and_update_version(
                        &data_center,
                        task.push_version,
                        task.fetch_seq_start,
                        task.fetch_seq_end,
                    );
                }
                self.pushing_tasks.remove_if(&addr, |_, v| v.seq == task.seq);
            }
            Err(err) => {
                warn!(%addr, %err, "push transport call failed");
                self.pushing_tasks.remove_if(&addr, |_, v| v.seq == task.seq);
                self.retry(&task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssembleType, RegistrationBase, Scope, Subscriber};
    use crate::model::DataInfoId;
    use crate::push::task::TaskKey;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering as O};

    fn config() -> PushProcessorConfig {
        PushProcessorConfig {
            retry_max: 3,
            retry_expire_ms: 500,
        }
    }

    fn subscriber(id: &str) -> Arc<crate::model::Subscriber> {
        Arc::new(Subscriber::new(
            RegistrationBase {
                register_id: id.into(),
                data_info_id: DataInfoId::new("d1", "g1", ""),
                source_address: "1.1.1.1:1".into(),
                target_address: "2.2.2.2:2".into(),
                version: 1,
                register_timestamp: 1,
            },
            Scope::Global,
            AssembleType::All,
        ))
    }

    fn task(client_addr: &str, start: i64, end: i64, no_delay: bool) -> PushTask {
        let key = TaskKey::new("dc1", client_addr, BTreeSet::from(["s1".to_string()]));
        PushTask::new(key, vec![subscriber("s1")], vec![], 1, start, end, 0, no_delay)
    }

    #[test]
    fn fast_path_accepts_first_task() {
        let processor = PushProcessor::new(Arc::new(NoopPushTransport), config());
        assert!(processor.fire_push(task("addr1", 0, 5, false)));
        assert_eq!(processor.pending_len(), 1);
    }

    #[test]
    fn conflicting_overlap_is_dropped_strictly_after_wins() {
        let processor = PushProcessor::new(Arc::new(NoopPushTransport), config());
        assert!(processor.fire_push(task("addr1", 0, 5, false)));
        // B: strictly after A, replaces it.
        assert!(processor.fire_push(task("addr1", 6, 10, false)));
        // C: overlaps B's range, dropped.
        assert!(!processor.fire_push(task("addr1", 3, 7, false)));
        assert_eq!(processor.pending_len(), 1);
    }

    #[tokio::test]
    async fn commit_delivers_and_clears_pushing_entry() {
        let processor = PushProcessor::new(Arc::new(NoopPushTransport), config());
        processor.fire_push(task("addr1", 0, 5, true));
        let key = TaskKey::new("dc1", "addr1", BTreeSet::from(["s1".to_string()]));
        let t = processor.take_pending(&key).unwrap();
        processor.commit(t).await;
        assert!(!processor.is_pushing("addr1"));
    }

    struct FailingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PushTransport for FailingTransport {
        async fn push(&self, addr: &str, _payload: PushPayload) -> Result<PushAck, Error> {
            self.calls.fetch_add(1, O::SeqCst);
            Err(Error::Transport {
                addr: addr.to_string(),
                reason: "simulated".into(),
            })
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_drops_task_and_clears_pushing_slot() {
        let transport = Arc::new(FailingTransport {
            calls: AtomicUsize::new(0),
        });
        let processor = PushProcessor::new(transport.clone(), config());
        processor.fire_push(task("addr1", 0, 5, true));

        // Drive the retry chain by hand: commit, then drain whatever
        // landed back in pendingTasks, up to the retry budget.
        for _ in 0..(config().retry_max + 1) {
            let key = TaskKey::new("dc1", "addr1", BTreeSet::from(["s1".to_string()]));
            if let Some(t) = processor.take_pending(&key) {
                processor.commit(t).await;
            }
        }

        assert!(!processor.is_pushing("addr1"));
        assert_eq!(processor.pending_len(), 0);
        assert_eq!(processor.retry_exhausted_count(), 1);
        assert_eq!(transport.calls.load(O::SeqCst), config().retry_max + 1);
    }
}
