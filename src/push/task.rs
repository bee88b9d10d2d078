//! `PushTask`: the unit of work tracked through `pendingTasks` and
//! `pushingTasks`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::model::{DataInfoId, Datum, Subscriber};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// `(dataCenter, clientAddr, subscriberIdSet)` -- the merge point for
/// dedup. `subscriber_ids` is a `BTreeSet` so the key hashes/compares
/// consistently regardless of registration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub data_center: String,
    pub client_addr: String,
    pub subscriber_ids: BTreeSet<String>,
}

impl TaskKey {
    pub fn new(
        data_center: impl Into<String>,
        client_addr: impl Into<String>,
        subscriber_ids: BTreeSet<String>,
    ) -> Self {
        Self {
            data_center: data_center.into(),
            client_addr: client_addr.into(),
            subscriber_ids,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushTask {
    pub key: TaskKey,
    pub subscribers: Vec<Arc<Subscriber>>,
    pub datums: Vec<Datum>,
    pub push_version: i64,
    pub fetch_seq_start: i64,
    pub fetch_seq_end: i64,
    pub expire_timestamp_ms: i64,
    pub retry_count: u32,
    pub no_delay: bool,
    /// Monotonic token stamped at creation, used to implement
    /// compare-and-remove on `pushingTasks` without relying on pointer
    /// identity (a retried task is logically "the same" push, but a fresh
    /// value).
    pub seq: u64,
}

impl PushTask {
    pub fn new(
        key: TaskKey,
        subscribers: Vec<Arc<Subscriber>>,
        datums: Vec<Datum>,
        push_version: i64,
        fetch_seq_start: i64,
        fetch_seq_end: i64,
        expire_timestamp_ms: i64,
        no_delay: bool,
    ) -> Self {
        Self {
            key,
            subscribers,
            datums,
            push_version,
            fetch_seq_start,
            fetch_seq_end,
            expire_timestamp_ms,
            retry_count: 0,
            no_delay,
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.no_delay || self.expire_timestamp_ms <= now_ms
    }

    pub fn data_info_ids(&self) -> Vec<DataInfoId> {
        self.datums
            .iter()
            .filter_map(|d| d.data_info_id.clone())
            .collect()
    }
}
