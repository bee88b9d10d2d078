//! Publisher / Subscriber / Watcher registration records.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use super::connect_id::ConnectId;
use super::data_info_id::DataInfoId;

/// Common accessors shared by every registration kind, so the registration
/// store can be written once and instantiated for each concrete type.
pub trait Registration: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn register_id(&self) -> &str;
    fn data_info_id(&self) -> &DataInfoId;
    fn connect_id(&self) -> &ConnectId;
    fn version(&self) -> i64;
    fn register_timestamp(&self) -> i64;
}

/// Fields shared by every registration kind.
#[derive(Debug, Clone)]
pub struct RegistrationBase {
    pub register_id: String,
    pub data_info_id: DataInfoId,
    pub source_address: String,
    pub target_address: String,
    pub version: i64,
    pub register_timestamp: i64,
}

impl RegistrationBase {
    pub fn connect_id(&self) -> ConnectId {
        ConnectId::new(self.source_address.clone(), self.target_address.clone())
    }
}

/// A published data entry. Opaque payload from the core's perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataBox {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Publisher {
    pub base: RegistrationBase,
    pub data_list: Vec<DataBox>,
    connect_id: ConnectId,
}

impl Publisher {
    pub fn new(base: RegistrationBase, data_list: Vec<DataBox>) -> Self {
        let connect_id = base.connect_id();
        Self {
            base,
            data_list,
            connect_id,
        }
    }
}

impl Registration for Publisher {
    fn register_id(&self) -> &str {
        &self.base.register_id
    }
    fn data_info_id(&self) -> &DataInfoId {
        &self.base.data_info_id
    }
    fn connect_id(&self) -> &ConnectId {
        &self.connect_id
    }
    fn version(&self) -> i64 {
        self.base.version
    }
    fn register_timestamp(&self) -> i64 {
        self.base.register_timestamp
    }
}

/// Scope a subscriber wants its data assembled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    Zone,
    DataCenter,
    #[default]
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssembleType {
    #[default]
    All,
    ZoneFirst,
}

/// Per-`dataCenter` push bookkeeping for a subscriber. Stored behind an
/// `Arc`-shared `DashMap` so every clone of a `Subscriber` (e.g. the copy
/// living in each index of the registration store) observes the same
/// live state.
#[derive(Debug, Default)]
struct PushStateEntry {
    last_push_version: AtomicI64,
    last_fetch_seq_end: AtomicI64,
}

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub base: RegistrationBase,
    pub scope: Scope,
    pub assemble_type: AssembleType,
    connect_id: ConnectId,
    push_state: std::sync::Arc<DashMap<String, PushStateEntry>>,
}

impl Subscriber {
    pub fn new(base: RegistrationBase, scope: Scope, assemble_type: AssembleType) -> Self {
        let connect_id = base.connect_id();
        Self {
            base,
            scope,
            assemble_type,
            connect_id,
            push_state: std::sync::Arc::new(DashMap::new()),
        }
    }

    /// Does this subscriber still consent to receiving a push that reflects
    /// sequence `fetch_seq_start`? Refuses if it has already observed data
    /// as of a later sequence (a stale/overlapping push).
    pub fn check_version(&self, data_center: &str, fetch_seq_start: i64) -> bool {
        match self.push_state.get(data_center) {
            Some(entry) => entry.last_fetch_seq_end.load(Ordering::Acquire) <= fetch_seq_start,
            None => true,
        }
    }

    /// Atomically accept a completed push iff it does not regress version
    /// or leave a sequence gap. Returns whether it was accepted.
    pub fn check_and_update_version(
        &self,
        data_center: &str,
        push_version: i64,
        fetch_seq_start: i64,
        fetch_seq_end: i64,
    ) -> bool {
        let entry = self
            .push_state
            .entry(data_center.to_string())
            .or_insert_with(PushStateEntry::default);

        let recorded_version = entry.last_push_version.load(Ordering::Acquire);
        let recorded_fetch_end = entry.last_fetch_seq_end.load(Ordering::Acquire);

        if push_version >= recorded_version && recorded_fetch_end <= fetch_seq_start {
            entry.last_push_version.store(push_version, Ordering::Release);
            entry.last_fetch_seq_end.store(fetch_seq_end, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn last_push_version(&self, data_center: &str) -> i64 {
        self.push_state
            .get(data_center)
            .map(|e| e.last_push_version.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl Registration for Subscriber {
    fn register_id(&self) -> &str {
        &self.base.register_id
    }
    fn data_info_id(&self) -> &DataInfoId {
        &self.base.data_info_id
    }
    fn connect_id(&self) -> &ConnectId {
        &self.connect_id
    }
    fn version(&self) -> i64 {
        self.base.version
    }
    fn register_timestamp(&self) -> i64 {
        self.base.register_timestamp
    }
}

#[derive(Debug, Clone)]
pub struct Watcher {
    pub base: RegistrationBase,
    connect_id: ConnectId,
}

impl Watcher {
    pub fn new(base: RegistrationBase) -> Self {
        let connect_id = base.connect_id();
        Self { base, connect_id }
    }
}

impl Registration for Watcher {
    fn register_id(&self) -> &str {
        &self.base.register_id
    }
    fn data_info_id(&self) -> &DataInfoId {
        &self.base.data_info_id
    }
    fn connect_id(&self) -> &ConnectId {
        &self.connect_id
    }
    fn version(&self) -> i64 {
        self.base.version
    }
    fn register_timestamp(&self) -> i64 {
        self.base.register_timestamp
    }
}
