//! The aggregated publication state for `(dataCenter, dataInfoId)`.

use std::collections::BTreeMap;

use super::data_info_id::DataInfoId;
use super::registration::DataBox;

/// One publisher's contribution to a `Datum`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherEntry {
    pub register_id: String,
    pub data_list: Vec<DataBox>,
}

/// Authoritative, versioned aggregation of all publishers for a single
/// `(dataCenter, dataInfoId)`. Owned by the data-tier leader; sessions only
/// ever hold short-lived copies received via sync.
#[derive(Debug, Clone, Default)]
pub struct Datum {
    pub data_center: String,
    pub data_info_id: Option<DataInfoId>,
    pub version: i64,
    entries: BTreeMap<String, PublisherEntry>,
}

impl Datum {
    pub fn new(data_center: impl Into<String>, data_info_id: DataInfoId) -> Self {
        Self {
            data_center: data_center.into(),
            data_info_id: Some(data_info_id),
            version: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace one publisher's entry, bumping the version.
    /// `version` is strictly monotone per `(dataCenter, dataInfoId)`.
    pub fn put(&mut self, entry: PublisherEntry, next_version: i64) {
        debug_assert!(
            next_version > self.version,
            "Datum.version must be strictly monotone"
        );
        self.entries.insert(entry.register_id.clone(), entry);
        self.version = next_version;
    }

    /// Remove a publisher's entry. Returns true if the datum becomes empty
    /// and should be dropped by the caller.
    pub fn remove(&mut self, register_id: &str, next_version: i64) -> bool {
        if self.entries.remove(register_id).is_some() {
            debug_assert!(next_version > self.version);
            self.version = next_version;
        }
        self.entries.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PublisherEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
