//! Local per-node store of `Datum`s, partitioned implicitly by slot via
//! `slot_of`. Used by the watchdog to apply sync diffs and to bump
//! versions when a migration completes.

use dashmap::DashMap;

use crate::model::{DataInfoId, Datum};

use super::sync::SyncDiff;
use super::table::{slot_of, SlotId};

#[derive(Debug, Default)]
pub struct DatumStore {
    data: DashMap<(String, DataInfoId), Datum>,
}

impl DatumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_diff(&self, diff: SyncDiff) {
        for datum in diff.added {
            if let Some(ref data_info_id) = datum.data_info_id {
                self.data
                    .insert((datum.data_center.clone(), data_info_id.clone()), datum);
            }
        }
        for data_info_id in diff.removed {
            // removed entries carry no data_center in this shape; sweep all.
            self.data.retain(|(_, id), _| id != &data_info_id);
        }
    }

    pub fn get(&self, data_center: &str, data_info_id: &DataInfoId) -> Option<Datum> {
        self.data
            .get(&(data_center.to_string(), data_info_id.clone()))
            .map(|d| d.clone())
    }

    /// Versions currently known for data belonging to `slot_id`, used as
    /// the `knownVersions` cursor in a diff-pull request.
    pub fn known_versions_for_slot(&self, slot_id: SlotId) -> std::collections::HashMap<DataInfoId, i64> {
        self.data
            .iter()
            .filter(|entry| slot_of(&entry.key().1) == slot_id)
            .map(|entry| (entry.key().1.clone(), entry.value().version))
            .collect()
    }

    /// Bump the version of every datum belonging to `slot_id`. Called once
    /// a migration finishes, so subsequent reads observe a version newer
    /// than anything seen during migration.
    pub fn bump_versions_for_slot(&self, slot_id: SlotId) {
        for mut entry in self.data.iter_mut() {
            if slot_of(&entry.key().1) == slot_id {
                entry.version += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PublisherEntry;

    #[test]
    fn apply_diff_inserts_and_removes() {
        let store = DatumStore::new();
        let id = DataInfoId::new("d1", "g1", "");
        let mut datum = Datum::new("dc1", id.clone());
        datum.put(
            PublisherEntry {
                register_id: "p1".into(),
                data_list: vec![],
            },
            1,
        );

        store.apply_diff(SyncDiff {
            added: vec![datum],
            removed: vec![],
        });
        assert!(store.get("dc1", &id).is_some());

        store.apply_diff(SyncDiff {
            added: vec![],
            removed: vec![id.clone()],
        });
        assert!(store.get("dc1", &id).is_none());
    }
}
