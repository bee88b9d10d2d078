//! Generic two-index registration store shared by `SessionInterests`,
//! `SessionDataStore`, and `SessionWatchers`.
//!
//! Two indices are maintained: `by_data_info_id` (the authoritative store)
//! and `by_connect_id` (a derived lookup index). Every mutation updates
//! both, but `deleteByConnectId` additionally performs a compare-and-delete
//! against the authoritative index so that a delayed delete can never
//! remove a record that has since been superseded by a re-registration on
//! another connection (see module docs on `RegistrationStore::delete_by_connect_id`).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::model::{ConnectId, DataInfoId, Registration};

/// Keyed by `register_id` within one `DataInfoId`.
type DataInfoBucket<R> = RwLock<HashMap<String, Arc<R>>>;

/// Keyed by `(DataInfoId, register_id)` within one `ConnectId`.
type ConnectBucket<R> = RwLock<HashMap<(DataInfoId, String), Arc<R>>>;

#[derive(Debug)]
pub struct RegistrationStore<R: Registration> {
    by_data_info_id: DashMap<DataInfoId, DataInfoBucket<R>>,
    by_connect_id: DashMap<ConnectId, ConnectBucket<R>>,
}

impl<R: Registration> Default for RegistrationStore<R> {
    fn default() -> Self {
        Self {
            by_data_info_id: DashMap::new(),
            by_connect_id: DashMap::new(),
        }
    }
}

impl<R: Registration> RegistrationStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace by `(data_info_id, register_id)`.
    ///
    /// If a record with that key exists under a *different* `connect_id`,
    /// the new record only wins if it is not older by timestamp and not
    /// smaller by version -- otherwise the add is silently ignored. This is
    /// what stops a stale reconnection from resurrecting a dead
    /// registration.
    pub fn add(&self, reg: R) -> bool {
        let data_info_id = reg.data_info_id().clone();
        let register_id = reg.register_id().to_string();
        let new_connect_id = reg.connect_id().clone();
        let new_arc = Arc::new(reg);

        let old = {
            let bucket = self
                .by_data_info_id
                .entry(data_info_id.clone())
                .or_insert_with(|| RwLock::new(HashMap::new()));
            let mut map = bucket.write();

            if let Some(existing) = map.get(&register_id) {
                if existing.connect_id() != &new_connect_id
                    && (new_arc.register_timestamp() < existing.register_timestamp()
                        || new_arc.version() < existing.version())
                {
                    tracing::debug!(
                        data_info_id = %data_info_id,
                        register_id = %register_id,
                        "rejecting stale re-registration from a different connection"
                    );
                    return false;
                }
            }

            map.insert(register_id.clone(), new_arc.clone())
        };

        if let Some(ref old_arc) = old {
            if old_arc.connect_id() != &new_connect_id {
                self.remove_from_connect_index(old_arc.connect_id(), &data_info_id, &register_id);
            }
        }

        let bucket = self
            .by_connect_id
            .entry(new_connect_id)
            .or_insert_with(|| RwLock::new(HashMap::new()));
        bucket
            .write()
            .insert((data_info_id, register_id), new_arc);

        true
    }

    fn remove_from_connect_index(
        &self,
        connect_id: &ConnectId,
        data_info_id: &DataInfoId,
        register_id: &str,
    ) {
        if let Some(bucket) = self.by_connect_id.get(connect_id) {
            bucket
                .write()
                .remove(&(data_info_id.clone(), register_id.to_string()));
        }
    }

    /// Remove the single record matching `(register_id, data_info_id)`.
    pub fn delete_by_id(&self, register_id: &str, data_info_id: &DataInfoId) -> bool {
        let removed = match self.by_data_info_id.get(data_info_id) {
            Some(bucket) => bucket.write().remove(register_id),
            None => None,
        };

        if let Some(reg) = removed {
            self.remove_from_connect_index(reg.connect_id(), data_info_id, register_id);
            self.prune_data_info_bucket(data_info_id);
            true
        } else {
            false
        }
    }

    /// Remove every record whose `connect_id` equals `connect_id`.
    ///
    /// Idempotent: once the connect_id's bucket is drained there is
    /// nothing left for a second invocation to find.
    ///
    /// Compare-and-delete: a pair is only removed from `by_data_info_id` if
    /// the record currently stored there still belongs to this
    /// `connect_id`. This is what makes the delete safe even if it is
    /// delayed past a re-registration that moved the same
    /// `(data_info_id, register_id)` to a different connection.
    pub fn delete_by_connect_id(&self, connect_id: &ConnectId) {
        let Some((_, bucket)) = self.by_connect_id.remove(connect_id) else {
            return;
        };

        let pairs: Vec<(DataInfoId, String)> = bucket.into_inner().into_keys().collect();

        for (data_info_id, register_id) in pairs {
            if let Some(data_bucket) = self.by_data_info_id.get(&data_info_id) {
                let mut map = data_bucket.write();
                let still_owned = map
                    .get(&register_id)
                    .map(|current| current.connect_id() == connect_id)
                    .unwrap_or(false);

                if still_owned {
                    map.remove(&register_id);
                }
            }
            self.prune_data_info_bucket(&data_info_id);
        }
    }

    /// Drop the outer `data_info_id` entry once its bucket is empty, so a
    /// long-lived registry doesn't accumulate empty maps forever.
    fn prune_data_info_bucket(&self, data_info_id: &DataInfoId) {
        self.by_data_info_id
            .remove_if(data_info_id, |_, bucket| bucket.read().is_empty());
    }

    /// All registrations currently attributed to `connect_id`, keyed by
    /// `register_id`. Absent connect_id and an empty mapping are both
    /// represented the same way: an empty map.
    pub fn query_by_connect_id(&self, connect_id: &ConnectId) -> HashMap<String, Arc<R>> {
        match self.by_connect_id.get(connect_id) {
            Some(bucket) => bucket
                .read()
                .iter()
                .map(|((_, register_id), reg)| (register_id.clone(), reg.clone()))
                .collect(),
            None => HashMap::new(),
        }
    }

    /// All registrations on `data_info_id`.
    pub fn get_datas(&self, data_info_id: &DataInfoId) -> Vec<Arc<R>> {
        match self.by_data_info_id.get(data_info_id) {
            Some(bucket) => bucket.read().values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Total number of distinct `data_info_id` keys tracked (diagnostic).
    pub fn data_info_id_count(&self) -> usize {
        self.by_data_info_id.len()
    }

    /// Check that both indices agree with each other. Intended for tests
    /// and debug assertions, not the hot path.
    #[cfg(test)]
    pub fn indices_consistent(&self) -> bool {
        for entry in self.by_connect_id.iter() {
            let connect_id = entry.key();
            for ((data_info_id, register_id), reg) in entry.value().read().iter() {
                let authoritative = self
                    .by_data_info_id
                    .get(data_info_id)
                    .and_then(|b| b.read().get(register_id).cloned());
                match authoritative {
                    Some(current) if current.connect_id() == connect_id && Arc::ptr_eq(&current, reg) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegistrationBase, Subscriber, AssembleType, Scope};

    fn sub(register_id: &str, source: &str, target: &str, ts: i64, version: i64) -> Subscriber {
        Subscriber::new(
            RegistrationBase {
                register_id: register_id.into(),
                data_info_id: DataInfoId::new("d1", "g1", ""),
                source_address: source.into(),
                target_address: target.into(),
                version,
                register_timestamp: ts,
            },
            Scope::Global,
            AssembleType::All,
        )
    }

    #[test]
    fn overwrite_via_reconnect() {
        let store = RegistrationStore::<Subscriber>::new();
        let c1 = ConnectId::new("1.1.1.1:12345", "2.2.2.2:9600");
        let c2 = ConnectId::new("1.1.1.1:12346", "2.2.2.2:9600");

        assert!(store.add(sub("P1", "1.1.1.1:12345", "2.2.2.2:9600", 1, 1)));
        assert!(store.add(sub("P1", "1.1.1.1:12346", "2.2.2.2:9600", 2, 2)));

        assert!(store.query_by_connect_id(&c1).is_empty());
        assert_eq!(store.query_by_connect_id(&c2).len(), 1);
        assert!(store.indices_consistent());
    }

    #[test]
    fn delayed_delete_does_not_remove_newer_registration() {
        let store = RegistrationStore::<Subscriber>::new();
        let c1 = ConnectId::new("1.1.1.1:1", "2.2.2.2:9600");
        let c2 = ConnectId::new("1.1.1.1:2", "2.2.2.2:9600");
        let data_info_id = DataInfoId::new("d1", "g1", "");

        assert!(store.add(sub("S1", "1.1.1.1:1", "2.2.2.2:9600", 1, 1)));
        assert!(store.add(sub("S1", "1.1.1.1:2", "2.2.2.2:9600", 2, 2)));

        store.delete_by_connect_id(&c1);

        assert!(store.query_by_connect_id(&c1).is_empty());
        assert_eq!(store.query_by_connect_id(&c2).len(), 1);
        let datas = store.get_datas(&data_info_id);
        assert_eq!(datas.len(), 1);
        assert_eq!(datas[0].connect_id(), &c2);
        assert!(store.indices_consistent());
    }

    #[test]
    fn delete_by_connect_id_is_idempotent() {
        let store = RegistrationStore::<Subscriber>::new();
        let c1 = ConnectId::new("1.1.1.1:1", "2.2.2.2:9600");

        store.add(sub("S1", "1.1.1.1:1", "2.2.2.2:9600", 1, 1));
        store.delete_by_connect_id(&c1);
        // second call: no-op, does not panic or misbehave.
        store.delete_by_connect_id(&c1);

        assert!(store.query_by_connect_id(&c1).is_empty());
        assert!(store.indices_consistent());
    }

    #[test]
    fn stale_add_from_different_connection_is_ignored() {
        let store = RegistrationStore::<Subscriber>::new();
        assert!(store.add(sub("S1", "1.1.1.1:1", "2.2.2.2:9600", 10, 10)));
        // Older timestamp and lower version from a different connection: rejected.
        assert!(!store.add(sub("S1", "1.1.1.1:2", "2.2.2.2:9600", 5, 5)));

        let data_info_id = DataInfoId::new("d1", "g1", "");
        let datas = store.get_datas(&data_info_id);
        assert_eq!(datas.len(), 1);
        assert_eq!(datas[0].register_timestamp(), 10);
    }

    #[test]
    fn delete_by_id_removes_single_record() {
        let store = RegistrationStore::<Subscriber>::new();
        let data_info_id = DataInfoId::new("d1", "g1", "");
        store.add(sub("S1", "1.1.1.1:1", "2.2.2.2:9600", 1, 1));
        assert!(store.delete_by_id("S1", &data_info_id));
        assert!(!store.delete_by_id("S1", &data_info_id));
        assert!(store.get_datas(&data_info_id).is_empty());
    }
}
