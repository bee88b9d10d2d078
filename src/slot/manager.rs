//! Per-data-node slot manager: the local view of the slot table plus the
//! per-slot worker state (`SlotState`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::info;

use super::access::SlotAccess;
use super::state::{Role, SlotState};
use super::table::{SlotAssignment, SlotId, SlotTable};

struct Inner {
    slot_table: SlotTable,
    pending: Option<SlotTable>,
    slot_states: HashMap<SlotId, Arc<SlotState>>,
}

pub struct SlotManager {
    node_id: String,
    inner: RwLock<Inner>,
    live_sessions: RwLock<HashSet<String>>,
    /// Wakes the watchdog when a fresh slot table is pending and should be
    /// applied before the next tick.
    pub wake: Notify,
    /// Wakes the meta-tier poll loop for an out-of-band `fetch_slot_table`,
    /// raised when an incoming RPC observes an epoch ahead of ours.
    pub meta_refresh: Notify,
}

impl SlotManager {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            inner: RwLock::new(Inner {
                slot_table: SlotTable::default(),
                pending: None,
                slot_states: HashMap::new(),
            }),
            live_sessions: RwLock::new(HashSet::new()),
            wake: Notify::new(),
            meta_refresh: Notify::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Accepts only strictly newer epochs; stores the table in a
    /// pending slot and wakes the watchdog, which applies the structural
    /// diff on its next iteration.
    pub fn update_slot_table(&self, new_table: SlotTable) -> bool {
        {
            let mut inner = self.inner.write();
            if new_table.epoch <= inner.slot_table.epoch {
                return false;
            }
            inner.pending = Some(new_table);
        }
        self.wake.notify_one();
        true
    }

    /// Apply any pending slot-table update. Called by the watchdog. Adds
    /// and removes `SlotState` entries for slots that became or stopped
    /// being locally relevant; existing slots are updated in place so
    /// in-flight task guards are preserved across epoch bumps that don't
    /// change leadership. Returns whether a table was actually applied.
    pub fn apply_pending(&self) -> bool {
        let mut inner = self.inner.write();
        let Some(new_table) = inner.pending.take() else {
            return false;
        };
        if new_table.epoch <= inner.slot_table.epoch {
            return false;
        }

        let node_id = self.node_id.clone();
        let mut new_states = HashMap::with_capacity(inner.slot_states.len());

        for assignment in &new_table.slots {
            let relevant =
                assignment.leader == node_id || assignment.followers.iter().any(|f| f == &node_id);
            if !relevant {
                continue;
            }

            let state = match inner.slot_states.remove(&assignment.id) {
                Some(existing) => {
                    existing.update_assignment(assignment.clone());
                    existing
                }
                None => Arc::new(SlotState::new(assignment.clone())),
            };
            new_states.insert(assignment.id, state);
        }

        info!(
            epoch = new_table.epoch,
            local_slots = new_states.len(),
            "applied slot table update"
        );

        inner.slot_states = new_states;
        inner.slot_table = new_table;
        true
    }

    /// Clone of the currently-applied slot table, for the post-mortem
    /// recorder and meta-tier debug endpoints.
    pub fn slot_table_snapshot(&self) -> SlotTable {
        self.inner.read().slot_table.clone()
    }

    /// Called on every incoming data RPC. Returns the access decision and,
    /// as a side effect, wakes the meta-tier poll loop for an out-of-band
    /// `fetch_slot_table` if the caller's epoch is ahead of ours.
    pub fn check_slot_access(
        &self,
        slot_id: SlotId,
        src_slot_epoch: u64,
        src_leader_epoch: u64,
    ) -> SlotAccess {
        let inner = self.inner.read();

        if src_slot_epoch > inner.slot_table.epoch {
            self.meta_refresh.notify_one();
            return SlotAccess::MisMatch;
        }

        match inner.slot_states.get(&slot_id) {
            None => SlotAccess::Moved,
            Some(state) => {
                if state.role(&self.node_id) != Some(Role::Leader) {
                    return SlotAccess::Moved;
                }
                if state.leader_epoch() != src_leader_epoch {
                    return SlotAccess::MisMatch;
                }
                if !state.migrated() {
                    return SlotAccess::Migrating;
                }
                SlotAccess::Accept
            }
        }
    }

    pub fn get_slot(&self, slot_id: SlotId) -> Option<SlotAssignment> {
        self.inner
            .read()
            .slot_states
            .get(&slot_id)
            .map(|s| s.assignment())
    }

    pub fn is_leader(&self, slot_id: SlotId) -> bool {
        self.inner
            .read()
            .slot_states
            .get(&slot_id)
            .map(|s| s.role(&self.node_id) == Some(Role::Leader))
            .unwrap_or(false)
    }

    pub fn is_follower(&self, slot_id: SlotId) -> bool {
        self.inner
            .read()
            .slot_states
            .get(&slot_id)
            .map(|s| s.role(&self.node_id) == Some(Role::Follower))
            .unwrap_or(false)
    }

    pub fn slot_table_epoch(&self) -> u64 {
        self.inner.read().slot_table.epoch
    }

    /// Snapshot of locally relevant slot states, for the watchdog to drive.
    pub fn slot_states_snapshot(&self) -> Vec<Arc<SlotState>> {
        self.inner.read().slot_states.values().cloned().collect()
    }

    pub fn set_live_sessions(&self, sessions: HashSet<String>) {
        *self.live_sessions.write() = sessions;
    }

    pub fn live_sessions(&self) -> Vec<String> {
        self.live_sessions.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(epoch: u64, leader: &str) -> SlotTable {
        SlotTable::new(
            epoch,
            vec![SlotAssignment {
                id: 17,
                leader: leader.into(),
                followers: vec!["s2".into()],
                leader_epoch: epoch,
            }],
        )
    }

    #[test]
    fn stale_epoch_is_rejected_and_leaves_no_trace() {
        let manager = SlotManager::new("n1");
        assert!(manager.update_slot_table(table(10, "n1")));
        manager.apply_pending();

        assert!(!manager.update_slot_table(table(8, "other")));
        manager.apply_pending();
        assert_eq!(manager.slot_table_epoch(), 10);
        assert!(manager.is_leader(17));

        assert!(manager.update_slot_table(table(12, "n1")));
        manager.apply_pending();
        assert_eq!(manager.slot_table_epoch(), 12);
    }

    #[test]
    fn not_locally_relevant_slots_are_dropped() {
        let manager = SlotManager::new("n1");
        manager.update_slot_table(table(1, "n1"));
        manager.apply_pending();
        assert!(manager.get_slot(17).is_some());

        manager.update_slot_table(table(2, "someone-else"));
        manager.apply_pending();
        assert!(manager.get_slot(17).is_none());
    }

    #[test]
    fn check_slot_access_progresses_through_states() {
        let manager = SlotManager::new("n1");
        manager.update_slot_table(table(1, "n1"));
        manager.apply_pending();

        assert_eq!(
            manager.check_slot_access(17, 1, 1),
            SlotAccess::Migrating
        );

        let state = manager
            .inner
            .read()
            .slot_states
            .get(&17)
            .unwrap()
            .clone();
        state.finish_migration();

        assert_eq!(manager.check_slot_access(17, 1, 1), SlotAccess::Accept);
        assert_eq!(manager.check_slot_access(17, 1, 2), SlotAccess::MisMatch);
        assert_eq!(manager.check_slot_access(99, 1, 1), SlotAccess::Moved);
    }

    #[test]
    fn check_slot_access_monotone_once_accepted() {
        // Once Accept at a given (slot, leader_epoch), it cannot later
        // return Migrating at the same epoch.
        let manager = SlotManager::new("n1");
        manager.update_slot_table(table(1, "n1"));
        manager.apply_pending();
        let state = manager.inner.read().slot_states.get(&17).unwrap().clone();
        state.finish_migration();

        assert_eq!(manager.check_slot_access(17, 1, 1), SlotAccess::Accept);
        assert_eq!(manager.check_slot_access(17, 1, 1), SlotAccess::Accept);
    }

    #[tokio::test]
    async fn stale_local_epoch_wakes_meta_refresh_not_watchdog() {
        let manager = SlotManager::new("n1");
        manager.update_slot_table(table(1, "n1"));
        manager.apply_pending();

        assert_eq!(manager.check_slot_access(17, 5, 1), SlotAccess::MisMatch);

        // The out-of-band signal lands on `meta_refresh`, which the
        // meta-tier poll loop listens on, not `wake`, which only the slot
        // watchdog's apply-pending loop consumes.
        tokio::time::timeout(std::time::Duration::from_millis(50), manager.meta_refresh.notified())
            .await
            .expect("meta_refresh should have been notified");
    }
}
