//! Local, per-slot worker state. Owned exclusively by the slot manager;
//! mutable fields are touched only from the watchdog task and published to
//! RPC handlers via atomics.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use dashmap::DashSet;
use parking_lot::RwLock;

use super::table::{SlotAssignment, SlotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

#[derive(Debug)]
pub struct SlotState {
    pub slot_id: SlotId,
    assignment: RwLock<SlotAssignment>,
    migrated: AtomicBool,
    migrating_start_time_ms: AtomicI64,
    last_success_leader_sync_time_ms: AtomicI64,
    /// Sessions that have completed a migrating sync for the current
    /// leader epoch. Cleared whenever `leader_epoch` changes.
    migrating_sessions_done: DashSet<String>,
    /// Guards against overlapping sync-leader tasks for this slot -- both
    /// this node's own follower-side sync from its leader, and (from the
    /// leader side, after a role flip) against starting a migration sync
    /// while a stale sync-leader task from the prior follower role is
    /// still draining. One flag, shared by both roles, so a leader never
    /// starts sync-session work concurrently with a leftover sync-leader
    /// task.
    sync_leader_in_flight: AtomicBool,
    /// Last time (ms) a steady-state leader->session sync ran, used to
    /// throttle to `slot_leader_sync_session_interval`.
    last_steady_sync_ms: AtomicI64,
}

impl SlotState {
    pub fn new(assignment: SlotAssignment) -> Self {
        Self {
            slot_id: assignment.id,
            assignment: RwLock::new(assignment),
            migrated: AtomicBool::new(false),
            migrating_start_time_ms: AtomicI64::new(0),
            last_success_leader_sync_time_ms: AtomicI64::new(0),
            migrating_sessions_done: DashSet::new(),
            sync_leader_in_flight: AtomicBool::new(false),
            last_steady_sync_ms: AtomicI64::new(0),
        }
    }

    /// Throttle steady-state leader->session syncs to roughly once per
    /// `interval`. Not a precise scheduler: a watchdog tick that arrives a
    /// little early simply skips this slot.
    pub fn due_for_steady_sync(&self, interval_ms: i64, now_ms: i64) -> bool {
        now_ms - self.last_steady_sync_ms.load(Ordering::Acquire) >= interval_ms
    }

    pub fn mark_steady_sync(&self, now_ms: i64) {
        self.last_steady_sync_ms.store(now_ms, Ordering::Release);
    }

    pub fn assignment(&self) -> SlotAssignment {
        self.assignment.read().clone()
    }

    pub fn leader_epoch(&self) -> u64 {
        self.assignment.read().leader_epoch
    }

    pub fn role(&self, node_id: &str) -> Option<Role> {
        let assignment = self.assignment.read();
        if assignment.leader == node_id {
            Some(Role::Leader)
        } else if assignment.followers.iter().any(|f| f == node_id) {
            Some(Role::Follower)
        } else {
            None
        }
    }

    /// Replace the assignment. If the leader epoch advanced, resets
    /// migration progress -- a new migration begins.
    pub fn update_assignment(&self, new: SlotAssignment) {
        let mut assignment = self.assignment.write();
        if new.leader_epoch != assignment.leader_epoch {
            self.migrated.store(false, Ordering::SeqCst);
            self.migrating_sessions_done.clear();
            self.migrating_start_time_ms.store(0, Ordering::SeqCst);
        }
        *assignment = new;
    }

    pub fn migrated(&self) -> bool {
        self.migrated.load(Ordering::Acquire)
    }

    pub fn mark_migration_started(&self, now_ms: i64) {
        self.migrating_start_time_ms
            .compare_exchange(0, now_ms, Ordering::SeqCst, Ordering::SeqCst)
            .ok();
    }

    pub fn migrating_start_time_ms(&self) -> i64 {
        self.migrating_start_time_ms.load(Ordering::Acquire)
    }

    /// Record a successful migrating sync from `session`. Returns true if
    /// this session had not previously been recorded for this epoch.
    pub fn record_migrating_session_done(&self, session: &str) -> bool {
        self.migrating_sessions_done.insert(session.to_string())
    }

    pub fn migrating_sessions_done_count(&self) -> usize {
        self.migrating_sessions_done.len()
    }

    pub fn has_migrating_session_done(&self, session: &str) -> bool {
        self.migrating_sessions_done.contains(session)
    }

    /// Complete migration: all currently-live sessions have synced.
    pub fn finish_migration(&self) {
        self.migrated.store(true, Ordering::SeqCst);
        self.migrating_sessions_done.clear();
        self.migrating_start_time_ms.store(0, Ordering::SeqCst);
    }

    pub fn try_begin_sync_leader(&self) -> bool {
        self.sync_leader_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_sync_leader(&self) {
        self.sync_leader_in_flight.store(false, Ordering::SeqCst);
    }

    pub fn sync_leader_in_flight(&self) -> bool {
        self.sync_leader_in_flight.load(Ordering::Acquire)
    }

    /// Same guard as `try_begin_sync_leader`: a follower's sync-from-leader
    /// task and a leader's post-role-flip migration check must serialize on
    /// one flag, or a follower that has just become leader could start
    /// migration sync-session work while its own prior sync-leader task is
    /// still running.
    pub fn try_begin_follower_sync(&self) -> bool {
        self.try_begin_sync_leader()
    }

    pub fn end_follower_sync(&self, now_ms: i64) {
        self.last_success_leader_sync_time_ms.store(now_ms, Ordering::SeqCst);
        self.end_sync_leader();
    }

    pub fn abort_follower_sync(&self) {
        self.end_sync_leader();
    }

    pub fn last_success_leader_sync_time_ms(&self) -> i64 {
        self.last_success_leader_sync_time_ms.load(Ordering::Acquire)
    }
}
