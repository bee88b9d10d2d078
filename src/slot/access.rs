//! Result of an incoming data-tier RPC's access check.

/// Outcome of `SlotManager::check_slot_access`. Not an error type: each
/// variant is a normal, expected outcome the caller reacts to (accept the
/// RPC, redirect, back off, or refresh the slot table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAccess {
    /// Caller may proceed: this node is the current leader, the slot has
    /// finished migrating, and the leader epoch matches.
    Accept,
    /// This node is not (or no longer) responsible for the slot; the
    /// caller should refresh its slot table and redirect.
    Moved,
    /// This node is becoming the leader but migration has not completed.
    Migrating,
    /// The caller's leader epoch does not match ours, even though we are
    /// the leader (a concurrent leadership change). The caller should
    /// refresh its slot table.
    MisMatch,
}

impl SlotAccess {
    pub fn is_accept(&self) -> bool {
        matches!(self, SlotAccess::Accept)
    }
}
