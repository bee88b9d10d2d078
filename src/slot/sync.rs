//! Sync primitives: the diff-pull RPCs a leader issues to sessions and a
//! follower issues to its leader. The actual wire transport is an external
//! collaborator; this module only defines the trait boundary and the
//! cooperative-cancellation predicate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{DataInfoId, Datum};

use super::error::Error;
use super::table::SlotId;

/// Checked between pages of a diff pull and on every peer round-trip. If it
/// returns false (e.g. this node's role changed mid-sync), the task aborts
/// cleanly without merging a partial result; the next watchdog tick will
/// reconcile.
pub type SyncContinues = Arc<dyn Fn() -> bool + Send + Sync>;

pub fn always_continue() -> SyncContinues {
    Arc::new(|| true)
}

/// Result of a single diff pull.
#[derive(Debug, Clone, Default)]
pub struct SyncDiff {
    pub added: Vec<Datum>,
    pub removed: Vec<DataInfoId>,
}

/// A peer to sync a slot's data against: either a session (leader→session
/// migrating/steady-state sync) or the leader itself (follower sync).
#[async_trait]
pub trait SlotDiffSyncer: Send + Sync {
    async fn sync_session(
        &self,
        slot_id: SlotId,
        session_addr: &str,
        known_versions: &HashMap<DataInfoId, i64>,
        continues: SyncContinues,
    ) -> Result<SyncDiff, Error>;

    async fn sync_leader(
        &self,
        slot_id: SlotId,
        known_versions: &HashMap<DataInfoId, i64>,
        continues: SyncContinues,
    ) -> Result<SyncDiff, Error>;
}

/// In-memory syncer used by tests and the example binary: always succeeds
/// with an empty diff.
#[derive(Debug, Default)]
pub struct NoopSyncer;

#[async_trait]
impl SlotDiffSyncer for NoopSyncer {
    async fn sync_session(
        &self,
        _slot_id: SlotId,
        _session_addr: &str,
        _known_versions: &HashMap<DataInfoId, i64>,
        _continues: SyncContinues,
    ) -> Result<SyncDiff, Error> {
        Ok(SyncDiff::default())
    }

    async fn sync_leader(
        &self,
        _slot_id: SlotId,
        _known_versions: &HashMap<DataInfoId, i64>,
        _continues: SyncContinues,
    ) -> Result<SyncDiff, Error> {
        Ok(SyncDiff::default())
    }
}
