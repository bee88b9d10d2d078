//! External collaborator traits: the meta tier and the session→data
//! sync-publisher RPC. Both are out of this crate's scope to implement for
//! real; a production binary substitutes a transport that actually talks
//! to the meta server / data leader. The in-memory stand-ins here let the
//! stores and slot manager be exercised end-to-end in tests.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Error;
use crate::model::{DataInfoId, Publisher};
use crate::slot::SlotTable;

/// Polled by a background task that feeds `SlotManager::update_slot_table`
/// and `SlotManager::set_live_sessions`.
#[async_trait]
pub trait MetaClient: Send + Sync {
    async fn fetch_slot_table(&self) -> Result<SlotTable, Error>;

    /// Session node ids currently heartbeating against this data node.
    /// Drives the "for each live session" loop in the leader's migration
    /// and steady-state sync.
    async fn fetch_live_sessions(&self) -> Result<HashSet<String>, Error>;
}

/// Fired by the session store whenever a publisher is added or removed, so
/// the data-tier leader learns about it. Out of the core's component
/// budget but wired up here so the registration stores are exercised
/// end-to-end.
#[async_trait]
pub trait SyncPublisherTransport: Send + Sync {
    async fn sync_publisher(&self, data_info_id: &DataInfoId, publisher: &Publisher) -> Result<(), Error>;
}

/// Returns the slot table handed to it at construction time, unchanged.
/// Useful for tests that want deterministic, scripted slot-table
/// dissemination rather than a real meta-server poll.
pub struct StaticMetaClient {
    table: parking_lot::Mutex<SlotTable>,
    live_sessions: parking_lot::Mutex<HashSet<String>>,
}

impl StaticMetaClient {
    pub fn new(table: SlotTable) -> Self {
        Self {
            table: parking_lot::Mutex::new(table),
            live_sessions: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    pub fn set(&self, table: SlotTable) {
        *self.table.lock() = table;
    }

    pub fn set_live_sessions(&self, sessions: HashSet<String>) {
        *self.live_sessions.lock() = sessions;
    }
}

#[async_trait]
impl MetaClient for StaticMetaClient {
    async fn fetch_slot_table(&self) -> Result<SlotTable, Error> {
        Ok(self.table.lock().clone())
    }

    async fn fetch_live_sessions(&self) -> Result<HashSet<String>, Error> {
        Ok(self.live_sessions.lock().clone())
    }
}

/// Always succeeds without doing anything. Used where a publisher-sync
/// call is required by a signature but not under test.
#[derive(Debug, Default)]
pub struct NoopSyncPublisherTransport;

#[async_trait]
impl SyncPublisherTransport for NoopSyncPublisherTransport {
    async fn sync_publisher(&self, _data_info_id: &DataInfoId, _publisher: &Publisher) -> Result<(), Error> {
        Ok(())
    }
}
