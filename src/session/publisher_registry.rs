//! Thin wrapper around `SessionDataStore` that additionally notifies the
//! data tier whenever a publisher is added or removed, via
//! `SyncPublisherTransport`. Kept separate from the generic
//! `RegistrationStore` so that store stays free of any transport
//! dependency and is reusable for subscribers/watchers, which don't need
//! this notification.

use std::sync::Arc;

use crate::model::{ConnectId, DataInfoId, Publisher, Registration};
use crate::rpc::SyncPublisherTransport;

use super::store::RegistrationStore;

pub struct PublisherRegistry {
    store: RegistrationStore<Publisher>,
    transport: Arc<dyn SyncPublisherTransport>,
}

impl PublisherRegistry {
    pub fn new(transport: Arc<dyn SyncPublisherTransport>) -> Self {
        Self {
            store: RegistrationStore::new(),
            transport,
        }
    }

    /// Add the publisher locally, then notify the data tier. The transport
    /// call failing does not undo the local add -- the sync is retried by
    /// the caller's own retry policy (it is a fire-and-forget ack, not a
    /// two-phase commit), matching the "at-least-once" delivery model.
    pub async fn add(&self, publisher: Publisher) -> bool {
        let data_info_id = publisher.data_info_id().clone();
        let changed = self.store.add(publisher.clone());

        if changed {
            if let Err(err) = self.transport.sync_publisher(&data_info_id, &publisher).await {
                tracing::warn!(%data_info_id, %err, "sync-publisher notification failed");
            }
        }

        changed
    }

    pub fn delete_by_id(&self, register_id: &str, data_info_id: &DataInfoId) -> bool {
        self.store.delete_by_id(register_id, data_info_id)
    }

    pub fn delete_by_connect_id(&self, connect_id: &ConnectId) {
        self.store.delete_by_connect_id(connect_id)
    }

    pub fn get_datas(&self, data_info_id: &DataInfoId) -> Vec<Arc<Publisher>> {
        self.store.get_datas(data_info_id)
    }

    pub fn query_by_connect_id(&self, connect_id: &ConnectId) -> std::collections::HashMap<String, Arc<Publisher>> {
        self.store.query_by_connect_id(connect_id)
    }
}
