//! Background loop driving slot migration and steady-state sync: a
//! `tokio::time::interval` raced against a wakeable `Notify` in a
//! `select!`.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::{select, spawn, time::interval};
use tracing::{debug, info, warn};

use crate::executor::KeyedExecutor;

use super::datum_store::DatumStore;
use super::manager::SlotManager;
use super::recorder::DiskSlotTableRecorder;
use super::state::{Role, SlotState};
use super::sync::{SlotDiffSyncer, SyncContinues};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct SlotWatchdogConfig {
    pub tick: Duration,
    pub leader_sync_session_interval: Duration,
    pub follower_sync_leader_interval: Duration,
    pub sync_leader_slow_warn: Duration,
    pub executor_queue_size: usize,
    pub migrate_session_workers: usize,
    pub sync_session_workers: usize,
    pub sync_leader_workers: usize,
}

pub struct SlotWatchdog {
    manager: Arc<SlotManager>,
    syncer: Arc<dyn SlotDiffSyncer>,
    datum_store: Arc<DatumStore>,
    config: SlotWatchdogConfig,
    migrate_executor: KeyedExecutor,
    sync_session_executor: KeyedExecutor,
    sync_leader_executor: KeyedExecutor,
    recorder: Option<Arc<DiskSlotTableRecorder>>,
}

impl SlotWatchdog {
    pub fn new(
        manager: Arc<SlotManager>,
        syncer: Arc<dyn SlotDiffSyncer>,
        datum_store: Arc<DatumStore>,
        config: SlotWatchdogConfig,
    ) -> Arc<Self> {
        Self::with_recorder(manager, syncer, datum_store, config, None)
    }

    /// Like [`SlotWatchdog::new`], additionally recording every accepted
    /// slot table to disk via `recorder`.
    pub fn with_recorder(
        manager: Arc<SlotManager>,
        syncer: Arc<dyn SlotDiffSyncer>,
        datum_store: Arc<DatumStore>,
        config: SlotWatchdogConfig,
        recorder: Option<Arc<DiskSlotTableRecorder>>,
    ) -> Arc<Self> {
        let migrate_executor = KeyedExecutor::new(config.migrate_session_workers, config.executor_queue_size);
        let sync_session_executor = KeyedExecutor::new(config.sync_session_workers, config.executor_queue_size);
        let sync_leader_executor = KeyedExecutor::new(config.sync_leader_workers, config.executor_queue_size);

        Arc::new(Self {
            manager,
            syncer,
            datum_store,
            config,
            migrate_executor,
            sync_session_executor,
            sync_leader_executor,
            recorder,
        })
    }

    /// Spawn the watchdog task. Returns immediately; the task runs until
    /// the process exits (no graceful shutdown is modeled here, matching
    /// the core's scope).
    pub fn run(self: &Arc<Self>) {
        let watchdog = self.clone();
        spawn(async move { watchdog.loop_forever().await });
    }

    async fn loop_forever(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick);

        loop {
            select! {
                _ = ticker.tick() => {},
                _ = self.manager.wake.notified() => {},
            }

            if self.manager.apply_pending() {
                self.record_slot_table().await;
            }

            for state in self.manager.slot_states_snapshot() {
                match state.role(self.manager.node_id()) {
                    Some(Role::Leader) => self.drive_leader(state),
                    Some(Role::Follower) => self.drive_follower(state),
                    None => {}
                }
            }
        }
    }

    async fn record_slot_table(self: &Arc<Self>) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let table = self.manager.slot_table_snapshot();
        if let Err(err) = recorder.record(&table).await {
            warn!(%err, "failed to record accepted slot table to disk");
        }
    }

    fn drive_leader(self: &Arc<Self>, state: Arc<SlotState>) {
        // Sync-leader and sync-session must not overlap: the datum merge
        // must observe a quiescent state when migration finishes.
        if state.sync_leader_in_flight() {
            return;
        }

        if !state.migrated() {
            self.drive_migration(state);
        } else {
            self.drive_steady_state(state);
        }
    }

    fn drive_migration(self: &Arc<Self>, state: Arc<SlotState>) {
        state.mark_migration_started(now_ms());
        let sessions = self.manager.live_sessions();

        // Vacuously true for zero live sessions: migration completes
        // immediately rather than waiting on a set with nothing to sync.
        let mut all_done = true;
        for session in sessions {
            if state.has_migrating_session_done(&session) {
                continue;
            }
            all_done = false;
            self.submit_migrating_sync(state.clone(), session);
        }

        if all_done {
            let slot_id = state.slot_id;
            state.finish_migration();
            self.datum_store.bump_versions_for_slot(slot_id);
            info!(slot_id, "migration complete, all live sessions synced");
        }
    }

    fn submit_migrating_sync(self: &Arc<Self>, state: Arc<SlotState>, session: String) {
        let watchdog = self.clone();
        let key = (state.slot_id, session.clone());
        let continues = leader_continues(&state, self.manager.node_id().to_string());

        let accepted = self.migrate_executor.submit(
            &key,
            Box::pin(async move {
                let known = watchdog.datum_store.known_versions_for_slot(state.slot_id);
                match watchdog
                    .syncer
                    .sync_session(state.slot_id, &session, &known, continues)
                    .await
                {
                    Ok(diff) => {
                        watchdog.datum_store.apply_diff(diff);
                        if state.record_migrating_session_done(&session) {
                            debug!(slot_id = state.slot_id, %session, "migrating sync succeeded");
                        }
                    }
                    Err(err) => {
                        warn!(slot_id = state.slot_id, %session, %err, "migrating sync failed, retrying next tick");
                    }
                }
            }),
        );

        if !accepted {
            debug!(slot_id = state.slot_id, %session, "migrate-session executor backpressure, will retry next tick");
        }
    }

    fn drive_steady_state(self: &Arc<Self>, state: Arc<SlotState>) {
        let interval_ms = self.config.leader_sync_session_interval.as_millis() as i64;
        if !state.due_for_steady_sync(interval_ms, now_ms()) {
            return;
        }
        state.mark_steady_sync(now_ms());

        for session in self.manager.live_sessions() {
            let watchdog = self.clone();
            let state = state.clone();
            let key = (state.slot_id, session.clone());
            let continues = leader_continues(&state, self.manager.node_id().to_string());

            let accepted = self.sync_session_executor.submit(
                &key,
                Box::pin(async move {
                    let known = watchdog.datum_store.known_versions_for_slot(state.slot_id);
                    match watchdog
                        .syncer
                        .sync_session(state.slot_id, &session, &known, continues)
                        .await
                    {
                        Ok(diff) => watchdog.datum_store.apply_diff(diff),
                        Err(err) => {
                            warn!(slot_id = state.slot_id, %session, %err, "steady-state sync-session failed");
                        }
                    }
                }),
            );

            if !accepted {
                debug!(slot_id = state.slot_id, %session, "sync-session executor backpressure, skipping this tick");
            }
        }
    }

    fn drive_follower(self: &Arc<Self>, state: Arc<SlotState>) {
        if !state.try_begin_follower_sync() {
            return;
        }

        let watchdog = self.clone();
        let started = Instant::now();
        let slow_warn = self.config.sync_leader_slow_warn;
        let continues = follower_continues(&state, self.manager.node_id().to_string());

        let accepted = self.sync_leader_executor.submit(
            &state.slot_id,
            Box::pin(async move {
                let known = watchdog.datum_store.known_versions_for_slot(state.slot_id);
                let result = watchdog
                    .syncer
                    .sync_leader(state.slot_id, &known, continues)
                    .await;

                let elapsed = started.elapsed();
                if elapsed > slow_warn {
                    warn!(
                        slot_id = state.slot_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "sync-leader task exceeded slow-task threshold"
                    );
                }

                match result {
                    Ok(diff) => {
                        watchdog.datum_store.apply_diff(diff);
                        state.end_follower_sync(now_ms());
                    }
                    Err(err) => {
                        warn!(slot_id = state.slot_id, %err, "sync-leader failed");
                        state.abort_follower_sync();
                    }
                }
            }),
        );

        if !accepted {
            state.abort_follower_sync();
            debug!(slot_id = state.slot_id, "sync-leader executor backpressure, skipping this tick");
        }
    }
}

fn leader_continues(state: &Arc<SlotState>, node_id: String) -> SyncContinues {
    let state = state.clone();
    let expected_epoch = state.leader_epoch();
    Arc::new(move || {
        state.role(&node_id) == Some(Role::Leader) && state.leader_epoch() == expected_epoch
    })
}

fn follower_continues(state: &Arc<SlotState>, node_id: String) -> SyncContinues {
    let state = state.clone();
    Arc::new(move || state.role(&node_id) == Some(Role::Follower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::sync::NoopSyncer;
    use crate::slot::table::{SlotAssignment, SlotTable};
    use std::collections::HashSet;

    fn config() -> SlotWatchdogConfig {
        SlotWatchdogConfig {
            tick: Duration::from_millis(20),
            leader_sync_session_interval: Duration::from_secs(3),
            follower_sync_leader_interval: Duration::from_secs(1),
            sync_leader_slow_warn: Duration::from_secs(5),
            executor_queue_size: 64,
            migrate_session_workers: 2,
            sync_session_workers: 2,
            sync_leader_workers: 2,
        }
    }

    #[tokio::test]
    async fn migration_completes_once_all_sessions_synced() {
        let manager = Arc::new(SlotManager::new("n1"));
        manager.set_live_sessions(HashSet::from(["s1".to_string(), "s2".to_string()]));
        manager.update_slot_table(SlotTable::new(
            1,
            vec![SlotAssignment {
                id: 17,
                leader: "n1".into(),
                followers: vec![],
                leader_epoch: 1,
            }],
        ));
        manager.apply_pending();

        let datum_store = Arc::new(DatumStore::new());
        let watchdog = SlotWatchdog::new(manager.clone(), Arc::new(NoopSyncer), datum_store, config());
        watchdog.run();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = manager
            .slot_states_snapshot()
            .into_iter()
            .find(|s| s.slot_id == 17)
            .unwrap();
        assert!(state.migrated());
    }

    #[tokio::test]
    async fn migration_completes_with_no_live_sessions() {
        let manager = Arc::new(SlotManager::new("n1"));
        manager.update_slot_table(SlotTable::new(
            1,
            vec![SlotAssignment {
                id: 17,
                leader: "n1".into(),
                followers: vec![],
                leader_epoch: 1,
            }],
        ));
        manager.apply_pending();

        let datum_store = Arc::new(DatumStore::new());
        let watchdog = SlotWatchdog::new(manager.clone(), Arc::new(NoopSyncer), datum_store, config());
        watchdog.run();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = manager
            .slot_states_snapshot()
            .into_iter()
            .find(|s| s.slot_id == 17)
            .unwrap();
        assert!(state.migrated());
    }

    #[tokio::test]
    async fn follower_sync_guard_blocks_migration_until_released() {
        // Regression test: drive_follower and drive_leader must serialize
        // on the same in-flight guard so a node that flips from follower
        // to leader mid-sync cannot start a migration sync-session
        // concurrently with its own still-running sync-leader task.
        let manager = Arc::new(SlotManager::new("n1"));
        manager.update_slot_table(SlotTable::new(
            1,
            vec![SlotAssignment {
                id: 17,
                leader: "other".into(),
                followers: vec!["n1".into()],
                leader_epoch: 1,
            }],
        ));
        manager.apply_pending();

        let state = manager
            .slot_states_snapshot()
            .into_iter()
            .find(|s| s.slot_id == 17)
            .unwrap();
        assert!(state.try_begin_follower_sync());

        // Role flips to leader while the follower-side task is still
        // in flight.
        manager.update_slot_table(SlotTable::new(
            2,
            vec![SlotAssignment {
                id: 17,
                leader: "n1".into(),
                followers: vec![],
                leader_epoch: 2,
            }],
        ));
        manager.apply_pending();

        let datum_store = Arc::new(DatumStore::new());
        let watchdog = SlotWatchdog::new(manager.clone(), Arc::new(NoopSyncer), datum_store, config());
        watchdog.run();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!state.migrated(), "migration must not proceed while the guard is held");

        state.abort_follower_sync();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.migrated(), "migration proceeds once the guard is released");
    }
}
