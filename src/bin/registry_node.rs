use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::{select, signal::ctrl_c, time::interval};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use registry_core::cli::Cli;
use registry_core::config::{self, Config};
use registry_core::push::{NoopPushTransport, PushProcessor, PushProcessorConfig, PushWatchdog, PushWatchdogConfig};
use registry_core::rpc::{MetaClient, StaticMetaClient};
use registry_core::sighup::Sighup;
use registry_core::slot::{DiskSlotTableRecorder, DiskSlotTableRecorderConfig};
use registry_core::slot::{NoopSyncer, SlotManager, SlotWatchdog, SlotWatchdogConfig};
use registry_core::slot::{SlotAssignment, SlotTable};

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn reload_loop(config_path: std::path::PathBuf) {
    let Ok(mut sighup) = Sighup::new() else {
        warn!("failed to install SIGHUP handler, config reload disabled");
        return;
    };

    loop {
        sighup.listen().await;
        match Config::load(&config_path) {
            Ok(new_config) => {
                info!(path = %config_path.display(), "reloaded configuration");
                config::set_config(new_config);
            }
            Err(err) => {
                error!(path = %config_path.display(), %err, "failed to reload configuration, keeping current");
            }
        }
    }
}

async fn meta_poll_loop(manager: Arc<SlotManager>, meta: Arc<dyn MetaClient>, tick: Duration) {
    let mut ticker = interval(tick);
    loop {
        select! {
            _ = ticker.tick() => {},
            _ = manager.meta_refresh.notified() => {},
        }

        match meta.fetch_slot_table().await {
            Ok(table) => {
                manager.update_slot_table(table);
            }
            Err(err) => {
                warn!(%err, "failed to fetch slot table from meta tier");
            }
        }

        match meta.fetch_live_sessions().await {
            Ok(sessions) => manager.set_live_sessions(sessions),
            Err(err) => {
                warn!(%err, "failed to fetch live sessions from meta tier");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let loaded = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %cli.config.display(), %err, "failed to load configuration file, using defaults");
            Config::default()
        }
    };
    config::set_config(loaded);
    let cfg = config::config();

    info!(node_id = %cli.node_id, "starting registry node");

    let slot_manager = Arc::new(SlotManager::new(cli.node_id.clone()));

    let slot_table_recorder = cfg.slot_table_record_path.as_ref().map(|path| {
        Arc::new(DiskSlotTableRecorder::new(DiskSlotTableRecorderConfig {
            path: path.into(),
            max_bytes: cfg.slot_table_record_max_bytes,
        }))
    });

    let slot_watchdog = SlotWatchdog::with_recorder(
        slot_manager.clone(),
        Arc::new(NoopSyncer),
        Arc::new(registry_core::slot::DatumStore::new()),
        SlotWatchdogConfig {
            tick: cfg.slot_watchdog_tick(),
            leader_sync_session_interval: cfg.slot_leader_sync_session_interval(),
            follower_sync_leader_interval: cfg.slot_follower_sync_leader_interval(),
            sync_leader_slow_warn: cfg.sync_leader_slow_warn(),
            executor_queue_size: cfg.executor_queue_size,
            migrate_session_workers: cfg.migrate_session_workers,
            sync_session_workers: cfg.sync_session_workers,
            sync_leader_workers: cfg.sync_leader_workers,
        },
        slot_table_recorder,
    );
    slot_watchdog.run();

    let push_processor = PushProcessor::new(
        Arc::new(NoopPushTransport),
        PushProcessorConfig {
            retry_max: cfg.push_retry_max,
            retry_expire_ms: cfg.push_retry_expire_ms as i64,
        },
    );
    push_processor.set_stop_push_switch(cfg.stop_push_switch);

    let push_watchdog = PushWatchdog::new(
        push_processor.clone(),
        PushWatchdogConfig {
            tick: cfg.push_watchdog_tick(),
            executor_shards: cfg.sync_session_workers,
            executor_queue_size: cfg.executor_queue_size,
        },
    );
    push_watchdog.run();

    let meta: Arc<dyn MetaClient> = Arc::new(StaticMetaClient::new(SlotTable::new(
        0,
        Vec::<SlotAssignment>::new(),
    )));

    select! {
        _ = meta_poll_loop(slot_manager.clone(), meta, cfg.slot_watchdog_tick()) => {},
        _ = reload_loop(cli.config.clone()) => {},
        _ = ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
}
