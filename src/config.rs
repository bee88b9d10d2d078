//! Operational configuration, loaded once at startup from a TOML file and
//! reloadable at runtime (see `crate::sighup`): a `serde`-derived tree with
//! field-level defaults, held behind a global `ArcSwap` snapshot.

use std::path::Path;
use std::time::Duration;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Number of slots the `dataInfoId` key space is partitioned into. Fixed
/// for the lifetime of a deployment -- changing it requires a full
/// re-shard, which is outside this crate's scope.
pub const SLOT_COUNT: u32 = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Disables all outbound pushes. Intended as a kill switch during
    /// incident response.
    pub stop_push_switch: bool,

    /// How often a leader re-syncs each live session once migration has
    /// completed.
    pub slot_leader_sync_session_interval_secs: u64,

    /// How often a follower pulls a diff from its leader.
    pub slot_follower_sync_leader_interval_secs: u64,

    /// Watchdog tick for the slot manager.
    pub slot_watchdog_tick_ms: u64,

    /// Watchdog tick for the push processor.
    pub push_watchdog_tick_ms: u64,

    /// Maximum push retries before a task is dropped.
    pub push_retry_max: u32,

    /// Delay before a push task becomes eligible for a retry attempt.
    pub push_retry_expire_ms: u64,

    /// Bounded queue depth per key in the keyed executors.
    pub executor_queue_size: usize,

    /// Worker count for the migrate-session keyed executor.
    pub migrate_session_workers: usize,

    /// Worker count for the sync-session keyed executor.
    pub sync_session_workers: usize,

    /// Worker count for the sync-leader keyed executor.
    pub sync_leader_workers: usize,

    /// Emit a warning if a follower sync task runs longer than this.
    pub sync_leader_slow_warn_ms: u64,

    /// Path to append each accepted slot table to, as newline-delimited
    /// JSON, for post-mortem. `None` disables the recorder entirely.
    pub slot_table_record_path: Option<String>,

    /// Rotate `slot_table_record_path` once it reaches this size.
    pub slot_table_record_max_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stop_push_switch: false,
            slot_leader_sync_session_interval_secs: 3,
            slot_follower_sync_leader_interval_secs: 1,
            slot_watchdog_tick_ms: 200,
            push_watchdog_tick_ms: 100,
            push_retry_max: 3,
            push_retry_expire_ms: 500,
            executor_queue_size: 1024,
            migrate_session_workers: 4,
            sync_session_workers: 8,
            sync_leader_workers: 2,
            sync_leader_slow_warn_ms: 5_000,
            slot_table_record_path: None,
            slot_table_record_max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn slot_leader_sync_session_interval(&self) -> Duration {
        Duration::from_secs(self.slot_leader_sync_session_interval_secs)
    }

    pub fn slot_follower_sync_leader_interval(&self) -> Duration {
        Duration::from_secs(self.slot_follower_sync_leader_interval_secs)
    }

    pub fn slot_watchdog_tick(&self) -> Duration {
        Duration::from_millis(self.slot_watchdog_tick_ms)
    }

    pub fn push_watchdog_tick(&self) -> Duration {
        Duration::from_millis(self.push_watchdog_tick_ms)
    }

    pub fn push_retry_expire(&self) -> Duration {
        Duration::from_millis(self.push_retry_expire_ms)
    }

    pub fn sync_leader_slow_warn(&self) -> Duration {
        Duration::from_millis(self.sync_leader_slow_warn_ms)
    }
}

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Current configuration snapshot. Cheap to call; callers should not hold
/// on to it across a reload boundary if they need to observe changes.
pub fn config() -> std::sync::Arc<Config> {
    CONFIG.load_full()
}

/// Replace the global configuration snapshot, e.g. in response to SIGHUP.
pub fn set_config(new: Config) {
    CONFIG.store(std::sync::Arc::new(new));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let s = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&s).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<Config>("bogus_field = 1").unwrap_err();
        assert!(err.to_string().contains("unknown field") || err.to_string().contains("bogus_field"));
    }

    #[test]
    fn set_config_is_observed_by_config() {
        let mut updated = Config::default();
        updated.stop_push_switch = true;
        set_config(updated);
        assert!(config().stop_push_switch);
        // restore default for other tests running in-process
        set_config(Config::default());
    }
}
