//! Post-mortem recorder: appends each accepted slot table to a rotating
//! newline-delimited JSON file. Disabled unless a `SlotManager` is built
//! with one configured; registrations are never written here, only the
//! (much smaller, much less sensitive) slot table.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::error::Error;
use super::table::SlotTable;

#[derive(Debug, Clone)]
pub struct DiskSlotTableRecorderConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
}

impl Default for DiskSlotTableRecorderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("slot_table.jsonl"),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Writes one JSON line per accepted slot table. Rotates the file to
/// `<path>.1` (clobbering any previous backup) once it crosses
/// `max_bytes`, mirroring a single-generation logrotate policy.
pub struct DiskSlotTableRecorder {
    config: DiskSlotTableRecorderConfig,
    // Serializes rotate-then-append so concurrent `record` calls can never
    // interleave their writes or race the rotation check.
    lock: Mutex<()>,
}

impl DiskSlotTableRecorder {
    pub fn new(config: DiskSlotTableRecorderConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub async fn record(&self, table: &SlotTable) -> Result<(), Error> {
        let mut line = serde_json::to_string(table)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        self.rotate_if_needed().await?;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.config.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn rotate_if_needed(&self) -> Result<(), Error> {
        let len = match fs::metadata(&self.config.path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        if len < self.config.max_bytes {
            return Ok(());
        }

        let backup = backup_path(&self.config.path);
        fs::rename(&self.config.path, backup).await?;
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}
