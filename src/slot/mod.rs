//! Data-tier slot manager: local slot-table view, per-slot state machine,
//! and the migration/steady-state sync watchdog.

pub mod access;
pub mod datum_store;
pub mod error;
pub mod manager;
pub mod recorder;
pub mod state;
pub mod sync;
pub mod table;
pub mod watchdog;

pub use access::SlotAccess;
pub use datum_store::DatumStore;
pub use error::Error;
pub use manager::SlotManager;
pub use recorder::{DiskSlotTableRecorder, DiskSlotTableRecorderConfig};
pub use state::{Role, SlotState};
pub use sync::{always_continue, NoopSyncer, SlotDiffSyncer, SyncContinues, SyncDiff};
pub use table::{slot_of, SlotAssignment, SlotId, SlotTable};
pub use watchdog::{SlotWatchdog, SlotWatchdogConfig};
