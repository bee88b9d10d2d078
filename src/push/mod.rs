//! Session-tier push processor: dedup/conflict-merge on pending tasks,
//! single-in-flight delivery per client address, and bounded retry.

pub mod error;
pub mod processor;
pub mod task;
pub mod watchdog;

pub use error::Error;
pub use processor::{NoopPushTransport, PushAck, PushPayload, PushProcessor, PushProcessorConfig, PushTransport};
pub use task::{PushTask, TaskKey};
pub use watchdog::{PushWatchdog, PushWatchdogConfig};
