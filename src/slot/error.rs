use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("slot {0} is not assigned to this node")]
    NotAssigned(super::table::SlotId),

    #[error("sync with peer {peer} failed: {source}")]
    Sync {
        peer: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("sync aborted: role changed mid-sync")]
    Aborted,

    #[error("slot table recorder I/O failed: {0}")]
    Recorder(#[from] std::io::Error),

    #[error("slot table recorder serialization failed: {0}")]
    RecorderSerialize(#[from] serde_json::Error),
}
