use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("push transport failed for {addr}: {reason}")]
    Transport { addr: String, reason: String },
}
