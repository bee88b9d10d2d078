//! Crate-wide error type. Each subsystem defines a small, closed set of
//! variants; nothing here is used for control flow between components --
//! `SlotAccess`, `ConflictMerge` drops, and similar outcomes are plain
//! enums returned to the caller, not errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session error: {0}")]
    Session(#[from] crate::session::Error),

    #[error("slot manager error: {0}")]
    Slot(#[from] crate::slot::Error),

    #[error("push processor error: {0}")]
    Push(#[from] crate::push::Error),

    #[error("config error: {0}")]
    Config(#[from] crate::config::Error),

    #[error("transport error: {0}")]
    Transport(String),
}
