//! Bounded, keyed task execution shared by the slot manager and push
//! processor watchdogs.

pub mod keyed;

pub use keyed::{Job, KeyedExecutor};
