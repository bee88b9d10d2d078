//! Shared data model: identities, registrations, and the data-tier datum.

pub mod connect_id;
pub mod data_info_id;
pub mod datum;
pub mod registration;

pub use connect_id::{ConnectId, ConnectIdParseError};
pub use data_info_id::DataInfoId;
pub use datum::{Datum, PublisherEntry};
pub use registration::{
    AssembleType, DataBox, Publisher, Registration, RegistrationBase, Scope, Subscriber, Watcher,
};
