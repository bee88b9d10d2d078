//! Session-tier registration stores.

pub mod error;
pub mod publisher_registry;
pub mod store;

use crate::model::{ConnectId, Publisher, Subscriber, Watcher};
pub use error::Error;
pub use publisher_registry::PublisherRegistry;
pub use store::RegistrationStore;

/// Subscriber registrations, indexed by `dataInfoId` and `connectId`.
pub type SessionInterests = RegistrationStore<Subscriber>;
/// Publisher registrations, indexed by `dataInfoId` and `connectId`.
pub type SessionDataStore = RegistrationStore<Publisher>;
/// Watcher registrations, indexed by `dataInfoId` and `connectId`.
pub type SessionWatchers = RegistrationStore<Watcher>;

/// Parse a connect id off the wire (`"{sourceIp}:{sourcePort}_{targetIp}:{targetPort}"`).
pub fn parse_connect_id(s: &str) -> Result<ConnectId, Error> {
    Ok(s.parse::<ConnectId>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_connect_id_rejects_malformed_input() {
        assert!(parse_connect_id("1.1.1.1:1_2.2.2.2:2").is_ok());
        assert!(matches!(
            parse_connect_id("no-separator"),
            Err(Error::InvalidConnectId(_))
        ));
    }
}
