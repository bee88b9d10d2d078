//! Client<->session endpoint pair, the unit of session-level liveness.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectIdParseError {
    #[error("connect id missing '_' separator: {0:?}")]
    MissingSeparator(String),
}

/// Identifies a client connection by its two TCP endpoints.
///
/// Wire format: `"{sourceIp}:{sourcePort}_{targetIp}:{targetPort}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectId {
    pub source_address: String,
    pub target_address: String,
}

impl ConnectId {
    pub fn new(source_address: impl Into<String>, target_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            target_address: target_address.into(),
        }
    }
}

impl fmt::Display for ConnectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.source_address, self.target_address)
    }
}

impl FromStr for ConnectId {
    type Err = ConnectIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, target) = s
            .split_once('_')
            .ok_or_else(|| ConnectIdParseError::MissingSeparator(s.to_string()))?;
        Ok(Self::new(source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let id = ConnectId::new("1.1.1.1:12345", "2.2.2.2:9600");
        let s = id.to_string();
        assert_eq!(s, "1.1.1.1:12345_2.2.2.2:9600");
        let parsed: ConnectId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_missing_separator() {
        let err = "no-separator-here".parse::<ConnectId>().unwrap_err();
        assert!(matches!(err, ConnectIdParseError::MissingSeparator(_)));
    }
}
