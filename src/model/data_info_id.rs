//! Logical key for a published topic.

use std::fmt;

use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

/// Composite key identifying a publication: `dataId` within a `group`,
/// optionally scoped to an `instanceId` (tenant/namespace).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataInfoId {
    pub data_id: String,
    pub group: String,
    pub instance_id: String,
}

impl DataInfoId {
    pub fn new(data_id: impl Into<String>, group: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
            group: group.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Stable (non-randomized) hash used for slot assignment. Must agree
    /// across processes and restarts, unlike `std`'s SipHash default.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.data_id.hash(&mut hasher);
        self.group.hash(&mut hasher);
        self.instance_id.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for DataInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.data_id, self.group, self.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic() {
        let a = DataInfoId::new("d1", "g1", "");
        let b = DataInfoId::new("d1", "g1", "");
        assert_eq!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn distinguishes_fields() {
        let a = DataInfoId::new("d1", "g1", "");
        let b = DataInfoId::new("d1", "g2", "");
        assert_ne!(a, b);
    }
}
