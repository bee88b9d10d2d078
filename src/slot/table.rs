//! Slot table: the assignment of `dataInfoId` hash buckets to nodes.

use serde::{Deserialize, Serialize};

use crate::config::SLOT_COUNT;
use crate::model::DataInfoId;

pub type SlotId = u32;

/// One slot's assignment as seen in a slot table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub id: SlotId,
    pub leader: String,
    pub followers: Vec<String>,
    pub leader_epoch: u64,
}

/// A full slot table as disseminated by the meta tier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotTable {
    pub epoch: u64,
    pub slots: Vec<SlotAssignment>,
}

impl SlotTable {
    pub fn new(epoch: u64, slots: Vec<SlotAssignment>) -> Self {
        Self { epoch, slots }
    }

    pub fn get(&self, slot_id: SlotId) -> Option<&SlotAssignment> {
        self.slots.iter().find(|s| s.id == slot_id)
    }
}

/// Deterministic hash of a `DataInfoId` to a slot in `[0, SLOT_COUNT)`.
/// Must match the function used by session nodes, so it is built on a
/// fixed (non-randomized) hasher rather than `std`'s `SipHash`.
pub fn slot_of(data_info_id: &DataInfoId) -> SlotId {
    (data_info_id.stable_hash() % SLOT_COUNT as u64) as SlotId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_of_is_bounded_and_deterministic() {
        let id = DataInfoId::new("d1", "g1", "");
        let slot = slot_of(&id);
        assert!(slot < SLOT_COUNT);
        assert_eq!(slot, slot_of(&id));
    }
}
