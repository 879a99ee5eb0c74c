use crate::road_network::LaneSlot;
use crate::types::{PrefabId, SegmentId};

/// Location-derived stable identifier for a lane.
///
/// Local lane ids are allocated from per-machine pools and drift as the
/// road network mutates, so peers reference lanes by the slot the lane
/// occupies instead: owning segment, the segment's build counter, the
/// prefab and ordinal, plus a disambiguation sequence so that rapid
/// add/remove/add cycles on the same slot never collide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LaneGuid {
    pub segment: SegmentId,
    pub build_index: u32,
    pub prefab: PrefabId,
    pub ordinal: u8,
    pub sequence: u32,
}

impl LaneGuid {
    pub const INVALID: LaneGuid = LaneGuid {
        segment: 0,
        build_index: 0,
        prefab: 0,
        ordinal: 0,
        sequence: 0,
    };

    pub fn new(slot: LaneSlotKey, sequence: u32) -> Self {
        Self {
            segment: slot.segment,
            build_index: slot.build_index,
            prefab: slot.prefab,
            ordinal: slot.ordinal,
            sequence,
        }
    }

    /// An all-zero segment+prefab pair is the invalid sentinel.
    pub fn is_valid(&self) -> bool {
        self.segment != 0 || self.prefab != 0
    }

    pub fn slot(&self) -> LaneSlotKey {
        LaneSlotKey {
            segment: self.segment,
            build_index: self.build_index,
            prefab: self.prefab,
            ordinal: self.ordinal,
        }
    }
}

/// Key of a structural lane slot: a lane guid without the disambiguation
/// sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneSlotKey {
    pub segment: SegmentId,
    pub build_index: u32,
    pub prefab: PrefabId,
    pub ordinal: u8,
}

impl LaneSlotKey {
    pub fn is_valid(&self) -> bool {
        self.segment != 0 || self.prefab != 0
    }

    /// Structural match: same segment, prefab and ordinal. Tolerates a
    /// build-index difference so a rebuilt-in-place segment keeps its
    /// lanes' identities.
    pub fn matches(&self, guid: &LaneGuid) -> bool {
        self.segment == guid.segment && self.prefab == guid.prefab && self.ordinal == guid.ordinal
    }

    /// Structural match that also requires the build index to agree.
    pub fn matches_strict(&self, guid: &LaneGuid) -> bool {
        self.matches(guid) && self.build_index == guid.build_index
    }
}

impl From<LaneSlot> for LaneSlotKey {
    fn from(slot: LaneSlot) -> Self {
        Self {
            segment: slot.segment,
            build_index: slot.build_index,
            prefab: slot.prefab,
            ordinal: slot.ordinal,
        }
    }
}
