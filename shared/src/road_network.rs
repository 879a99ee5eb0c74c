use crate::types::{LaneId, NodeId, PrefabId, SegmentId};

/// Structural position of a lane inside the live road network: the owning
/// segment, that segment's build counter and prefab, and the lane's ordinal
/// slot within the prefab's lane layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneSlot {
    pub segment: SegmentId,
    pub build_index: u32,
    pub prefab: PrefabId,
    pub ordinal: u8,
}

/// Read-only view of the host game's road network.
///
/// The simulation allocates lane/segment/node ids from machine-local pools,
/// so none of these ids can be trusted across peers; everything the
/// synchronization core knows about the world it learns through this trait.
pub trait RoadNetwork: Send + Sync {
    fn lane_exists(&self, lane: LaneId) -> bool;

    fn segment_exists(&self, segment: SegmentId) -> bool;

    fn node_exists(&self, node: NodeId) -> bool;

    /// Ids of all live segments, in no particular order.
    fn segment_ids(&self) -> Vec<SegmentId>;

    /// Build counter of a segment; bumped whenever the segment is rebuilt
    /// in place (same topology, new physical entity).
    fn segment_build_index(&self, segment: SegmentId) -> Option<u32>;

    fn segment_prefab(&self, segment: SegmentId) -> Option<PrefabId>;

    /// Created lanes of a segment as `(ordinal, lane id)` pairs in slot
    /// order. Ordinals of uncreated lanes are skipped.
    fn segment_lanes(&self, segment: SegmentId) -> Vec<(u8, LaneId)>;

    /// Current structural slot of a lane, if the lane and its owning
    /// segment both exist.
    fn lane_slot(&self, lane: LaneId) -> Option<LaneSlot>;
}
