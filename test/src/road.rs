//! Mutable in-memory road network standing in for the host game.
//!
//! Each test instance hands out lane ids from its own pool, so two
//! instances playing host and client naturally disagree on numeric ids —
//! exactly the condition the identity layer exists for. Offset the pools
//! (`with_lane_id_base`) to make accidental id equality impossible.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lanesync_shared::{LaneId, LaneSlot, NodeId, PrefabId, RoadNetwork, SegmentId};

struct Segment {
    build_index: u32,
    prefab: PrefabId,
    /// Lane id per ordinal; `None` marks an uncreated slot.
    lanes: Vec<Option<LaneId>>,
}

#[derive(Default)]
struct World {
    segments: BTreeMap<SegmentId, Segment>,
    nodes: BTreeMap<NodeId, ()>,
    next_lane: LaneId,
    next_build: u32,
}

#[derive(Default)]
pub struct TestRoadNetwork {
    world: Mutex<World>,
}

impl TestRoadNetwork {
    pub fn new() -> Self {
        let net = Self::default();
        {
            let mut world = net.lock();
            world.next_lane = 1;
            world.next_build = 100;
        }
        net
    }

    /// Start lane ids at an offset so this instance's ids never collide
    /// with another instance's by accident.
    pub fn with_lane_id_base(base: LaneId) -> Self {
        let net = Self::new();
        net.lock().next_lane = base;
        net
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_node(&self, node: NodeId) {
        self.lock().nodes.insert(node, ());
    }

    pub fn remove_node(&self, node: NodeId) {
        self.lock().nodes.remove(&node);
    }

    /// Create a segment with `lane_count` lanes; returns the lane ids in
    /// ordinal order.
    pub fn add_segment(&self, segment: SegmentId, prefab: PrefabId, lane_count: u8) -> Vec<LaneId> {
        let mut world = self.lock();
        let build_index = world.next_build;
        world.next_build += 1;
        let mut lanes = Vec::with_capacity(lane_count as usize);
        for _ in 0..lane_count {
            let lane = world.next_lane;
            world.next_lane += 1;
            lanes.push(Some(lane));
        }
        let ids: Vec<LaneId> = lanes.iter().map(|lane| lane.unwrap()).collect();
        world.segments.insert(
            segment,
            Segment {
                build_index,
                prefab,
                lanes,
            },
        );
        ids
    }

    pub fn remove_segment(&self, segment: SegmentId) {
        self.lock().segments.remove(&segment);
    }

    /// Rebuild a segment in place: same prefab and lane layout, bumped
    /// build counter, brand new lane ids. Returns the new ids.
    pub fn rebuild_segment(&self, segment: SegmentId) -> Vec<LaneId> {
        let mut world = self.lock();
        let build_index = world.next_build;
        world.next_build += 1;
        let Some(existing) = world.segments.get(&segment) else {
            return Vec::new();
        };
        let lane_count = existing.lanes.len();
        let mut lanes = Vec::with_capacity(lane_count);
        let mut ids = Vec::new();
        for _ in 0..lane_count {
            let lane = world.next_lane;
            world.next_lane += 1;
            lanes.push(Some(lane));
            ids.push(lane);
        }
        if let Some(entry) = world.segments.get_mut(&segment) {
            entry.build_index = build_index;
            entry.lanes = lanes;
        }
        ids
    }

    /// Release one lane, leaving its ordinal slot empty.
    pub fn remove_lane(&self, segment: SegmentId, ordinal: u8) -> Option<LaneId> {
        let mut world = self.lock();
        let entry = world.segments.get_mut(&segment)?;
        let slot = entry.lanes.get_mut(ordinal as usize)?;
        slot.take()
    }

    /// Re-create a lane in a previously emptied slot under a fresh id.
    pub fn restore_lane(&self, segment: SegmentId, ordinal: u8) -> Option<LaneId> {
        let mut world = self.lock();
        let lane = world.next_lane;
        world.next_lane += 1;
        let entry = world.segments.get_mut(&segment)?;
        let slot = entry.lanes.get_mut(ordinal as usize)?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(lane);
        Some(lane)
    }

    pub fn lane_at(&self, segment: SegmentId, ordinal: u8) -> Option<LaneId> {
        let world = self.lock();
        *world.segments.get(&segment)?.lanes.get(ordinal as usize)?
    }
}

impl RoadNetwork for TestRoadNetwork {
    fn lane_exists(&self, lane: LaneId) -> bool {
        if lane == 0 {
            return false;
        }
        self.lock()
            .segments
            .values()
            .any(|segment| segment.lanes.contains(&Some(lane)))
    }

    fn segment_exists(&self, segment: SegmentId) -> bool {
        segment != 0 && self.lock().segments.contains_key(&segment)
    }

    fn node_exists(&self, node: NodeId) -> bool {
        node != 0 && self.lock().nodes.contains_key(&node)
    }

    fn segment_ids(&self) -> Vec<SegmentId> {
        self.lock().segments.keys().copied().collect()
    }

    fn segment_build_index(&self, segment: SegmentId) -> Option<u32> {
        self.lock()
            .segments
            .get(&segment)
            .map(|entry| entry.build_index)
    }

    fn segment_prefab(&self, segment: SegmentId) -> Option<PrefabId> {
        self.lock().segments.get(&segment).map(|entry| entry.prefab)
    }

    fn segment_lanes(&self, segment: SegmentId) -> Vec<(u8, LaneId)> {
        let world = self.lock();
        let Some(entry) = world.segments.get(&segment) else {
            return Vec::new();
        };
        entry
            .lanes
            .iter()
            .enumerate()
            .filter_map(|(ordinal, lane)| lane.map(|lane| (ordinal as u8, lane)))
            .collect()
    }

    fn lane_slot(&self, lane: LaneId) -> Option<LaneSlot> {
        if lane == 0 {
            return None;
        }
        let world = self.lock();
        for (&segment, entry) in &world.segments {
            if let Some(ordinal) = entry.lanes.iter().position(|slot| *slot == Some(lane)) {
                return Some(LaneSlot {
                    segment,
                    build_index: entry.build_index,
                    prefab: entry.prefab,
                    ordinal: ordinal as u8,
                });
            }
        }
        None
    }
}
