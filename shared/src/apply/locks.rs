//! Per-entity try-locks serializing authoritative apply attempts.
//!
//! Held only around the engine call plus readback, never across network
//! I/O. A busy entity is a transient condition: the caller schedules a
//! retry instead of blocking the frame loop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{LaneId, NodeId, SegmentId};

#[derive(Default)]
struct LockTables {
    lanes: HashSet<LaneId>,
    nodes: HashSet<NodeId>,
    segments: HashSet<SegmentId>,
}

#[derive(Clone, Default)]
pub struct EntityLockRegistry {
    tables: Arc<Mutex<LockTables>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LockedEntity {
    Lane(LaneId),
    Node(NodeId),
    Segment(SegmentId),
}

/// Release-on-drop lock over one simulation entity.
pub struct EntityLockGuard {
    tables: Arc<Mutex<LockTables>>,
    entity: LockedEntity,
}

impl EntityLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LockTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_acquire_lane(&self, lane: LaneId) -> Option<EntityLockGuard> {
        if !self.lock().lanes.insert(lane) {
            return None;
        }
        Some(EntityLockGuard {
            tables: Arc::clone(&self.tables),
            entity: LockedEntity::Lane(lane),
        })
    }

    pub fn try_acquire_node(&self, node: NodeId) -> Option<EntityLockGuard> {
        if !self.lock().nodes.insert(node) {
            return None;
        }
        Some(EntityLockGuard {
            tables: Arc::clone(&self.tables),
            entity: LockedEntity::Node(node),
        })
    }

    pub fn try_acquire_segment(&self, segment: SegmentId) -> Option<EntityLockGuard> {
        if !self.lock().segments.insert(segment) {
            return None;
        }
        Some(EntityLockGuard {
            tables: Arc::clone(&self.tables),
            entity: LockedEntity::Segment(segment),
        })
    }
}

impl Drop for EntityLockGuard {
    fn drop(&mut self) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match self.entity {
            LockedEntity::Lane(lane) => {
                tables.lanes.remove(&lane);
            }
            LockedEntity::Node(node) => {
                tables.nodes.remove(&node);
            }
            LockedEntity::Segment(segment) => {
                tables.segments.remove(&segment);
            }
        }
    }
}
