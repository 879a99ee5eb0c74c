use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, SegmentEnd, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;

/// Connections of one source lane, expressed as ordinals within the
/// segment end's candidate lane list. Ordinals stay meaningful across
/// machines even though the lane ids behind them differ; the bound
/// engine adapter translates ordinals to its own lane ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneConnectionEntry {
    pub source: u8,
    pub targets: Vec<u8>,
}

/// Lane connections of one segment end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneConnectionsState {
    pub start_node: bool,
    pub connections: Vec<LaneConnectionEntry>,
}

pub trait LaneConnectionEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, end: SegmentEnd) -> Option<LaneConnectionsState>;

    fn apply(&mut self, end: SegmentEnd, state: &LaneConnectionsState) -> Result<(), EngineError>;
}

pub struct UnsupportedLaneConnectionEngine;

impl LaneConnectionEngine for UnsupportedLaneConnectionEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _end: SegmentEnd) -> Option<LaneConnectionsState> {
        None
    }

    fn apply(
        &mut self,
        _end: SegmentEnd,
        _state: &LaneConnectionsState,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::LaneConnections,
        })
    }
}

pub struct LaneConnections;

impl SyncFeature for LaneConnections {
    const KIND: FeatureKind = FeatureKind::LaneConnections;

    type Target = SegmentEnd;
    type WireTarget = SegmentEnd;
    type State = LaneConnectionsState;

    /// Incoming entries replace pending ones per source ordinal; sources
    /// the incoming request does not mention keep their pending value.
    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        existing.start_node = incoming.start_node;
        for entry in &incoming.connections {
            match existing
                .connections
                .iter_mut()
                .find(|candidate| candidate.source == entry.source)
            {
                Some(candidate) => *candidate = entry.clone(),
                None => existing.connections.push(entry.clone()),
            }
        }
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.node_exists(target.node) && net.segment_exists(target.segment)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.lane_connections.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.lane_connections.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.lane_connections.apply(*target, state)
    }

    fn try_lock(locks: &EntityLockRegistry, target: &Self::Target) -> Option<EntityLockGuard> {
        locks.try_acquire_node(target.node)
    }

    fn resolve_target(
        resolver: &TargetResolver<'_>,
        wire: &Self::WireTarget,
    ) -> Option<Self::Target> {
        if resolver.net.node_exists(wire.node) && resolver.net.segment_exists(wire.segment) {
            Some(*wire)
        } else {
            None
        }
    }

    fn wire_target(
        _resolver: &TargetResolver<'_>,
        target: &Self::Target,
    ) -> Option<Self::WireTarget> {
        Some(*target)
    }

    fn pending_target(wire: &Self::WireTarget) -> PendingTarget {
        PendingTarget::SegmentEnd(*wire)
    }

    fn entity_ref(wire: &Self::WireTarget) -> EntityRef {
        EntityRef::Node(wire.node)
    }

    fn make_request(request: UpdateRequest<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::LaneConnectionsRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::LaneConnectionsApplied(applied)
    }
}
