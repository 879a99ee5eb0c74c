use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, LaneRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::LaneId;

/// Turning arrows of one lane at its forward junction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneArrowState {
    pub left: bool,
    pub forward: bool,
    pub right: bool,
}

impl LaneArrowState {
    pub fn any(&self) -> bool {
        self.left || self.forward || self.right
    }
}

pub trait LaneArrowEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, lane: LaneId) -> Option<LaneArrowState>;

    fn apply(&mut self, lane: LaneId, state: &LaneArrowState) -> Result<(), EngineError>;
}

pub struct UnsupportedLaneArrowEngine;

impl LaneArrowEngine for UnsupportedLaneArrowEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _lane: LaneId) -> Option<LaneArrowState> {
        None
    }

    fn apply(&mut self, _lane: LaneId, _state: &LaneArrowState) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::LaneArrows,
        })
    }
}

pub struct LaneArrows;

impl SyncFeature for LaneArrows {
    const KIND: FeatureKind = FeatureKind::LaneArrows;

    type Target = LaneId;
    type WireTarget = LaneRef;
    type State = LaneArrowState;

    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        *existing = *incoming;
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.lane_exists(*target)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.lane_arrows.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.lane_arrows.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.lane_arrows.apply(*target, state)
    }

    fn try_lock(locks: &EntityLockRegistry, target: &Self::Target) -> Option<EntityLockGuard> {
        locks.try_acquire_lane(*target)
    }

    fn resolve_target(
        resolver: &TargetResolver<'_>,
        wire: &Self::WireTarget,
    ) -> Option<Self::Target> {
        resolver.lane_from_wire(wire)
    }

    fn wire_target(
        resolver: &TargetResolver<'_>,
        target: &Self::Target,
    ) -> Option<Self::WireTarget> {
        resolver.lane_to_wire(*target)
    }

    fn pending_target(wire: &Self::WireTarget) -> PendingTarget {
        PendingTarget::Lane(*wire)
    }

    fn entity_ref(wire: &Self::WireTarget) -> EntityRef {
        EntityRef::Lane(wire.host_lane)
    }

    fn make_request(request: UpdateRequest<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::LaneArrowsRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::LaneArrowsApplied(applied)
    }
}
