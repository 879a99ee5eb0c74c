use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::SegmentId;

/// Parking permission per driving direction of one segment. `None`
/// leaves that direction untouched by the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParkingRestrictionsState {
    pub allow_parking_forward: Option<bool>,
    pub allow_parking_backward: Option<bool>,
}

impl ParkingRestrictionsState {
    pub fn has_any_value(&self) -> bool {
        self.allow_parking_forward.is_some() || self.allow_parking_backward.is_some()
    }
}

pub trait ParkingRestrictionEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, segment: SegmentId) -> Option<ParkingRestrictionsState>;

    fn apply(
        &mut self,
        segment: SegmentId,
        state: &ParkingRestrictionsState,
    ) -> Result<(), EngineError>;
}

pub struct UnsupportedParkingRestrictionEngine;

impl ParkingRestrictionEngine for UnsupportedParkingRestrictionEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _segment: SegmentId) -> Option<ParkingRestrictionsState> {
        None
    }

    fn apply(
        &mut self,
        _segment: SegmentId,
        _state: &ParkingRestrictionsState,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::ParkingRestrictions,
        })
    }
}

pub struct ParkingRestrictions;

impl SyncFeature for ParkingRestrictions {
    const KIND: FeatureKind = FeatureKind::ParkingRestrictions;

    type Target = SegmentId;
    type WireTarget = SegmentId;
    type State = ParkingRestrictionsState;

    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        if incoming.allow_parking_forward.is_some() {
            existing.allow_parking_forward = incoming.allow_parking_forward;
        }
        if incoming.allow_parking_backward.is_some() {
            existing.allow_parking_backward = incoming.allow_parking_backward;
        }
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.segment_exists(*target)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.parking_restrictions.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.parking_restrictions.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.parking_restrictions.apply(*target, state)
    }

    fn try_lock(locks: &EntityLockRegistry, target: &Self::Target) -> Option<EntityLockGuard> {
        locks.try_acquire_segment(*target)
    }

    fn resolve_target(
        resolver: &TargetResolver<'_>,
        wire: &Self::WireTarget,
    ) -> Option<Self::Target> {
        resolver.net.segment_exists(*wire).then_some(*wire)
    }

    fn wire_target(
        _resolver: &TargetResolver<'_>,
        target: &Self::Target,
    ) -> Option<Self::WireTarget> {
        Some(*target)
    }

    fn pending_target(wire: &Self::WireTarget) -> PendingTarget {
        PendingTarget::Segment(*wire)
    }

    fn entity_ref(wire: &Self::WireTarget) -> EntityRef {
        EntityRef::Segment(*wire)
    }

    fn make_request(request: UpdateRequest<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::ParkingRestrictionsRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::ParkingRestrictionsApplied(applied)
    }
}
