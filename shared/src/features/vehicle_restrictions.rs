use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, LaneRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::LaneId;

/// Bit flags of the vehicle classes allowed on a lane.
pub mod vehicle_mask {
    pub const PASSENGER_CAR: u16 = 1 << 0;
    pub const CARGO_TRUCK: u16 = 1 << 1;
    pub const BUS: u16 = 1 << 2;
    pub const TAXI: u16 = 1 << 3;
    pub const SERVICE: u16 = 1 << 4;
    pub const EMERGENCY: u16 = 1 << 5;
    pub const CARGO_TRAIN: u16 = 1 << 6;
    pub const PASSENGER_TRAIN: u16 = 1 << 7;

    pub const ALL: u16 = PASSENGER_CAR
        | CARGO_TRUCK
        | BUS
        | TAXI
        | SERVICE
        | EMERGENCY
        | CARGO_TRAIN
        | PASSENGER_TRAIN;
}

/// Allowed-vehicle mask of one lane. `None` resets the lane to the
/// engine's defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VehicleRestrictionsState {
    pub allowed: Option<u16>,
}

pub trait VehicleRestrictionEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, lane: LaneId) -> Option<VehicleRestrictionsState>;

    fn apply(&mut self, lane: LaneId, state: &VehicleRestrictionsState)
        -> Result<(), EngineError>;
}

pub struct UnsupportedVehicleRestrictionEngine;

impl VehicleRestrictionEngine for UnsupportedVehicleRestrictionEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _lane: LaneId) -> Option<VehicleRestrictionsState> {
        None
    }

    fn apply(
        &mut self,
        _lane: LaneId,
        _state: &VehicleRestrictionsState,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::VehicleRestrictions,
        })
    }
}

pub struct VehicleRestrictions;

impl SyncFeature for VehicleRestrictions {
    const KIND: FeatureKind = FeatureKind::VehicleRestrictions;

    type Target = LaneId;
    type WireTarget = LaneRef;
    type State = VehicleRestrictionsState;

    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        if incoming.allowed.is_some() {
            existing.allowed = incoming.allowed;
        }
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.lane_exists(*target)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.vehicle_restrictions.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.vehicle_restrictions.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.vehicle_restrictions.apply(*target, state)
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
        SyncCommand::VehicleRestrictionsRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::VehicleRestrictionsApplied(applied)
    }
}
