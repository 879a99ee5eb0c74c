use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, LaneRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::LaneId;

/// Per-lane speed limit. `kmh = None` clears the override back to the
/// prefab default; `default_kmh` is informational readback so peers can
/// render the effective limit without asking their own engine.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpeedLimitState {
    pub kmh: Option<f32>,
    pub default_kmh: Option<f32>,
}

impl SpeedLimitState {
    pub fn override_kmh(kmh: f32) -> Self {
        Self {
            kmh: Some(kmh),
            default_kmh: None,
        }
    }

    pub fn has_override(&self) -> bool {
        self.kmh.is_some()
    }

    /// Effective limit a peer should display.
    pub fn effective_kmh(&self) -> Option<f32> {
        self.kmh.or(self.default_kmh)
    }
}

/// Capability seam to the traffic engine's speed limit manager.
pub trait SpeedLimitEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, lane: LaneId) -> Option<SpeedLimitState>;

    fn apply(&mut self, lane: LaneId, state: &SpeedLimitState) -> Result<(), EngineError>;
}

/// Stub selected at composition time when the speed limit manager could
/// not be bound.
pub struct UnsupportedSpeedLimitEngine;

impl SpeedLimitEngine for UnsupportedSpeedLimitEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _lane: LaneId) -> Option<SpeedLimitState> {
        None
    }

    fn apply(&mut self, _lane: LaneId, _state: &SpeedLimitState) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::SpeedLimits,
        })
    }
}

pub struct SpeedLimits;

impl SyncFeature for SpeedLimits {
    const KIND: FeatureKind = FeatureKind::SpeedLimits;

    type Target = LaneId;
    type WireTarget = LaneRef;
    type State = SpeedLimitState;

    /// A speed limit request always carries the full intent (override or
    /// clear), so merging is plain last-writer-wins.
    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        *existing = *incoming;
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.lane_exists(*target)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.speed_limits.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.speed_limits.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.speed_limits.apply(*target, state)
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
        SyncCommand::SpeedLimitRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::SpeedLimitApplied(applied)
    }
}
