use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::NodeId;

/// Whether one junction runs a traffic light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrafficLightState {
    pub enabled: bool,
}

pub trait TrafficLightEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, node: NodeId) -> Option<TrafficLightState>;

    fn apply(&mut self, node: NodeId, state: &TrafficLightState) -> Result<(), EngineError>;
}

pub struct UnsupportedTrafficLightEngine;

impl TrafficLightEngine for UnsupportedTrafficLightEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _node: NodeId) -> Option<TrafficLightState> {
        None
    }

    fn apply(&mut self, _node: NodeId, _state: &TrafficLightState) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::TrafficLights,
        })
    }
}

pub struct TrafficLights;

impl SyncFeature for TrafficLights {
    const KIND: FeatureKind = FeatureKind::TrafficLights;

    type Target = NodeId;
    type WireTarget = NodeId;
    type State = TrafficLightState;

    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        *existing = *incoming;
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.node_exists(*target)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.traffic_lights.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.traffic_lights.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.traffic_lights.apply(*target, state)
    }

    fn try_lock(locks: &EntityLockRegistry, target: &Self::Target) -> Option<EntityLockGuard> {
        locks.try_acquire_node(*target)
    }

    fn resolve_target(
        resolver: &TargetResolver<'_>,
        wire: &Self::WireTarget,
    ) -> Option<Self::Target> {
        resolver.net.node_exists(*wire).then_some(*wire)
    }

    fn wire_target(
        _resolver: &TargetResolver<'_>,
        target: &Self::Target,
    ) -> Option<Self::WireTarget> {
        Some(*target)
    }

    fn pending_target(wire: &Self::WireTarget) -> PendingTarget {
        PendingTarget::Node(*wire)
    }

    fn entity_ref(wire: &Self::WireTarget) -> EntityRef {
        EntityRef::Node(*wire)
    }

    fn make_request(request: UpdateRequest<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::TrafficLightRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::TrafficLightApplied(applied)
    }
}
