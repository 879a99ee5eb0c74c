use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, SegmentEnd, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrioritySign {
    #[default]
    None,
    Priority,
    Yield,
    Stop,
}

/// Priority sign of one segment end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrioritySignState {
    pub sign: PrioritySign,
}

pub trait PrioritySignEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, end: SegmentEnd) -> Option<PrioritySignState>;

    fn apply(&mut self, end: SegmentEnd, state: &PrioritySignState) -> Result<(), EngineError>;
}

pub struct UnsupportedPrioritySignEngine;

impl PrioritySignEngine for UnsupportedPrioritySignEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _end: SegmentEnd) -> Option<PrioritySignState> {
        None
    }

    fn apply(&mut self, _end: SegmentEnd, _state: &PrioritySignState) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::PrioritySigns,
        })
    }
}

pub struct PrioritySigns;

impl SyncFeature for PrioritySigns {
    const KIND: FeatureKind = FeatureKind::PrioritySigns;

    type Target = SegmentEnd;
    type WireTarget = SegmentEnd;
    type State = PrioritySignState;

    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        *existing = *incoming;
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.node_exists(target.node) && net.segment_exists(target.segment)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.priority_signs.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.priority_signs.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.priority_signs.apply(*target, state)
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
        SyncCommand::PrioritySignRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::PrioritySignApplied(applied)
    }
}
