use crate::apply::deferred::PendingTarget;
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::features::{EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines};
use crate::messages::{AppliedCommand, EntityRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::NodeId;

/// Junction restriction toggles of one node. `None` means "not part of
/// this request": a request only names the toggles the tool touched, and
/// merging is field-level last-writer-wins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JunctionRestrictionsState {
    pub allow_u_turns: Option<bool>,
    pub allow_near_turn_on_red: Option<bool>,
    pub allow_far_turn_on_red: Option<bool>,
    pub allow_lane_changing_while_going_straight: Option<bool>,
    pub allow_entering_blocked_junctions: Option<bool>,
    pub allow_pedestrian_crossings: Option<bool>,
}

impl JunctionRestrictionsState {
    pub fn has_any_value(&self) -> bool {
        self.allow_u_turns.is_some()
            || self.allow_near_turn_on_red.is_some()
            || self.allow_far_turn_on_red.is_some()
            || self.allow_lane_changing_while_going_straight.is_some()
            || self.allow_entering_blocked_junctions.is_some()
            || self.allow_pedestrian_crossings.is_some()
    }

    pub fn merge_from(&mut self, incoming: &JunctionRestrictionsState) {
        if incoming.allow_u_turns.is_some() {
            self.allow_u_turns = incoming.allow_u_turns;
        }
        if incoming.allow_near_turn_on_red.is_some() {
            self.allow_near_turn_on_red = incoming.allow_near_turn_on_red;
        }
        if incoming.allow_far_turn_on_red.is_some() {
            self.allow_far_turn_on_red = incoming.allow_far_turn_on_red;
        }
        if incoming.allow_lane_changing_while_going_straight.is_some() {
            self.allow_lane_changing_while_going_straight =
                incoming.allow_lane_changing_while_going_straight;
        }
        if incoming.allow_entering_blocked_junctions.is_some() {
            self.allow_entering_blocked_junctions = incoming.allow_entering_blocked_junctions;
        }
        if incoming.allow_pedestrian_crossings.is_some() {
            self.allow_pedestrian_crossings = incoming.allow_pedestrian_crossings;
        }
    }
}

pub trait JunctionRestrictionsEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn try_get(&self, node: NodeId) -> Option<JunctionRestrictionsState>;

    fn apply(&mut self, node: NodeId, state: &JunctionRestrictionsState)
        -> Result<(), EngineError>;
}

pub struct UnsupportedJunctionRestrictionsEngine;

impl JunctionRestrictionsEngine for UnsupportedJunctionRestrictionsEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn try_get(&self, _node: NodeId) -> Option<JunctionRestrictionsState> {
        None
    }

    fn apply(
        &mut self,
        _node: NodeId,
        _state: &JunctionRestrictionsState,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            feature: FeatureKind::JunctionRestrictions,
        })
    }
}

pub struct JunctionRestrictions;

impl SyncFeature for JunctionRestrictions {
    const KIND: FeatureKind = FeatureKind::JunctionRestrictions;

    type Target = NodeId;
    type WireTarget = NodeId;
    type State = JunctionRestrictionsState;

    fn merge(existing: &mut Self::State, incoming: &Self::State) {
        existing.merge_from(incoming);
    }

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool {
        net.node_exists(*target)
    }

    fn is_supported(engines: &TrafficEngines) -> bool {
        engines.junction_restrictions.is_supported()
    }

    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State> {
        engines.junction_restrictions.try_get(*target)
    }

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError> {
        engines.junction_restrictions.apply(*target, state)
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
        SyncCommand::JunctionRestrictionsRequest(request)
    }

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand {
        SyncCommand::JunctionRestrictionsApplied(applied)
    }
}
