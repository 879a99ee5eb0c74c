//! Per-feature strategy seams of the synchronization core.
//!
//! Every synchronized tool-feature implements [`SyncFeature`]: a
//! zero-sized strategy type describing how to merge, resolve, lock and
//! apply that feature's state. One generic
//! [`ApplyCoordinator`](crate::apply::coordinator::ApplyCoordinator) is
//! instantiated per feature instead of eight hand-copied ones.
//!
//! The traffic engine itself is reached through one capability trait per
//! feature. The embedder binds real adapters where the engine mod is
//! present and installs the `Unsupported*` stubs where it is not; callers
//! branch on `is_supported` once instead of null-checking every call.

mod error;

pub mod junction_restrictions;
pub mod lane_arrows;
pub mod lane_connections;
pub mod parking_restrictions;
pub mod priority_signs;
pub mod speed_limits;
pub mod traffic_lights;
pub mod traffic_service;
pub mod vehicle_restrictions;

use std::fmt::Debug;
use std::hash::Hash;

pub use error::EngineError;

use crate::apply::deferred::{PendingOperation, PendingPrecondition, PendingTarget};
use crate::apply::locks::{EntityLockGuard, EntityLockRegistry};
use crate::context::SyncContext;
use crate::identity::LaneGuidRegistry;
use crate::mapping::LaneMappingStore;
use crate::messages::{AppliedCommand, EntityRef, LaneRef, SyncCommand, UpdateRequest};
use crate::road_network::RoadNetwork;
use crate::types::LaneId;

use junction_restrictions::JunctionRestrictionsEngine;
use lane_arrows::LaneArrowEngine;
use lane_connections::LaneConnectionEngine;
use parking_restrictions::ParkingRestrictionEngine;
use priority_signs::PrioritySignEngine;
use speed_limits::SpeedLimitEngine;
use traffic_lights::TrafficLightEngine;
use traffic_service::TrafficServiceEngine;
use vehicle_restrictions::VehicleRestrictionEngine;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    SpeedLimits,
    LaneArrows,
    LaneConnections,
    JunctionRestrictions,
    ParkingRestrictions,
    PrioritySigns,
    TrafficLights,
    VehicleRestrictions,
}

impl FeatureKind {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            FeatureKind::SpeedLimits => "speed_limits",
            FeatureKind::LaneArrows => "lane_arrows",
            FeatureKind::LaneConnections => "lane_connections",
            FeatureKind::JunctionRestrictions => "junction_restrictions",
            FeatureKind::ParkingRestrictions => "parking_restrictions",
            FeatureKind::PrioritySigns => "priority_signs",
            FeatureKind::TrafficLights => "traffic_lights",
            FeatureKind::VehicleRestrictions => "vehicle_restrictions",
        }
    }
}

/// Every bound (or stubbed) engine capability, one per feature, plus the
/// non-entity service surface (clear traffic, default speed limits).
pub struct TrafficEngines {
    pub speed_limits: Box<dyn SpeedLimitEngine>,
    pub lane_arrows: Box<dyn LaneArrowEngine>,
    pub lane_connections: Box<dyn LaneConnectionEngine>,
    pub junction_restrictions: Box<dyn JunctionRestrictionsEngine>,
    pub parking_restrictions: Box<dyn ParkingRestrictionEngine>,
    pub priority_signs: Box<dyn PrioritySignEngine>,
    pub traffic_lights: Box<dyn TrafficLightEngine>,
    pub vehicle_restrictions: Box<dyn VehicleRestrictionEngine>,
    pub traffic_service: Box<dyn TrafficServiceEngine>,
}

impl TrafficEngines {
    /// All stubs: every operation reports unsupported. The starting point
    /// an embedder replaces field by field with bound adapters.
    pub fn unsupported() -> Self {
        Self {
            speed_limits: Box::new(speed_limits::UnsupportedSpeedLimitEngine),
            lane_arrows: Box::new(lane_arrows::UnsupportedLaneArrowEngine),
            lane_connections: Box::new(lane_connections::UnsupportedLaneConnectionEngine),
            junction_restrictions: Box::new(
                junction_restrictions::UnsupportedJunctionRestrictionsEngine,
            ),
            parking_restrictions: Box::new(
                parking_restrictions::UnsupportedParkingRestrictionEngine,
            ),
            priority_signs: Box::new(priority_signs::UnsupportedPrioritySignEngine),
            traffic_lights: Box::new(traffic_lights::UnsupportedTrafficLightEngine),
            vehicle_restrictions: Box::new(
                vehicle_restrictions::UnsupportedVehicleRestrictionEngine,
            ),
            traffic_service: Box::new(traffic_service::UnsupportedTrafficServiceEngine),
        }
    }
}

/// Resolves between local apply targets and their cross-machine wire
/// form, consulting the guid registry first and the mapping table as the
/// fallback.
pub struct TargetResolver<'a> {
    pub registry: &'a LaneGuidRegistry,
    pub mapping: &'a LaneMappingStore,
    pub net: &'a dyn RoadNetwork,
}

impl<'a> TargetResolver<'a> {
    pub fn new(context: &'a SyncContext, net: &'a dyn RoadNetwork) -> Self {
        Self {
            registry: &context.registry,
            mapping: &context.mapping,
            net,
        }
    }

    /// Local lane for a wire reference: guid resolution first (including
    /// the structural fallback scan), then the mapping table by the
    /// authority's lane id, then the mapping table by slot.
    pub fn lane_from_wire(&self, wire: &LaneRef) -> Option<LaneId> {
        if let Some(lane) = self.registry.try_resolve(self.net, wire.guid) {
            return Some(lane);
        }

        if let Some(entry) = self.mapping.try_resolve_host_lane(wire.host_lane) {
            if entry.local_resolved
                && entry.local_lane != 0
                && self.net.lane_exists(entry.local_lane)
            {
                return Some(entry.local_lane);
            }
        }

        if wire.guid.is_valid() {
            if let Some(entry) = self.mapping.try_get(wire.guid.segment, wire.guid.ordinal) {
                if entry.guid == wire.guid
                    && entry.local_resolved
                    && entry.local_lane != 0
                    && self.net.lane_exists(entry.local_lane)
                {
                    return Some(entry.local_lane);
                }
            }
        }

        None
    }

    /// Wire reference for a local lane. The authority mints (or reuses)
    /// the guid and its own numeric id is the host lane id; a client can
    /// only reference lanes the mapping table already covers.
    pub fn lane_to_wire(&self, lane: LaneId) -> Option<LaneRef> {
        if let Some(guid) = self.registry.get_or_create(self.net, lane) {
            if self.registry.automatic_generation() {
                return Some(LaneRef {
                    guid,
                    host_lane: lane,
                });
            }
            if let Some(entry) = self.mapping.try_resolve_guid(guid) {
                return Some(LaneRef {
                    guid,
                    host_lane: entry.host_lane,
                });
            }
        }

        let slot = self.net.lane_slot(lane)?;
        let entry = self.mapping.try_get(slot.segment, slot.ordinal)?;
        if !entry.guid.is_valid() {
            return None;
        }
        Some(LaneRef {
            guid: entry.guid,
            host_lane: entry.host_lane,
        })
    }
}

/// Precondition of one parked operation: mapping freshness first, then
/// target existence. A lane whose segment exists counts as mid-creation
/// (worth waiting); anything else absent counts as missing.
pub fn pending_precondition(
    context: &SyncContext,
    net: &dyn RoadNetwork,
    op: &PendingOperation,
) -> PendingPrecondition {
    if context.mapping.version() < op.required_version {
        return PendingPrecondition::Wait;
    }
    match op.target {
        PendingTarget::Lane(wire) => {
            let resolver = TargetResolver::new(context, net);
            if resolver.lane_from_wire(&wire).is_some() {
                PendingPrecondition::Ready
            } else if net.segment_exists(wire.guid.segment) {
                PendingPrecondition::Wait
            } else {
                PendingPrecondition::Missing
            }
        }
        PendingTarget::Node(node) => {
            if net.node_exists(node) {
                PendingPrecondition::Ready
            } else {
                PendingPrecondition::Missing
            }
        }
        PendingTarget::Segment(segment) => {
            if net.segment_exists(segment) {
                PendingPrecondition::Ready
            } else {
                PendingPrecondition::Missing
            }
        }
        PendingTarget::SegmentEnd(end) => {
            if net.node_exists(end.node) && net.segment_exists(end.segment) {
                PendingPrecondition::Ready
            } else {
                PendingPrecondition::Missing
            }
        }
    }
}

/// Strategy of one synchronized tool-feature.
pub trait SyncFeature: 'static + Sized {
    const KIND: FeatureKind;

    /// Locally-resolved apply target.
    type Target: Copy + Eq + Hash + Debug + Send + 'static;
    /// Cross-machine form of the target as carried in commands.
    type WireTarget: Copy + Eq + Debug + Send + 'static;
    /// The feature's state, both on the wire and at the engine seam.
    type State: Clone + PartialEq + Debug + Send + 'static;

    /// Field-level last-writer-wins merge of a newer request into a
    /// pending one.
    fn merge(existing: &mut Self::State, incoming: &Self::State);

    fn target_exists(net: &dyn RoadNetwork, target: &Self::Target) -> bool;

    fn is_supported(engines: &TrafficEngines) -> bool;

    /// Read the engine's actual state for the target (readback).
    fn try_get(engines: &TrafficEngines, target: &Self::Target) -> Option<Self::State>;

    fn apply(
        engines: &mut TrafficEngines,
        target: &Self::Target,
        state: &Self::State,
    ) -> Result<(), EngineError>;

    fn try_lock(locks: &EntityLockRegistry, target: &Self::Target) -> Option<EntityLockGuard>;

    fn resolve_target(resolver: &TargetResolver<'_>, wire: &Self::WireTarget)
        -> Option<Self::Target>;

    fn wire_target(resolver: &TargetResolver<'_>, target: &Self::Target)
        -> Option<Self::WireTarget>;

    fn pending_target(wire: &Self::WireTarget) -> PendingTarget;

    fn entity_ref(wire: &Self::WireTarget) -> EntityRef;

    fn make_request(request: UpdateRequest<Self::WireTarget, Self::State>) -> SyncCommand;

    fn make_applied(applied: AppliedCommand<Self::WireTarget, Self::State>) -> SyncCommand;
}
