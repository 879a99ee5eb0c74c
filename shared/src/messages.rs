//! Typed wire surface of the synchronization core.
//!
//! Serialization is owned by the embedding multiplayer layer; these are
//! the payloads it is handed. The mapping batch shape (chunked entries,
//! `is_full_snapshot` on the first chunk only, one shared version) is the
//! one structure the core dictates directly.

use crate::features::junction_restrictions::JunctionRestrictionsState;
use crate::features::lane_arrows::LaneArrowState;
use crate::features::lane_connections::LaneConnectionsState;
use crate::features::parking_restrictions::ParkingRestrictionsState;
use crate::features::priority_signs::PrioritySignState;
use crate::features::speed_limits::SpeedLimitState;
use crate::features::traffic_lights::TrafficLightState;
use crate::features::vehicle_restrictions::VehicleRestrictionsState;
use crate::identity::LaneGuid;
use crate::types::{LaneId, MappingVersion, NodeId, PrefabId, SegmentId};

/// Cross-machine lane reference: the stable guid plus the authority's
/// numeric lane id as a mapping-table hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneRef {
    pub guid: LaneGuid,
    pub host_lane: LaneId,
}

/// One end of a segment, anchored at a junction node. Node and segment
/// ids ride the wire raw; only lanes get stabilized identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentEnd {
    pub node: NodeId,
    pub segment: SegmentId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneMappingEntryMsg {
    pub segment: SegmentId,
    pub ordinal: u8,
    pub host_lane: LaneId,
    pub guid: LaneGuid,
}

/// One chunk of a mapping snapshot. `is_full_snapshot` is true only on
/// the first chunk of a full resync; the receiver clears its table on
/// that chunk and applies the rest cumulatively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaneMappingBatch {
    pub entries: Vec<LaneMappingEntryMsg>,
    pub is_full_snapshot: bool,
    pub version: MappingVersion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneMappingChanged {
    pub entry: LaneMappingEntryMsg,
    pub version: MappingVersion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneMappingRemoved {
    pub segment: SegmentId,
    pub ordinal: u8,
    pub version: MappingVersion,
}

/// A peer asks the authority to apply a state change.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRequest<T, S> {
    pub target: T,
    pub state: S,
    /// Mapping-store version the sender resolved its target against.
    pub mapping_version: MappingVersion,
}

/// The authority broadcasts the state it actually applied (readback), as
/// the new ground truth for every peer.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedCommand<T, S> {
    pub target: T,
    pub state: S,
    pub mapping_version: MappingVersion,
}

/// Per-prefab default speed limit; global state, no entity identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DefaultSpeedLimit {
    pub prefab: PrefabId,
    pub kmh: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityRef {
    Lane(LaneId),
    Node(NodeId),
    Segment(SegmentId),
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    EntityMissing,
    ApplyFailed,
    Unsupported,
}

impl RejectReason {
    pub fn label(self) -> &'static str {
        match self {
            RejectReason::EntityMissing => "entity_missing",
            RejectReason::ApplyFailed => "apply_failed",
            RejectReason::Unsupported => "unsupported",
        }
    }
}

/// Sent back to the originating client when its request permanently
/// failed, so its UI does not keep showing a setting that never took
/// effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestRejected {
    pub reason: RejectReason,
    pub entity: EntityRef,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyncCommand {
    LaneMappingBatch(LaneMappingBatch),
    LaneMappingChanged(LaneMappingChanged),
    LaneMappingRemoved(LaneMappingRemoved),

    SpeedLimitRequest(UpdateRequest<LaneRef, SpeedLimitState>),
    SpeedLimitApplied(AppliedCommand<LaneRef, SpeedLimitState>),
    LaneArrowsRequest(UpdateRequest<LaneRef, LaneArrowState>),
    LaneArrowsApplied(AppliedCommand<LaneRef, LaneArrowState>),
    LaneConnectionsRequest(UpdateRequest<SegmentEnd, LaneConnectionsState>),
    LaneConnectionsApplied(AppliedCommand<SegmentEnd, LaneConnectionsState>),
    JunctionRestrictionsRequest(UpdateRequest<NodeId, JunctionRestrictionsState>),
    JunctionRestrictionsApplied(AppliedCommand<NodeId, JunctionRestrictionsState>),
    ParkingRestrictionsRequest(UpdateRequest<SegmentId, ParkingRestrictionsState>),
    ParkingRestrictionsApplied(AppliedCommand<SegmentId, ParkingRestrictionsState>),
    PrioritySignRequest(UpdateRequest<SegmentEnd, PrioritySignState>),
    PrioritySignApplied(AppliedCommand<SegmentEnd, PrioritySignState>),
    TrafficLightRequest(UpdateRequest<NodeId, TrafficLightState>),
    TrafficLightApplied(AppliedCommand<NodeId, TrafficLightState>),
    VehicleRestrictionsRequest(UpdateRequest<LaneRef, VehicleRestrictionsState>),
    VehicleRestrictionsApplied(AppliedCommand<LaneRef, VehicleRestrictionsState>),

    DefaultSpeedLimitRequest(DefaultSpeedLimit),
    DefaultSpeedLimitApplied(DefaultSpeedLimit),
    ClearTrafficRequest,
    ClearTrafficApplied,

    RequestRejected(RequestRejected),
}
