//! # Lanesync Shared
//! Common functionality shared between lanesync-server & lanesync-client crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod cache;
mod config;
mod context;
mod road_network;
mod timer;
mod transport;
mod types;

pub mod apply;
pub mod features;
pub mod identity;
pub mod mapping;
pub mod messages;

pub use cache::StateCache;
pub use config::SyncConfig;
pub use context::SyncContext;
pub use road_network::{LaneSlot, RoadNetwork};
pub use timer::FrameTimer;
pub use transport::Transport;
pub use types::{ClientId, Frame, HostType, LaneId, MappingVersion, NodeId, PrefabId, SegmentId};

pub use apply::{
    coordinator::{ApplyCoordinator, ApplyEvent, ApplyOrigin, ApplyOutcome},
    deferred::{DeferredApplyQueue, PendingOperation, PendingPrecondition, PendingTarget},
    guard::{local_apply_active, LocalApplyGuard},
    locks::{EntityLockGuard, EntityLockRegistry},
};
pub use features::{
    junction_restrictions::{
        JunctionRestrictions, JunctionRestrictionsEngine, JunctionRestrictionsState,
    },
    lane_arrows::{LaneArrowEngine, LaneArrowState, LaneArrows},
    lane_connections::{
        LaneConnectionEngine, LaneConnectionEntry, LaneConnections, LaneConnectionsState,
    },
    parking_restrictions::{ParkingRestrictionEngine, ParkingRestrictions, ParkingRestrictionsState},
    priority_signs::{PrioritySign, PrioritySignEngine, PrioritySignState, PrioritySigns},
    speed_limits::{SpeedLimitEngine, SpeedLimitState, SpeedLimits},
    traffic_lights::{TrafficLightEngine, TrafficLightState, TrafficLights},
    traffic_service::TrafficServiceEngine,
    vehicle_restrictions::{
        vehicle_mask, VehicleRestrictionEngine, VehicleRestrictions, VehicleRestrictionsState,
    },
    pending_precondition, EngineError, FeatureKind, SyncFeature, TargetResolver, TrafficEngines,
};
pub use identity::{IdentityError, LaneGuid, LaneGuidRegistry, LaneSlotKey};
pub use mapping::{LaneMappingStore, MappingEntry, UpsertOutcome};
pub use messages::{
    AppliedCommand, DefaultSpeedLimit, EntityRef, LaneMappingBatch, LaneMappingChanged,
    LaneMappingEntryMsg, LaneMappingRemoved, LaneRef, RejectReason, RequestRejected, SegmentEnd,
    SyncCommand, UpdateRequest,
};
