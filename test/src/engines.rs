//! Memory-backed traffic engines. Each engine shares its backing table
//! with the [`EngineState`] handle the test keeps, so applied state can
//! be inspected and pre-seeded from outside.
//!
//! The speed limit engine clamps overrides to a fixed palette the way
//! the real engine does, which is what makes readback-before-broadcast
//! observable in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lanesync_shared::{
    EngineError, FeatureKind, JunctionRestrictionsEngine, JunctionRestrictionsState,
    LaneArrowEngine, LaneArrowState, LaneConnectionEngine, LaneConnectionsState, LaneId, NodeId,
    ParkingRestrictionEngine, ParkingRestrictionsState, PrefabId, PrioritySignEngine,
    PrioritySignState, SegmentEnd, SegmentId, SpeedLimitEngine, SpeedLimitState, TrafficEngines,
    TrafficLightEngine, TrafficLightState, TrafficServiceEngine, VehicleRestrictionEngine,
    VehicleRestrictionsState,
};

pub const SPEED_PALETTE: [f32; 14] = [
    10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 110.0, 120.0, 130.0, 140.0,
];

pub const DEFAULT_SPEED_KMH: f32 = 50.0;

fn clamp_to_palette(kmh: f32) -> f32 {
    let mut best = SPEED_PALETTE[0];
    let mut best_distance = (kmh - best).abs();
    for &candidate in &SPEED_PALETTE[1..] {
        let distance = (kmh - candidate).abs();
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    best
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared inspection handle over every memory engine's backing tables.
#[derive(Clone, Default)]
pub struct EngineState {
    pub speed_limits: Arc<Mutex<HashMap<LaneId, SpeedLimitState>>>,
    pub lane_arrows: Arc<Mutex<HashMap<LaneId, LaneArrowState>>>,
    pub lane_connections: Arc<Mutex<HashMap<SegmentEnd, LaneConnectionsState>>>,
    pub junction_restrictions: Arc<Mutex<HashMap<NodeId, JunctionRestrictionsState>>>,
    pub parking_restrictions: Arc<Mutex<HashMap<SegmentId, ParkingRestrictionsState>>>,
    pub priority_signs: Arc<Mutex<HashMap<SegmentEnd, PrioritySignState>>>,
    pub traffic_lights: Arc<Mutex<HashMap<NodeId, TrafficLightState>>>,
    pub vehicle_restrictions: Arc<Mutex<HashMap<LaneId, VehicleRestrictionsState>>>,
    pub default_speed_limits: Arc<Mutex<HashMap<PrefabId, f32>>>,
    pub clear_traffic_calls: Arc<Mutex<u32>>,
    transient_failures: Arc<Mutex<HashMap<FeatureKind, u32>>>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next `times` applies of a feature to fail transiently.
    pub fn fail_transiently(&self, kind: FeatureKind, times: u32) {
        lock(&self.transient_failures).insert(kind, times);
    }

    fn consume_failure(&self, kind: FeatureKind) -> bool {
        let mut failures = lock(&self.transient_failures);
        match failures.get_mut(&kind) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn speed_limit(&self, lane: LaneId) -> Option<SpeedLimitState> {
        lock(&self.speed_limits).get(&lane).copied()
    }

    pub fn traffic_light(&self, node: NodeId) -> Option<TrafficLightState> {
        lock(&self.traffic_lights).get(&node).copied()
    }

    pub fn junction(&self, node: NodeId) -> Option<JunctionRestrictionsState> {
        lock(&self.junction_restrictions).get(&node).copied()
    }

    pub fn clear_traffic_calls(&self) -> u32 {
        *lock(&self.clear_traffic_calls)
    }
}

/// A full engine set backed by the given state handle.
pub fn memory_engines(state: &EngineState) -> TrafficEngines {
    TrafficEngines {
        speed_limits: Box::new(MemorySpeedLimits {
            state: state.clone(),
        }),
        lane_arrows: Box::new(MemoryLaneArrows {
            state: state.clone(),
        }),
        lane_connections: Box::new(MemoryLaneConnections {
            state: state.clone(),
        }),
        junction_restrictions: Box::new(MemoryJunctionRestrictions {
            state: state.clone(),
        }),
        parking_restrictions: Box::new(MemoryParkingRestrictions {
            state: state.clone(),
        }),
        priority_signs: Box::new(MemoryPrioritySigns {
            state: state.clone(),
        }),
        traffic_lights: Box::new(MemoryTrafficLights {
            state: state.clone(),
        }),
        vehicle_restrictions: Box::new(MemoryVehicleRestrictions {
            state: state.clone(),
        }),
        traffic_service: Box::new(MemoryTrafficService {
            state: state.clone(),
        }),
    }
}

struct MemorySpeedLimits {
    state: EngineState,
}

impl SpeedLimitEngine for MemorySpeedLimits {
    fn try_get(&self, lane: LaneId) -> Option<SpeedLimitState> {
        Some(
            lock(&self.state.speed_limits)
                .get(&lane)
                .copied()
                .unwrap_or(SpeedLimitState {
                    kmh: None,
                    default_kmh: Some(DEFAULT_SPEED_KMH),
                }),
        )
    }

    fn apply(&mut self, lane: LaneId, state: &SpeedLimitState) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::SpeedLimits) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        if let Some(kmh) = state.kmh {
            if !(1.0..=400.0).contains(&kmh) {
                return Err(EngineError::Rejected {
                    reason: "speed_out_of_range",
                });
            }
        }
        let stored = SpeedLimitState {
            kmh: state.kmh.map(clamp_to_palette),
            default_kmh: Some(DEFAULT_SPEED_KMH),
        };
        lock(&self.state.speed_limits).insert(lane, stored);
        Ok(())
    }
}

struct MemoryLaneArrows {
    state: EngineState,
}

impl LaneArrowEngine for MemoryLaneArrows {
    fn try_get(&self, lane: LaneId) -> Option<LaneArrowState> {
        Some(
            lock(&self.state.lane_arrows)
                .get(&lane)
                .copied()
                .unwrap_or_default(),
        )
    }

    fn apply(&mut self, lane: LaneId, state: &LaneArrowState) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::LaneArrows) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        lock(&self.state.lane_arrows).insert(lane, *state);
        Ok(())
    }
}

struct MemoryLaneConnections {
    state: EngineState,
}

impl LaneConnectionEngine for MemoryLaneConnections {
    fn try_get(&self, end: SegmentEnd) -> Option<LaneConnectionsState> {
        Some(
            lock(&self.state.lane_connections)
                .get(&end)
                .cloned()
                .unwrap_or_default(),
        )
    }

    fn apply(&mut self, end: SegmentEnd, state: &LaneConnectionsState) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::LaneConnections) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        lock(&self.state.lane_connections).insert(end, state.clone());
        Ok(())
    }
}

struct MemoryJunctionRestrictions {
    state: EngineState,
}

impl JunctionRestrictionsEngine for MemoryJunctionRestrictions {
    fn try_get(&self, node: NodeId) -> Option<JunctionRestrictionsState> {
        Some(
            lock(&self.state.junction_restrictions)
                .get(&node)
                .copied()
                .unwrap_or(JunctionRestrictionsState {
                    allow_u_turns: Some(false),
                    allow_near_turn_on_red: Some(false),
                    allow_far_turn_on_red: Some(false),
                    allow_lane_changing_while_going_straight: Some(false),
                    allow_entering_blocked_junctions: Some(false),
                    allow_pedestrian_crossings: Some(true),
                }),
        )
    }

    fn apply(
        &mut self,
        node: NodeId,
        state: &JunctionRestrictionsState,
    ) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::JunctionRestrictions) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        // The engine keeps the full toggle set; a request only moves the
        // toggles it names.
        let mut merged = self.try_get(node).unwrap_or_default();
        merged.merge_from(state);
        lock(&self.state.junction_restrictions).insert(node, merged);
        Ok(())
    }
}

struct MemoryParkingRestrictions {
    state: EngineState,
}

impl ParkingRestrictionEngine for MemoryParkingRestrictions {
    fn try_get(&self, segment: SegmentId) -> Option<ParkingRestrictionsState> {
        Some(
            lock(&self.state.parking_restrictions)
                .get(&segment)
                .copied()
                .unwrap_or(ParkingRestrictionsState {
                    allow_parking_forward: Some(true),
                    allow_parking_backward: Some(true),
                }),
        )
    }

    fn apply(
        &mut self,
        segment: SegmentId,
        state: &ParkingRestrictionsState,
    ) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::ParkingRestrictions) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        let mut merged = self.try_get(segment).unwrap_or_default();
        if state.allow_parking_forward.is_some() {
            merged.allow_parking_forward = state.allow_parking_forward;
        }
        if state.allow_parking_backward.is_some() {
            merged.allow_parking_backward = state.allow_parking_backward;
        }
        lock(&self.state.parking_restrictions).insert(segment, merged);
        Ok(())
    }
}

struct MemoryPrioritySigns {
    state: EngineState,
}

impl PrioritySignEngine for MemoryPrioritySigns {
    fn try_get(&self, end: SegmentEnd) -> Option<PrioritySignState> {
        Some(
            lock(&self.state.priority_signs)
                .get(&end)
                .copied()
                .unwrap_or_default(),
        )
    }

    fn apply(&mut self, end: SegmentEnd, state: &PrioritySignState) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::PrioritySigns) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        lock(&self.state.priority_signs).insert(end, *state);
        Ok(())
    }
}

struct MemoryTrafficLights {
    state: EngineState,
}

impl TrafficLightEngine for MemoryTrafficLights {
    fn try_get(&self, node: NodeId) -> Option<TrafficLightState> {
        Some(
            lock(&self.state.traffic_lights)
                .get(&node)
                .copied()
                .unwrap_or_default(),
        )
    }

    fn apply(&mut self, node: NodeId, state: &TrafficLightState) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::TrafficLights) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        lock(&self.state.traffic_lights).insert(node, *state);
        Ok(())
    }
}

struct MemoryVehicleRestrictions {
    state: EngineState,
}

impl VehicleRestrictionEngine for MemoryVehicleRestrictions {
    fn try_get(&self, lane: LaneId) -> Option<VehicleRestrictionsState> {
        Some(
            lock(&self.state.vehicle_restrictions)
                .get(&lane)
                .copied()
                .unwrap_or_default(),
        )
    }

    fn apply(
        &mut self,
        lane: LaneId,
        state: &VehicleRestrictionsState,
    ) -> Result<(), EngineError> {
        if self.state.consume_failure(FeatureKind::VehicleRestrictions) {
            return Err(EngineError::NotReady {
                reason: "test_transient",
            });
        }
        lock(&self.state.vehicle_restrictions).insert(lane, *state);
        Ok(())
    }
}

struct MemoryTrafficService {
    state: EngineState,
}

impl TrafficServiceEngine for MemoryTrafficService {
    fn clear_traffic(&mut self) -> Result<(), EngineError> {
        *lock(&self.state.clear_traffic_calls) += 1;
        Ok(())
    }

    fn try_get_default_speed_limit(&self, prefab: PrefabId) -> Option<f32> {
        lock(&self.state.default_speed_limits).get(&prefab).copied()
    }

    fn apply_default_speed_limit(&mut self, prefab: PrefabId, kmh: f32) -> Result<(), EngineError> {
        lock(&self.state.default_speed_limits).insert(prefab, clamp_to_palette(kmh));
        Ok(())
    }
}
