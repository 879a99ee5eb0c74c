use crate::features::EngineError;
use crate::types::PrefabId;

/// Non-entity service surface of the traffic engine: global actions and
/// per-prefab defaults. These carry no identity to stabilize, so they
/// bypass the coordinator machinery and are handled by the runtimes
/// directly.
pub trait TrafficServiceEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    /// Despawn all active traffic.
    fn clear_traffic(&mut self) -> Result<(), EngineError>;

    fn try_get_default_speed_limit(&self, prefab: PrefabId) -> Option<f32>;

    fn apply_default_speed_limit(&mut self, prefab: PrefabId, kmh: f32)
        -> Result<(), EngineError>;
}

pub struct UnsupportedTrafficServiceEngine;

impl TrafficServiceEngine for UnsupportedTrafficServiceEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn clear_traffic(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Rejected {
            reason: "traffic_service_unbound",
        })
    }

    fn try_get_default_speed_limit(&self, _prefab: PrefabId) -> Option<f32> {
        None
    }

    fn apply_default_speed_limit(
        &mut self,
        _prefab: PrefabId,
        _kmh: f32,
    ) -> Result<(), EngineError> {
        Err(EngineError::Rejected {
            reason: "traffic_service_unbound",
        })
    }
}
