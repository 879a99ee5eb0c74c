use thiserror::Error;

use crate::features::FeatureKind;

/// Outcome taxonomy of a traffic-engine call.
///
/// Transient errors are worth retrying: the engine manager may not be
/// initialized yet, or the target entity has not resolved locally.
/// Everything else is a permanent reject reported straight back to the
/// request's originator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// No engine adapter is bound for this feature on this machine.
    #[error("no engine is bound for {feature:?}")]
    Unsupported { feature: FeatureKind },

    /// The engine exists but is not ready to take this call yet.
    #[error("engine is not ready: {reason}")]
    NotReady { reason: &'static str },

    /// The target entity is missing from the local simulation.
    #[error("target entity is missing")]
    EntityMissing,

    /// The engine refused the request; retrying will not help.
    #[error("engine rejected the request: {reason}")]
    Rejected { reason: &'static str },
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::NotReady { .. } | EngineError::EntityMissing
        )
    }
}
