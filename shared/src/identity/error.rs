use thiserror::Error;

use crate::types::LaneId;

/// Errors that can occur while binding a lane guid to a local lane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The guid is the all-zero invalid sentinel.
    #[error("lane guid is the invalid sentinel")]
    InvalidGuid,

    /// The lane does not exist in the local road network.
    #[error("lane {lane} does not exist locally")]
    LaneMissing { lane: LaneId },

    /// The guid's structural signature (segment, prefab, ordinal) does not
    /// match the lane's current slot, even after a slot refresh.
    #[error("lane {lane} does not sit in the slot the guid describes")]
    SlotMismatch { lane: LaneId },

    /// A different guid is already actively bound to the lane and the
    /// caller did not request an overwrite.
    #[error("lane {lane} is already bound to a different guid")]
    AlreadyBound { lane: LaneId },
}
