mod error;
mod lane_guid;
mod registry;

pub use error::IdentityError;
pub use lane_guid::{LaneGuid, LaneSlotKey};
pub use registry::LaneGuidRegistry;
