//! # Lanesync Server
//! Authoritative-side orchestration: walks the live road network to keep
//! the versioned lane mapping current, answers peers' update requests
//! through the apply pipeline (resolve, lock, apply, readback,
//! broadcast), and resynchronizes reconnecting clients from the state
//! caches.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod runtime;
mod snapshot;
mod tracker;

pub use runtime::HostRuntime;
pub use snapshot::{SnapshotDispatcher, SnapshotScope};
pub use tracker::LaneMappingTracker;
