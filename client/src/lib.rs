//! # Lanesync Client
//! Client-side runtime: imports the authority's lane mapping, binds
//! broadcast guids to local lanes (deferring until the local simulation
//! catches up), and applies authoritative state with the echo guard
//! held.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod resolver;
mod runtime;

pub use resolver::PendingAssignments;
pub use runtime::ClientRuntime;
