//! Test helpers for the lanesync crates: an in-memory road network, a
//! recording transport and memory-backed traffic engines.

pub mod engines;
pub mod road;

pub use engines::{memory_engines, EngineState};
pub use road::TestRoadNetwork;
pub use transport::{RecordingTransport, SentTo};
