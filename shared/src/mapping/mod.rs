mod store;

pub use store::{LaneMappingStore, MappingEntry, UpsertOutcome};
