use crate::apply::locks::EntityLockRegistry;
use crate::config::SyncConfig;
use crate::identity::LaneGuidRegistry;
use crate::mapping::LaneMappingStore;
use crate::types::HostType;

/// Shared state of one synchronization session.
///
/// Constructed once by the composition root and handed to the role
/// runtime; owning it in one place makes teardown and role transitions
/// explicit instead of scattering init flags across static registries.
pub struct SyncContext {
    pub host_type: HostType,
    pub config: SyncConfig,
    pub registry: LaneGuidRegistry,
    pub mapping: LaneMappingStore,
    pub locks: EntityLockRegistry,
}

impl SyncContext {
    pub fn new(host_type: HostType, config: SyncConfig) -> Self {
        let registry = LaneGuidRegistry::new();
        // Only the authority manufactures guids.
        registry.set_automatic_generation(host_type.is_server());
        Self {
            host_type,
            config,
            registry,
            mapping: LaneMappingStore::new(),
            locks: EntityLockRegistry::new(),
        }
    }

    /// Role loss or session end: stop minting and forget everything.
    /// A demoted authority must neither manufacture identities nor trust
    /// stale ones.
    pub fn reset(&self) {
        self.registry.set_automatic_generation(false);
        self.registry.clear();
        self.mapping.clear();
    }
}
