use std::sync::{Arc, Mutex, PoisonError};

use lanesync_shared::ClientId;

/// While a client-connect resync is in flight, broadcasts that would
/// normally go to everyone are redirected to just the connecting client,
/// so the rest of the session is not spammed with rows it already has.
#[derive(Default)]
pub struct SnapshotDispatcher {
    target: Mutex<Option<ClientId>>,
}

impl SnapshotDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_target(&self) -> Option<ClientId> {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scope all dispatcher-routed sends to one client until the returned
    /// guard drops.
    pub fn begin(self: &Arc<Self>, client: ClientId) -> SnapshotScope {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
        SnapshotScope {
            dispatcher: Arc::clone(self),
        }
    }
}

pub struct SnapshotScope {
    dispatcher: Arc<SnapshotDispatcher>,
}

impl Drop for SnapshotScope {
    fn drop(&mut self) {
        *self
            .dispatcher
            .target
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
