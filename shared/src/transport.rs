use crate::messages::SyncCommand;
use crate::types::ClientId;

/// Seam to the multiplayer-coordination mod's command dispatch.
///
/// The core hands over typed commands and never serializes bytes itself;
/// wire encoding, reliability and session management belong to the
/// implementor.
pub trait Transport: Send + Sync {
    fn send_to_all(&self, command: SyncCommand);

    fn send_to_server(&self, command: SyncCommand);

    fn send_to_client(&self, client: ClientId, command: SyncCommand);
}
