/// Simulation-local numeric id of a lane. Not stable across machines.
pub type LaneId = u32;
/// Simulation-local numeric id of a road segment.
pub type SegmentId = u16;
/// Simulation-local numeric id of a junction node.
pub type NodeId = u16;
/// Prefab (road asset) identity, shared by all machines loading the same assets.
pub type PrefabId = u16;
/// Multiplayer peer id as assigned by the coordination layer.
pub type ClientId = u16;
/// Simulation frame counter. All retry/validation delays are frame-counted.
pub type Frame = u32;
/// Monotonic version stamp of the lane mapping store.
pub type MappingVersion = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }

    pub fn is_server(self) -> bool {
        self == HostType::Server
    }
}
