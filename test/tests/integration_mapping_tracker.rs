//! Tracker-level integration: promotion snapshots, per-entry removal
//! broadcasts, and the periodic validator's drift/prune/discovery
//! handling — all driven through the host runtime.

use std::sync::Arc;

use lanesync_server::HostRuntime;
use lanesync_shared::{
    HostType, RoadNetwork, SyncCommand, SyncConfig, SyncContext, Transport,
};
use lanesync_test::{memory_engines, EngineState, RecordingTransport, SentTo, TestRoadNetwork};

fn start_host() -> (
    HostRuntime,
    Arc<TestRoadNetwork>,
    Arc<RecordingTransport>,
    EngineState,
) {
    let net = Arc::new(TestRoadNetwork::new());
    let transport = Arc::new(RecordingTransport::new());
    let engine_state = EngineState::new();
    let context = Arc::new(SyncContext::new(HostType::Server, SyncConfig::default()));
    net.add_segment(1, 7, 3);
    let runtime = HostRuntime::new(
        context,
        net.clone() as Arc<dyn RoadNetwork>,
        transport.clone() as Arc<dyn Transport>,
        memory_engines(&engine_state),
    );
    (runtime, net, transport, engine_state)
}

#[test]
fn promotion_walk_broadcasts_full_snapshot() {
    let (runtime, _net, transport, _engines) = start_host();

    // Three lanes discovered: three upserts, version 3, one chunk with
    // the full-snapshot flag set.
    assert_eq!(runtime.context().mapping.version(), 3);
    assert_eq!(runtime.context().mapping.len(), 3);

    let sent = transport.take();
    let batches: Vec<_> = sent
        .iter()
        .filter_map(|(to, command)| match command {
            SyncCommand::LaneMappingBatch(batch) => Some((*to, batch.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(batches.len(), 1);
    let (to, batch) = &batches[0];
    assert_eq!(*to, SentTo::All);
    assert!(batch.is_full_snapshot);
    assert_eq!(batch.entries.len(), 3);
    assert_eq!(batch.version, 3);
    for entry in &batch.entries {
        assert_eq!(entry.segment, 1);
        assert!(entry.guid.is_valid());
        assert_ne!(entry.host_lane, 0);
    }
}

#[test]
fn segment_release_broadcasts_one_removal_per_entry() {
    let (mut runtime, net, transport, _engines) = start_host();
    transport.take();
    let version_before = runtime.context().mapping.version();

    net.remove_segment(1);
    runtime.handle_segment_released(1);

    let removals: Vec<_> = transport
        .take()
        .into_iter()
        .filter_map(|(_, command)| match command {
            SyncCommand::LaneMappingRemoved(msg) => Some(msg),
            _ => None,
        })
        .collect();
    assert_eq!(removals.len(), 3);

    // Each removal bumps the version individually.
    let mut last = version_before;
    for removal in &removals {
        assert!(removal.version > last);
        last = removal.version;
    }
    assert_eq!(runtime.context().mapping.len(), 0);
}

#[test]
fn validator_detects_in_place_rebuild() {
    let (mut runtime, net, transport, _engines) = start_host();
    transport.take();

    let new_lanes = net.rebuild_segment(1);
    let interval = SyncConfig::default().validation_interval_frames;
    runtime.tick(interval);

    let changes: Vec<_> = transport
        .take()
        .into_iter()
        .filter_map(|(_, command)| match command {
            SyncCommand::LaneMappingChanged(msg) => Some(msg),
            _ => None,
        })
        .collect();
    assert_eq!(changes.len(), 3, "every lane of the rebuilt segment resyncs");
    for change in &changes {
        assert!(new_lanes.contains(&change.entry.host_lane));
    }

    // The store now maps the new lane ids.
    for entry in runtime.context().mapping.snapshot() {
        assert!(new_lanes.contains(&entry.host_lane));
    }
}

#[test]
fn validator_prunes_vanished_segments() {
    let (mut runtime, net, transport, _engines) = start_host();
    transport.take();

    // Segment disappears without any release hook firing.
    net.remove_segment(1);
    let interval = SyncConfig::default().validation_interval_frames;
    runtime.tick(interval);

    let removals = transport
        .take()
        .into_iter()
        .filter(|(_, command)| matches!(command, SyncCommand::LaneMappingRemoved(_)))
        .count();
    assert_eq!(removals, 3);
    assert_eq!(runtime.context().mapping.len(), 0);
}

#[test]
fn validator_discovers_unseen_segments() {
    let (mut runtime, net, transport, _engines) = start_host();
    transport.take();

    net.add_segment(2, 9, 2);
    let interval = SyncConfig::default().validation_interval_frames;
    runtime.tick(interval);

    let changes: Vec<_> = transport
        .take()
        .into_iter()
        .filter_map(|(_, command)| match command {
            SyncCommand::LaneMappingChanged(msg) => Some(msg),
            _ => None,
        })
        .collect();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|msg| msg.entry.segment == 2));
    assert_eq!(runtime.context().mapping.len(), 5);
}

#[test]
fn connect_resync_targets_single_client() {
    let (mut runtime, _net, transport, _engines) = start_host();
    transport.take();

    runtime.client_connected(9);

    let sent = transport.take();
    assert!(
        sent.iter().all(|(to, _)| *to == SentTo::Client(9)),
        "a connect resync must not broadcast"
    );
    let batch = sent
        .iter()
        .find_map(|(_, command)| match command {
            SyncCommand::LaneMappingBatch(batch) => Some(batch.clone()),
            _ => None,
        })
        .expect("mapping snapshot for the connecting client");
    assert!(batch.is_full_snapshot);
    assert_eq!(batch.entries.len(), 3);
}
