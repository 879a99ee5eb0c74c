//! Keeps the lane mapping store in sync with the live road network and
//! broadcasts changes to connected peers.
//!
//! State machine per tracked segment: unknown -> synced ->
//! (structurally changed -> synced) -> removed. A validator pass every
//! `validation_interval_frames` re-reads every live segment's build
//! counter: drift means the segment was rebuilt in place and gets a full
//! resync, segments that vanished are pruned, segments never seen before
//! are discovered. This self-heals any hook the event surface missed.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use lanesync_shared::{
    ClientId, Frame, FrameTimer, LaneMappingBatch, LaneMappingChanged, LaneMappingEntryMsg,
    LaneMappingRemoved, MappingVersion, RoadNetwork, SegmentId, SyncCommand, SyncConfig,
    SyncContext, Transport, UpsertOutcome,
};

use crate::snapshot::SnapshotDispatcher;

pub struct LaneMappingTracker {
    observed_builds: HashMap<SegmentId, u32>,
    validator: FrameTimer,
    batch_size: usize,
}

impl LaneMappingTracker {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            observed_builds: HashMap::new(),
            validator: FrameTimer::new(config.validation_interval_frames),
            batch_size: config.mapping_batch_size,
        }
    }

    /// Full network walk: refresh every segment's rows, prune stale ones,
    /// then push the complete table as a chunked snapshot — to one client
    /// during a connect resync, to everyone otherwise.
    pub fn sync_all_segments(
        &mut self,
        context: &SyncContext,
        net: &dyn RoadNetwork,
        transport: &dyn Transport,
        snapshots: &SnapshotDispatcher,
        reason: &str,
        target: Option<ClientId>,
    ) {
        for segment in net.segment_ids() {
            self.sync_segment_internal(context, net, transport, snapshots, segment);
        }
        self.broadcast_snapshot(context, transport, reason, target);
    }

    /// Incremental resync of one segment; changed rows go out as
    /// individual change messages.
    pub fn sync_segment(
        &mut self,
        context: &SyncContext,
        net: &dyn RoadNetwork,
        transport: &dyn Transport,
        snapshots: &SnapshotDispatcher,
        segment: SegmentId,
        reason: &str,
    ) {
        let updates = self.sync_segment_internal(context, net, transport, snapshots, segment);
        for (entry, version) in updates {
            debug!(
                "lane mapping broadcast | segment={} ordinal={} host_lane={} version={} reason={}",
                entry.segment, entry.ordinal, entry.host_lane, version, reason
            );
            send(
                transport,
                snapshots,
                SyncCommand::LaneMappingChanged(LaneMappingChanged { entry, version }),
            );
        }
    }

    /// Drop every row under a segment, broadcasting one removal per row —
    /// each removal bumps the store version individually.
    pub fn remove_segment(
        &mut self,
        context: &SyncContext,
        transport: &dyn Transport,
        snapshots: &SnapshotDispatcher,
        segment: SegmentId,
        reason: &str,
    ) {
        self.observed_builds.remove(&segment);
        for entry in context.mapping.entries_for_segment(segment) {
            if let Some((_, version)) = context.mapping.remove(entry.segment, entry.ordinal) {
                debug!(
                    "lane mapping removed | segment={} ordinal={} version={} reason={}",
                    entry.segment, entry.ordinal, version, reason
                );
                send(
                    transport,
                    snapshots,
                    SyncCommand::LaneMappingRemoved(LaneMappingRemoved {
                        segment: entry.segment,
                        ordinal: entry.ordinal,
                        version,
                    }),
                );
            }
        }
    }

    /// Periodic validator. Call once per frame; runs a pass at the
    /// configured interval.
    pub fn tick(
        &mut self,
        context: &SyncContext,
        net: &dyn RoadNetwork,
        transport: &dyn Transport,
        snapshots: &SnapshotDispatcher,
        frame: Frame,
    ) {
        if !self.validator.ready(frame) {
            return;
        }
        self.validate(context, net, transport, snapshots);
    }

    fn validate(
        &mut self,
        context: &SyncContext,
        net: &dyn RoadNetwork,
        transport: &dyn Transport,
        snapshots: &SnapshotDispatcher,
    ) {
        let mut stale: HashSet<SegmentId> = HashSet::new();
        for entry in context.mapping.snapshot() {
            if !net.segment_exists(entry.segment) {
                stale.insert(entry.segment);
            }
        }
        for segment in stale {
            debug!("lane mapping pruned | segment={} reason=validator", segment);
            context.registry.handle_segment_released(segment);
            self.remove_segment(context, transport, snapshots, segment, "validator_prune");
        }

        for segment in net.segment_ids() {
            let Some(build) = net.segment_build_index(segment) else {
                continue;
            };
            match self.observed_builds.get(&segment) {
                Some(&observed) if observed == build => {}
                Some(&observed) => {
                    debug!(
                        "segment structurally changed | segment={} old_build={} new_build={}",
                        segment, observed, build
                    );
                    // The old physical lanes are gone; their guids must
                    // not survive into the rebuilt segment.
                    context.registry.handle_segment_released(segment);
                    context.registry.refresh_segment(net, segment);
                    self.sync_segment(
                        context,
                        net,
                        transport,
                        snapshots,
                        segment,
                        "structural_change",
                    );
                }
                None => {
                    self.sync_segment(context, net, transport, snapshots, segment, "discovered");
                }
            }
        }
    }

    fn sync_segment_internal(
        &mut self,
        context: &SyncContext,
        net: &dyn RoadNetwork,
        transport: &dyn Transport,
        snapshots: &SnapshotDispatcher,
        segment: SegmentId,
    ) -> Vec<(LaneMappingEntryMsg, MappingVersion)> {
        if !net.segment_exists(segment) {
            self.remove_segment(context, transport, snapshots, segment, "segment_missing");
            return Vec::new();
        }

        if let Some(build) = net.segment_build_index(segment) {
            self.observed_builds.insert(segment, build);
        }

        let mut updates = Vec::new();
        let mut live_ordinals: HashSet<u8> = HashSet::new();

        for (ordinal, lane) in net.segment_lanes(segment) {
            live_ordinals.insert(ordinal);
            let Some(guid) = context.registry.get_or_create(net, lane) else {
                continue;
            };
            let (outcome, version) = context.mapping.upsert_host_lane(guid, lane, segment, ordinal);
            if matches!(outcome, UpsertOutcome::Added | UpsertOutcome::Updated) {
                updates.push((
                    LaneMappingEntryMsg {
                        segment,
                        ordinal,
                        host_lane: lane,
                        guid,
                    },
                    version,
                ));
            }
            context.mapping.update_local_lane(segment, ordinal, lane);
        }

        // Rows whose ordinal slot is no longer populated are stale.
        for entry in context.mapping.entries_for_segment(segment) {
            if !live_ordinals.contains(&entry.ordinal) {
                if let Some((_, version)) = context.mapping.remove(segment, entry.ordinal) {
                    send(
                        transport,
                        snapshots,
                        SyncCommand::LaneMappingRemoved(LaneMappingRemoved {
                            segment,
                            ordinal: entry.ordinal,
                            version,
                        }),
                    );
                }
            }
        }

        updates
    }

    fn broadcast_snapshot(
        &self,
        context: &SyncContext,
        transport: &dyn Transport,
        reason: &str,
        target: Option<ClientId>,
    ) {
        let mut entries: Vec<LaneMappingEntryMsg> = context
            .mapping
            .snapshot()
            .into_iter()
            .map(|entry| LaneMappingEntryMsg {
                segment: entry.segment,
                ordinal: entry.ordinal,
                host_lane: entry.host_lane,
                guid: entry.guid,
            })
            .collect();
        if entries.is_empty() {
            return;
        }
        entries.sort_by_key(|entry| (entry.segment, entry.ordinal));

        let version = context.mapping.version();
        let total = entries.len();
        let mut first = true;
        for chunk in entries.chunks(self.batch_size) {
            let payload = SyncCommand::LaneMappingBatch(LaneMappingBatch {
                entries: chunk.to_vec(),
                is_full_snapshot: first,
                version,
            });
            match target {
                Some(client) => transport.send_to_client(client, payload),
                None => transport.send_to_all(payload),
            }
            first = false;
        }

        info!(
            "lane mapping snapshot broadcast | entries={} version={} reason={} target={}",
            total,
            version,
            reason,
            match target {
                Some(client) => format!("client:{client}"),
                None => "broadcast".to_string(),
            }
        );
    }
}

fn send(transport: &dyn Transport, snapshots: &SnapshotDispatcher, command: SyncCommand) {
    match snapshots.current_target() {
        Some(client) => transport.send_to_client(client, command),
        None => transport.send_to_all(command),
    }
}
