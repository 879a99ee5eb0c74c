//! Pending guid assignments: mapping rows whose lane has no local
//! counterpart yet.
//!
//! A broadcast row can arrive before the local simulation has created
//! the lane (road edits replicate through a separate channel and race
//! this one). Each unresolved guid is retried with a power-of-two
//! cooldown until it binds or its segment is clearly never coming.

use std::collections::HashMap;

use log::debug;

use lanesync_shared::{Frame, LaneGuid, RoadNetwork, SegmentId, SyncConfig, SyncContext};

struct PendingAssignment {
    segment: SegmentId,
    ordinal: u8,
    attempts: u32,
    cooldown: Frame,
}

pub struct PendingAssignments {
    entries: HashMap<LaneGuid, PendingAssignment>,
    max_attempts: u32,
    max_cooldown: Frame,
}

enum Outcome {
    Resolved,
    Drop,
    Retry,
}

impl PendingAssignments {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            entries: HashMap::new(),
            max_attempts: config.assignment_max_attempts,
            max_cooldown: config.assignment_max_cooldown_frames,
        }
    }

    /// Queue (or refresh) an unresolved guid. Re-queuing resets the
    /// cooldown so a fresh broadcast is acted on promptly.
    pub fn queue(&mut self, guid: LaneGuid, segment: SegmentId, ordinal: u8) {
        if !guid.is_valid() {
            return;
        }
        match self.entries.get_mut(&guid) {
            Some(existing) => {
                if segment != 0 {
                    existing.segment = segment;
                }
                existing.ordinal = ordinal;
                existing.cooldown = 0;
            }
            None => {
                self.entries.insert(
                    guid,
                    PendingAssignment {
                        segment,
                        ordinal,
                        attempts: 0,
                        cooldown: 0,
                    },
                );
            }
        }
    }

    pub fn remove_slot(&mut self, segment: SegmentId, ordinal: u8) {
        self.entries.retain(|guid, pending| {
            let slot_match = (pending.segment == segment && pending.ordinal == ordinal)
                || (guid.segment == segment && guid.ordinal == ordinal);
            !slot_match
        });
    }

    pub fn remove_for_segment(&mut self, segment: SegmentId) {
        self.entries
            .retain(|guid, pending| pending.segment != segment && guid.segment != segment);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One resolution pass; call once per frame.
    pub fn process(&mut self, context: &SyncContext, net: &dyn RoadNetwork) {
        if self.entries.is_empty() {
            return;
        }

        let guids: Vec<LaneGuid> = self.entries.keys().copied().collect();
        for guid in guids {
            let (segment, ordinal) = {
                let Some(pending) = self.entries.get_mut(&guid) else {
                    continue;
                };
                if pending.cooldown > 0 {
                    pending.cooldown -= 1;
                    continue;
                }
                let segment = if pending.segment != 0 {
                    pending.segment
                } else {
                    guid.segment
                };
                (segment, pending.ordinal)
            };

            let outcome = Self::attempt(context, net, guid, segment, ordinal);
            match outcome {
                Outcome::Resolved => {
                    debug!(
                        "pending lane assignment resolved | guid={:?} segment={}",
                        guid, segment
                    );
                    self.entries.remove(&guid);
                }
                Outcome::Drop => {
                    debug!(
                        "pending lane assignment dropped | guid={:?} segment={}",
                        guid, segment
                    );
                    self.entries.remove(&guid);
                }
                Outcome::Retry => {
                    if let Some(pending) = self.entries.get_mut(&guid) {
                        pending.attempts += 1;
                        if pending.attempts >= self.max_attempts
                            || !net.segment_exists(segment)
                        {
                            self.entries.remove(&guid);
                            continue;
                        }
                        let shift = u32::min(pending.attempts, 5);
                        pending.cooldown = Frame::min(self.max_cooldown, 1 << shift);
                    }
                }
            }
        }
    }

    fn attempt(
        context: &SyncContext,
        net: &dyn RoadNetwork,
        guid: LaneGuid,
        segment: SegmentId,
        ordinal: u8,
    ) -> Outcome {
        // The mapping store may have resolved meanwhile.
        if let Some(entry) = context.mapping.try_resolve_guid(guid) {
            if entry.local_resolved && entry.local_lane != 0 && net.lane_exists(entry.local_lane) {
                if context
                    .registry
                    .assign(net, entry.local_lane, guid, true)
                    .is_ok()
                {
                    return Outcome::Resolved;
                }
            }
        }

        // Structural scan: the slot may be populated now.
        if let Some(lane) = context.registry.try_resolve(net, guid) {
            context.mapping.update_local_lane(segment, ordinal, lane);
            return Outcome::Resolved;
        }

        if !net.segment_exists(segment) && !net.segment_exists(guid.segment) {
            return Outcome::Drop;
        }

        Outcome::Retry
    }
}
