use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::identity::LaneGuid;
use crate::types::{LaneId, MappingVersion, SegmentId};

/// One row of the mapping table: the association between a stable lane
/// slot, the authority's numeric lane id and (once resolved) the local
/// numeric lane id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    pub guid: LaneGuid,
    pub segment: SegmentId,
    pub ordinal: u8,
    /// The authority's numeric id for this lane. On the authority itself
    /// this equals `local_lane`.
    pub host_lane: LaneId,
    /// This machine's numeric id for the lane, once resolved.
    pub local_lane: LaneId,
    pub local_resolved: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Unchanged,
    Added,
    Updated,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    segment: SegmentId,
    ordinal: u8,
}

/// Versioned table of `{lane guid <-> numeric lane id}` associations,
/// scoped per owning segment.
///
/// Every logical change bumps a single monotonic version counter exactly
/// once — batched walks still bump per entry, which downstream diffing
/// and deferred operations rely on. No history is retained, only current
/// state plus the counter.
pub struct LaneMappingStore {
    inner: Mutex<Inner>,
}

struct Inner {
    by_key: HashMap<SlotKey, MappingEntry>,
    by_host_lane: HashMap<LaneId, SlotKey>,
    by_guid: HashMap<LaneGuid, SlotKey>,
    version: MappingVersion,
}

impl Default for LaneMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneMappingStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_key: HashMap::new(),
                by_host_lane: HashMap::new(),
                by_guid: HashMap::new(),
                version: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn version(&self) -> MappingVersion {
        self.lock().version
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_key.is_empty()
    }

    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.by_key.clear();
        guard.by_host_lane.clear();
        guard.by_guid.clear();
        guard.version = 0;
    }

    /// Authoritative-side upsert during a network walk. The host lane id
    /// doubles as the local lane id. Bumps the version only when the row
    /// actually changed.
    pub fn upsert_host_lane(
        &self,
        guid: LaneGuid,
        host_lane: LaneId,
        segment: SegmentId,
        ordinal: u8,
    ) -> (UpsertOutcome, MappingVersion) {
        let key = SlotKey { segment, ordinal };
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Some(existing) = inner.by_key.get_mut(&key) {
            if existing.host_lane == host_lane && existing.guid == guid {
                return (UpsertOutcome::Unchanged, inner.version);
            }
            if existing.host_lane != 0 {
                inner.by_host_lane.remove(&existing.host_lane);
            }
            if existing.guid.is_valid() {
                inner.by_guid.remove(&existing.guid);
            }
            existing.guid = guid;
            existing.host_lane = host_lane;
            existing.local_lane = host_lane;
            existing.local_resolved = true;
            inner.by_host_lane.insert(host_lane, key);
            if guid.is_valid() {
                inner.by_guid.insert(guid, key);
            }
            inner.version += 1;
            return (UpsertOutcome::Updated, inner.version);
        }

        inner.by_key.insert(
            key,
            MappingEntry {
                guid,
                segment,
                ordinal,
                host_lane,
                local_lane: host_lane,
                local_resolved: true,
            },
        );
        if host_lane != 0 {
            inner.by_host_lane.insert(host_lane, key);
        }
        if guid.is_valid() {
            inner.by_guid.insert(guid, key);
        }
        inner.version += 1;
        (UpsertOutcome::Added, inner.version)
    }

    /// Remove one row; bumps the version only when a row was present.
    pub fn remove(
        &self,
        segment: SegmentId,
        ordinal: u8,
    ) -> Option<(MappingEntry, MappingVersion)> {
        let key = SlotKey { segment, ordinal };
        let mut guard = self.lock();
        let inner = &mut *guard;
        let removed = inner.by_key.remove(&key)?;
        if removed.host_lane != 0 {
            inner.by_host_lane.remove(&removed.host_lane);
        }
        if removed.guid.is_valid() {
            inner.by_guid.remove(&removed.guid);
        }
        inner.version += 1;
        Some((removed, inner.version))
    }

    pub fn try_get(&self, segment: SegmentId, ordinal: u8) -> Option<MappingEntry> {
        let key = SlotKey { segment, ordinal };
        self.lock().by_key.get(&key).cloned()
    }

    pub fn try_resolve_host_lane(&self, host_lane: LaneId) -> Option<MappingEntry> {
        let guard = self.lock();
        let key = guard.by_host_lane.get(&host_lane)?;
        guard.by_key.get(key).cloned()
    }

    pub fn try_resolve_guid(&self, guid: LaneGuid) -> Option<MappingEntry> {
        let guard = self.lock();
        let key = guard.by_guid.get(&guid)?;
        guard.by_key.get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<MappingEntry> {
        self.lock().by_key.values().cloned().collect()
    }

    pub fn entries_for_segment(&self, segment: SegmentId) -> Vec<MappingEntry> {
        self.lock()
            .by_key
            .values()
            .filter(|entry| entry.segment == segment)
            .cloned()
            .collect()
    }

    /// Record the local lane id a remote row resolved to. Does not bump
    /// the version — resolution is local bookkeeping, not a table change.
    pub fn update_local_lane(&self, segment: SegmentId, ordinal: u8, local_lane: LaneId) {
        let key = SlotKey { segment, ordinal };
        let mut guard = self.lock();
        if let Some(entry) = guard.by_key.get_mut(&key) {
            entry.local_lane = local_lane;
            entry.local_resolved = true;
        }
    }

    /// Replace the whole table with an authoritative snapshot. Accepts
    /// `version >= current` so a re-sent snapshot is idempotent; an older
    /// one is rejected as stale.
    pub fn apply_remote_snapshot(
        &self,
        entries: &[MappingEntry],
        version: MappingVersion,
    ) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if version < inner.version {
            return false;
        }

        inner.by_key.clear();
        inner.by_host_lane.clear();
        inner.by_guid.clear();

        for entry in entries {
            let key = SlotKey {
                segment: entry.segment,
                ordinal: entry.ordinal,
            };
            inner.by_key.insert(key, entry.clone());
            if entry.host_lane != 0 {
                inner.by_host_lane.insert(entry.host_lane, key);
            }
            if entry.guid.is_valid() {
                inner.by_guid.insert(entry.guid, key);
            }
        }

        inner.version = version;
        true
    }

    /// Install one remote row change. Accepts `version >= current` so all
    /// chunks of one logical snapshot (which share a version) apply
    /// cumulatively; an older version is rejected as stale.
    pub fn apply_remote_change(
        &self,
        version: MappingVersion,
        guid: LaneGuid,
        host_lane: LaneId,
        segment: SegmentId,
        ordinal: u8,
    ) -> bool {
        let key = SlotKey { segment, ordinal };
        let mut guard = self.lock();
        let inner = &mut *guard;
        if version < inner.version {
            return false;
        }

        if let Some(existing) = inner.by_key.get_mut(&key) {
            if existing.host_lane != 0 {
                inner.by_host_lane.remove(&existing.host_lane);
            }
            if existing.guid.is_valid() {
                inner.by_guid.remove(&existing.guid);
            }
            existing.guid = guid;
            existing.host_lane = host_lane;
            existing.local_resolved = false;
        } else {
            inner.by_key.insert(
                key,
                MappingEntry {
                    guid,
                    segment,
                    ordinal,
                    host_lane,
                    local_lane: 0,
                    local_resolved: false,
                },
            );
        }

        if host_lane != 0 {
            inner.by_host_lane.insert(host_lane, key);
        }
        if guid.is_valid() {
            inner.by_guid.insert(guid, key);
        }
        inner.version = version;
        true
    }

    /// Install one remote row removal, with the same staleness rule as
    /// [`LaneMappingStore::apply_remote_change`].
    pub fn apply_remote_removal(
        &self,
        version: MappingVersion,
        segment: SegmentId,
        ordinal: u8,
    ) -> bool {
        let key = SlotKey { segment, ordinal };
        let mut guard = self.lock();
        let inner = &mut *guard;
        if version < inner.version {
            return false;
        }

        if let Some(removed) = inner.by_key.remove(&key) {
            if removed.host_lane != 0 {
                inner.by_host_lane.remove(&removed.host_lane);
            }
            if removed.guid.is_valid() {
                inner.by_guid.remove(&removed.guid);
            }
        }

        inner.version = version;
        true
    }
}
