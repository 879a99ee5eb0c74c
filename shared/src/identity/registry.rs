use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::identity::{IdentityError, LaneGuid, LaneSlotKey};
use crate::road_network::RoadNetwork;
use crate::types::{LaneId, SegmentId};

/// Manufactures and resolves location-derived guids for network lanes.
///
/// Guids are minted only while automatic generation is enabled (the
/// authoritative peer); clients consume explicit assignments pushed by the
/// authority and never mint their own, which keeps guids globally unique
/// without any coordination.
///
/// Slot state survives lane release: a lane re-created in the same
/// structural slot shortly after (engine-triggered flag resets, quick
/// undo/redo) picks its predecessor's guid back up, while a slot whose
/// guid was displaced or invalidated mints a fresh one with the next
/// sequence number so stale references can never collide.
pub struct LaneGuidRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<LaneId, LaneEntry>,
    guid_to_lane: HashMap<LaneGuid, LaneId>,
    slot_states: HashMap<LaneSlotKey, SlotState>,
    automatic_generation: bool,
}

#[derive(Default)]
struct LaneEntry {
    guid: LaneGuid,
    slot: Option<LaneSlotKey>,
    active: bool,
}

struct SlotState {
    next_sequence: u32,
    has_active_lane: bool,
    /// Most recent guid of this slot, kept across lane release so the
    /// slot's identity survives a remove/re-add cycle.
    last_guid: LaneGuid,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            next_sequence: 1,
            has_active_lane: false,
            last_guid: LaneGuid::INVALID,
        }
    }
}

impl Default for LaneGuidRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneGuidRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                guid_to_lane: HashMap::new(),
                slot_states: HashMap::new(),
                automatic_generation: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Guid currently bound to `lane`, refreshing the reverse index on hit.
    pub fn try_get(&self, lane: LaneId) -> Option<LaneGuid> {
        if lane == 0 {
            return None;
        }
        let mut guard = self.lock();
        let inner = &mut *guard;
        let entry = inner.entries.get(&lane)?;
        if !entry.active {
            return None;
        }
        let guid = entry.guid;
        inner.guid_to_lane.insert(guid, lane);
        Some(guid)
    }

    /// Existing guid of `lane`, the dormant guid of the lane's slot, or a
    /// freshly minted one. Returns `None` when the lane cannot be located
    /// in the network, or when minting is disabled and no explicit
    /// assignment has arrived yet.
    pub fn get_or_create(&self, net: &dyn RoadNetwork, lane: LaneId) -> Option<LaneGuid> {
        if lane == 0 {
            return None;
        }
        if let Some(cached) = self.try_get(lane) {
            return Some(cached);
        }
        let slot = LaneSlotKey::from(net.lane_slot(lane)?);
        self.lock().ensure_registration(lane, slot)
    }

    /// Resolve a guid to the local lane currently occupying its slot.
    ///
    /// Exact reverse lookup first; on miss, a structural scan of the
    /// guid's segment. The scan tolerates a build-index mismatch (the
    /// segment was rebuilt in place) and re-binds the guid to the new
    /// lane, but refuses to displace a lane that already carries a
    /// different active guid — resolving anything but the most recent
    /// guid of a slot fails.
    pub fn try_resolve(&self, net: &dyn RoadNetwork, guid: LaneGuid) -> Option<LaneId> {
        if !guid.is_valid() {
            return None;
        }

        {
            let guard = self.lock();
            if let Some(&lane) = guard.guid_to_lane.get(&guid) {
                if net.lane_exists(lane) {
                    return Some(lane);
                }
            }
        }

        let lane = find_lane_for_guid(net, &guid)?;
        match self.assign(net, lane, guid, false) {
            Ok(()) => Some(lane),
            Err(err) => {
                debug!(
                    "lane guid structural re-bind refused | lane={} guid={:?} reason={}",
                    lane, guid, err
                );
                None
            }
        }
    }

    /// Force-install a guid produced elsewhere (a mapping broadcast from
    /// the authority). Validates the guid still matches the lane's
    /// structural signature; a build-index mismatch is tolerated and
    /// logged as a relaxed match.
    pub fn assign(
        &self,
        net: &dyn RoadNetwork,
        lane: LaneId,
        guid: LaneGuid,
        overwrite: bool,
    ) -> Result<(), IdentityError> {
        if !guid.is_valid() {
            return Err(IdentityError::InvalidGuid);
        }
        if lane == 0 || !net.lane_exists(lane) {
            return Err(IdentityError::LaneMissing { lane });
        }

        let mut guard = self.lock();
        let inner = &mut *guard;

        let mut slot = match inner.entries.get(&lane).and_then(|entry| entry.slot) {
            Some(slot) => slot,
            None => match net.lane_slot(lane) {
                Some(slot) => LaneSlotKey::from(slot),
                None => return Err(IdentityError::LaneMissing { lane }),
            },
        };

        if !slot.matches(&guid) {
            // The cached slot may be stale; recompute before rejecting.
            slot = match net.lane_slot(lane) {
                Some(fresh) => LaneSlotKey::from(fresh),
                None => return Err(IdentityError::LaneMissing { lane }),
            };
            if !slot.matches(&guid) {
                return Err(IdentityError::SlotMismatch { lane });
            }
        }

        let strict = slot.matches_strict(&guid);

        let (was_active, old_guid) = {
            let entry = inner.entries.entry(lane).or_default();
            entry.slot = Some(slot);
            (entry.active, entry.guid)
        };

        if was_active {
            if old_guid == guid {
                inner.guid_to_lane.insert(guid, lane);
                if !strict {
                    debug!("lane guid relaxed match | lane={} guid={:?}", lane, guid);
                }
                return Ok(());
            }
            if !overwrite {
                return Err(IdentityError::AlreadyBound { lane });
            }
            inner.guid_to_lane.remove(&old_guid);
        }

        if let Some(entry) = inner.entries.get_mut(&lane) {
            entry.guid = guid;
            entry.active = true;
        }
        inner.guid_to_lane.insert(guid, lane);
        inner.mark_slot_active(slot, guid);
        if !strict {
            debug!("lane guid relaxed match | lane={} guid={:?}", lane, guid);
        }
        Ok(())
    }

    /// Minting is enabled only on the authoritative side. Disabling also
    /// drops all per-slot sequence state — a demoted authority must not
    /// keep manufacturing identities.
    pub fn set_automatic_generation(&self, enabled: bool) {
        let mut guard = self.lock();
        guard.automatic_generation = enabled;
        if !enabled {
            guard.slot_states.clear();
        }
    }

    pub fn automatic_generation(&self) -> bool {
        self.lock().automatic_generation
    }

    /// Drop everything and re-register every created lane in the live
    /// network. No-op beyond the clear when minting is disabled.
    pub fn rebuild(&self, net: &dyn RoadNetwork) {
        self.clear();
        if !self.automatic_generation() {
            return;
        }
        for segment in net.segment_ids() {
            self.refresh_segment(net, segment);
        }
    }

    /// Register (or refresh) every created lane of one segment.
    pub fn refresh_segment(&self, net: &dyn RoadNetwork, segment: SegmentId) {
        let Some(build_index) = net.segment_build_index(segment) else {
            return;
        };
        let Some(prefab) = net.segment_prefab(segment) else {
            return;
        };
        let lanes = net.segment_lanes(segment);
        let mut guard = self.lock();
        for (ordinal, lane) in lanes {
            let slot = LaneSlotKey {
                segment,
                build_index,
                prefab,
                ordinal,
            };
            guard.ensure_registration(lane, slot);
        }
    }

    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.guid_to_lane.clear();
        guard.slot_states.clear();
    }

    /// Deactivate a guid and forget it as its slot's dormant identity:
    /// the next lane in the slot mints a fresh sequence instead of
    /// picking this guid back up.
    pub fn invalidate(&self, guid: LaneGuid) {
        if !guid.is_valid() {
            return;
        }
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(lane) = inner.guid_to_lane.remove(&guid) else {
            return;
        };
        let Some(entry) = inner.entries.get_mut(&lane) else {
            return;
        };
        if !entry.active || entry.guid != guid {
            return;
        }
        entry.guid = LaneGuid::INVALID;
        entry.active = false;
        let slot = entry.slot;
        if let Some(slot) = slot {
            if let Some(state) = inner.slot_states.get_mut(&slot) {
                state.has_active_lane = false;
                state.last_guid = LaneGuid::INVALID;
            }
        }
    }

    /// The lane was released by the simulation. The binding is
    /// deactivated, not deleted: the slot keeps both its sequence counter
    /// and its guid, so a lane re-created in the same slot reuses the
    /// identity.
    pub fn handle_lane_released(&self, lane: LaneId) {
        if lane == 0 {
            return;
        }
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(&lane) else {
            return;
        };
        let was_active = entry.active;
        let guid = entry.guid;
        let slot = entry.slot;
        entry.active = false;
        if was_active {
            inner.guid_to_lane.remove(&guid);
        }
        if let Some(slot) = slot {
            if let Some(state) = inner.slot_states.get_mut(&slot) {
                state.has_active_lane = false;
            }
        }
    }

    /// The owning segment was released: every entry and slot state under
    /// it goes away.
    pub fn handle_segment_released(&self, segment: SegmentId) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.slot_states.retain(|slot, _| slot.segment != segment);

        let doomed: Vec<LaneId> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.slot.is_some_and(|slot| slot.segment == segment))
            .map(|(&lane, _)| lane)
            .collect();
        for lane in doomed {
            if let Some(entry) = inner.entries.remove(&lane) {
                if entry.active {
                    inner.guid_to_lane.remove(&entry.guid);
                }
            }
        }
    }
}

impl Inner {
    fn ensure_registration(&mut self, lane: LaneId, slot: LaneSlotKey) -> Option<LaneGuid> {
        let (active, cached_guid) = {
            let entry = self.entries.entry(lane).or_default();
            entry.slot = Some(slot);
            (entry.active, entry.guid)
        };

        if active {
            self.guid_to_lane.insert(cached_guid, lane);
            self.mark_slot_active(slot, cached_guid);
            return Some(cached_guid);
        }

        // A briefly deactivated binding of the same lane id (engine
        // flag reset) revives as long as nothing else claimed the guid.
        if cached_guid.is_valid()
            && slot.matches(&cached_guid)
            && !self.guid_to_lane.contains_key(&cached_guid)
        {
            if let Some(entry) = self.entries.get_mut(&lane) {
                entry.active = true;
            }
            self.guid_to_lane.insert(cached_guid, lane);
            self.mark_slot_active(slot, cached_guid);
            return Some(cached_guid);
        }

        // A different lane id in a known slot picks up the slot's
        // dormant guid: the slot's identity survives remove/re-add.
        if let Some(state) = self.slot_states.get(&slot) {
            let dormant = state.last_guid;
            if !state.has_active_lane
                && dormant.is_valid()
                && slot.matches(&dormant)
                && !self.guid_to_lane.contains_key(&dormant)
            {
                if let Some(entry) = self.entries.get_mut(&lane) {
                    entry.guid = dormant;
                    entry.active = true;
                }
                self.guid_to_lane.insert(dormant, lane);
                self.mark_slot_active(slot, dormant);
                return Some(dormant);
            }
        }

        if !self.automatic_generation {
            return None;
        }

        let state = self.slot_states.entry(slot).or_default();
        let mut sequence = state.next_sequence;
        // The sequence is never zero and skips the max sentinel.
        if sequence == 0 || sequence == u32::MAX {
            sequence = 1;
        }
        state.next_sequence = sequence.wrapping_add(1);
        state.has_active_lane = true;

        let guid = LaneGuid::new(slot, sequence);
        state.last_guid = guid;
        if let Some(entry) = self.entries.get_mut(&lane) {
            entry.guid = guid;
            entry.active = true;
        }
        self.guid_to_lane.insert(guid, lane);
        Some(guid)
    }

    fn mark_slot_active(&mut self, slot: LaneSlotKey, guid: LaneGuid) {
        if !self.automatic_generation {
            return;
        }
        let state = self.slot_states.entry(slot).or_default();
        state.has_active_lane = true;
        state.last_guid = guid;
    }
}

/// Locate the local lane sitting in the slot a guid describes, if any.
/// Build-index drift is logged and tolerated; a prefab or ordinal
/// mismatch is not.
fn find_lane_for_guid(net: &dyn RoadNetwork, guid: &LaneGuid) -> Option<LaneId> {
    if !net.segment_exists(guid.segment) {
        return None;
    }
    let actual_build = net.segment_build_index(guid.segment)?;
    if actual_build != guid.build_index {
        debug!(
            "lane guid build index mismatch | segment={} expected={} actual={} action=remap",
            guid.segment, guid.build_index, actual_build
        );
    }
    if net.segment_prefab(guid.segment)? != guid.prefab {
        return None;
    }
    net.segment_lanes(guid.segment)
        .into_iter()
        .find(|(ordinal, _)| *ordinal == guid.ordinal)
        .map(|(_, lane)| lane)
}
