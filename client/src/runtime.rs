//! Client runtime: the receiving half of the synchronization loop.
//!
//! Mapping broadcasts keep the local translation table current; applied
//! commands resolve their stable target to a local entity (parking in
//! the deferred queue when the entity has not materialized yet) and are
//! written to the engine with the echo guard held so the event-listener
//! shims stay quiet.

use std::sync::Arc;

use log::{debug, info, warn};

use lanesync_shared::{
    local_apply_active, pending_precondition, AppliedCommand, ApplyCoordinator, ApplyEvent,
    ApplyOrigin, DefaultSpeedLimit, DeferredApplyQueue, FeatureKind, Frame, JunctionRestrictions,
    LaneArrows, LaneConnections, LaneId, LaneMappingBatch, LaneMappingChanged, LaneMappingEntryMsg,
    LaneMappingRemoved, LocalApplyGuard, MappingEntry, ParkingRestrictions, PendingOperation,
    PrefabId, PrioritySigns, RoadNetwork, SegmentId, SpeedLimits, SyncCommand, SyncContext,
    SyncFeature, TargetResolver, TrafficEngines, TrafficLights, Transport, UpdateRequest,
    VehicleRestrictions,
};

use crate::resolver::PendingAssignments;

pub struct ClientFeatures {
    speed_limits: ApplyCoordinator<SpeedLimits>,
    lane_arrows: ApplyCoordinator<LaneArrows>,
    lane_connections: ApplyCoordinator<LaneConnections>,
    junction_restrictions: ApplyCoordinator<JunctionRestrictions>,
    parking_restrictions: ApplyCoordinator<ParkingRestrictions>,
    priority_signs: ApplyCoordinator<PrioritySigns>,
    traffic_lights: ApplyCoordinator<TrafficLights>,
    vehicle_restrictions: ApplyCoordinator<VehicleRestrictions>,
}

impl ClientFeatures {
    fn new(context: &SyncContext) -> Self {
        Self {
            speed_limits: ApplyCoordinator::client(&context.config),
            lane_arrows: ApplyCoordinator::client(&context.config),
            lane_connections: ApplyCoordinator::client(&context.config),
            junction_restrictions: ApplyCoordinator::client(&context.config),
            parking_restrictions: ApplyCoordinator::client(&context.config),
            priority_signs: ApplyCoordinator::client(&context.config),
            traffic_lights: ApplyCoordinator::client(&context.config),
            vehicle_restrictions: ApplyCoordinator::client(&context.config),
        }
    }

    fn clear(&mut self) {
        self.speed_limits.clear();
        self.lane_arrows.clear();
        self.lane_connections.clear();
        self.junction_restrictions.clear();
        self.parking_restrictions.clear();
        self.priority_signs.clear();
        self.traffic_lights.clear();
        self.vehicle_restrictions.clear();
    }
}

pub trait ClientSlot<F: SyncFeature> {
    fn coordinator(&mut self) -> &mut ApplyCoordinator<F>;
}

macro_rules! client_slot {
    ($feature:ty, $field:ident) => {
        impl ClientSlot<$feature> for ClientFeatures {
            fn coordinator(&mut self) -> &mut ApplyCoordinator<$feature> {
                &mut self.$field
            }
        }
    };
}

client_slot!(SpeedLimits, speed_limits);
client_slot!(LaneArrows, lane_arrows);
client_slot!(LaneConnections, lane_connections);
client_slot!(JunctionRestrictions, junction_restrictions);
client_slot!(ParkingRestrictions, parking_restrictions);
client_slot!(PrioritySigns, priority_signs);
client_slot!(TrafficLights, traffic_lights);
client_slot!(VehicleRestrictions, vehicle_restrictions);

pub struct ClientRuntime {
    context: Arc<SyncContext>,
    net: Arc<dyn RoadNetwork>,
    transport: Arc<dyn Transport>,
    engines: TrafficEngines,
    features: ClientFeatures,
    deferred: DeferredApplyQueue,
    assignments: PendingAssignments,
    frame: Frame,
}

impl ClientRuntime {
    pub fn new(
        context: Arc<SyncContext>,
        net: Arc<dyn RoadNetwork>,
        transport: Arc<dyn Transport>,
        engines: TrafficEngines,
    ) -> Self {
        // Clients never mint guids; the authority pushes assignments.
        context.registry.set_automatic_generation(false);
        let features = ClientFeatures::new(&context);
        let deferred = DeferredApplyQueue::new(&context.config);
        let assignments = PendingAssignments::new(&context.config);
        info!("client runtime started | role=client");
        Self {
            context,
            net,
            transport,
            engines,
            features,
            deferred,
            assignments,
            frame: 0,
        }
    }

    /// Session end: drop every table and in-flight operation.
    pub fn shutdown(&mut self) {
        self.context.reset();
        self.features.clear();
        self.deferred.clear();
        self.assignments.clear();
        info!("client runtime shut down");
    }

    /// Frame pump: pending guid bindings, retry chains, deferred ops.
    pub fn tick(&mut self, frame: Frame) {
        self.frame = frame;
        self.assignments.process(&self.context, self.net.as_ref());

        self.tick_feature::<SpeedLimits>(frame);
        self.tick_feature::<LaneArrows>(frame);
        self.tick_feature::<LaneConnections>(frame);
        self.tick_feature::<JunctionRestrictions>(frame);
        self.tick_feature::<ParkingRestrictions>(frame);
        self.tick_feature::<PrioritySigns>(frame);
        self.tick_feature::<TrafficLights>(frame);
        self.tick_feature::<VehicleRestrictions>(frame);

        let ready = {
            let context = &self.context;
            let net = self.net.as_ref();
            self.deferred
                .poll(frame, |op| pending_precondition(context, net, op))
        };
        for op in ready {
            self.handle_command(op.command);
        }
    }

    /// A command arrived from the transport.
    pub fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::LaneMappingBatch(batch) => self.handle_mapping_batch(batch),
            SyncCommand::LaneMappingChanged(msg) => self.handle_mapping_changed(msg),
            SyncCommand::LaneMappingRemoved(msg) => self.handle_mapping_removed(msg),

            SyncCommand::SpeedLimitApplied(cmd) => self.handle_applied::<SpeedLimits>(cmd),
            SyncCommand::LaneArrowsApplied(cmd) => self.handle_applied::<LaneArrows>(cmd),
            SyncCommand::LaneConnectionsApplied(cmd) => {
                self.handle_applied::<LaneConnections>(cmd)
            }
            SyncCommand::JunctionRestrictionsApplied(cmd) => {
                self.handle_applied::<JunctionRestrictions>(cmd)
            }
            SyncCommand::ParkingRestrictionsApplied(cmd) => {
                self.handle_applied::<ParkingRestrictions>(cmd)
            }
            SyncCommand::PrioritySignApplied(cmd) => self.handle_applied::<PrioritySigns>(cmd),
            SyncCommand::TrafficLightApplied(cmd) => self.handle_applied::<TrafficLights>(cmd),
            SyncCommand::VehicleRestrictionsApplied(cmd) => {
                self.handle_applied::<VehicleRestrictions>(cmd)
            }

            SyncCommand::DefaultSpeedLimitApplied(msg) => {
                let result = {
                    let _scope = LocalApplyGuard::scoped_acquire(FeatureKind::SpeedLimits);
                    self.engines
                        .traffic_service
                        .apply_default_speed_limit(msg.prefab, msg.kmh)
                };
                if let Err(err) = result {
                    warn!(
                        "default speed limit apply failed | prefab={} reason={}",
                        msg.prefab, err
                    );
                }
            }
            SyncCommand::ClearTrafficApplied => {
                if let Err(err) = self.engines.traffic_service.clear_traffic() {
                    warn!("clear traffic failed | reason={}", err);
                }
            }
            SyncCommand::RequestRejected(msg) => {
                // The authority refused; the local UI stays unsynced
                // rather than pretending the edit took effect.
                warn!(
                    "request rejected by authority | reason={} entity={:?}",
                    msg.reason.label(),
                    msg.entity
                );
            }
            _ => debug!("ignoring command on client"),
        }
    }

    /// Entry point for this player's own tool use. No-ops while a remote
    /// apply for the feature is running on this thread (echo guard).
    pub fn notify_local_change<F: SyncFeature>(&mut self, target: F::Target) {
        if local_apply_active(F::KIND) {
            return;
        }
        let Some(state) = F::try_get(&self.engines, &target) else {
            return;
        };
        let wire = {
            let resolver = TargetResolver::new(&self.context, self.net.as_ref());
            F::wire_target(&resolver, &target)
        };
        let Some(wire) = wire else {
            debug!(
                "{} local change has no mapping yet | target={:?}",
                F::KIND.label(),
                target
            );
            return;
        };
        info!(
            "{} update request sent | target={:?}",
            F::KIND.label(),
            target
        );
        self.transport.send_to_server(F::make_request(UpdateRequest {
            target: wire,
            state,
            mapping_version: self.context.mapping.version(),
        }));
    }

    pub fn request_clear_traffic(&self) {
        self.transport.send_to_server(SyncCommand::ClearTrafficRequest);
    }

    pub fn request_default_speed_limit(&self, prefab: PrefabId, kmh: f32) {
        self.transport
            .send_to_server(SyncCommand::DefaultSpeedLimitRequest(
                DefaultSpeedLimit { prefab, kmh },
            ));
    }

    /// Structural hook: a segment was released locally.
    pub fn handle_segment_released(&mut self, segment: SegmentId) {
        self.context.registry.handle_segment_released(segment);
        self.assignments.remove_for_segment(segment);
    }

    /// Structural hook: a lane was released locally.
    pub fn handle_lane_released(&mut self, lane: LaneId) {
        self.context.registry.handle_lane_released(lane);
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn engines_mut(&mut self) -> &mut TrafficEngines {
        &mut self.engines
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    fn handle_applied<F: SyncFeature>(&mut self, cmd: AppliedCommand<F::WireTarget, F::State>)
    where
        ClientFeatures: ClientSlot<F>,
    {
        let resolved = {
            let resolver = TargetResolver::new(&self.context, self.net.as_ref());
            F::resolve_target(&resolver, &cmd.target)
        };
        match resolved {
            Some(target) => {
                debug!(
                    "{} applied command | target={:?}",
                    F::KIND.label(),
                    target
                );
                let frame = self.frame;
                <ClientFeatures as ClientSlot<F>>::coordinator(&mut self.features).apply(
                    &mut self.engines,
                    self.net.as_ref(),
                    frame,
                    target,
                    cmd.state,
                    ApplyOrigin::local("applied"),
                );
                self.pump::<F>();
            }
            None => {
                let key = format!("{}@{:?}", F::KIND.label(), cmd.target);
                debug!(
                    "{} target unresolved, deferring | key={} mapping_version={}",
                    F::KIND.label(),
                    key,
                    cmd.mapping_version
                );
                let target = F::pending_target(&cmd.target);
                let required_version = cmd.mapping_version;
                self.deferred.enqueue(PendingOperation {
                    key,
                    command: F::make_applied(cmd),
                    required_version,
                    target,
                    sender: None,
                });
            }
        }
    }

    fn tick_feature<F: SyncFeature>(&mut self, frame: Frame)
    where
        ClientFeatures: ClientSlot<F>,
    {
        <ClientFeatures as ClientSlot<F>>::coordinator(&mut self.features).tick(
            &mut self.engines,
            self.net.as_ref(),
            frame,
        );
        self.pump::<F>();
    }

    fn pump<F: SyncFeature>(&mut self)
    where
        ClientFeatures: ClientSlot<F>,
    {
        let events =
            <ClientFeatures as ClientSlot<F>>::coordinator(&mut self.features).drain_events();
        for event in events {
            match event {
                ApplyEvent::Applied { target, .. } => {
                    debug!("{} applied locally | target={:?}", F::KIND.label(), target);
                }
                ApplyEvent::Failed {
                    target,
                    reason,
                    attempts,
                    ..
                } => {
                    warn!(
                        "{} local apply failed | target={:?} attempts={} reason={}",
                        F::KIND.label(),
                        target,
                        attempts,
                        reason
                    );
                }
            }
        }
    }

    fn handle_mapping_batch(&mut self, batch: LaneMappingBatch) {
        if batch.entries.is_empty() {
            return;
        }

        if batch.is_full_snapshot {
            let entries: Vec<MappingEntry> = batch
                .entries
                .iter()
                .map(|entry| MappingEntry {
                    guid: entry.guid,
                    segment: entry.segment,
                    ordinal: entry.ordinal,
                    host_lane: entry.host_lane,
                    local_lane: 0,
                    local_resolved: false,
                })
                .collect();
            if !self.context.mapping.apply_remote_snapshot(&entries, batch.version) {
                debug!(
                    "ignoring stale lane mapping snapshot | version={}",
                    batch.version
                );
                return;
            }
            self.assignments.clear();
            for entry in &batch.entries {
                self.resolve_local_lane(entry);
            }
            info!(
                "lane mapping snapshot imported | count={} version={}",
                batch.entries.len(),
                batch.version
            );
            return;
        }

        for entry in &batch.entries {
            if !self.context.mapping.apply_remote_change(
                batch.version,
                entry.guid,
                entry.host_lane,
                entry.segment,
                entry.ordinal,
            ) {
                debug!(
                    "ignoring stale lane mapping change | segment={} ordinal={} version={}",
                    entry.segment, entry.ordinal, batch.version
                );
                continue;
            }
            self.resolve_local_lane(entry);
        }
    }

    fn handle_mapping_changed(&mut self, msg: LaneMappingChanged) {
        if !self.context.mapping.apply_remote_change(
            msg.version,
            msg.entry.guid,
            msg.entry.host_lane,
            msg.entry.segment,
            msg.entry.ordinal,
        ) {
            debug!(
                "ignoring stale lane mapping update | segment={} ordinal={} version={}",
                msg.entry.segment, msg.entry.ordinal, msg.version
            );
            return;
        }
        debug!(
            "lane mapping changed | segment={} ordinal={} host_lane={} version={}",
            msg.entry.segment, msg.entry.ordinal, msg.entry.host_lane, msg.version
        );
        self.resolve_local_lane(&msg.entry);
    }

    fn handle_mapping_removed(&mut self, msg: LaneMappingRemoved) {
        if !self
            .context
            .mapping
            .apply_remote_removal(msg.version, msg.segment, msg.ordinal)
        {
            debug!(
                "ignoring stale lane mapping removal | segment={} ordinal={} version={}",
                msg.segment, msg.ordinal, msg.version
            );
            return;
        }
        self.assignments.remove_slot(msg.segment, msg.ordinal);
        debug!(
            "lane mapping removed | segment={} ordinal={} version={}",
            msg.segment, msg.ordinal, msg.version
        );
    }

    /// Bind a freshly imported row's guid to whatever lane currently sits
    /// in its slot; queue it for retry when the slot is empty.
    fn resolve_local_lane(&mut self, entry: &LaneMappingEntryMsg) {
        let lane = self
            .net
            .segment_lanes(entry.segment)
            .into_iter()
            .find(|(ordinal, _)| *ordinal == entry.ordinal)
            .map(|(_, lane)| lane);

        if let Some(lane) = lane {
            match self
                .context
                .registry
                .assign(self.net.as_ref(), lane, entry.guid, true)
            {
                Ok(()) => {
                    self.context
                        .mapping
                        .update_local_lane(entry.segment, entry.ordinal, lane);
                    return;
                }
                Err(err) => {
                    debug!(
                        "lane guid assignment failed | lane={} guid={:?} reason={}",
                        lane, entry.guid, err
                    );
                }
            }
        }

        self.assignments.queue(entry.guid, entry.segment, entry.ordinal);
    }
}
