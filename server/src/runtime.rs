//! Authoritative runtime: receives update requests, drives the per-
//! feature apply coordinators, broadcasts readback state as ground truth
//! and replays caches to reconnecting clients.

use std::sync::Arc;

use log::{debug, info, warn};

use lanesync_shared::{
    local_apply_active, pending_precondition, AppliedCommand, ApplyCoordinator, ApplyEvent,
    ApplyOrigin, ApplyOutcome, ClientId, DefaultSpeedLimit, DeferredApplyQueue, EngineError,
    EntityRef, FeatureKind, Frame, JunctionRestrictions, LaneArrows, LaneConnections, LaneId,
    LocalApplyGuard, ParkingRestrictions, PendingOperation, PendingPrecondition, PrefabId,
    PrioritySigns, RejectReason, RequestRejected, RoadNetwork, SegmentId, SpeedLimits, StateCache,
    SyncCommand, SyncContext, SyncFeature, TargetResolver, TrafficEngines, TrafficLights,
    Transport, UpdateRequest, VehicleRestrictions,
};

use crate::snapshot::SnapshotDispatcher;
use crate::tracker::LaneMappingTracker;

/// Coordinator plus applied-state cache of one feature on the host.
pub struct FeatureChannel<F: SyncFeature> {
    coordinator: ApplyCoordinator<F>,
    cache: StateCache<F::Target, F::State>,
}

impl<F: SyncFeature> FeatureChannel<F> {
    fn new(context: &SyncContext) -> Self {
        Self {
            coordinator: ApplyCoordinator::host(&context.config, context.locks.clone()),
            cache: StateCache::new(),
        }
    }

    fn clear(&mut self) {
        self.coordinator.clear();
        self.cache.clear();
    }
}

pub struct HostFeatures {
    speed_limits: FeatureChannel<SpeedLimits>,
    lane_arrows: FeatureChannel<LaneArrows>,
    lane_connections: FeatureChannel<LaneConnections>,
    junction_restrictions: FeatureChannel<JunctionRestrictions>,
    parking_restrictions: FeatureChannel<ParkingRestrictions>,
    priority_signs: FeatureChannel<PrioritySigns>,
    traffic_lights: FeatureChannel<TrafficLights>,
    vehicle_restrictions: FeatureChannel<VehicleRestrictions>,
}

impl HostFeatures {
    fn new(context: &SyncContext) -> Self {
        Self {
            speed_limits: FeatureChannel::new(context),
            lane_arrows: FeatureChannel::new(context),
            lane_connections: FeatureChannel::new(context),
            junction_restrictions: FeatureChannel::new(context),
            parking_restrictions: FeatureChannel::new(context),
            priority_signs: FeatureChannel::new(context),
            traffic_lights: FeatureChannel::new(context),
            vehicle_restrictions: FeatureChannel::new(context),
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

pub trait HostSlot<F: SyncFeature> {
    fn channel(&mut self) -> &mut FeatureChannel<F>;
}

macro_rules! host_slot {
    ($feature:ty, $field:ident) => {
        impl HostSlot<$feature> for HostFeatures {
            fn channel(&mut self) -> &mut FeatureChannel<$feature> {
                &mut self.$field
            }
        }
    };
}

host_slot!(SpeedLimits, speed_limits);
host_slot!(LaneArrows, lane_arrows);
host_slot!(LaneConnections, lane_connections);
host_slot!(JunctionRestrictions, junction_restrictions);
host_slot!(ParkingRestrictions, parking_restrictions);
host_slot!(PrioritySigns, priority_signs);
host_slot!(TrafficLights, traffic_lights);
host_slot!(VehicleRestrictions, vehicle_restrictions);

pub struct HostRuntime {
    context: Arc<SyncContext>,
    net: Arc<dyn RoadNetwork>,
    transport: Arc<dyn Transport>,
    engines: TrafficEngines,
    tracker: LaneMappingTracker,
    snapshots: Arc<SnapshotDispatcher>,
    features: HostFeatures,
    default_speed_limits: StateCache<PrefabId, f32>,
    deferred: DeferredApplyQueue,
    frame: Frame,
}

impl HostRuntime {
    /// Promotion to authority: enable guid minting, walk the network and
    /// push a full mapping snapshot to everyone already connected.
    pub fn new(
        context: Arc<SyncContext>,
        net: Arc<dyn RoadNetwork>,
        transport: Arc<dyn Transport>,
        engines: TrafficEngines,
    ) -> Self {
        context.registry.set_automatic_generation(true);
        context.registry.rebuild(net.as_ref());

        let features = HostFeatures::new(&context);
        let mut runtime = Self {
            tracker: LaneMappingTracker::new(&context.config),
            snapshots: Arc::new(SnapshotDispatcher::new()),
            features,
            default_speed_limits: StateCache::new(),
            deferred: DeferredApplyQueue::new(&context.config),
            frame: 0,
            context,
            net,
            transport,
            engines,
        };

        runtime.tracker.sync_all_segments(
            &runtime.context,
            runtime.net.as_ref(),
            runtime.transport.as_ref(),
            &runtime.snapshots,
            "promotion",
            None,
        );
        info!("host runtime started | role=authority");
        runtime
    }

    /// Demotion or session end. Minting stops, every registry and cache
    /// is dropped; a demoted authority must not keep manufacturing or
    /// trusting identities.
    pub fn shutdown(&mut self) {
        self.context.reset();
        self.features.clear();
        self.default_speed_limits.clear();
        self.deferred.clear();
        info!("host runtime shut down | role=demoted");
    }

    /// Frame pump: validator pass plus every feature's retry chains.
    pub fn tick(&mut self, frame: Frame) {
        self.frame = frame;
        self.tracker.tick(
            &self.context,
            self.net.as_ref(),
            self.transport.as_ref(),
            &self.snapshots,
            frame,
        );
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
            let sender = op.sender.unwrap_or(0);
            self.handle_command(sender, op.command);
        }
    }

    /// A peer's command arrived from the transport.
    pub fn handle_command(&mut self, sender: ClientId, command: SyncCommand) {
        match command {
            SyncCommand::SpeedLimitRequest(request) => {
                self.handle_request::<SpeedLimits>(sender, request)
            }
            SyncCommand::LaneArrowsRequest(request) => {
                self.handle_request::<LaneArrows>(sender, request)
            }
            SyncCommand::LaneConnectionsRequest(request) => {
                self.handle_request::<LaneConnections>(sender, request)
            }
            SyncCommand::JunctionRestrictionsRequest(request) => {
                self.handle_request::<JunctionRestrictions>(sender, request)
            }
            SyncCommand::ParkingRestrictionsRequest(request) => {
                self.handle_request::<ParkingRestrictions>(sender, request)
            }
            SyncCommand::PrioritySignRequest(request) => {
                self.handle_request::<PrioritySigns>(sender, request)
            }
            SyncCommand::TrafficLightRequest(request) => {
                self.handle_request::<TrafficLights>(sender, request)
            }
            SyncCommand::VehicleRestrictionsRequest(request) => {
                self.handle_request::<VehicleRestrictions>(sender, request)
            }
            SyncCommand::DefaultSpeedLimitRequest(request) => {
                self.apply_default_speed_limit(Some(sender), request)
            }
            SyncCommand::ClearTrafficRequest => self.apply_clear_traffic(Some(sender)),
            // The authority originates mapping and applied traffic; a
            // peer echoing them back is stale noise.
            _ => debug!("ignoring command on authority | sender={}", sender),
        }
    }

    /// Entry point for the host player's own tool use. No-ops while a
    /// remote apply for the feature is in progress on this thread, which
    /// breaks the apply/detect/re-send echo loop.
    pub fn notify_local_change<F: SyncFeature>(&mut self, target: F::Target)
    where
        HostFeatures: HostSlot<F>,
    {
        if local_apply_active(F::KIND) {
            return;
        }
        let Some(state) = F::try_get(&self.engines, &target) else {
            return;
        };
        let frame = self.frame;
        let outcome = <HostFeatures as HostSlot<F>>::channel(&mut self.features)
            .coordinator
            .apply(
                &mut self.engines,
                self.net.as_ref(),
                frame,
                target,
                state,
                ApplyOrigin::local("local_change"),
            );
        debug!(
            "{} local change | target={:?} outcome={:?}",
            F::KIND.label(),
            target,
            outcome
        );
        self.pump::<F>();
    }

    /// Host-side clear-traffic button.
    pub fn clear_traffic(&mut self) {
        self.apply_clear_traffic(None);
    }

    /// Host-side default speed limit edit.
    pub fn set_default_speed_limit(&mut self, prefab: PrefabId, kmh: f32) {
        self.apply_default_speed_limit(None, DefaultSpeedLimit { prefab, kmh });
    }

    /// A new peer joined: push the complete mapping table plus every
    /// feature's cached applied state, all targeted at just that peer.
    pub fn client_connected(&mut self, client: ClientId) {
        info!("client connect resync | client={}", client);
        let scope = self.snapshots.begin(client);
        self.tracker.sync_all_segments(
            &self.context,
            self.net.as_ref(),
            self.transport.as_ref(),
            &self.snapshots,
            "client_connect",
            Some(client),
        );
        self.replay::<SpeedLimits>(client);
        self.replay::<LaneArrows>(client);
        self.replay::<LaneConnections>(client);
        self.replay::<JunctionRestrictions>(client);
        self.replay::<ParkingRestrictions>(client);
        self.replay::<PrioritySigns>(client);
        self.replay::<TrafficLights>(client);
        self.replay::<VehicleRestrictions>(client);
        for (prefab, kmh) in self.default_speed_limits.entries() {
            self.transport.send_to_client(
                client,
                SyncCommand::DefaultSpeedLimitApplied(DefaultSpeedLimit { prefab, kmh }),
            );
        }
        drop(scope);
    }

    /// Structural hook: a segment was released by the simulation.
    pub fn handle_segment_released(&mut self, segment: SegmentId) {
        self.context.registry.handle_segment_released(segment);
        self.tracker.remove_segment(
            &self.context,
            self.transport.as_ref(),
            &self.snapshots,
            segment,
            "segment_released",
        );
    }

    /// Structural hook: a segment was created or rebuilt.
    pub fn handle_segment_built(&mut self, segment: SegmentId) {
        self.tracker.sync_segment(
            &self.context,
            self.net.as_ref(),
            self.transport.as_ref(),
            &self.snapshots,
            segment,
            "segment_built",
        );
    }

    /// Structural hook: a single lane was released.
    pub fn handle_lane_released(&mut self, lane: LaneId) {
        self.context.registry.handle_lane_released(lane);
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn engines_mut(&mut self) -> &mut TrafficEngines {
        &mut self.engines
    }

    fn handle_request<F: SyncFeature>(
        &mut self,
        sender: ClientId,
        request: UpdateRequest<F::WireTarget, F::State>,
    ) where
        HostFeatures: HostSlot<F>,
    {
        debug!(
            "{} request received | sender={} target={:?} mapping_version={}",
            F::KIND.label(),
            sender,
            request.target,
            request.mapping_version
        );

        if !F::is_supported(&self.engines) {
            self.reject(sender, RejectReason::Unsupported, F::entity_ref(&request.target));
            return;
        }

        let resolved = {
            let resolver = TargetResolver::new(&self.context, self.net.as_ref());
            F::resolve_target(&resolver, &request.target)
        };
        let Some(target) = resolved else {
            // Not resolvable right now. A target that plausibly shows up
            // soon (mapping lag, road edit in flight) is parked for
            // retry; one with no sign of arriving is rejected outright.
            let op = PendingOperation {
                key: format!("{}@{:?}", F::KIND.label(), request.target),
                command: F::make_request(request.clone()),
                required_version: 0,
                target: F::pending_target(&request.target),
                sender: Some(sender),
            };
            let verdict = {
                let resolver_context = &self.context;
                pending_precondition(resolver_context, self.net.as_ref(), &op)
            };
            match verdict {
                PendingPrecondition::Missing => {
                    warn!(
                        "{} request rejected | sender={} target={:?} reason=entity_missing",
                        F::KIND.label(),
                        sender,
                        request.target
                    );
                    self.reject(
                        sender,
                        RejectReason::EntityMissing,
                        F::entity_ref(&request.target),
                    );
                }
                _ => {
                    debug!(
                        "{} request parked until target resolves | sender={} target={:?}",
                        F::KIND.label(),
                        sender,
                        request.target
                    );
                    self.deferred.enqueue(op);
                }
            }
            return;
        };

        let frame = self.frame;
        let outcome = <HostFeatures as HostSlot<F>>::channel(&mut self.features)
            .coordinator
            .apply(
                &mut self.engines,
                self.net.as_ref(),
                frame,
                target,
                request.state,
                ApplyOrigin::remote(sender, "request"),
            );
        if outcome == ApplyOutcome::WillRetry {
            debug!(
                "{} apply deferred | sender={} target={:?}",
                F::KIND.label(),
                sender,
                target
            );
        }
        self.pump::<F>();
    }

    fn tick_feature<F: SyncFeature>(&mut self, frame: Frame)
    where
        HostFeatures: HostSlot<F>,
    {
        <HostFeatures as HostSlot<F>>::channel(&mut self.features)
            .coordinator
            .tick(&mut self.engines, self.net.as_ref(), frame);
        self.pump::<F>();
    }

    /// Drain coordinator outcomes: successful applies are cached and
    /// broadcast as readback ground truth, terminal failures are reported
    /// back to every requester.
    fn pump<F: SyncFeature>(&mut self)
    where
        HostFeatures: HostSlot<F>,
    {
        let events = <HostFeatures as HostSlot<F>>::channel(&mut self.features)
            .coordinator
            .drain_events();
        for event in events {
            match event {
                ApplyEvent::Applied { target, state, .. } => {
                    <HostFeatures as HostSlot<F>>::channel(&mut self.features)
                        .cache
                        .store(target, state.clone());
                    let wire = {
                        let resolver = TargetResolver::new(&self.context, self.net.as_ref());
                        F::wire_target(&resolver, &target)
                    };
                    let Some(wire) = wire else {
                        warn!(
                            "{} applied but not broadcastable | target={:?}",
                            F::KIND.label(),
                            target
                        );
                        continue;
                    };
                    info!(
                        "{} applied | target={:?} action=broadcast",
                        F::KIND.label(),
                        target
                    );
                    self.transport.send_to_all(F::make_applied(AppliedCommand {
                        target: wire,
                        state,
                        mapping_version: self.context.mapping.version(),
                    }));
                }
                ApplyEvent::Failed {
                    target,
                    origins,
                    reason,
                    attempts,
                } => {
                    warn!(
                        "{} apply failed | target={:?} attempts={} reason={}",
                        F::KIND.label(),
                        target,
                        attempts,
                        reason
                    );
                    let reject = match reason {
                        EngineError::Unsupported { .. } => RejectReason::Unsupported,
                        EngineError::EntityMissing => RejectReason::EntityMissing,
                        _ => RejectReason::ApplyFailed,
                    };
                    let entity = {
                        let resolver = TargetResolver::new(&self.context, self.net.as_ref());
                        F::wire_target(&resolver, &target)
                            .map(|wire| F::entity_ref(&wire))
                            .unwrap_or(EntityRef::None)
                    };
                    for origin in origins {
                        if let Some(client) = origin.client {
                            self.reject(client, reject, entity);
                        }
                    }
                }
            }
        }
    }

    fn replay<F: SyncFeature>(&mut self, client: ClientId)
    where
        HostFeatures: HostSlot<F>,
    {
        let entries = <HostFeatures as HostSlot<F>>::channel(&mut self.features)
            .cache
            .entries();
        if entries.is_empty() {
            return;
        }
        let version = self.context.mapping.version();
        let mut replayed = 0usize;
        for (target, state) in entries {
            let wire = {
                let resolver = TargetResolver::new(&self.context, self.net.as_ref());
                F::wire_target(&resolver, &target)
            };
            let Some(wire) = wire else {
                continue;
            };
            self.transport.send_to_client(
                client,
                F::make_applied(AppliedCommand {
                    target: wire,
                    state,
                    mapping_version: version,
                }),
            );
            replayed += 1;
        }
        debug!(
            "{} cache replayed | client={} entries={}",
            F::KIND.label(),
            client,
            replayed
        );
    }

    fn apply_default_speed_limit(&mut self, sender: Option<ClientId>, request: DefaultSpeedLimit) {
        let result = {
            let _scope = LocalApplyGuard::scoped_acquire(FeatureKind::SpeedLimits);
            self.engines
                .traffic_service
                .apply_default_speed_limit(request.prefab, request.kmh)
        };
        match result {
            Ok(()) => {
                let kmh = self
                    .engines
                    .traffic_service
                    .try_get_default_speed_limit(request.prefab)
                    .unwrap_or(request.kmh);
                self.default_speed_limits.store(request.prefab, kmh);
                info!(
                    "default speed limit applied | prefab={} kmh={} action=broadcast",
                    request.prefab, kmh
                );
                self.transport
                    .send_to_all(SyncCommand::DefaultSpeedLimitApplied(DefaultSpeedLimit {
                        prefab: request.prefab,
                        kmh,
                    }));
            }
            Err(err) => {
                warn!(
                    "default speed limit apply failed | prefab={} reason={}",
                    request.prefab, err
                );
                if let Some(client) = sender {
                    self.reject(client, RejectReason::ApplyFailed, EntityRef::None);
                }
            }
        }
    }

    fn apply_clear_traffic(&mut self, sender: Option<ClientId>) {
        match self.engines.traffic_service.clear_traffic() {
            Ok(()) => {
                info!("traffic cleared | action=broadcast");
                self.transport.send_to_all(SyncCommand::ClearTrafficApplied);
            }
            Err(err) => {
                warn!("clear traffic failed | reason={}", err);
                if let Some(client) = sender {
                    self.reject(client, RejectReason::ApplyFailed, EntityRef::None);
                }
            }
        }
    }

    fn reject(&self, client: ClientId, reason: RejectReason, entity: EntityRef) {
        self.transport.send_to_client(
            client,
            SyncCommand::RequestRejected(RequestRejected { reason, entity }),
        );
    }
}
