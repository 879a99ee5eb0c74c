//! Integration tests for the generic apply coordinator: idempotent
//! applies, merge-on-schedule semantics, the frame-delay backoff ladder
//! and terminal failure reporting.

use lanesync_shared::{
    ApplyCoordinator, ApplyEvent, ApplyOrigin, ApplyOutcome, EngineError, EntityLockRegistry,
    FeatureKind, JunctionRestrictions, JunctionRestrictionsState, SpeedLimitState, SpeedLimits,
    SyncConfig,
};
use lanesync_test::{memory_engines, EngineState, TestRoadNetwork};

fn applied_states<F: lanesync_shared::SyncFeature>(
    events: Vec<ApplyEvent<F>>,
) -> Vec<(F::Target, F::State)> {
    events
        .into_iter()
        .filter_map(|event| match event {
            ApplyEvent::Applied { target, state, .. } => Some((target, state)),
            ApplyEvent::Failed { .. } => None,
        })
        .collect()
}

#[test]
fn applying_same_state_twice_is_idempotent() {
    let net = TestRoadNetwork::new();
    let lanes = net.add_segment(1, 7, 2);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let mut coordinator =
        ApplyCoordinator::<SpeedLimits>::host(&config, EntityLockRegistry::new());

    let request = SpeedLimitState::override_kmh(30.0);

    let first = coordinator.apply(
        &mut engines,
        &net,
        0,
        lanes[0],
        request,
        ApplyOrigin::local("test"),
    );
    assert_eq!(first, ApplyOutcome::AppliedImmediately);
    let first_applied = applied_states(coordinator.drain_events());

    let second = coordinator.apply(
        &mut engines,
        &net,
        1,
        lanes[0],
        request,
        ApplyOrigin::local("test"),
    );
    assert_eq!(second, ApplyOutcome::AppliedImmediately);
    let second_applied = applied_states(coordinator.drain_events());

    assert_eq!(first_applied.len(), 1);
    assert_eq!(second_applied.len(), 1);
    assert_eq!(
        first_applied[0].1, second_applied[0].1,
        "readback must be identical across repeated applies"
    );
    assert_eq!(state.speed_limit(lanes[0]).unwrap().kmh, Some(30.0));
}

#[test]
fn readback_reports_engine_clamped_value() {
    let net = TestRoadNetwork::new();
    let lanes = net.add_segment(1, 7, 1);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let mut coordinator =
        ApplyCoordinator::<SpeedLimits>::host(&config, EntityLockRegistry::new());

    // 33 km/h is not in the engine palette; the engine clamps to 30 and
    // the broadcast state must say so.
    let outcome = coordinator.apply(
        &mut engines,
        &net,
        0,
        lanes[0],
        SpeedLimitState::override_kmh(33.0),
        ApplyOrigin::local("test"),
    );
    assert_eq!(outcome, ApplyOutcome::AppliedImmediately);

    let applied = applied_states(coordinator.drain_events());
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].1.kmh, Some(30.0));
}

#[test]
fn concurrent_requests_merge_into_single_context() {
    let net = TestRoadNetwork::new();
    net.add_node(5);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let mut coordinator =
        ApplyCoordinator::<JunctionRestrictions>::host(&config, EntityLockRegistry::new());

    // First request fails transiently and parks a retry context.
    state.fail_transiently(FeatureKind::JunctionRestrictions, 1);
    let first = JunctionRestrictionsState {
        allow_u_turns: Some(true),
        ..Default::default()
    };
    let outcome = coordinator.apply(
        &mut engines,
        &net,
        0,
        5,
        first,
        ApplyOrigin::remote(1, "request"),
    );
    assert_eq!(outcome, ApplyOutcome::WillRetry);
    assert_eq!(coordinator.pending_len(), 1);

    // Second request for the same node sets a previously-unset field. It
    // must merge into the pending context, not start a parallel chain.
    let second = JunctionRestrictionsState {
        allow_pedestrian_crossings: Some(false),
        ..Default::default()
    };
    let outcome = coordinator.apply(
        &mut engines,
        &net,
        1,
        5,
        second,
        ApplyOrigin::remote(2, "request"),
    );
    assert_eq!(outcome, ApplyOutcome::AppliedImmediately);
    assert_eq!(coordinator.pending_len(), 0);

    let events = coordinator.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ApplyEvent::Applied {
            state: applied,
            origins,
            ..
        } => {
            assert_eq!(applied.allow_u_turns, Some(true));
            assert_eq!(applied.allow_pedestrian_crossings, Some(false));
            assert_eq!(origins.len(), 2, "both requesters share the outcome");
        }
        ApplyEvent::Failed { .. } => panic!("merged apply should succeed"),
    }

    let engine_view = state.junction(5).unwrap();
    assert_eq!(engine_view.allow_u_turns, Some(true));
    assert_eq!(engine_view.allow_pedestrian_crossings, Some(false));
}

#[test]
fn retries_follow_backoff_ladder() {
    let net = TestRoadNetwork::new();
    let lanes = net.add_segment(1, 7, 1);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let mut coordinator =
        ApplyCoordinator::<SpeedLimits>::host(&config, EntityLockRegistry::new());

    // Immediate attempt plus the first two retries fail; the third retry
    // lands at frame 5 + 15 + 30 = 50.
    state.fail_transiently(FeatureKind::SpeedLimits, 3);
    let outcome = coordinator.apply(
        &mut engines,
        &net,
        0,
        lanes[0],
        SpeedLimitState::override_kmh(60.0),
        ApplyOrigin::local("test"),
    );
    assert_eq!(outcome, ApplyOutcome::WillRetry);

    let mut applied_at = None;
    for frame in 1..=600 {
        coordinator.tick(&mut engines, &net, frame);
        for event in coordinator.drain_events() {
            if let ApplyEvent::Applied { .. } = event {
                assert!(applied_at.is_none(), "must apply exactly once");
                applied_at = Some(frame);
            }
        }
    }
    assert_eq!(applied_at, Some(50));
    assert_eq!(coordinator.pending_len(), 0);
}

#[test]
fn retry_chain_gives_up_after_max_attempts() {
    let net = TestRoadNetwork::new();
    let lanes = net.add_segment(1, 7, 1);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let mut coordinator =
        ApplyCoordinator::<SpeedLimits>::host(&config, EntityLockRegistry::new());

    state.fail_transiently(FeatureKind::SpeedLimits, 100);
    let outcome = coordinator.apply(
        &mut engines,
        &net,
        0,
        lanes[0],
        SpeedLimitState::override_kmh(60.0),
        ApplyOrigin::remote(3, "request"),
    );
    assert_eq!(outcome, ApplyOutcome::WillRetry);

    let mut failure = None;
    for frame in 1..=1000 {
        coordinator.tick(&mut engines, &net, frame);
        for event in coordinator.drain_events() {
            match event {
                ApplyEvent::Failed {
                    attempts, origins, ..
                } => {
                    assert!(failure.is_none(), "must fail exactly once");
                    failure = Some((frame, attempts, origins));
                }
                ApplyEvent::Applied { .. } => panic!("apply cannot succeed here"),
            }
        }
    }

    let (frame, attempts, origins) = failure.expect("terminal failure expected");
    // Retries at 5, 20, 50, 110, 230 and 470 frames; the sixth exhausts
    // the attempt budget.
    assert_eq!(frame, 470);
    assert_eq!(attempts, SyncConfig::default().max_retry_attempts);
    assert_eq!(origins[0].client, Some(3));
    assert_eq!(coordinator.pending_len(), 0);
}

#[test]
fn malformed_request_fails_without_retry() {
    let net = TestRoadNetwork::new();
    let lanes = net.add_segment(1, 7, 1);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let mut coordinator =
        ApplyCoordinator::<SpeedLimits>::host(&config, EntityLockRegistry::new());

    let outcome = coordinator.apply(
        &mut engines,
        &net,
        0,
        lanes[0],
        SpeedLimitState::override_kmh(500.0),
        ApplyOrigin::local("test"),
    );
    assert_eq!(outcome, ApplyOutcome::Failed);
    assert_eq!(coordinator.pending_len(), 0);

    let events = coordinator.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ApplyEvent::Failed { reason, .. } => {
            assert!(matches!(reason, EngineError::Rejected { .. }));
        }
        ApplyEvent::Applied { .. } => panic!("out-of-range speed must be rejected"),
    }
}

#[test]
fn locked_entity_defers_until_lock_released() {
    let net = TestRoadNetwork::new();
    let lanes = net.add_segment(1, 7, 1);
    let state = EngineState::new();
    let mut engines = memory_engines(&state);
    let config = SyncConfig::default();
    let locks = EntityLockRegistry::new();
    let mut coordinator = ApplyCoordinator::<SpeedLimits>::host(&config, locks.clone());

    let guard = locks.try_acquire_lane(lanes[0]).expect("external lock");
    let outcome = coordinator.apply(
        &mut engines,
        &net,
        0,
        lanes[0],
        SpeedLimitState::override_kmh(60.0),
        ApplyOrigin::local("test"),
    );
    assert_eq!(outcome, ApplyOutcome::WillRetry);
    drop(guard);

    let mut applied = false;
    for frame in 1..=10 {
        coordinator.tick(&mut engines, &net, frame);
        if !applied_states(coordinator.drain_events()).is_empty() {
            applied = true;
            break;
        }
    }
    assert!(applied, "apply must go through once the lock is free");
    assert_eq!(state.speed_limit(lanes[0]).unwrap().kmh, Some(60.0));
}
