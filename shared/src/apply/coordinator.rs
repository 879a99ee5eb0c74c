//! Generic per-feature apply coordinator.
//!
//! One coordinator instance exists per synchronized feature and role. It
//! owns the retry state machine for every in-flight entity-feature key:
//! `Requested -> Applying -> [Success | RetryScheduled -> Applying ...]
//! -> Success | Failed`. Concurrent requests for the same key merge
//! field-by-field (newest non-default values win) into the existing
//! context instead of spawning a parallel retry chain; origin tags
//! concatenate so every requester hears about the terminal outcome.
//!
//! Completed and failed applies surface as drained events rather than
//! stored callbacks; the owning runtime broadcasts, caches or rejects
//! based on them.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::apply::guard::LocalApplyGuard;
use crate::apply::locks::EntityLockRegistry;
use crate::config::SyncConfig;
use crate::features::{EngineError, SyncFeature, TrafficEngines};
use crate::road_network::RoadNetwork;
use crate::types::{ClientId, Frame};

/// Who asked for an apply; carried through merges to the terminal event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOrigin {
    /// Requesting client, when the apply answers a network request.
    pub client: Option<ClientId>,
    pub tag: &'static str,
}

impl ApplyOrigin {
    pub fn local(tag: &'static str) -> Self {
        Self { client: None, tag }
    }

    pub fn remote(client: ClientId, tag: &'static str) -> Self {
        Self {
            client: Some(client),
            tag,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    AppliedImmediately,
    WillRetry,
    Failed,
}

pub enum ApplyEvent<F: SyncFeature> {
    /// The engine accepted the state. On the authority `state` is the
    /// readback of what the engine actually holds, not the request.
    Applied {
        target: F::Target,
        state: F::State,
        origins: Vec<ApplyOrigin>,
    },
    /// Terminal failure after exhausting retries, or a permanent reject.
    Failed {
        target: F::Target,
        origins: Vec<ApplyOrigin>,
        reason: EngineError,
        attempts: u32,
    },
}

struct RetryContext<F: SyncFeature> {
    state: F::State,
    origins: Vec<ApplyOrigin>,
    /// Retries performed so far (the immediate attempt is not counted).
    attempt: u32,
    next_retry: Frame,
    last_failure: Option<EngineError>,
}

pub struct ApplyCoordinator<F: SyncFeature> {
    pending: HashMap<F::Target, RetryContext<F>>,
    events: Vec<ApplyEvent<F>>,
    retry_delays: Vec<Frame>,
    max_attempts: u32,
    locks: Option<EntityLockRegistry>,
    readback: bool,
}

impl<F: SyncFeature> ApplyCoordinator<F> {
    /// Authoritative-side coordinator: serializes applies per entity via
    /// the lock registry and reads back actual engine state after every
    /// successful apply.
    pub fn host(config: &SyncConfig, locks: EntityLockRegistry) -> Self {
        Self::new(config, Some(locks), true)
    }

    /// Client-side coordinator: no entity locks, no readback — the
    /// broadcast state already is the authority's ground truth.
    pub fn client(config: &SyncConfig) -> Self {
        Self::new(config, None, false)
    }

    fn new(config: &SyncConfig, locks: Option<EntityLockRegistry>, readback: bool) -> Self {
        Self {
            pending: HashMap::new(),
            events: Vec::new(),
            retry_delays: config.retry_frame_delays.clone(),
            max_attempts: config.max_retry_attempts,
            locks,
            readback,
        }
    }

    /// Attempt an immediate apply, merging into any pending retry chain
    /// for the same target first.
    pub fn apply(
        &mut self,
        engines: &mut TrafficEngines,
        net: &dyn RoadNetwork,
        frame: Frame,
        target: F::Target,
        state: F::State,
        origin: ApplyOrigin,
    ) -> ApplyOutcome {
        let merged_state = match self.pending.get_mut(&target) {
            Some(context) => {
                F::merge(&mut context.state, &state);
                context.origins.push(origin);
                // A changed payload restarts the backoff ladder.
                context.attempt = 0;
                debug!(
                    "{} request merged into pending context | target={:?}",
                    F::KIND.label(),
                    target
                );
                context.state.clone()
            }
            None => state,
        };

        match self.attempt_once(engines, net, &target, &merged_state) {
            Ok(applied) => {
                let origins = match self.pending.remove(&target) {
                    Some(context) => context.origins,
                    None => vec![origin],
                };
                self.events.push(ApplyEvent::Applied {
                    target,
                    state: applied,
                    origins,
                });
                ApplyOutcome::AppliedImmediately
            }
            Err(err) if err.is_transient() => {
                let delay = self.retry_delay(0);
                let context = self
                    .pending
                    .entry(target)
                    .or_insert_with(|| RetryContext {
                        state: merged_state,
                        origins: vec![origin],
                        attempt: 0,
                        next_retry: frame,
                        last_failure: None,
                    });
                context.last_failure = Some(err);
                context.next_retry = frame.wrapping_add(delay);
                ApplyOutcome::WillRetry
            }
            Err(err) => {
                let origins = match self.pending.remove(&target) {
                    Some(context) => context.origins,
                    None => vec![origin],
                };
                warn!(
                    "{} apply rejected | target={:?} reason={}",
                    F::KIND.label(),
                    target,
                    err
                );
                self.events.push(ApplyEvent::Failed {
                    target,
                    origins,
                    reason: err,
                    attempts: 0,
                });
                ApplyOutcome::Failed
            }
        }
    }

    /// Drive due retries. Call once per simulation frame.
    pub fn tick(&mut self, engines: &mut TrafficEngines, net: &dyn RoadNetwork, frame: Frame) {
        if self.pending.is_empty() {
            return;
        }
        let due: Vec<F::Target> = self
            .pending
            .iter()
            .filter(|(_, context)| frame >= context.next_retry)
            .map(|(target, _)| *target)
            .collect();

        for target in due {
            let Some(state) = self.pending.get(&target).map(|c| c.state.clone()) else {
                continue;
            };
            match self.attempt_once(engines, net, &target, &state) {
                Ok(applied) => {
                    if let Some(context) = self.pending.remove(&target) {
                        info!(
                            "{} retry applied | target={:?} attempts={}",
                            F::KIND.label(),
                            target,
                            context.attempt
                        );
                        self.events.push(ApplyEvent::Applied {
                            target,
                            state: applied,
                            origins: context.origins,
                        });
                    }
                }
                Err(err) => {
                    let transient = err.is_transient();
                    let exhausted = {
                        let Some(context) = self.pending.get_mut(&target) else {
                            continue;
                        };
                        context.attempt += 1;
                        context.last_failure = Some(err.clone());
                        !transient || context.attempt >= self.max_attempts
                    };
                    if exhausted {
                        if let Some(context) = self.pending.remove(&target) {
                            warn!(
                                "{} apply failed terminally | target={:?} attempts={} reason={}",
                                F::KIND.label(),
                                target,
                                context.attempt,
                                err
                            );
                            self.events.push(ApplyEvent::Failed {
                                target,
                                origins: context.origins,
                                attempts: context.attempt,
                                reason: err,
                            });
                        }
                    } else if let Some(context) = self.pending.get_mut(&target) {
                        let delay = self.retry_delays
                            [usize::min(context.attempt as usize, self.retry_delays.len() - 1)];
                        context.next_retry = frame.wrapping_add(delay);
                    }
                }
            }
        }
    }

    /// Atomically hand back everything that reached a terminal state
    /// since the last drain.
    pub fn drain_events(&mut self) -> Vec<ApplyEvent<F>> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.events.clear();
    }

    fn retry_delay(&self, attempt: u32) -> Frame {
        self.retry_delays[usize::min(attempt as usize, self.retry_delays.len() - 1)]
    }

    /// One guarded engine round-trip: existence check, per-entity lock,
    /// local-apply scope around the write, optional readback.
    fn attempt_once(
        &self,
        engines: &mut TrafficEngines,
        net: &dyn RoadNetwork,
        target: &F::Target,
        state: &F::State,
    ) -> Result<F::State, EngineError> {
        if !F::target_exists(net, target) {
            return Err(EngineError::EntityMissing);
        }

        let _lock = match &self.locks {
            Some(locks) => match F::try_lock(locks, target) {
                Some(guard) => Some(guard),
                None => {
                    return Err(EngineError::NotReady {
                        reason: "entity_locked",
                    })
                }
            },
            None => None,
        };

        {
            let _scope = LocalApplyGuard::scoped_acquire(F::KIND);
            F::apply(engines, target, state)?;
        }

        if self.readback {
            // Broadcast what the engine actually holds, not what was
            // asked for; the engine may clamp or partially reject.
            Ok(F::try_get(engines, target).unwrap_or_else(|| state.clone()))
        } else {
            Ok(state.clone())
        }
    }
}
