//! Central queue for commands whose targets do not exist locally yet.
//!
//! A remote change can reference a lane the local simulation has not
//! created, or a mapping row that has not arrived. Such commands are
//! parked here keyed by target+feature — re-enqueuing a key replaces the
//! parked payload, latest wins — and polled on a fixed frame cadence
//! until their precondition passes or a bounded wait expires. Expired
//! operations are dropped with a log entry and nothing else: these races
//! almost always self-resolve, and a persistent hole reappears on the
//! next validator pass anyway.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::config::SyncConfig;
use crate::messages::{LaneRef, SegmentEnd, SyncCommand};
use crate::types::{ClientId, Frame, MappingVersion, NodeId, SegmentId};

/// What must exist before the parked command can be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingTarget {
    Lane(LaneRef),
    Node(NodeId),
    Segment(SegmentId),
    SegmentEnd(SegmentEnd),
}

/// A command parked until its target resolves.
#[derive(Clone, Debug)]
pub struct PendingOperation {
    /// Uniquely identifies target+feature; replaces on re-enqueue.
    pub key: String,
    /// The payload to re-dispatch once the precondition passes.
    pub command: SyncCommand,
    /// Wait until the mapping store reaches this version before acting,
    /// so the command is never applied against pre-edit coordinates.
    pub required_version: MappingVersion,
    pub target: PendingTarget,
    /// Requesting client, when the parked command is a request the
    /// authority still owes an answer to.
    pub sender: Option<ClientId>,
}

/// Verdict of the caller-supplied precondition check for one poll pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingPrecondition {
    /// Target resolved — hand the command back for application.
    Ready,
    /// Target may resolve soon (mapping lag, entity mid-creation).
    Wait,
    /// Target absent with no sign it is coming.
    Missing,
}

struct QueueEntry {
    op: PendingOperation,
    retries: u32,
    wait_cycles: u32,
}

struct QueueInner {
    pending: HashMap<String, QueueEntry>,
    next_poll: Frame,
}

pub struct DeferredApplyQueue {
    inner: Mutex<QueueInner>,
    poll_frames: Frame,
    max_retries: u32,
}

impl DeferredApplyQueue {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: HashMap::new(),
                next_poll: 0,
            }),
            poll_frames: config.deferred_poll_frames,
            max_retries: config.deferred_max_retries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, op: PendingOperation) {
        if op.key.is_empty() {
            return;
        }
        debug!("deferred operation queued | key={}", op.key);
        let mut guard = self.lock();
        // Always overwrite the previous entry so the latest payload wins.
        guard.pending.insert(
            op.key.clone(),
            QueueEntry {
                op,
                retries: 0,
                wait_cycles: 0,
            },
        );
    }

    /// One poll pass. Runs at most once per cadence window; `check`
    /// judges each entry's precondition and ready commands are handed
    /// back for application. Entries that exhausted their retry or wait
    /// budget are silently dropped (logged only).
    pub fn poll(
        &self,
        frame: Frame,
        mut check: impl FnMut(&PendingOperation) -> PendingPrecondition,
    ) -> Vec<PendingOperation> {
        let mut guard = self.lock();
        if frame < guard.next_poll || guard.pending.is_empty() {
            return Vec::new();
        }

        let mut ready = Vec::new();
        let mut dropped = Vec::new();

        for (key, entry) in guard.pending.iter_mut() {
            match check(&entry.op) {
                PendingPrecondition::Ready => {
                    ready.push(key.clone());
                }
                PendingPrecondition::Wait => {
                    entry.wait_cycles += 1;
                    if entry.wait_cycles >= self.max_retries {
                        dropped.push(key.clone());
                    }
                }
                PendingPrecondition::Missing => {
                    entry.retries += 1;
                    if entry.retries >= self.max_retries {
                        dropped.push(key.clone());
                    }
                }
            }
        }

        for key in &dropped {
            if let Some(entry) = guard.pending.remove(key) {
                warn!(
                    "deferred operation dropped | key={} retries={} wait_cycles={}",
                    key, entry.retries, entry.wait_cycles
                );
            }
        }

        let mut out = Vec::with_capacity(ready.len());
        for key in ready {
            if let Some(entry) = guard.pending.remove(&key) {
                info!(
                    "deferred operation ready | key={} wait_cycles={}",
                    key, entry.wait_cycles
                );
                out.push(entry.op);
            }
        }

        // Anything that progressed is retried next frame; otherwise back
        // off for the poll cadence.
        guard.next_poll = if out.is_empty() {
            frame.wrapping_add(self.poll_frames)
        } else {
            frame.wrapping_add(1)
        };

        out
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.pending.clear();
        guard.next_poll = 0;
    }
}
