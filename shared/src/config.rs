//! # `SyncConfig` – tuning knobs for the synchronization core
//!
//! These parameters govern retry pacing, the mapping validator cadence and
//! the deferred-queue bounds. They are set once at composition time and
//! cloned into every runtime; no run-time mutation is expected.
//!
//! All intervals are **frame counts**, not wall-clock durations: the host
//! game drives every runtime through `tick(frame)`, so delays scale with
//! simulation speed the same way road edits do.

use crate::types::Frame;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Interval between validator passes over all tracked segments.
    pub validation_interval_frames: Frame,
    /// Maximum entries per chunk of a full mapping snapshot broadcast.
    pub mapping_batch_size: usize,
    /// Frame delays between apply-coordinator retry attempts; attempts past
    /// the end of the table reuse the final delay.
    pub retry_frame_delays: Vec<Frame>,
    /// Terminal bound on apply-coordinator retry attempts.
    pub max_retry_attempts: u32,
    /// Poll cadence of the deferred-apply queue while nothing progresses.
    pub deferred_poll_frames: Frame,
    /// Bound on both retry and wait cycles of a deferred operation before
    /// it is dropped.
    pub deferred_max_retries: u32,
    /// Bound on attempts to bind a broadcast lane guid to a local lane.
    pub assignment_max_attempts: u32,
    /// Cap on the power-of-two assignment retry cooldown.
    pub assignment_max_cooldown_frames: Frame,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            validation_interval_frames: 256,
            mapping_batch_size: 256,
            retry_frame_delays: vec![5, 15, 30, 60, 120, 240],
            max_retry_attempts: 6,
            deferred_poll_frames: 8,
            deferred_max_retries: 20,
            assignment_max_attempts: 12,
            assignment_max_cooldown_frames: 32,
        }
    }
}
