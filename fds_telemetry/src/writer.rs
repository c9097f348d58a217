//! Producer side: batch assembly and non-blocking publish.

use std::sync::Arc;

use heapless::Deque;
use parking_lot::Mutex;
use static_assertions::const_assert;
use tracing::warn;

use fds_common::telemetry::ControlSample;

use crate::buffer::{RingSample, TelemetryBuffer};

/// Capacity of the producer-local pending batch.
///
/// Sized for several ticks of consumer absence; overflowing it means the
/// consumer has been gone far longer than the hand-off protocol budgets
/// for, and the oldest pending sample is sacrificed.
pub const PENDING_LEN: usize = 256;

const_assert!(PENDING_LEN >= 2);

/// Result of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Semaphore acquired; this many samples were copied into the ring.
    Published(usize),
    /// Consumer mid-drain — batch stays pending until the next tick.
    Busy,
}

/// O(1) producer statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterStats {
    /// Successful publishes.
    pub publishes: u64,
    /// Samples copied into the shared ring.
    pub published_samples: u64,
    /// Publish attempts skipped because the semaphore was held.
    pub deferrals: u64,
    /// Publish attempts where the ring had no room for the full batch.
    pub ring_full: u64,
    /// Pending samples evicted because the local batch overflowed.
    pub dropped: u64,
}

/// Producer handle: owns the pending batch, tries the semaphore, never blocks.
pub struct TelemetryWriter<const N: usize> {
    shared: Arc<Mutex<TelemetryBuffer<N>>>,
    pending: Deque<RingSample, PENDING_LEN>,
    stats: WriterStats,
}

impl<const N: usize> TelemetryWriter<N> {
    pub(crate) fn new(shared: Arc<Mutex<TelemetryBuffer<N>>>) -> Self {
        Self {
            shared,
            pending: Deque::new(),
            stats: WriterStats::default(),
        }
    }

    /// Queue one tick's sample for the next publish.
    pub fn push(&mut self, sample: &ControlSample) {
        let ring_sample = RingSample {
            ch1: sample.ch1,
            ch2: sample.ch2,
            control: sample.control,
        };
        if self.pending.is_full() {
            // Consumer absent for hundreds of ticks: evict the oldest.
            let _ = self.pending.pop_front();
            self.stats.dropped += 1;
            if self.stats.dropped == 1 || self.stats.dropped % 1000 == 0 {
                warn!(
                    dropped = self.stats.dropped,
                    "telemetry pending batch overflow"
                );
            }
        }
        // Cannot fail: one slot was just freed if full.
        let _ = self.pending.push_back(ring_sample);
    }

    /// Attempt a non-blocking hand-off of the pending batch.
    ///
    /// On contention the batch stays pending — deferred, not lost. Samples
    /// that do not fit in the ring also stay pending for the next attempt.
    pub fn try_publish(&mut self) -> PublishOutcome {
        if self.pending.is_empty() {
            return PublishOutcome::Published(0);
        }

        let Some(mut ring) = self.shared.try_lock() else {
            self.stats.deferrals += 1;
            return PublishOutcome::Busy;
        };

        let mut copied = 0usize;
        while ring.free() > 0 {
            let Some(sample) = self.pending.pop_front() else {
                break;
            };
            ring.push(sample);
            copied += 1;
        }
        drop(ring);

        if !self.pending.is_empty() {
            self.stats.ring_full += 1;
        }
        if copied > 0 {
            self.stats.publishes += 1;
            self.stats.published_samples += copied as u64;
        }
        PublishOutcome::Published(copied)
    }

    /// Samples waiting for the next successful hand-off.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
