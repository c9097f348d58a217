//! Consumer side: drain under the semaphore, cursor back to zero.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{RingSample, TelemetryBuffer};

/// Consumer handle over the shared ring.
pub struct TelemetryReader<const N: usize> {
    shared: Arc<Mutex<TelemetryBuffer<N>>>,
}

impl<const N: usize> TelemetryReader<N> {
    pub(crate) fn new(shared: Arc<Mutex<TelemetryBuffer<N>>>) -> Self {
        Self { shared }
    }

    /// Copy all published samples into `out`, leaving the cursor at 0.
    ///
    /// Blocks only for the duration of the producer's batch copy, which is
    /// bounded by the ring capacity.
    pub fn drain_into(&self, out: &mut Vec<RingSample>) -> usize {
        self.shared.lock().drain_into(out)
    }

    /// Number of samples currently published and undrained.
    pub fn available(&self) -> usize {
        self.shared.lock().len()
    }

    /// Hold the semaphore open — simulates a consumer mid-drain in tests.
    #[cfg(test)]
    pub(crate) fn hold_for_test(&self) -> parking_lot::MutexGuard<'_, TelemetryBuffer<N>> {
        self.shared.lock()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
