//! Shared ring buffer: three parallel sample arrays plus a write cursor.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::reader::TelemetryReader;
use crate::writer::TelemetryWriter;

/// One drained telemetry sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RingSample {
    /// Raw channel 1 measurement [Hz].
    pub ch1: f64,
    /// Raw channel 2 measurement [Hz].
    pub ch2: f64,
    /// Control output [Hz].
    pub control: f64,
}

/// Fixed-capacity ring of three parallel numeric arrays.
///
/// The cursor counts valid samples from index 0. The producer appends at
/// the cursor; the consumer copies `[0, cursor)` out and resets it.
#[derive(Debug)]
pub struct TelemetryBuffer<const N: usize> {
    ch1: [f64; N],
    ch2: [f64; N],
    control: [f64; N],
    cursor: usize,
}

impl<const N: usize> TelemetryBuffer<N> {
    pub const fn new() -> Self {
        Self {
            ch1: [0.0; N],
            ch2: [0.0; N],
            control: [0.0; N],
            cursor: 0,
        }
    }

    /// Number of published samples not yet drained.
    #[inline]
    pub const fn len(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Remaining capacity before the ring is full.
    #[inline]
    pub const fn free(&self) -> usize {
        N - self.cursor
    }

    /// Append one sample at the cursor. Caller must check [`free`](Self::free).
    #[inline]
    pub(crate) fn push(&mut self, sample: RingSample) {
        debug_assert!(self.cursor < N);
        self.ch1[self.cursor] = sample.ch1;
        self.ch2[self.cursor] = sample.ch2;
        self.control[self.cursor] = sample.control;
        self.cursor += 1;
    }

    /// Copy all published samples into `out` and reset the cursor.
    pub(crate) fn drain_into(&mut self, out: &mut Vec<RingSample>) -> usize {
        let n = self.cursor;
        out.reserve(n);
        for i in 0..n {
            out.push(RingSample {
                ch1: self.ch1[i],
                ch2: self.ch2[i],
                control: self.control[i],
            });
        }
        self.cursor = 0;
        n
    }
}

impl<const N: usize> Default for TelemetryBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a connected writer/reader pair over one shared ring.
///
/// The ring and its semaphore are allocated exactly once, here.
pub fn channel<const N: usize>() -> (TelemetryWriter<N>, TelemetryReader<N>) {
    let shared = Arc::new(Mutex::new(TelemetryBuffer::<N>::new()));
    (
        TelemetryWriter::new(Arc::clone(&shared)),
        TelemetryReader::new(shared),
    )
}

// ─── Tests ──────────────────────────────────────────────────────────
