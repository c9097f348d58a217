//! Incremental stability engine over an accumulating sample record.

use tracing::debug;

use crate::deviation::{adev_overlapped, hdev};
use crate::noise::{NoiseType, confidence_interval, noise_id_for_tau};

/// Safety margin applied when deriving the tau grid from the sampling
/// frequency [Hz].
const TAU_MARGIN: f64 = 0.1;

/// Deviation estimator selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviationKind {
    /// Overlapped Allan deviation.
    #[default]
    AllanOverlapped,
    /// Hadamard (third-difference) deviation.
    Hadamard,
}

/// One point on the tau grid.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TauPoint {
    /// Averaging time [s].
    pub tau: f64,
    /// Deviation estimate, once the window fits the record.
    pub dev: Option<f64>,
    /// Identified dominant noise category.
    pub noise: Option<NoiseType>,
    /// One-sigma confidence interval.
    pub confidence: Option<f64>,
}

/// Accumulates frequency samples and recomputes the deviation series.
///
/// Samples are only ever appended; the phase-error record extends
/// incrementally from the running cumulative sum, and tau points fill in
/// (and refine) as the record grows — never retroactively invalidated.
#[derive(Debug)]
pub struct StabilityEngine {
    f_sampling: f64,
    f_reference: f64,
    kind: DeviationKind,
    freqs: Vec<f64>,
    /// Phase-error record (cumulative fractional frequency over the sample
    /// period).
    x: Vec<f64>,
    /// Running cumulative sum of the fractional frequency.
    y_sum: f64,
    points: Vec<TauPoint>,
}

impl StabilityEngine {
    /// Create an engine with a fixed tau grid.
    ///
    /// The grid spans `[1/(fs − margin), max_samples / (2 (fs + margin))]`
    /// linearly with `tau_count` points, matching the display span of a
    /// `max_samples`-deep history. The margin keeps the shortest tau just
    /// above one sample period so its averaging factor never rounds to zero.
    pub fn new(
        f_sampling: f64,
        f_reference: f64,
        tau_count: usize,
        max_samples: usize,
    ) -> Self {
        let tau_min = if f_sampling > TAU_MARGIN {
            1.0 / (f_sampling - TAU_MARGIN)
        } else {
            1.0 / f_sampling
        };
        let tau_max = max_samples as f64 / (2.0 * (f_sampling + TAU_MARGIN));
        let points = (0..tau_count)
            .map(|i| {
                let frac = if tau_count > 1 {
                    i as f64 / (tau_count - 1) as f64
                } else {
                    0.0
                };
                TauPoint {
                    tau: tau_min + frac * (tau_max - tau_min),
                    dev: None,
                    noise: None,
                    confidence: None,
                }
            })
            .collect();

        Self {
            f_sampling,
            f_reference,
            kind: DeviationKind::default(),
            freqs: Vec::new(),
            x: Vec::new(),
            y_sum: 0.0,
            points,
        }
    }

    /// Select the deviation estimator. Existing points are recomputed on
    /// the next [`recompute`](Self::recompute).
    pub fn set_kind(&mut self, kind: DeviationKind) {
        self.kind = kind;
    }

    /// Append one frequency sample [Hz], extending the phase-error record.
    pub fn push(&mut self, freq: f64) {
        let y = (freq - self.f_reference) / self.f_reference;
        self.y_sum += y;
        self.freqs.push(freq);
        self.x.push(self.y_sum / self.f_sampling);
    }

    /// Append a batch of frequency samples.
    pub fn extend(&mut self, freqs: &[f64]) {
        for &f in freqs {
            self.push(f);
        }
    }

    /// Recompute every tau point whose averaging window fits the record.
    pub fn recompute(&mut self) {
        let n = self.x.len();
        if n < 3 {
            return;
        }
        debug!(samples = n, kind = ?self.kind, "recomputing deviation series");

        for point in &mut self.points {
            let dev = match self.kind {
                DeviationKind::AllanOverlapped => {
                    adev_overlapped(&self.x, point.tau, self.f_sampling)
                }
                DeviationKind::Hadamard => hdev(&self.x, point.tau, self.f_sampling),
            };
            let Some(dev) = dev else {
                continue;
            };

            let alpha = noise_id_for_tau(&self.freqs, point.tau, self.f_sampling);
            let noise = NoiseType::from_alpha(alpha);
            point.dev = Some(dev);
            point.noise = Some(noise);
            point.confidence = Some(confidence_interval(
                dev,
                point.tau,
                self.f_sampling,
                noise,
                n,
            ));
        }
    }

    /// Current deviation series, one entry per tau.
    pub fn points(&self) -> &[TauPoint] {
        &self.points
    }

    /// Number of accumulated samples.
    pub fn sample_count(&self) -> usize {
        self.x.len()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
