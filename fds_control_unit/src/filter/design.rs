//! Closed-form Butterworth lowpass synthesis.
//!
//! From a passband/stopband specification: minimum filter order, analytic
//! cutoff frequency, then digital coefficients via the analog Butterworth
//! prototype, frequency pre-warp, and the bilinear transform. Attenuations
//! are linear ratios derived from dB relative to the configured gain.

use std::f64::consts::PI;

use num_complex::Complex64;
use thiserror::Error;

use fds_common::filter::{CoefVec, MAX_FILTER_TAPS};

/// Highest synthesizable order, bounded by the coefficient capacity.
pub const MAX_DESIGN_ORDER: usize = MAX_FILTER_TAPS - 1;

/// Band specification for a lowpass design.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignSpec {
    /// Passband edge [Hz].
    pub passband_hz: f64,
    /// Stopband edge [Hz].
    pub stopband_hz: f64,
    /// Attenuation at the passband edge [dB], relative to 0 dB.
    pub att_passband_db: f64,
    /// Attenuation at the stopband edge [dB], relative to 0 dB.
    pub att_stopband_db: f64,
    /// Overall filter gain [dB], applied to the feed-forward taps.
    pub gain_db: f64,
    /// Sampling frequency [Hz].
    pub f_sampling: f64,
}

/// Synthesized digital lowpass.
#[derive(Debug, Clone, PartialEq)]
pub struct LowpassDesign {
    /// Minimum Butterworth order meeting the band spec.
    pub order: usize,
    /// Analytic cutoff frequency [Hz].
    pub cutoff_hz: f64,
    /// Feed-forward taps (gain applied).
    pub ff: CoefVec,
    /// Feedback taps, ready for [`IirFilter`](super::IirFilter).
    pub fb: CoefVec,
}

/// Design rejection — a configuration error; prior filter state stays
/// untouched.
#[derive(Debug, Error, PartialEq)]
pub enum DesignError {
    #[error("critical frequency {freq_hz} Hz at or above Nyquist ({nyquist_hz} Hz)")]
    AboveNyquist { freq_hz: f64, nyquist_hz: f64 },
    #[error("passband frequency {passband_hz} Hz not below stopband {stopband_hz} Hz")]
    BandOrdering { passband_hz: f64, stopband_hz: f64 },
    #[error("attenuation {att_db} dB above the filter gain {gain_db} dB")]
    AttenuationAboveGain { att_db: f64, gain_db: f64 },
    #[error("passband attenuation must stay above stopband attenuation")]
    AttenuationOrdering,
    #[error("required order {order} exceeds the supported maximum {max}")]
    OrderTooHigh { order: usize, max: usize },
}

/// Linear attenuation ratio from dB.
#[inline]
fn db_to_att(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Design a digital Butterworth lowpass meeting the band specification.
pub fn design_lowpass(spec: &DesignSpec) -> Result<LowpassDesign, DesignError> {
    let omega_p = 2.0 * PI * spec.passband_hz;
    let omega_s = 2.0 * PI * spec.stopband_hz;
    let nyquist = PI * spec.f_sampling;

    // Critical frequencies must sit below Nyquist.
    for (omega, freq) in [(omega_p, spec.passband_hz), (omega_s, spec.stopband_hz)] {
        if omega >= nyquist {
            return Err(DesignError::AboveNyquist {
                freq_hz: freq,
                nyquist_hz: spec.f_sampling / 2.0,
            });
        }
    }
    if omega_p >= omega_s {
        return Err(DesignError::BandOrdering {
            passband_hz: spec.passband_hz,
            stopband_hz: spec.stopband_hz,
        });
    }
    for att_db in [spec.att_passband_db, spec.att_stopband_db] {
        if att_db > spec.gain_db {
            return Err(DesignError::AttenuationAboveGain {
                att_db,
                gain_db: spec.gain_db,
            });
        }
    }

    // Linear ratios relative to the gain; the passband constraint must be
    // the less restrictive of the two.
    let att_p = db_to_att(spec.att_passband_db - spec.gain_db);
    let att_s = db_to_att(spec.att_stopband_db - spec.gain_db);
    if att_p <= att_s {
        return Err(DesignError::AttenuationOrdering);
    }

    // Minimum order: N = ceil( log10((δs⁻²−1)/(δp⁻²−1)) / (2 log10(Ωs/Ωp)) )
    let num = (att_s.powi(-2) - 1.0) / (att_p.powi(-2) - 1.0);
    let order = (num.log10() / (2.0 * (omega_s / omega_p).log10()))
        .ceil()
        .max(1.0) as usize;
    if order > MAX_DESIGN_ORDER {
        return Err(DesignError::OrderTooHigh {
            order,
            max: MAX_DESIGN_ORDER,
        });
    }

    // Analytic cutoff from the passband spec: Ωc = Ωp / (δp⁻²−1)^(1/2N)
    let omega_c = omega_p / (att_p.powi(-2) - 1.0).powf(1.0 / (2.0 * order as f64));

    let (mut ff, fb) = digital_butterworth(order, omega_c, 2.0 * PI * spec.f_sampling);
    let gain = db_to_att(spec.gain_db);
    for tap in ff.iter_mut() {
        *tap *= gain;
    }

    Ok(LowpassDesign {
        order,
        cutoff_hz: omega_c / (2.0 * PI),
        ff,
        fb,
    })
}

/// Digital Butterworth coefficients at a given analog cutoff.
///
/// Pre-warps the normalized cutoff, scales the analog prototype poles, and
/// applies the bilinear transform; the N zeros land at z = −1. Returns
/// `(ff, fb)` with `ff = b / a0` and `fb = −a[1..] / a0`.
fn digital_butterworth(order: usize, omega_c: f64, omega_samp: f64) -> (CoefVec, CoefVec) {
    let n = order;
    // Normalize the cutoff to Nyquist, then pre-warp for the bilinear map.
    let wn = omega_c / (omega_samp / 2.0);
    let fs = 2.0;
    let warped = 2.0 * fs * (PI * wn / fs).tan();

    // Unit Butterworth prototype poles: exp(iπ(2k + N + 1) / 2N), all in
    // the left half-plane, scaled to the warped cutoff.
    let poles: Vec<Complex64> = (0..n)
        .map(|k| {
            let angle = PI * (2 * k + n + 1) as f64 / (2 * n) as f64;
            warped * Complex64::from_polar(1.0, angle)
        })
        .collect();
    let analog_gain = warped.powi(n as i32);

    // Bilinear transform: z = (2fs + s) / (2fs − s).
    let fs2 = Complex64::new(2.0 * fs, 0.0);
    let digital_poles: Vec<Complex64> =
        poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    let denom: Complex64 = poles.iter().map(|&p| fs2 - p).product();
    let digital_gain = (analog_gain * (Complex64::new(1.0, 0.0) / denom)).re;

    // b(z) = k · (z + 1)^N — binomial coefficients.
    let mut b = vec![0.0; n + 1];
    let mut binom = 1.0f64;
    for (k, slot) in b.iter_mut().enumerate() {
        *slot = digital_gain * binom;
        binom = binom * (n - k) as f64 / (k + 1) as f64;
    }

    // a(z) from the digital poles; conjugate symmetry keeps it real.
    let a = real_poly_from_roots(&digital_poles);

    let a0 = a[0];
    let mut ff = CoefVec::new();
    for tap in &b {
        let _ = ff.push(tap / a0);
    }
    let mut fb = CoefVec::new();
    for tap in &a[1..] {
        let _ = fb.push(-tap / a0);
    }
    (ff, fb)
}

/// Expand a monic polynomial from its complex roots, returning the real
/// coefficient sequence (highest power first).
fn real_poly_from_roots(roots: &[Complex64]) -> Vec<f64> {
    let mut poly = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); poly.len() + 1];
        for (i, &coef) in poly.iter().enumerate() {
            next[i] += coef;
            next[i + 1] -= coef * root;
        }
        poly = next;
    }
    poly.into_iter().map(|c| c.re).collect()
}

/// Complex frequency response of `(ff, fb)` coefficients at a digital
/// frequency `w` [rad/sample].
pub fn frequency_response(ff: &[f64], fb: &[f64], w: f64) -> Complex64 {
    let z = |k: f64| Complex64::from_polar(1.0, -w * k);
    let num: Complex64 = ff
        .iter()
        .enumerate()
        .map(|(k, &c)| c * z(k as f64))
        .sum();
    let den: Complex64 = Complex64::new(1.0, 0.0)
        - fb.iter()
            .enumerate()
            .map(|(k, &c)| c * z((k + 1) as f64))
            .sum::<Complex64>();
    num / den
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_spec() -> DesignSpec {
        DesignSpec {
            passband_hz: 1.0,
            stopband_hz: 20.0,
            att_passband_db: -1.0,
            att_stopband_db: -10.0,
            gain_db: 0.0,
            f_sampling: 100.0,
        }
    }

    #[test]
    fn reference_design_order_and_cutoff() {
        let design = design_lowpass(&reference_spec()).unwrap();
        assert!(design.order >= 1);
        assert!(
            design.cutoff_hz > 1.0 && design.cutoff_hz < 20.0,
            "cutoff {} Hz",
            design.cutoff_hz
        );
    }

    #[test]
    fn reference_design_meets_attenuation_bounds() {
        let spec = reference_spec();
        let design = design_lowpass(&spec).unwrap();

        let response_at = |freq_hz: f64| {
            let w = 2.0 * PI * freq_hz / spec.f_sampling;
            frequency_response(&design.ff, &design.fb, w).norm()
        };

        // Passband edge: attenuation no worse than −1 dB (linear 0.794).
        let att_p = db_to_att(-1.0);
        assert!(
            response_at(1.0) >= att_p * 0.98,
            "passband response {}",
            response_at(1.0)
        );
        // Stopband edge: attenuation at least −10 dB (linear 0.1).
        let att_s = db_to_att(-10.0);
        assert!(
            response_at(20.0) <= att_s * 1.05,
            "stopband response {}",
            response_at(20.0)
        );
    }

    #[test]
    fn dc_gain_matches_configured_gain() {
        let mut spec = reference_spec();
        spec.gain_db = 6.0;
        spec.att_passband_db = 5.0;
        spec.att_stopband_db = -4.0;
        let design = design_lowpass(&spec).unwrap();
        let dc = frequency_response(&design.ff, &design.fb, 0.0).norm();
        assert!((dc - db_to_att(6.0)).abs() < 1e-9, "dc gain {dc}");
    }

    #[test]
    fn first_order_coefficients_are_stable() {
        let design = design_lowpass(&reference_spec()).unwrap();
        assert_eq!(design.ff.len(), design.order + 1);
        assert_eq!(design.fb.len(), design.order);
        // All poles inside the unit circle ⇒ |fb| < 1 for first order.
        if design.order == 1 {
            assert!(design.fb[0].abs() < 1.0);
        }
    }

    #[test]
    fn nyquist_violation_rejected() {
        let mut spec = reference_spec();
        spec.stopband_hz = 60.0;
        assert!(matches!(
            design_lowpass(&spec),
            Err(DesignError::AboveNyquist { .. })
        ));
    }

    #[test]
    fn band_ordering_rejected() {
        let mut spec = reference_spec();
        spec.passband_hz = 25.0;
        spec.stopband_hz = 10.0;
        // 25 Hz is below Nyquist (50 Hz) but above the stopband edge.
        assert!(matches!(
            design_lowpass(&spec),
            Err(DesignError::BandOrdering { .. })
        ));
    }

    #[test]
    fn attenuation_above_gain_rejected() {
        let mut spec = reference_spec();
        spec.att_passband_db = 1.0;
        assert!(matches!(
            design_lowpass(&spec),
            Err(DesignError::AttenuationAboveGain { .. })
        ));
    }

    #[test]
    fn attenuation_ordering_rejected() {
        let mut spec = reference_spec();
        spec.att_passband_db = -10.0;
        spec.att_stopband_db = -1.0;
        assert!(matches!(
            design_lowpass(&spec),
            Err(DesignError::AttenuationOrdering)
        ));
    }

    #[test]
    fn sharp_transition_needs_higher_order() {
        let mut spec = reference_spec();
        spec.stopband_hz = 2.0;
        spec.att_stopband_db = -40.0;
        let design = design_lowpass(&spec).unwrap();
        assert!(design.order > 2, "order {}", design.order);
    }

    #[test]
    fn monotone_lowpass_response() {
        // Butterworth is maximally flat: magnitude decreases with frequency.
        let design = design_lowpass(&reference_spec()).unwrap();
        let mut prev = f64::INFINITY;
        for i in 1..=40 {
            let w = PI * i as f64 / 41.0;
            let mag = frequency_response(&design.ff, &design.fb, w).norm();
            assert!(mag <= prev + 1e-12);
            prev = mag;
        }
    }
}
