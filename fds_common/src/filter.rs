//! Filter descriptors shared between the design layer and the servo engine.
//!
//! A [`LoopFilterSpec`] fully describes one control filter: its kind, gains,
//! coefficient vectors, saturation bounds, and timestep. The servo engine
//! consumes specs to construct or retune its active filter; the front-end
//! produces them from user input or a persisted settings document.

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of taps in any coefficient vector.
///
/// Bounds both designed lowpass stages and hand-entered coefficients so the
/// servo loop never allocates. The Butterworth synthesizer caps its order
/// well below this.
pub const MAX_FILTER_TAPS: usize = 32;

/// Bounded coefficient vector (feed-forward or feedback taps).
pub type CoefVec = Vec<f64, MAX_FILTER_TAPS>;

// ─── Filter Kind ────────────────────────────────────────────────────

/// Control filter topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Proportional-integral-derivative controller.
    Pid,
    /// Single integrator behind a single lowpass stage.
    IntLowpass,
    /// Double integrator behind a single lowpass stage.
    DoubleIntLowpass,
    /// Double integrator behind two cascaded lowpass stages.
    DoubleIntDoubleLowpass,
}

impl FilterKind {
    /// Number of integrator accumulators for this kind.
    #[inline]
    pub const fn integrator_count(self) -> usize {
        match self {
            Self::Pid | Self::IntLowpass => 1,
            Self::DoubleIntLowpass | Self::DoubleIntDoubleLowpass => 2,
        }
    }

    /// Number of cascaded lowpass stages on the error path.
    #[inline]
    pub const fn lowpass_stages(self) -> usize {
        match self {
            Self::Pid => 0,
            Self::IntLowpass | Self::DoubleIntLowpass => 1,
            Self::DoubleIntDoubleLowpass => 2,
        }
    }

    /// True for the loop-filter family (everything except PID).
    #[inline]
    pub const fn is_loop(self) -> bool {
        !matches!(self, Self::Pid)
    }
}

// ─── Sign & Bounds ──────────────────────────────────────────────────

/// Servo polarity: whether a positive error drives the actuator up or down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterSign {
    #[default]
    Positive,
    Negative,
}

impl FilterSign {
    /// Multiplicative factor applied to the raw error.
    #[inline]
    pub const fn value(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// Closed saturation interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

impl Bounds {
    /// Unbounded interval (no saturation).
    pub const fn unbounded() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
        }
    }

    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Clamp a value into the interval.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }

    /// True when `lo < hi` and neither end is NaN.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.lo < self.hi
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

// ─── Loop Filter Spec ───────────────────────────────────────────────

/// Immutable descriptor of one control filter configuration.
///
/// Gains that a kind does not use are ignored (e.g. `kp`/`kd` for the loop
/// family, `kii` for single-integrator kinds). Zero `ki` disables the double
/// integrator's accumulation rather than dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopFilterSpec {
    /// Filter topology.
    pub kind: FilterKind,
    /// Update timestep [s] — the acquisition sample period.
    pub dt: f64,
    /// Proportional gain (PID).
    #[serde(default)]
    pub kp: f64,
    /// Integral gain.
    #[serde(default)]
    pub ki: f64,
    /// Derivative gain (PID).
    #[serde(default)]
    pub kd: f64,
    /// Second-integrator gain (double-integrator kinds).
    #[serde(default)]
    pub kii: f64,
    /// Overall output gain (PID).
    #[serde(default = "default_gain")]
    pub gain: f64,
    /// Derivative smoothing coefficient in (0, 1]; 1 = no smoothing.
    #[serde(default = "default_gain")]
    pub lead_coef: f64,
    /// Servo polarity.
    #[serde(default)]
    pub sign: FilterSign,
    /// Lowpass feed-forward taps (loop family).
    #[serde(default = "default_ff")]
    pub ff: CoefVec,
    /// Lowpass feedback taps (loop family).
    #[serde(default = "default_fb")]
    pub fb: CoefVec,
    /// Output saturation interval.
    #[serde(default)]
    pub bounds: Bounds,
    /// Integrator anti-windup interval.
    #[serde(default)]
    pub int_bounds: Bounds,
}

fn default_gain() -> f64 {
    1.0
}

fn default_ff() -> CoefVec {
    let mut v = CoefVec::new();
    let _ = v.push(1.0);
    v
}

fn default_fb() -> CoefVec {
    let mut v = CoefVec::new();
    let _ = v.push(0.0);
    v
}

/// Spec validation failure — a configuration error, reported synchronously.
#[derive(Debug, Error, PartialEq)]
pub enum FilterSpecError {
    #[error("timestep must be positive, got {0}")]
    InvalidTimestep(f64),
    #[error("empty coefficient vector")]
    EmptyCoefficients,
    #[error("coefficient vector exceeds {MAX_FILTER_TAPS} taps")]
    TooManyTaps,
    #[error("invalid bounds: [{lo}, {hi}]")]
    InvalidBounds { lo: f64, hi: f64 },
    #[error("lead coefficient must be in (0, 1], got {0}")]
    InvalidLeadCoef(f64),
    #[error("spec kind does not match the target filter")]
    KindMismatch,
}

impl LoopFilterSpec {
    /// Minimal spec of the given kind; callers fill in gains and bounds.
    pub fn new(kind: FilterKind, dt: f64) -> Self {
        Self {
            kind,
            dt,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            kii: 0.0,
            gain: 1.0,
            lead_coef: 1.0,
            sign: FilterSign::Positive,
            ff: default_ff(),
            fb: default_fb(),
            bounds: Bounds::unbounded(),
            int_bounds: Bounds::unbounded(),
        }
    }

    /// Check the spec for construction-time configuration errors.
    pub fn validate(&self) -> Result<(), FilterSpecError> {
        if !(self.dt > 0.0) {
            return Err(FilterSpecError::InvalidTimestep(self.dt));
        }
        if !self.bounds.is_valid() {
            return Err(FilterSpecError::InvalidBounds {
                lo: self.bounds.lo,
                hi: self.bounds.hi,
            });
        }
        if !self.int_bounds.is_valid() {
            return Err(FilterSpecError::InvalidBounds {
                lo: self.int_bounds.lo,
                hi: self.int_bounds.hi,
            });
        }
        if self.kind.is_loop() && (self.ff.is_empty() || self.fb.is_empty()) {
            return Err(FilterSpecError::EmptyCoefficients);
        }
        if !(self.lead_coef > 0.0 && self.lead_coef <= 1.0) {
            return Err(FilterSpecError::InvalidLeadCoef(self.lead_coef));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_properties() {
        assert_eq!(FilterKind::Pid.integrator_count(), 1);
        assert_eq!(FilterKind::Pid.lowpass_stages(), 0);
        assert!(!FilterKind::Pid.is_loop());
        assert_eq!(FilterKind::IntLowpass.integrator_count(), 1);
        assert_eq!(FilterKind::DoubleIntLowpass.integrator_count(), 2);
        assert_eq!(FilterKind::DoubleIntDoubleLowpass.lowpass_stages(), 2);
    }

    #[test]
    fn bounds_clamp() {
        let b = Bounds::new(-1.0, 1.0);
        assert_eq!(b.clamp(5.0), 1.0);
        assert_eq!(b.clamp(-5.0), -1.0);
        assert_eq!(b.clamp(0.5), 0.5);
    }

    #[test]
    fn unbounded_passes_everything() {
        let b = Bounds::unbounded();
        assert_eq!(b.clamp(1e300), 1e300);
        assert_eq!(b.clamp(-1e300), -1e300);
    }

    #[test]
    fn default_spec_is_valid() {
        let spec = LoopFilterSpec::new(FilterKind::DoubleIntLowpass, 0.1);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn zero_timestep_rejected() {
        let spec = LoopFilterSpec::new(FilterKind::Pid, 0.0);
        assert_eq!(
            spec.validate(),
            Err(FilterSpecError::InvalidTimestep(0.0))
        );
    }

    #[test]
    fn empty_coefficients_rejected_for_loop_kinds() {
        let mut spec = LoopFilterSpec::new(FilterKind::IntLowpass, 0.1);
        spec.ff = CoefVec::new();
        assert_eq!(spec.validate(), Err(FilterSpecError::EmptyCoefficients));
        // PID does not use the lowpass taps.
        let mut pid = LoopFilterSpec::new(FilterKind::Pid, 0.1);
        pid.ff = CoefVec::new();
        assert!(pid.validate().is_ok());
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut spec = LoopFilterSpec::new(FilterKind::Pid, 0.1);
        spec.bounds = Bounds::new(10.0, -10.0);
        assert!(matches!(
            spec.validate(),
            Err(FilterSpecError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn sign_values() {
        assert_eq!(FilterSign::Positive.value(), 1.0);
        assert_eq!(FilterSign::Negative.value(), -1.0);
    }

    #[test]
    fn spec_toml_round_trip() {
        let mut spec = LoopFilterSpec::new(FilterKind::DoubleIntDoubleLowpass, 0.02);
        spec.ki = 1.5;
        spec.kii = 0.3;
        spec.bounds = Bounds::new(1e6, 100e6);
        let text = toml::to_string(&spec).unwrap();
        let back: LoopFilterSpec = toml::from_str(&text).unwrap();
        assert_eq!(back, spec);
    }
}
