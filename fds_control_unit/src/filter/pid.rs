//! PID controller with trapezoidal integration and anti-windup clamping.

use fds_common::filter::{Bounds, FilterKind, FilterSign, FilterSpecError, LoopFilterSpec};

/// PID control filter.
///
/// The integral term uses the trapezoidal rule and is clamped to
/// `int_bounds` on every tick, not only on saturation detection. The
/// derivative is blended with its previous value through `lead_coef`
/// (1 = raw derivative, smaller values smooth differentiator noise).
#[derive(Debug, Clone)]
pub struct Pid {
    dt: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    gain: f64,
    lead_coef: f64,
    bounds: Bounds,
    int_bounds: Bounds,
    sign: FilterSign,

    integral: f64,
    diff_last: f64,
    error_curr: f64,
    error_last: f64,
    control_curr: f64,
}

impl Pid {
    /// Construct from a validated spec of kind [`FilterKind::Pid`].
    pub fn from_spec(spec: &LoopFilterSpec) -> Result<Self, FilterSpecError> {
        spec.validate()?;
        if spec.kind != FilterKind::Pid {
            return Err(FilterSpecError::KindMismatch);
        }
        Ok(Self {
            dt: spec.dt,
            kp: spec.kp,
            ki: spec.ki,
            kd: spec.kd,
            gain: spec.gain,
            lead_coef: spec.lead_coef,
            bounds: spec.bounds,
            int_bounds: spec.int_bounds,
            sign: spec.sign,
            integral: 0.0,
            diff_last: 0.0,
            error_curr: 0.0,
            error_last: 0.0,
            control_curr: 0.0,
        })
    }

    /// Retune gains/bounds in place, preserving the dynamic state.
    pub fn set_params(&mut self, spec: &LoopFilterSpec) -> Result<(), FilterSpecError> {
        spec.validate()?;
        if spec.kind != FilterKind::Pid {
            return Err(FilterSpecError::KindMismatch);
        }
        self.dt = spec.dt;
        self.kp = spec.kp;
        self.ki = spec.ki;
        self.kd = spec.kd;
        self.gain = spec.gain;
        self.lead_coef = spec.lead_coef;
        self.bounds = spec.bounds;
        self.int_bounds = spec.int_bounds;
        self.sign = spec.sign;
        Ok(())
    }

    /// Change the update timestep (acquisition rate change).
    pub fn set_timestep(&mut self, dt: f64) {
        if dt > 0.0 {
            self.dt = dt;
        }
    }

    /// Seed the integrator so the next output with near-zero error is
    /// within epsilon of `value` (soft start from a manual setpoint).
    pub fn set_initial_offset(&mut self, value: f64) {
        let target = if self.gain != 0.0 {
            value / self.gain
        } else {
            value
        };
        self.integral = self.int_bounds.clamp(target);
    }

    /// One control step: `error = sign·(setpoint − pv)`.
    pub fn update(&mut self, setpoint: f64, process_variable: f64) -> f64 {
        self.error_last = self.error_curr;
        self.error_curr = self.sign.value() * (setpoint - process_variable);

        // P
        let p = self.kp * self.error_curr;

        // I — trapezoidal rule, clamped every tick (anti-windup)
        self.integral += 0.5 * self.ki * self.dt * (self.error_curr + self.error_last);
        self.integral = self.int_bounds.clamp(self.integral);

        // D — first difference, smoothed against the previous derivative
        let mut d = (self.error_curr - self.error_last) * self.kd / self.dt;
        d = self.lead_coef * d + (1.0 - self.lead_coef) * self.diff_last;
        self.diff_last = d;

        let control = self.bounds.clamp(self.gain * (p + self.integral + d));
        self.control_curr = control;
        control
    }

    /// Zero all dynamic state.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.diff_last = 0.0;
        self.error_curr = 0.0;
        self.error_last = 0.0;
        self.control_curr = 0.0;
    }

    /// Most recent control output.
    #[inline]
    pub fn last_output(&self) -> f64 {
        self.control_curr
    }

    #[cfg(test)]
    pub(crate) fn integral(&self) -> f64 {
        self.integral
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kp: f64, ki: f64, kd: f64) -> LoopFilterSpec {
        let mut spec = LoopFilterSpec::new(FilterKind::Pid, 0.1);
        spec.kp = kp;
        spec.ki = ki;
        spec.kd = kd;
        spec
    }

    #[test]
    fn wrong_kind_rejected() {
        let spec = LoopFilterSpec::new(FilterKind::IntLowpass, 0.1);
        assert_eq!(
            Pid::from_spec(&spec).unwrap_err(),
            FilterSpecError::KindMismatch
        );
    }

    #[test]
    fn pure_proportional() {
        let mut pid = Pid::from_spec(&spec(10.0, 0.0, 0.0)).unwrap();
        let out = pid.update(1.0, 0.0);
        assert!((out - 10.0).abs() < 1e-12);
    }

    #[test]
    fn trapezoidal_integral() {
        // Constant error 1.0, ki=2, dt=0.1: first tick averages against the
        // zero-initialized previous error.
        let mut pid = Pid::from_spec(&spec(0.0, 2.0, 0.0)).unwrap();
        let out1 = pid.update(1.0, 0.0);
        assert!((out1 - 0.1).abs() < 1e-12); // 0.5·2·0.1·(1+0)
        let out2 = pid.update(1.0, 0.0);
        assert!((out2 - 0.3).abs() < 1e-12); // + 0.5·2·0.1·(1+1)
    }

    #[test]
    fn integral_clamped_every_tick() {
        let mut s = spec(0.0, 100.0, 0.0);
        s.int_bounds = Bounds::new(-5.0, 5.0);
        let mut pid = Pid::from_spec(&s).unwrap();
        // Large sustained error: the accumulator must never leave its bounds.
        for _ in 0..10_000 {
            pid.update(1000.0, 0.0);
            assert!(pid.integral() <= 5.0 && pid.integral() >= -5.0);
        }
        assert!((pid.integral() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn output_clamped_to_bounds() {
        let mut s = spec(1000.0, 0.0, 0.0);
        s.bounds = Bounds::new(-1.0, 1.0);
        let mut pid = Pid::from_spec(&s).unwrap();
        assert_eq!(pid.update(100.0, 0.0), 1.0);
        assert_eq!(pid.update(-100.0, 0.0), -1.0);
    }

    #[test]
    fn derivative_smoothing() {
        let mut s = spec(0.0, 0.0, 1.0);
        s.lead_coef = 0.5;
        let mut pid = Pid::from_spec(&s).unwrap();
        pid.update(0.0, 0.0);
        // Step error 0 → 1: raw derivative = 1/0.1 = 10, smoothed by 0.5.
        let out = pid.update(1.0, 0.0);
        assert!((out - 5.0).abs() < 1e-12);
    }

    #[test]
    fn negative_sign_inverts_error() {
        let mut s = spec(1.0, 0.0, 0.0);
        s.sign = FilterSign::Negative;
        let mut pid = Pid::from_spec(&s).unwrap();
        let out = pid.update(1.0, 0.0);
        assert!((out + 1.0).abs() < 1e-12);
    }

    #[test]
    fn reset_zeroes_state() {
        let mut pid = Pid::from_spec(&spec(1.0, 10.0, 1.0)).unwrap();
        for _ in 0..50 {
            pid.update(5.0, 0.0);
        }
        assert!(pid.integral().abs() > 0.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.last_output(), 0.0);
    }

    #[test]
    fn initial_offset_soft_start() {
        let mut s = spec(1.0, 1.0, 0.0);
        s.gain = 2.0;
        let mut pid = Pid::from_spec(&s).unwrap();
        pid.set_initial_offset(80.0);
        // Near-zero error: the first output must land within epsilon of the
        // seeded value.
        let out = pid.update(10.0, 10.0);
        assert!((out - 80.0).abs() < 1e-9);
    }

    #[test]
    fn in_place_retune_preserves_integral() {
        let mut pid = Pid::from_spec(&spec(0.0, 1.0, 0.0)).unwrap();
        for _ in 0..10 {
            pid.update(1.0, 0.0);
        }
        let integral = pid.integral();
        assert!(integral > 0.0);
        pid.set_params(&spec(1.0, 2.0, 0.0)).unwrap();
        assert_eq!(pid.integral(), integral);
    }
}
