//! Integrator + lowpass loop filters (FLL/PLL loop shapes).
//!
//! One struct covers the three loop topologies: single or double
//! integrator behind one or two cascaded lowpass stages. The raw error
//! passes through the lowpass stage(s); the first integrator applies the
//! trapezoidal rule to the shaped error exactly as the PID integral does;
//! the optional second integrator accumulates the first. Each accumulator
//! is clamped to `int_bounds` on every tick.

use fds_common::filter::{Bounds, FilterKind, FilterSign, FilterSpecError, LoopFilterSpec};

use super::iir::IirFilter;

/// Loop-family control filter.
#[derive(Debug, Clone)]
pub struct LoopFilter {
    kind: FilterKind,
    dt: f64,
    ki: f64,
    kii: f64,
    bounds: Bounds,
    int_bounds: Bounds,
    sign: FilterSign,

    stage1: IirFilter,
    stage2: Option<IirFilter>,

    integral: f64,
    integral2: f64,
    error_filt_last: f64,
    control_curr: f64,
}

impl LoopFilter {
    /// Construct from a validated spec of a loop kind.
    pub fn from_spec(spec: &LoopFilterSpec) -> Result<Self, FilterSpecError> {
        spec.validate()?;
        if !spec.kind.is_loop() {
            return Err(FilterSpecError::KindMismatch);
        }

        let stage1 = IirFilter::new(&spec.ff, &spec.fb)?;
        let stage2 = if spec.kind.lowpass_stages() == 2 {
            Some(IirFilter::new(&spec.ff, &spec.fb)?)
        } else {
            None
        };

        Ok(Self {
            kind: spec.kind,
            dt: spec.dt,
            ki: spec.ki,
            kii: spec.kii,
            bounds: spec.bounds,
            int_bounds: spec.int_bounds,
            sign: spec.sign,
            stage1,
            stage2,
            integral: 0.0,
            integral2: 0.0,
            error_filt_last: 0.0,
            control_curr: 0.0,
        })
    }

    /// Filter topology.
    #[inline]
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Retune gains, bounds, and lowpass taps in place. Integrators keep
    /// their accumulated values; the lowpass path (stage histories and the
    /// shaped-error memory) restarts from zero with the new taps.
    pub fn set_params(&mut self, spec: &LoopFilterSpec) -> Result<(), FilterSpecError> {
        spec.validate()?;
        if spec.kind != self.kind {
            return Err(FilterSpecError::KindMismatch);
        }
        self.dt = spec.dt;
        self.ki = spec.ki;
        self.kii = spec.kii;
        self.bounds = spec.bounds;
        self.int_bounds = spec.int_bounds;
        self.sign = spec.sign;
        self.stage1.set_coefficients(&spec.ff, &spec.fb)?;
        if let Some(stage2) = &mut self.stage2 {
            stage2.set_coefficients(&spec.ff, &spec.fb)?;
        }
        self.error_filt_last = 0.0;
        Ok(())
    }

    /// Change the update timestep (acquisition rate change).
    pub fn set_timestep(&mut self, dt: f64) {
        if dt > 0.0 {
            self.dt = dt;
        }
    }

    /// Seed the outer integrator so that with near-zero error the next
    /// output is within epsilon of `value`.
    ///
    /// This is the soft-start contract for engaging lock from a manually
    /// set actuator value: the servo picks up where the operator left off
    /// instead of stepping the actuator.
    pub fn set_initial_offset(&mut self, value: f64) {
        if self.kind.integrator_count() == 2 {
            self.integral2 = self.int_bounds.clamp(value);
        } else {
            self.integral = self.int_bounds.clamp(value);
        }
    }

    /// One control step: `error = sign·(setpoint − pv)`.
    pub fn update(&mut self, setpoint: f64, process_variable: f64) -> f64 {
        let error = self.sign.value() * (setpoint - process_variable);

        // Shape the raw error through the lowpass cascade.
        let mut shaped = self.stage1.update(error);
        if let Some(stage2) = &mut self.stage2 {
            shaped = stage2.update(shaped);
        }

        // First integrator: trapezoidal rule on the shaped error.
        self.integral += 0.5 * self.ki * self.dt * (shaped + self.error_filt_last);
        self.integral = self.int_bounds.clamp(self.integral);
        self.error_filt_last = shaped;

        // Second integrator accumulates the first, normalized by ki so the
        // double-integrator corner is set by kii alone. Zero ki contributes
        // nothing rather than dividing by zero.
        let mut control = self.integral;
        if self.kind.integrator_count() == 2 {
            if self.ki != 0.0 {
                self.integral2 += self.kii * self.dt * (self.integral / self.ki);
                self.integral2 = self.int_bounds.clamp(self.integral2);
            }
            control += self.integral2;
        }

        let control = self.bounds.clamp(control);
        self.control_curr = control;
        control
    }

    /// Zero integrators and lowpass histories.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.integral2 = 0.0;
        self.error_filt_last = 0.0;
        self.control_curr = 0.0;
        self.stage1.reset(0.0);
        if let Some(stage2) = &mut self.stage2 {
            stage2.reset(0.0);
        }
    }

    /// Most recent control output.
    #[inline]
    pub fn last_output(&self) -> f64 {
        self.control_curr
    }

    #[cfg(test)]
    pub(crate) fn integrals(&self) -> (f64, f64) {
        (self.integral, self.integral2)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
