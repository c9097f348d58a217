//! Control filter engine: recursive primitive, PID, loop family, synthesis.
//!
//! The active control filter is a tagged variant carrying its own state.
//! Applying a spec of the same kind retunes the live filter in place;
//! applying a different kind replaces the variant, seeded from the outgoing
//! filter's last output so the actuator sees no step.

pub mod design;
pub mod iir;
pub mod loop_filter;
pub mod pid;

pub use design::{DesignError, DesignSpec, LowpassDesign, design_lowpass};
pub use iir::IirFilter;
pub use loop_filter::LoopFilter;
pub use pid::Pid;

use fds_common::filter::{FilterKind, FilterSpecError, LoopFilterSpec};

/// The live control filter, as a tagged variant.
#[derive(Debug, Clone)]
pub enum ActiveFilter {
    Pid(Pid),
    Loop(LoopFilter),
}

impl ActiveFilter {
    /// Construct a filter of the spec's kind.
    pub fn from_spec(spec: &LoopFilterSpec) -> Result<Self, FilterSpecError> {
        if spec.kind == FilterKind::Pid {
            Ok(Self::Pid(Pid::from_spec(spec)?))
        } else {
            Ok(Self::Loop(LoopFilter::from_spec(spec)?))
        }
    }

    /// Current topology.
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Pid(_) => FilterKind::Pid,
            Self::Loop(f) => f.kind(),
        }
    }

    /// Apply a spec: same kind mutates in place, a new kind replaces the
    /// variant seeded from the outgoing filter's last output.
    pub fn apply_spec(&mut self, spec: &LoopFilterSpec) -> Result<(), FilterSpecError> {
        if spec.kind == self.kind() {
            match self {
                Self::Pid(f) => f.set_params(spec),
                Self::Loop(f) => f.set_params(spec),
            }
        } else {
            let carry = self.last_output();
            let mut next = Self::from_spec(spec)?;
            next.set_initial_offset(carry);
            *self = next;
            Ok(())
        }
    }

    /// One control step.
    #[inline]
    pub fn update(&mut self, setpoint: f64, process_variable: f64) -> f64 {
        match self {
            Self::Pid(f) => f.update(setpoint, process_variable),
            Self::Loop(f) => f.update(setpoint, process_variable),
        }
    }

    /// Zero all dynamic state.
    pub fn reset(&mut self) {
        match self {
            Self::Pid(f) => f.reset(),
            Self::Loop(f) => f.reset(),
        }
    }

    /// Seed the (outer) integrator for a soft start.
    pub fn set_initial_offset(&mut self, value: f64) {
        match self {
            Self::Pid(f) => f.set_initial_offset(value),
            Self::Loop(f) => f.set_initial_offset(value),
        }
    }

    /// Change the update timestep.
    pub fn set_timestep(&mut self, dt: f64) {
        match self {
            Self::Pid(f) => f.set_timestep(dt),
            Self::Loop(f) => f.set_timestep(dt),
        }
    }

    /// Most recent control output.
    pub fn last_output(&self) -> f64 {
        match self {
            Self::Pid(f) => f.last_output(),
            Self::Loop(f) => f.last_output(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fds_common::filter::Bounds;

    fn loop_spec(kind: FilterKind) -> LoopFilterSpec {
        let mut spec = LoopFilterSpec::new(kind, 1.0);
        spec.ki = 1.0;
        spec.bounds = Bounds::new(-1e6, 1e6);
        spec
    }

    #[test]
    fn constructs_matching_variant() {
        let pid = ActiveFilter::from_spec(&loop_spec(FilterKind::Pid)).unwrap();
        assert_eq!(pid.kind(), FilterKind::Pid);
        let lp = ActiveFilter::from_spec(&loop_spec(FilterKind::IntLowpass)).unwrap();
        assert_eq!(lp.kind(), FilterKind::IntLowpass);
    }

    #[test]
    fn same_kind_update_keeps_state() {
        let mut filter = ActiveFilter::from_spec(&loop_spec(FilterKind::IntLowpass)).unwrap();
        for _ in 0..10 {
            filter.update(1.0, 0.0);
        }
        let before = filter.last_output();
        assert!(before > 0.0);

        let mut retuned = loop_spec(FilterKind::IntLowpass);
        retuned.ki = 3.0;
        filter.apply_spec(&retuned).unwrap();
        // Still the same variant with its accumulated integrator.
        assert_eq!(filter.kind(), FilterKind::IntLowpass);
        let next = filter.update(0.0, 0.0);
        assert!((next - before).abs() < 1e-9);
    }

    #[test]
    fn kind_switch_preserves_output_continuity() {
        let mut filter = ActiveFilter::from_spec(&loop_spec(FilterKind::IntLowpass)).unwrap();
        for _ in 0..25 {
            filter.update(10.0, 0.0);
        }
        let carried = filter.last_output();

        filter
            .apply_spec(&loop_spec(FilterKind::DoubleIntLowpass))
            .unwrap();
        assert_eq!(filter.kind(), FilterKind::DoubleIntLowpass);
        // With zero error the new filter holds the carried output.
        let out = filter.update(0.0, 0.0);
        assert!((out - carried).abs() < 1e-9);
    }

    #[test]
    fn timestep_propagates() {
        let mut filter = ActiveFilter::from_spec(&loop_spec(FilterKind::IntLowpass)).unwrap();
        filter.set_timestep(0.5);
        // Trapezoid increment halves with dt.
        let out = filter.update(1.0, 0.0);
        assert!((out - 0.25).abs() < 1e-12);
    }
}
