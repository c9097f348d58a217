//! Lock controller: process-variable shaping, the lock/mode state machine,
//! and control-filter dispatch.
//!
//! Lock lifecycle: `Unlocked → FrequencyLocked → PhaseLocked` and back.
//! Engaging always starts in frequency lock, seeded from the manually set
//! actuator value. When phase mode is selected, a hysteresis counter
//! tracks how long the process variable stays inside the phase-lock
//! margin; saturating the counter hands control to the phase filter (fed
//! the integrated phase error), and draining it falls back to frequency
//! lock. Disengaging reverts the actuator to the manual value.

use thiserror::Error;
use tracing::{debug, info};

use fds_common::command::{FilterSlot, LockMode};
use fds_common::config::ServoConfig;
use fds_common::filter::{FilterSpecError, LoopFilterSpec};

use crate::filter::{ActiveFilter, IirFilter};

/// Lock acquisition state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockState {
    #[default]
    Unlocked,
    FrequencyLocked,
    PhaseLocked,
}

/// Engage rejection — preconditions unmet, prior state unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngageError {
    #[error("no control filter designed for the {0:?} slot")]
    FilterNotDesigned(FilterSlot),
    #[error("actuator output is disabled")]
    ActuatorDisabled,
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    /// Shaped process variable [Hz].
    pub pv: f64,
    /// Control value for the actuator [Hz].
    pub control: f64,
    /// Phase lock acquired (`true`) or lost (`false`) this tick.
    pub phase_event: Option<bool>,
    /// Lock-indicator change this tick.
    pub indicator_event: Option<bool>,
}

/// The servo's control brain, stepped once per acquisition sample.
pub struct LockController {
    dt: f64,
    phase_lock_margin: f64,
    counter_limit: u32,
    error_margin: f64,

    state: LockState,
    mode: LockMode,
    counter: u32,
    phase_acc: f64,
    setpoint: f64,
    manual_control: f64,
    control: f64,
    lock_indicator: bool,
    last_raw_pv: f64,

    freq_filter: Option<ActiveFilter>,
    phase_filter: Option<ActiveFilter>,
    aux_lowpass: Option<IirFilter>,
    lowpass_active: bool,
}

impl LockController {
    pub fn new(config: &ServoConfig) -> Self {
        Self {
            dt: config.sample_period,
            phase_lock_margin: config.phase_lock_margin,
            counter_limit: config.phase_lock_counter_limit,
            error_margin: config.error_margin,
            state: LockState::Unlocked,
            mode: LockMode::Frequency,
            counter: 0,
            phase_acc: 0.0,
            setpoint: 0.0,
            manual_control: 0.0,
            control: 0.0,
            lock_indicator: false,
            last_raw_pv: 0.0,
            freq_filter: None,
            phase_filter: None,
            aux_lowpass: None,
            lowpass_active: false,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> LockState {
        self.state
    }

    #[inline]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state != LockState::Unlocked
    }

    /// Current control value (manual value while unlocked).
    #[inline]
    pub fn control(&self) -> f64 {
        self.control
    }

    #[inline]
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// True while the auxiliary lowpass shapes the process variable.
    #[inline]
    pub fn lowpass_active(&self) -> bool {
        self.lowpass_active
    }

    /// True when a filter is designed for the given slot.
    pub fn has_filter(&self, slot: FilterSlot) -> bool {
        match slot {
            FilterSlot::Frequency => self.freq_filter.is_some(),
            FilterSlot::Phase => self.phase_filter.is_some(),
        }
    }

    #[cfg(test)]
    pub(crate) fn hysteresis_counter(&self) -> u32 {
        self.counter
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Design or update a control filter slot.
    ///
    /// A failed spec leaves the slot (and lock readiness) untouched.
    pub fn configure(
        &mut self,
        slot: FilterSlot,
        spec: &LoopFilterSpec,
    ) -> Result<(), FilterSpecError> {
        let slot_filter = match slot {
            FilterSlot::Frequency => &mut self.freq_filter,
            FilterSlot::Phase => &mut self.phase_filter,
        };
        match slot_filter {
            Some(filter) => filter.apply_spec(spec)?,
            None => *slot_filter = Some(ActiveFilter::from_spec(spec)?),
        }
        debug!(?slot, kind = ?spec.kind, "control filter configured");
        Ok(())
    }

    /// Install auxiliary lowpass coefficients for process-variable shaping.
    pub fn set_lowpass(&mut self, ff: &[f64], fb: &[f64]) -> Result<(), FilterSpecError> {
        match &mut self.aux_lowpass {
            Some(filter) => filter.set_coefficients(ff, fb)?,
            None => self.aux_lowpass = Some(IirFilter::new(ff, fb)?),
        }
        Ok(())
    }

    /// Toggle the auxiliary lowpass. Enabling pads the filter history with
    /// the current raw process variable to avoid a switching transient.
    pub fn apply_lowpass(&mut self, active: bool) {
        if active && !self.lowpass_active {
            if let Some(filter) = &mut self.aux_lowpass {
                filter.reset(self.last_raw_pv);
            }
        }
        self.lowpass_active = active;
    }

    /// Frequency setpoint [Hz].
    pub fn set_setpoint(&mut self, value: f64) {
        self.setpoint = value;
    }

    /// Record the last manually commanded actuator value [Hz].
    pub fn set_manual_control(&mut self, value: f64) {
        self.manual_control = value;
        if !self.is_locked() {
            self.control = value;
        }
    }

    #[inline]
    pub fn manual_control(&self) -> f64 {
        self.manual_control
    }

    /// Switch tracking mode. Leaving phase mode while phase-locked drops
    /// back to frequency lock with the control value carried over.
    ///
    /// Returns a phase-lock-lost notification when that fallback happens.
    pub fn set_mode(&mut self, mode: LockMode) -> Option<bool> {
        let was = self.mode;
        self.mode = mode;
        if was == LockMode::Phase
            && mode == LockMode::Frequency
            && self.state == LockState::PhaseLocked
        {
            self.fall_back_to_frequency();
            return Some(false);
        }
        None
    }

    /// Propagate an acquisition rate change into every live filter.
    pub fn set_timestep(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        self.dt = dt;
        if let Some(filter) = &mut self.freq_filter {
            filter.set_timestep(dt);
        }
        if let Some(filter) = &mut self.phase_filter {
            filter.set_timestep(dt);
        }
    }

    /// Zero all filter state (integrators and histories).
    pub fn reset_filters(&mut self) {
        if let Some(filter) = &mut self.freq_filter {
            filter.reset();
        }
        if let Some(filter) = &mut self.phase_filter {
            filter.reset();
        }
        if let Some(filter) = &mut self.aux_lowpass {
            filter.reset(0.0);
        }
        self.phase_acc = 0.0;
    }

    // ─── Lock lifecycle ─────────────────────────────────────────────

    /// Engage the lock from the current manual actuator value.
    ///
    /// Requires a designed filter for the frequency slot (and the phase
    /// slot when phase mode is selected) and an enabled actuator. Rejected
    /// synchronously otherwise, leaving prior state unchanged.
    pub fn engage(&mut self, actuator_enabled: bool) -> Result<(), EngageError> {
        if self.is_locked() {
            return Ok(());
        }
        if self.freq_filter.is_none() {
            return Err(EngageError::FilterNotDesigned(FilterSlot::Frequency));
        }
        if self.mode == LockMode::Phase && self.phase_filter.is_none() {
            return Err(EngageError::FilterNotDesigned(FilterSlot::Phase));
        }
        if !actuator_enabled {
            return Err(EngageError::ActuatorDisabled);
        }

        // Soft start: the filter output picks up at the operator's value.
        if let Some(filter) = &mut self.freq_filter {
            filter.set_initial_offset(self.manual_control);
        }
        self.control = self.manual_control;
        self.counter = 0;
        self.phase_acc = 0.0;
        self.state = LockState::FrequencyLocked;
        info!(setpoint = self.setpoint, "lock engaged");
        Ok(())
    }

    /// Disengage: actuator reverts to the manual value, the hysteresis
    /// counter zeroes, and the mode resets to frequency tracking.
    pub fn disengage(&mut self) {
        self.state = LockState::Unlocked;
        self.mode = LockMode::Frequency;
        self.counter = 0;
        self.phase_acc = 0.0;
        self.control = self.manual_control;
        self.lock_indicator = false;
        info!("lock disengaged");
    }

    fn fall_back_to_frequency(&mut self) {
        self.state = LockState::FrequencyLocked;
        if let Some(filter) = &mut self.freq_filter {
            filter.set_initial_offset(self.control);
        }
        self.counter = 0;
        self.phase_acc = 0.0;
        info!("phase lock lost, falling back to frequency lock");
    }

    // ─── Per-tick step ──────────────────────────────────────────────

    /// One controller step over the averaged raw measurement.
    pub fn tick(&mut self, raw_pv: f64) -> TickOutput {
        self.last_raw_pv = raw_pv;
        let pv = if self.lowpass_active {
            match &mut self.aux_lowpass {
                Some(filter) => filter.update(raw_pv),
                None => raw_pv,
            }
        } else {
            raw_pv
        };

        let mut phase_event = None;

        // Phase-lock hysteresis: runs whenever the loop is locked and
        // phase tracking is requested.
        if self.is_locked() && self.mode == LockMode::Phase {
            if (self.setpoint - pv).abs() < self.phase_lock_margin {
                if self.counter < self.counter_limit {
                    self.counter += 1;
                }
            } else if self.counter > 0 {
                self.counter -= 1;
            }

            match self.state {
                LockState::FrequencyLocked if self.counter >= self.counter_limit => {
                    // Hand over to the phase filter, continuing from the
                    // current control value.
                    if let Some(filter) = &mut self.phase_filter {
                        filter.reset();
                        filter.set_initial_offset(self.control);
                    }
                    self.phase_acc = 0.0;
                    self.state = LockState::PhaseLocked;
                    phase_event = Some(true);
                    info!("phase lock acquired");
                }
                LockState::PhaseLocked if self.counter == 0 => {
                    self.fall_back_to_frequency();
                    phase_event = Some(false);
                }
                _ => {}
            }
        }

        match self.state {
            LockState::Unlocked => {
                // Manual passthrough.
                self.control = self.manual_control;
            }
            LockState::FrequencyLocked => {
                if let Some(filter) = &mut self.freq_filter {
                    self.control = filter.update(self.setpoint, pv);
                }
            }
            LockState::PhaseLocked => {
                // The phase filter consumes the integrated phase error,
                // not the raw process variable.
                self.phase_acc += (pv - self.setpoint) * self.dt;
                if let Some(filter) = &mut self.phase_filter {
                    self.control = filter.update(0.0, self.phase_acc);
                }
            }
        }

        let indicator = self.is_locked() && (self.setpoint - pv).abs() < self.error_margin;
        let indicator_event = (indicator != self.lock_indicator).then_some(indicator);
        self.lock_indicator = indicator;

        TickOutput {
            pv,
            control: self.control,
            phase_event,
            indicator_event,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fds_common::filter::{Bounds, FilterKind};

    fn test_config() -> ServoConfig {
        ServoConfig {
            sample_period: 1.0,
            phase_lock_margin: 1.0,
            phase_lock_counter_limit: 5,
            error_margin: 0.1,
            ..ServoConfig::default()
        }
    }

    fn loop_spec() -> LoopFilterSpec {
        let mut spec = LoopFilterSpec::new(FilterKind::IntLowpass, 1.0);
        spec.ki = 0.1;
        spec.bounds = Bounds::new(-1e9, 1e9);
        spec
    }

    fn locked_controller() -> LockController {
        let mut ctl = LockController::new(&test_config());
        ctl.configure(FilterSlot::Frequency, &loop_spec()).unwrap();
        ctl.configure(FilterSlot::Phase, &loop_spec()).unwrap();
        ctl.set_manual_control(70e6);
        ctl.set_setpoint(10.0);
        ctl.engage(true).unwrap();
        ctl
    }

    #[test]
    fn engage_requires_designed_filter() {
        let mut ctl = LockController::new(&test_config());
        assert!(!ctl.has_filter(FilterSlot::Frequency));
        assert_eq!(
            ctl.engage(true),
            Err(EngageError::FilterNotDesigned(FilterSlot::Frequency))
        );
        assert!(!ctl.is_locked());

        ctl.configure(FilterSlot::Frequency, &loop_spec()).unwrap();
        assert!(ctl.has_filter(FilterSlot::Frequency));
    }

    #[test]
    fn engage_requires_enabled_actuator() {
        let mut ctl = LockController::new(&test_config());
        ctl.configure(FilterSlot::Frequency, &loop_spec()).unwrap();
        assert_eq!(ctl.engage(false), Err(EngageError::ActuatorDisabled));
        assert!(!ctl.is_locked());
    }

    #[test]
    fn phase_mode_engage_requires_phase_filter() {
        let mut ctl = LockController::new(&test_config());
        ctl.configure(FilterSlot::Frequency, &loop_spec()).unwrap();
        ctl.set_mode(LockMode::Phase);
        assert_eq!(
            ctl.engage(true),
            Err(EngageError::FilterNotDesigned(FilterSlot::Phase))
        );
    }

    #[test]
    fn unlocked_passes_manual_value_through() {
        let mut ctl = LockController::new(&test_config());
        ctl.set_manual_control(70e6);
        let out = ctl.tick(5.0);
        assert_eq!(out.control, 70e6);
        assert!(out.phase_event.is_none());
    }

    #[test]
    fn engage_soft_starts_from_manual_value() {
        let mut ctl = locked_controller();
        // Process variable on target: the first locked output stays at the
        // operator's value.
        let out = ctl.tick(10.0);
        assert!((out.control - 70e6).abs() < 1e-6);
    }

    #[test]
    fn frequency_lock_drives_toward_setpoint() {
        let mut ctl = locked_controller();
        // pv below setpoint → positive error → control rises.
        let mut last = 70e6;
        for _ in 0..10 {
            let out = ctl.tick(5.0);
            assert!(out.control > last);
            last = out.control;
        }
    }

    #[test]
    fn hysteresis_counts_to_phase_lock_exactly_once() {
        let mut ctl = locked_controller();
        ctl.set_mode(LockMode::Phase);

        let mut acquisitions = 0;
        for tick in 0..20 {
            let out = ctl.tick(10.0); // inside the 1 Hz margin
            if out.phase_event == Some(true) {
                acquisitions += 1;
                assert_eq!(tick, 4); // fifth in-margin tick hits the limit
            }
            assert!(ctl.hysteresis_counter() <= 5);
        }
        assert_eq!(acquisitions, 1);
        assert_eq!(ctl.state(), LockState::PhaseLocked);
    }

    #[test]
    fn counter_never_escapes_bounds() {
        let mut ctl = locked_controller();
        ctl.set_mode(LockMode::Phase);
        // Alternate far outside and inside the margin.
        for i in 0..100 {
            let pv = if i % 3 == 0 { 500.0 } else { 10.0 };
            ctl.tick(pv);
            assert!(ctl.hysteresis_counter() <= 5);
        }
    }

    #[test]
    fn phase_lock_falls_back_when_error_grows() {
        let mut ctl = locked_controller();
        ctl.set_mode(LockMode::Phase);
        for _ in 0..5 {
            ctl.tick(10.0);
        }
        assert_eq!(ctl.state(), LockState::PhaseLocked);

        let mut lost = 0;
        for _ in 0..5 {
            let out = ctl.tick(100.0); // far outside the margin
            if out.phase_event == Some(false) {
                lost += 1;
            }
        }
        assert_eq!(lost, 1);
        assert_eq!(ctl.state(), LockState::FrequencyLocked);
    }

    #[test]
    fn phase_filter_consumes_integrated_error() {
        let mut ctl = locked_controller();
        ctl.set_mode(LockMode::Phase);
        for _ in 0..5 {
            ctl.tick(10.0);
        }
        let seed = ctl.control();

        // Persistent positive frequency error integrates into phase error;
        // the phase filter pulls the control value down from its seed.
        let mut control = seed;
        for _ in 0..10 {
            control = ctl.tick(10.5).control;
        }
        assert!(control < seed);
    }

    #[test]
    fn disengage_reverts_to_manual_and_frequency_mode() {
        let mut ctl = locked_controller();
        ctl.set_mode(LockMode::Phase);
        for _ in 0..5 {
            ctl.tick(10.0);
        }
        ctl.disengage();
        assert_eq!(ctl.state(), LockState::Unlocked);
        assert_eq!(ctl.mode(), LockMode::Frequency);
        assert_eq!(ctl.hysteresis_counter(), 0);
        assert_eq!(ctl.control(), 70e6);
        let out = ctl.tick(10.0);
        assert_eq!(out.control, 70e6);
    }

    #[test]
    fn mode_switch_away_from_phase_falls_back() {
        let mut ctl = locked_controller();
        ctl.set_mode(LockMode::Phase);
        for _ in 0..5 {
            ctl.tick(10.0);
        }
        assert_eq!(ctl.state(), LockState::PhaseLocked);
        let event = ctl.set_mode(LockMode::Frequency);
        assert_eq!(event, Some(false));
        assert_eq!(ctl.state(), LockState::FrequencyLocked);
    }

    #[test]
    fn aux_lowpass_shapes_process_variable() {
        let mut ctl = LockController::new(&test_config());
        // Single-pole smoother.
        ctl.set_lowpass(&[0.5], &[0.5]).unwrap();
        ctl.tick(8.0);
        ctl.apply_lowpass(true);
        // History was padded with the last raw pv, so a constant input
        // passes through settled.
        let out = ctl.tick(8.0);
        assert!((out.pv - 8.0).abs() < 1e-12);
        // A step input is now smoothed.
        let out = ctl.tick(16.0);
        assert!(out.pv > 8.0 && out.pv < 16.0);
    }

    #[test]
    fn lowpass_toggle_off_restores_raw_pv() {
        let mut ctl = LockController::new(&test_config());
        ctl.set_lowpass(&[0.5], &[0.5]).unwrap();
        ctl.apply_lowpass(true);
        ctl.tick(8.0);
        ctl.apply_lowpass(false);
        let out = ctl.tick(3.0);
        assert_eq!(out.pv, 3.0);
    }

    #[test]
    fn indicator_tracks_error_margin() {
        let mut ctl = locked_controller();
        let out = ctl.tick(10.0); // |error| < 0.1
        assert_eq!(out.indicator_event, Some(true));
        // Constant state: no repeated event.
        let out = ctl.tick(10.0);
        assert_eq!(out.indicator_event, None);
        let out = ctl.tick(11.0);
        assert_eq!(out.indicator_event, Some(false));
    }

    #[test]
    fn reset_filters_zeroes_integrators() {
        let mut ctl = locked_controller();
        for _ in 0..10 {
            ctl.tick(5.0);
        }
        assert!(ctl.control() > 70e6);
        ctl.reset_filters();
        // Near-zero error after reset: the integrator restarts from zero.
        let out = ctl.tick(10.0);
        assert!(out.control.abs() < 1.0);
    }
}
