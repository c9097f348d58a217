//! Tagged command protocol: consumer front-end → servo loop.
//!
//! Commands travel over a bounded FIFO and are drained in full once per
//! servo tick. Delivery order is the only guarantee; there is no atomic
//! interleaving with the measurement step.

use crate::filter::{CoefVec, LoopFilterSpec};

/// Tracking mode of the servo: instantaneous frequency error or integrated
/// phase error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    Frequency,
    Phase,
}

/// Commands addressed to the acquisition source (counter / ADC).
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionCommand {
    /// Change the sample period [s]. Also retunes the live filter timestep.
    SetRate(f64),
    /// Select the number of active input channels.
    SetChannels(u8),
    /// Connect to the named device.
    Connect(String),
    Disconnect,
    /// Enumerate reachable devices; reply arrives as a telemetry event.
    Enumerate,
}

/// Commands addressed to the actuator (DDS / DAC).
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCommand {
    /// Manual frequency setpoint [Hz]. Applied directly only while unlocked.
    SetFrequency(f64),
    /// Output amplitude.
    SetAmplitude(f64),
    /// Output phase offset [deg].
    SetPhase(f64),
    /// Enable or disable the output stage.
    Enable(bool),
    Connect(String),
    Disconnect,
    Enumerate,
}

/// Which control-filter slot a configuration targets.
///
/// Phase tracking runs a separate filter over the integrated phase error;
/// both slots are configured up front when phase mode is selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterSlot {
    #[default]
    Frequency,
    Phase,
}

/// Commands addressed to the control filter / lock state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCommand {
    /// Design or update a control filter slot. Same kind retunes the live
    /// filter in place; a different kind replaces it with output
    /// continuity.
    Configure {
        slot: FilterSlot,
        spec: LoopFilterSpec,
    },
    /// Install auxiliary lowpass coefficients for process-variable shaping.
    SetLowpass { ff: CoefVec, fb: CoefVec },
    /// Toggle the auxiliary lowpass on the process variable.
    ApplyLowpass(bool),
    /// Zero all filter state (integrators and histories).
    Reset,
    /// Engage (`true`) or disengage (`false`) the lock.
    Lock(bool),
    /// Frequency setpoint [Hz].
    Setpoint(f64),
    /// Switch between frequency and phase tracking.
    Mode(LockMode),
}

/// Top-level tagged command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Acquisition(AcquisitionCommand),
    Actuator(ActuatorCommand),
    Filter(FilterCommand),
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_frequency() {
        assert_eq!(LockMode::default(), LockMode::Frequency);
    }

    #[test]
    fn commands_compare_by_value() {
        assert_eq!(
            Command::Acquisition(AcquisitionCommand::SetRate(0.1)),
            Command::Acquisition(AcquisitionCommand::SetRate(0.1)),
        );
        assert_ne!(
            Command::Filter(FilterCommand::Lock(true)),
            Command::Filter(FilterCommand::Lock(false)),
        );
    }
}
