//! Telemetry types: per-tick samples, status flags, and event messages
//! flowing from the servo loop back to the consumer.

use bitflags::bitflags;

/// One servo tick's worth of measurement and control data.
///
/// Produced exactly once per tick, whether or not the loop is locked.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlSample {
    /// Raw channel 1 measurement [Hz].
    pub ch1: f64,
    /// Raw channel 2 measurement [Hz].
    pub ch2: f64,
    /// Averaged (and optionally lowpass-shaped) process variable [Hz].
    pub pv: f64,
    /// Control output dispatched to the actuator [Hz].
    pub control: f64,
    /// Monotonic tick index.
    pub seq: u64,
}

bitflags! {
    /// Servo status word summarizing the producer state each tick.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ServoStatus: u8 {
        /// Lock is engaged.
        const LOCKED          = 1 << 0;
        /// Phase lock has been acquired.
        const PHASE_LOCKED    = 1 << 1;
        /// Acquisition device connected.
        const ACQ_CONNECTED   = 1 << 2;
        /// Actuator device connected.
        const ACT_CONNECTED   = 1 << 3;
        /// Actuator output stage enabled.
        const ACT_ENABLED     = 1 << 4;
        /// Auxiliary lowpass applied to the process variable.
        const LOWPASS_ACTIVE  = 1 << 5;
    }
}

/// Asynchronous event from the servo loop to the consumer.
///
/// Bulk per-tick samples travel through the telemetry ring; these events
/// carry state changes and low-rate values.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// Shaped process variable for the current tick [Hz].
    ProcessVariable(f64),
    /// Control output for the current tick [Hz].
    Control(f64),
    /// Lock engaged / disengaged.
    LockAcquired(bool),
    /// Phase lock acquired / lost.
    PhaseLockAcquired(bool),
    /// Acquisition device connection state changed.
    AcquisitionConnection(bool),
    /// Actuator device connection state changed.
    ActuatorConnection(bool),
    /// Result of an acquisition device enumeration.
    AcquisitionDevices(Vec<String>),
    /// Result of an actuator device enumeration.
    ActuatorDevices(Vec<String>),
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_default_is_zeroed() {
        let s = ControlSample::default();
        assert_eq!(s.ch1, 0.0);
        assert_eq!(s.ch2, 0.0);
        assert_eq!(s.pv, 0.0);
        assert_eq!(s.control, 0.0);
        assert_eq!(s.seq, 0);
    }

    #[test]
    fn status_flags_compose() {
        let mut status = ServoStatus::default();
        assert!(status.is_empty());
        status |= ServoStatus::LOCKED | ServoStatus::ACT_ENABLED;
        assert!(status.contains(ServoStatus::LOCKED));
        assert!(!status.contains(ServoStatus::PHASE_LOCKED));
        status.remove(ServoStatus::LOCKED);
        assert!(!status.contains(ServoStatus::LOCKED));
        assert!(status.contains(ServoStatus::ACT_ENABLED));
    }
}
