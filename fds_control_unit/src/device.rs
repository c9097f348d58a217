//! Hardware device interfaces and their simulation implementations.
//!
//! One trait per device role, implementations chosen at construction time
//! from configuration — never by conditional compilation. Vendor drivers
//! (VISA counters, SPI ADCs, DDS boards) live behind the same traits in
//! their own crates; this crate ships the dummy pair used for development
//! and tests.

use thiserror::Error;
use tracing::{debug, info};

/// Device construction/selection error.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("unknown device selection: {0}")]
    UnknownDevice(String),
}

// ─── Traits ─────────────────────────────────────────────────────────

/// Measurement source: frequency counter or ADC.
pub trait AcquisitionDevice: Send {
    /// Connect to the named resource.
    fn connect(&mut self, target: &str) -> bool;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Enumerate reachable resources.
    fn enumerate(&self) -> Vec<String>;
    /// Select the sample period [s].
    fn set_rate(&mut self, seconds: f64);
    /// Select the number of active channels.
    fn set_channels(&mut self, channels: u8);
    /// Acquire one sample. `false` means no new data this tick — the
    /// control step is skipped, never faulted.
    fn measure(&mut self) -> bool;
    /// Raw per-channel values from the last measurement [Hz].
    fn values(&self) -> [f64; 2];
    /// Channel-averaged value from the last measurement [Hz].
    fn averaged_value(&self) -> f64;
}

/// Controllable oscillator output: DDS or DAC.
pub trait ActuatorDevice: Send {
    fn connect(&mut self, target: &str) -> bool;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn enumerate(&self) -> Vec<String>;
    /// Command the output frequency [Hz].
    fn set_frequency(&mut self, hz: f64);
    /// Command the output phase offset [deg].
    fn set_phase(&mut self, deg: f64);
    /// Command the output amplitude.
    fn set_amplitude(&mut self, amplitude: f64);
    /// Enable or disable the output stage.
    fn enable(&mut self, on: bool);
    fn is_enabled(&self) -> bool;
}

// ─── Factories ──────────────────────────────────────────────────────

/// Build an acquisition device from a configuration selection.
pub fn build_acquisition(selection: &str) -> Result<Box<dyn AcquisitionDevice>, DeviceError> {
    match selection {
        "dummy" => Ok(Box::new(DummyAcquisition::new(1e6))),
        other => Err(DeviceError::UnknownDevice(other.to_string())),
    }
}

/// Build an actuator device from a configuration selection.
pub fn build_actuator(selection: &str) -> Result<Box<dyn ActuatorDevice>, DeviceError> {
    match selection {
        "dummy" => Ok(Box::new(DummyActuator::new())),
        other => Err(DeviceError::UnknownDevice(other.to_string())),
    }
}

// ─── Dummy Acquisition ──────────────────────────────────────────────

/// Simulated two-channel measurement: a slowly drifting center frequency
/// with deterministic pseudo-noise per channel.
pub struct DummyAcquisition {
    connected: bool,
    rate: f64,
    channels: u8,
    f_center: f64,
    drift_per_sample: f64,
    noise_amplitude: f64,
    rng: u64,
    tick: u64,
    values: [f64; 2],
}

impl DummyAcquisition {
    pub fn new(f_center: f64) -> Self {
        Self {
            connected: false,
            rate: 0.1,
            channels: 2,
            f_center,
            drift_per_sample: 2e-4,
            noise_amplitude: 5e-3,
            rng: 0x853C49E6748FEA9B,
            tick: 0,
            values: [0.0; 2],
        }
    }

    /// Currently selected sample period [s].
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Uniform noise in [−1, 1] from a 64-bit LCG.
    fn noise(&mut self) -> f64 {
        self.rng = self
            .rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.rng >> 33) as f64 / (1u64 << 30) as f64 - 1.0
    }
}

impl AcquisitionDevice for DummyAcquisition {
    fn connect(&mut self, target: &str) -> bool {
        info!(resource = target, "dummy acquisition connected");
        self.connected = true;
        true
    }

    fn disconnect(&mut self) {
        info!("dummy acquisition disconnected");
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn enumerate(&self) -> Vec<String> {
        vec!["dummy://counter0".to_string()]
    }

    fn set_rate(&mut self, seconds: f64) {
        debug!(seconds, "dummy acquisition rate");
        if seconds > 0.0 {
            self.rate = seconds;
        }
    }

    fn set_channels(&mut self, channels: u8) {
        self.channels = channels.clamp(1, 2);
    }

    fn measure(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        self.tick += 1;
        let center = self.f_center + self.drift_per_sample * self.tick as f64;
        let n1 = self.noise();
        let n2 = self.noise();
        self.values = [
            center + self.noise_amplitude * n1,
            center + self.noise_amplitude * n2,
        ];
        true
    }

    fn values(&self) -> [f64; 2] {
        self.values
    }

    fn averaged_value(&self) -> f64 {
        if self.channels <= 1 {
            self.values[0]
        } else {
            0.5 * (self.values[0] + self.values[1])
        }
    }
}

// ─── Dummy Actuator ─────────────────────────────────────────────────

/// Records commanded setpoints; stands in for a DDS output stage.
#[derive(Debug, Default)]
pub struct DummyActuator {
    connected: bool,
    enabled: bool,
    frequency: f64,
    phase: f64,
    amplitude: f64,
}

impl DummyActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded frequency [Hz].
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Last commanded phase offset [deg].
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Last commanded amplitude.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }
}

impl ActuatorDevice for DummyActuator {
    fn connect(&mut self, target: &str) -> bool {
        info!(resource = target, "dummy actuator connected");
        self.connected = true;
        true
    }

    fn disconnect(&mut self) {
        info!("dummy actuator disconnected");
        self.connected = false;
        self.enabled = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn enumerate(&self) -> Vec<String> {
        vec!["dummy://dds0".to_string()]
    }

    fn set_frequency(&mut self, hz: f64) {
        self.frequency = hz;
    }

    fn set_phase(&mut self, deg: f64) {
        self.phase = deg;
    }

    fn set_amplitude(&mut self, amplitude: f64) {
        self.amplitude = amplitude;
    }

    fn enable(&mut self, on: bool) {
        debug!(on, "dummy actuator output stage");
        self.enabled = on;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
