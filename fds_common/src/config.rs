//! TOML configuration loader with validation.
//!
//! [`ServoConfig`] carries every numeric threshold the servo loop and the
//! consumer need — sample period, lock margins, hysteresis limit, history
//! depth, stability-engine settings, and device selection. Historical
//! deployments disagreed on several of these values, so all of them are
//! explicit configuration with defaults, never inferred constants.
//!
//! [`SettingsDoc`] is the persisted front-end state: rate selection,
//! actuator setpoints, and the last designed filter.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::LoopFilterSpec;

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Servo Configuration ────────────────────────────────────────────

/// Complete validated runtime configuration for one stabilizer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Nominal sample period of the acquisition source [s].
    #[serde(default = "default_sample_period")]
    pub sample_period: f64,
    /// Error margin for the lock indicator [Hz].
    #[serde(default = "default_error_margin")]
    pub error_margin: f64,
    /// Hysteresis margin for phase-lock acquisition [Hz].
    #[serde(default = "default_phase_lock_margin")]
    pub phase_lock_margin: f64,
    /// Hysteresis counter limit for phase-lock acquisition.
    #[serde(default = "default_phase_lock_counter_limit")]
    pub phase_lock_counter_limit: u32,
    /// Consumer-side display/history ring depth [samples].
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Number of averaging times on the stability tau grid.
    #[serde(default = "default_tau_count")]
    pub tau_count: usize,
    /// Reference frequency for fractional-frequency computation [Hz].
    #[serde(default = "default_f_reference")]
    pub f_reference: f64,
    /// Acquisition device selection (`"dummy"` or a vendor identifier).
    #[serde(default = "default_device")]
    pub acquisition: String,
    /// Actuator device selection (`"dummy"` or a vendor identifier).
    #[serde(default = "default_device")]
    pub actuator: String,
    /// Initial sample-rate label (resolved against the source's rate table).
    #[serde(default = "default_rate_label")]
    pub rate: String,
}

fn default_sample_period() -> f64 {
    0.1
}
fn default_error_margin() -> f64 {
    0.003
}
fn default_phase_lock_margin() -> f64 {
    100.0
}
fn default_phase_lock_counter_limit() -> u32 {
    200
}
fn default_history_len() -> usize {
    1000
}
fn default_tau_count() -> usize {
    20
}
fn default_f_reference() -> f64 {
    1e6
}
fn default_device() -> String {
    "dummy".to_string()
}
fn default_rate_label() -> String {
    "100ms".to_string()
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            sample_period: default_sample_period(),
            error_margin: default_error_margin(),
            phase_lock_margin: default_phase_lock_margin(),
            phase_lock_counter_limit: default_phase_lock_counter_limit(),
            history_len: default_history_len(),
            tau_count: default_tau_count(),
            f_reference: default_f_reference(),
            acquisition: default_device(),
            actuator: default_device(),
            rate: default_rate_label(),
        }
    }
}

impl ServoConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Run all validation rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_period > 0.0) {
            return Err(ConfigError::Validation(format!(
                "sample_period must be positive, got {}",
                self.sample_period
            )));
        }
        if !(self.error_margin > 0.0) {
            return Err(ConfigError::Validation(format!(
                "error_margin must be positive, got {}",
                self.error_margin
            )));
        }
        if !(self.phase_lock_margin > 0.0) {
            return Err(ConfigError::Validation(format!(
                "phase_lock_margin must be positive, got {}",
                self.phase_lock_margin
            )));
        }
        if self.phase_lock_counter_limit == 0 {
            return Err(ConfigError::Validation(
                "phase_lock_counter_limit must be at least 1".into(),
            ));
        }
        if self.history_len < 2 {
            return Err(ConfigError::Validation(
                "history_len must be at least 2".into(),
            ));
        }
        if self.tau_count == 0 {
            return Err(ConfigError::Validation(
                "tau_count must be at least 1".into(),
            ));
        }
        if !(self.f_reference > 0.0) {
            return Err(ConfigError::Validation(format!(
                "f_reference must be positive, got {}",
                self.f_reference
            )));
        }
        Ok(())
    }
}

// ─── Persisted Settings ─────────────────────────────────────────────

/// Manual actuator setpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSettings {
    /// Frequency setpoint [Hz].
    #[serde(default)]
    pub frequency: f64,
    /// Output amplitude.
    #[serde(default)]
    pub amplitude: f64,
    /// Phase offset [deg].
    #[serde(default)]
    pub phase: f64,
}

/// Persisted session state: rate selection, actuator setpoints, and the
/// last designed control filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDoc {
    #[serde(default = "default_rate_label")]
    pub rate: String,
    #[serde(default)]
    pub actuator: ActuatorSettings,
    #[serde(default)]
    pub filter: Option<LoopFilterSpec>,
}

impl SettingsDoc {
    /// Parse a settings document from TOML.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize the settings document to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
