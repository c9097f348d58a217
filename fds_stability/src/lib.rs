//! # FDS Frequency Stability Engine
//!
//! Statistics over accumulated frequency samples: fractional frequency,
//! integrated phase error, overlapped Allan deviation, Hadamard deviation,
//! power-law noise identification via repeated differencing and lag-1
//! autocorrelation, and per-noise-type confidence intervals.
//!
//! [`StabilityEngine`] wraps the lot behind an incremental interface: the
//! consumer appends samples as they drain from telemetry and re-runs
//! [`StabilityEngine::recompute`] periodically. Past samples are never
//! discarded or re-derived; each tau point fills in once its averaging
//! window fits the accumulated record.

pub mod deviation;
pub mod engine;
pub mod noise;

pub use deviation::{adev_overlapped, fractional_frequency, hdev, phase_error};
pub use engine::{DeviationKind, StabilityEngine, TauPoint};
pub use noise::{NoiseType, confidence_interval, noise_id, noise_id_for_tau};
