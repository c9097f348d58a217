//! # FDS Control Unit Library
//!
//! Real-time servo engine for frequency/phase stabilization of a
//! controllable oscillator against a reference measurement. Provides the
//! recursive filter primitives, the PID and loop-filter family, closed-form
//! Butterworth lowpass synthesis, the lock-acquisition state machine, and a
//! soft-deadline timed cycle that reads the acquisition source, runs the
//! lock controller, and dispatches actuator commands plus telemetry.
//!
//! ## Architecture
//!
//! 1. **filter** — IIR primitive, PID, loop filters, lowpass design
//! 2. **lock** — lock/mode state machine with phase-lock hysteresis
//! 3. **device** — acquisition/actuator traits + dummy implementations
//! 4. **cycle** — the timed measurement → filter → actuate loop
//!
//! ## Zero-Allocation Servo Loop
//!
//! All filter state lives in fixed-capacity vectors sized at compile time.
//! The per-tick path performs no heap allocation; telemetry hand-off is a
//! try-acquire batch copy that never blocks the loop.

pub mod cycle;
pub mod device;
pub mod filter;
pub mod lock;
