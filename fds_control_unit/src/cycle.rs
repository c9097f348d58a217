//! Timed servo cycle: measure → control → actuate → publish → drain.
//!
//! The loop is paced against the acquisition source's nominal sample
//! period: each iteration measures its wall-clock cost and sleeps for the
//! positive residual. A negative residual is a *soft* deadline miss —
//! counted and logged, never fatal. One shutdown check per tick; teardown
//! disables the actuator before releasing the device handles.
//!
//! With the `rt` feature, [`rt_setup`] locks memory, pins the thread, and
//! requests `SCHED_FIFO` before the loop starts; without it the calls are
//! no-ops and pacing relies on `thread::sleep`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use fds_common::command::{AcquisitionCommand, ActuatorCommand, Command, FilterCommand};
use fds_common::config::ServoConfig;
use fds_common::telemetry::{ControlSample, ServoStatus, TelemetryEvent};
use fds_telemetry::{RING_LEN, TelemetryWriter};

use crate::device::{AcquisitionDevice, ActuatorDevice};
use crate::lock::LockController;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total ticks executed.
    pub cycle_count: u64,
    /// Last tick duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum tick duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum tick duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Ticks that overran the sample period.
    pub deadline_misses: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            deadline_misses: 0,
        }
    }

    /// Record one tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
    }

    /// Average tick duration [ns] (0 before the first tick).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// RT setup failure (memory locking, affinity, or scheduler).
#[derive(Debug, Error)]
#[error("RT setup error: {0}")]
pub struct RtSetupError(String);

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtSetupError> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| RtSetupError(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RtSetupError> {
    Ok(()) // No-op in simulation mode
}

/// Pin the current thread to a specific CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RtSetupError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RtSetupError(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RtSetupError(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RtSetupError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RtSetupError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RtSetupError(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RtSetupError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence before entering the loop.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtSetupError> {
    rt_mlockall()?;
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Servo Runner ───────────────────────────────────────────────────

/// Owns the devices, the lock controller, and the channel endpoints, and
/// runs the timed servo loop.
pub struct ServoRunner {
    controller: LockController,
    acquisition: Box<dyn AcquisitionDevice>,
    actuator: Box<dyn ActuatorDevice>,
    commands: Receiver<Command>,
    events: Sender<TelemetryEvent>,
    writer: TelemetryWriter<RING_LEN>,
    shutdown: Arc<AtomicBool>,
    period: Duration,
    stats: CycleStats,
    status: ServoStatus,
    seq: u64,
}

impl ServoRunner {
    pub fn new(
        config: &ServoConfig,
        acquisition: Box<dyn AcquisitionDevice>,
        actuator: Box<dyn ActuatorDevice>,
        commands: Receiver<Command>,
        events: Sender<TelemetryEvent>,
        writer: TelemetryWriter<RING_LEN>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            controller: LockController::new(config),
            acquisition,
            actuator,
            commands,
            events,
            writer,
            shutdown,
            period: Duration::from_secs_f64(config.sample_period),
            stats: CycleStats::new(),
            status: ServoStatus::default(),
            seq: 0,
        }
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run until the shutdown flag is set (checked once per tick).
    pub fn run(&mut self) {
        info!(period_s = self.period.as_secs_f64(), "servo loop starting");

        while !self.shutdown.load(Ordering::Relaxed) {
            let start = Instant::now();
            self.tick_body();
            let elapsed = start.elapsed();
            self.stats.record(elapsed.as_nanos() as i64);

            // Soft deadline: sleep off the positive residual, report the
            // negative one and keep going.
            match self.period.checked_sub(elapsed) {
                Some(residual) => std::thread::sleep(residual),
                None => {
                    self.stats.deadline_misses += 1;
                    warn!(
                        elapsed_us = elapsed.as_micros() as u64,
                        budget_us = self.period.as_micros() as u64,
                        misses = self.stats.deadline_misses,
                        "sample period deadline missed"
                    );
                }
            }
        }

        // Orderly teardown: actuator output off before handles go away.
        self.actuator.enable(false);
        self.actuator.disconnect();
        self.acquisition.disconnect();
        let _ = self.writer.try_publish();
        info!(
            ticks = self.stats.cycle_count,
            avg_us = self.stats.avg_cycle_ns() / 1_000,
            misses = self.stats.deadline_misses,
            "servo loop stopped"
        );
    }

    /// One tick: measure → control → actuate → publish, then drain the
    /// entire command queue.
    fn tick_body(&mut self) {
        // Control only runs on a fresh sample; "no new data" is a no-op.
        if self.acquisition.measure() {
            let [ch1, ch2] = self.acquisition.values();
            let out = self.controller.tick(self.acquisition.averaged_value());

            if self.actuator.is_enabled() {
                self.actuator.set_frequency(out.control);
            }

            self.seq += 1;
            let sample = ControlSample {
                ch1,
                ch2,
                pv: out.pv,
                control: out.control,
                seq: self.seq,
            };
            self.writer.push(&sample);
            self.writer.try_publish();

            self.emit(TelemetryEvent::ProcessVariable(out.pv));
            if self.controller.is_locked() {
                self.emit(TelemetryEvent::Control(out.control));
            }
            if let Some(acquired) = out.phase_event {
                self.emit(TelemetryEvent::PhaseLockAcquired(acquired));
            }
            if let Some(indicated) = out.indicator_event {
                self.emit(TelemetryEvent::LockAcquired(indicated));
            }
        }

        // The whole queue drains every tick; ordering is the only
        // guarantee commands get.
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
        }

        self.refresh_status();
    }

    fn emit(&self, event: TelemetryEvent) {
        // A departed consumer is not the servo loop's problem.
        let _ = self.events.send(event);
    }

    fn refresh_status(&mut self) {
        let mut status = ServoStatus::default();
        status.set(ServoStatus::LOCKED, self.controller.is_locked());
        status.set(
            ServoStatus::PHASE_LOCKED,
            self.controller.state() == crate::lock::LockState::PhaseLocked,
        );
        status.set(ServoStatus::ACQ_CONNECTED, self.acquisition.is_connected());
        status.set(ServoStatus::ACT_CONNECTED, self.actuator.is_connected());
        status.set(ServoStatus::ACT_ENABLED, self.actuator.is_enabled());
        status.set(ServoStatus::LOWPASS_ACTIVE, self.controller.lowpass_active());
        if status != self.status {
            debug!(?status, "servo status changed");
            self.status = status;
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Acquisition(cmd) => self.handle_acquisition(cmd),
            Command::Actuator(cmd) => self.handle_actuator(cmd),
            Command::Filter(cmd) => self.handle_filter(cmd),
        }
    }

    fn handle_acquisition(&mut self, cmd: AcquisitionCommand) {
        match cmd {
            AcquisitionCommand::SetRate(seconds) => {
                if seconds > 0.0 {
                    self.acquisition.set_rate(seconds);
                    self.controller.set_timestep(seconds);
                    self.period = Duration::from_secs_f64(seconds);
                    info!(seconds, "sample rate changed");
                }
            }
            AcquisitionCommand::SetChannels(n) => self.acquisition.set_channels(n),
            AcquisitionCommand::Connect(target) => {
                let connected = self.acquisition.connect(&target);
                self.emit(TelemetryEvent::AcquisitionConnection(connected));
            }
            AcquisitionCommand::Disconnect => {
                self.acquisition.disconnect();
                self.emit(TelemetryEvent::AcquisitionConnection(false));
            }
            AcquisitionCommand::Enumerate => {
                self.emit(TelemetryEvent::AcquisitionDevices(
                    self.acquisition.enumerate(),
                ));
            }
        }
    }

    fn handle_actuator(&mut self, cmd: ActuatorCommand) {
        match cmd {
            ActuatorCommand::SetFrequency(hz) => {
                self.controller.set_manual_control(hz);
                // Manual frequency reaches the output only while unlocked.
                if !self.controller.is_locked() && self.actuator.is_enabled() {
                    self.actuator.set_frequency(hz);
                }
            }
            ActuatorCommand::SetAmplitude(amplitude) => self.actuator.set_amplitude(amplitude),
            ActuatorCommand::SetPhase(deg) => self.actuator.set_phase(deg),
            ActuatorCommand::Enable(on) => {
                self.actuator.enable(on);
                if !on && self.controller.is_locked() {
                    // The lock cannot outlive its output stage.
                    self.controller.disengage();
                    self.emit(TelemetryEvent::LockAcquired(false));
                }
            }
            ActuatorCommand::Connect(target) => {
                let connected = self.actuator.connect(&target);
                self.emit(TelemetryEvent::ActuatorConnection(connected));
            }
            ActuatorCommand::Disconnect => {
                if self.controller.is_locked() {
                    self.controller.disengage();
                    self.emit(TelemetryEvent::LockAcquired(false));
                }
                self.actuator.disconnect();
                self.emit(TelemetryEvent::ActuatorConnection(false));
            }
            ActuatorCommand::Enumerate => {
                self.emit(TelemetryEvent::ActuatorDevices(self.actuator.enumerate()));
            }
        }
    }

    fn handle_filter(&mut self, cmd: FilterCommand) {
        match cmd {
            FilterCommand::Configure { slot, spec } => {
                if let Err(e) = self.controller.configure(slot, &spec) {
                    warn!(%e, ?slot, "filter configuration rejected");
                }
            }
            FilterCommand::SetLowpass { ff, fb } => {
                if let Err(e) = self.controller.set_lowpass(&ff, &fb) {
                    warn!(%e, "auxiliary lowpass rejected");
                }
            }
            FilterCommand::ApplyLowpass(on) => self.controller.apply_lowpass(on),
            FilterCommand::Reset => self.controller.reset_filters(),
            FilterCommand::Lock(true) => {
                match self.controller.engage(self.actuator.is_enabled()) {
                    Ok(()) => self.emit(TelemetryEvent::LockAcquired(true)),
                    Err(e) => {
                        warn!(%e, "lock engage rejected");
                        self.emit(TelemetryEvent::LockAcquired(false));
                    }
                }
            }
            FilterCommand::Lock(false) => {
                self.controller.disengage();
                self.emit(TelemetryEvent::LockAcquired(false));
            }
            FilterCommand::Setpoint(value) => self.controller.set_setpoint(value),
            FilterCommand::Mode(mode) => {
                if let Some(phase_event) = self.controller.set_mode(mode) {
                    self.emit(TelemetryEvent::PhaseLockAcquired(phase_event));
                }
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
