//! # FDS Control Unit
//!
//! Frequency drift stabilizer servo process. Loads the TOML configuration,
//! builds the configured acquisition/actuator devices, and runs two
//! contexts: the timed servo loop on its own thread, and a consumer loop
//! that drains telemetry, maintains the display history, and periodically
//! re-runs the frequency-stability engine.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

use fds_common::command::{AcquisitionCommand, ActuatorCommand, Command};
use fds_common::config::ServoConfig;
use fds_common::rate::{RATES_COUNTER, rate_seconds};
use fds_common::telemetry::TelemetryEvent;
use fds_control_unit::cycle::{ServoRunner, rt_setup};
use fds_control_unit::device::{build_acquisition, build_actuator};
use fds_stability::StabilityEngine;
use fds_telemetry::{HistoryRing, RING_LEN, TelemetryReader, channel};

/// Consumer poll interval.
const UPDATE_PERIOD: Duration = Duration::from_millis(20);
/// Stability recompute interval.
const ALLAN_PERIOD: Duration = Duration::from_millis(500);

/// FDS Control Unit — frequency/phase stabilization servo
#[derive(Parser, Debug)]
#[command(name = "fds_control_unit")]
#[command(version)]
#[command(about = "Timed servo loop stabilizing an oscillator against a reference measurement")]
struct Args {
    /// Path to the servo configuration TOML.
    #[arg(default_value = "config/fds.toml")]
    config: PathBuf,

    /// CPU core to pin the servo thread to (rt builds).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt builds).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Stop after this many seconds (default: run until Ctrl-C).
    #[arg(long)]
    duration: Option<f64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("FDS control unit v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("FDS control unit shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        ServoConfig::load(&args.config)?
    } else {
        warn!(
            "config '{}' not found, using defaults with dummy devices",
            args.config.display()
        );
        ServoConfig::default()
    };

    // The rate label wins over the raw period when it resolves.
    if let Some(seconds) = rate_seconds(RATES_COUNTER, &config.rate) {
        config.sample_period = seconds;
    }
    info!(
        period_s = config.sample_period,
        acquisition = %config.acquisition,
        actuator = %config.actuator,
        "configuration loaded"
    );

    rt_setup(args.cpu_core, args.rt_priority)?;

    let acquisition = build_acquisition(&config.acquisition)?;
    let actuator = build_actuator(&config.actuator)?;

    let (cmd_tx, cmd_rx) = crossbeam_channel::bounded::<Command>(64);
    let (event_tx, event_rx) = crossbeam_channel::unbounded::<TelemetryEvent>();
    let (writer, reader) = channel::<RING_LEN>();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    // Bring the session up through the same command path a front-end uses.
    cmd_tx.send(Command::Acquisition(AcquisitionCommand::Connect(
        "dummy://counter0".into(),
    )))?;
    cmd_tx.send(Command::Actuator(ActuatorCommand::Connect(
        "dummy://dds0".into(),
    )))?;
    cmd_tx.send(Command::Actuator(ActuatorCommand::Enable(true)))?;

    let mut runner = ServoRunner::new(
        &config,
        acquisition,
        actuator,
        cmd_rx,
        event_tx,
        writer,
        Arc::clone(&shutdown),
    );
    let servo = std::thread::Builder::new()
        .name("fds-servo".into())
        .spawn(move || runner.run())?;

    consumer_loop(&config, &reader, &event_rx, &shutdown, args.duration);

    shutdown.store(true, Ordering::SeqCst);
    servo
        .join()
        .map_err(|_| "servo thread panicked".to_string())?;
    Ok(())
}

/// Slow consumer context: drains telemetry into the display history and
/// periodically re-runs the stability engine.
fn consumer_loop(
    config: &ServoConfig,
    reader: &TelemetryReader<RING_LEN>,
    events: &Receiver<TelemetryEvent>,
    shutdown: &AtomicBool,
    duration: Option<f64>,
) {
    let mut history = HistoryRing::new(config.history_len);
    let f_sampling = 1.0 / config.sample_period;
    let mut engine = StabilityEngine::new(
        f_sampling,
        config.f_reference,
        config.tau_count,
        config.history_len,
    );

    let started = Instant::now();
    let mut last_recompute = Instant::now();
    let mut batch = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        if let Some(limit) = duration {
            if started.elapsed().as_secs_f64() >= limit {
                info!(seconds = limit, "configured duration reached");
                break;
            }
        }

        batch.clear();
        if reader.drain_into(&mut batch) > 0 {
            for sample in &batch {
                engine.push(0.5 * (sample.ch1 + sample.ch2));
            }
            history.extend(&batch);
        }

        while let Ok(event) = events.try_recv() {
            match event {
                TelemetryEvent::ProcessVariable(pv) => trace!(pv, "pv"),
                TelemetryEvent::Control(control) => trace!(control, "control"),
                TelemetryEvent::LockAcquired(on) => info!(on, "lock state"),
                TelemetryEvent::PhaseLockAcquired(on) => info!(on, "phase lock state"),
                TelemetryEvent::AcquisitionConnection(on) => info!(on, "acquisition connection"),
                TelemetryEvent::ActuatorConnection(on) => info!(on, "actuator connection"),
                TelemetryEvent::AcquisitionDevices(list) => info!(?list, "acquisition devices"),
                TelemetryEvent::ActuatorDevices(list) => info!(?list, "actuator devices"),
            }
        }

        if last_recompute.elapsed() >= ALLAN_PERIOD {
            engine.recompute();
            let filled = engine.points().iter().filter(|p| p.dev.is_some()).count();
            debug!(
                samples = engine.sample_count(),
                taus_filled = filled,
                "stability series updated"
            );
            last_recompute = Instant::now();
        }

        std::thread::sleep(UPDATE_PERIOD);
    }

    info!(
        history = history.len(),
        samples = engine.sample_count(),
        "consumer loop stopped"
    );
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
