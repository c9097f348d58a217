//! Control filter micro-benchmarks.
//!
//! Measures throughput of the per-tick filter path (PID and the loop
//! family) and the cost of a full Butterworth synthesis.

use criterion::{Criterion, criterion_group, criterion_main};

use fds_common::filter::{Bounds, FilterKind, LoopFilterSpec};
use fds_control_unit::filter::design::{DesignSpec, design_lowpass};
use fds_control_unit::filter::{LoopFilter, Pid};

const DT: f64 = 0.02; // 50 Hz servo tick

fn pid_spec() -> LoopFilterSpec {
    let mut spec = LoopFilterSpec::new(FilterKind::Pid, DT);
    spec.kp = 3.0;
    spec.ki = 200.0;
    spec.kd = 0.1;
    spec.lead_coef = 0.9;
    spec.bounds = Bounds::new(1e6, 100e6);
    spec
}

fn loop_spec() -> LoopFilterSpec {
    let design = design_lowpass(&DesignSpec {
        passband_hz: 1.0,
        stopband_hz: 20.0,
        att_passband_db: -1.0,
        att_stopband_db: -10.0,
        gain_db: 0.0,
        f_sampling: 1.0 / DT,
    })
    .expect("reference design");

    let mut spec = LoopFilterSpec::new(FilterKind::DoubleIntDoubleLowpass, DT);
    spec.ki = 1.5;
    spec.kii = 0.3;
    spec.bounds = Bounds::new(1e6, 100e6);
    spec.ff = design.ff;
    spec.fb = design.fb;
    spec
}

fn bench_pid_update(c: &mut Criterion) {
    let mut pid = Pid::from_spec(&pid_spec()).unwrap();
    let mut tick = 0u64;

    c.bench_function("pid_update", |b| {
        b.iter(|| {
            tick += 1;
            let t = tick as f64 * DT;
            pid.update(10e6, 10e6 + 0.05 * t.sin())
        });
    });
}

fn bench_loop_filter_update(c: &mut Criterion) {
    let mut filter = LoopFilter::from_spec(&loop_spec()).unwrap();
    let mut tick = 0u64;

    c.bench_function("loop_filter_update", |b| {
        b.iter(|| {
            tick += 1;
            let t = tick as f64 * DT;
            filter.update(10e6, 10e6 + 0.05 * t.sin())
        });
    });
}

fn bench_lowpass_design(c: &mut Criterion) {
    let spec = DesignSpec {
        passband_hz: 1.0,
        stopband_hz: 5.0,
        att_passband_db: -1.0,
        att_stopband_db: -30.0,
        gain_db: 0.0,
        f_sampling: 50.0,
    };

    c.bench_function("lowpass_design", |b| {
        b.iter(|| design_lowpass(&spec).unwrap());
    });
}

criterion_group!(
    benches,
    bench_pid_update,
    bench_loop_filter_update,
    bench_lowpass_design
);
criterion_main!(benches);
