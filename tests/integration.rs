//! End-to-end tests for the chime pipeline.
//!
//! These drive the full data flow:
//!   sensor readings → mailbox → Controller (smoother, integrator, crossing
//!   detector, throttle, mapper, dispatcher) → recording engine → assertions
//!
//! Most tests tick the controller with synthetic timestamps so they run
//! instantly and deterministically; the last few use real threads.

use crossbeam_channel::{bounded, unbounded};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chime_motion::config::{ControlParams, MotionConfig, PipelineConfig, TriggerConfig};
use chime_motion::controller::Controller;
use chime_motion::crossing::CrossingDetector;
use chime_motion::engine::SynthEngine;
use chime_motion::error::{ChimeError, Result};
use chime_motion::integrator::MotionIntegrator;
use chime_motion::sensor::{MotionSink, SensorMailbox, SensorSource};
use chime_motion::simulator::{Gesture, Simulator};
use chime_motion::trace_reader::TraceSource;
use chime_motion::types::*;

// ─── Helpers ───────────────────────────────────────────────────────────────

const FRAME_US: u64 = 16_667;

#[derive(Default)]
struct EngineLog {
    sources: Vec<String>,
    triggers: Vec<AudioParams>,
    params: Vec<(String, f64)>,
    stopped: bool,
    triggers_after_stop: usize,
}

/// Engine that records everything it is asked to do.
struct RecordingEngine {
    log: Arc<Mutex<EngineLog>>,
    fail_init: bool,
}

impl RecordingEngine {
    fn new(fail_init: bool) -> (Self, Arc<Mutex<EngineLog>>) {
        let log = Arc::new(Mutex::new(EngineLog::default()));
        (
            Self {
                log: log.clone(),
                fail_init,
            },
            log,
        )
    }
}

impl SynthEngine for RecordingEngine {
    fn initialize(&mut self, source: &str) -> Result<()> {
        if self.fail_init {
            return Err(ChimeError::Engine("audio context blocked".into()));
        }
        self.log.lock().unwrap().sources.push(source.to_string());
        Ok(())
    }

    fn load_source(&mut self, source: &str) -> Result<()> {
        if source.contains("syntax error") {
            return Err(ChimeError::MalformedSource("line 3: unexpected token".into()));
        }
        self.log.lock().unwrap().sources.push(source.to_string());
        Ok(())
    }

    fn trigger(&mut self, params: &AudioParams) {
        let mut log = self.log.lock().unwrap();
        if log.stopped {
            log.triggers_after_stop += 1;
        }
        log.triggers.push(*params);
    }

    fn set_continuous_parameter(&mut self, name: &str, value: f64) {
        self.log.lock().unwrap().params.push((name.to_string(), value));
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stopped = true;
    }
}

fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.seed = Some(42);
    cfg
}

/// Build an initialized controller over a recording engine.
fn controller(cfg: &PipelineConfig) -> (Controller, Arc<SensorMailbox>, Arc<Mutex<EngineLog>>) {
    let (engine, log) = RecordingEngine::new(false);
    let mailbox = SensorMailbox::new();
    let mut c = Controller::new(cfg, Box::new(engine), mailbox.clone());
    c.initialize("voice").unwrap();
    (c, mailbox, log)
}

/// Feed simulator readings one per frame and collect the frame reports.
fn run_gestures(
    c: &mut Controller,
    mailbox: &SensorMailbox,
    gestures: &[Gesture],
    start_us: u64,
) -> Vec<FrameReport> {
    // Sensor at the frame rate, so every frame gets exactly one reading.
    let mut sim = Simulator::new(SessionClock::new(), 60, "basic").with_seed(9);
    let axis = SensorAxis::RotationGamma;
    let mut reports = Vec::new();
    let mut t = start_us;
    for g in gestures {
        for reading in sim.render(g) {
            if let Some(r) = reading {
                mailbox.post(SensorSample {
                    value: axis.extract(&r),
                    timestamp_us: t,
                });
            }
            reports.push(c.tick(t));
            t += FRAME_US;
        }
    }
    reports
}

fn dispatch_times(reports: &[FrameReport]) -> Vec<u64> {
    reports
        .iter()
        .filter(|r| !r.dispatched.is_empty())
        .map(|r| r.timestamp_us)
        .collect()
}

// ─── Integration Tests ─────────────────────────────────────────────────────

#[test]
fn test_advance_then_detect_crossing_20_to_21() {
    let params = ControlParams {
        friction: 0.94,
        ..ControlParams::default()
    };
    let mut integ = MotionIntegrator::new(MotionConfig::default()).with_state(20.0, 1.2);
    let mut detector = CrossingDetector::new(TriggerConfig::default(), 40, 2.0);

    assert!(detector.detect(&integ.snapshot(&params), 0).is_empty());
    let state = integ.advance(&params);
    assert!((state.position - 21.2).abs() < 1e-9);
    assert!((state.velocity - 1.128).abs() < 1e-9);

    let events = detector.detect(&state, FRAME_US);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].slot_index, 21);
}

#[test]
fn test_swinging_produces_bounded_throttled_strikes() {
    let mut cfg = test_config();
    cfg.resonance.probability = 0.0;
    let (mut c, mb, log) = controller(&cfg);

    let reports = run_gestures(
        &mut c,
        &mb,
        &[
            Gesture::Still { ms: 300 },
            Gesture::Swing { amplitude: 250.0, rate_hz: 1.0, ms: 4000 },
            Gesture::Shake { amplitude: 1200.0, ms: 2000 },
        ],
        0,
    );

    let max_speed = cfg.motion.max_speed;
    for r in &reports {
        assert!((0.0..=40.0).contains(&r.motion.position), "pos {}", r.motion.position);
        assert!(r.motion.velocity.abs() <= max_speed, "vel {}", r.motion.velocity);
        assert!(r.dispatched.len() <= 1, "throttle allows one strike per frame here");
    }

    let times = dispatch_times(&reports);
    assert!(!times.is_empty(), "swinging should strike some bars");
    for w in times.windows(2) {
        assert!(w[1] - w[0] >= 40_000, "strikes {}µs apart", w[1] - w[0]);
    }

    let log = log.lock().unwrap();
    assert_eq!(log.triggers.len(), times.len());
    for p in &log.triggers {
        assert!(p.frequency_hz <= 2500.0 && p.frequency_hz > 500.0);
        assert!((-1.0..=1.0).contains(&p.pan));
        assert!((0.1..=1.0).contains(&p.strike_force));
    }
}

#[test]
fn test_failed_init_drops_everything() {
    let cfg = test_config();
    let (engine, log) = RecordingEngine::new(true);
    let mb = SensorMailbox::new();
    let mut c = Controller::new(&cfg, Box::new(engine), mb.clone());

    let err = c.initialize("voice").unwrap_err();
    assert!(matches!(err, ChimeError::Engine(_)));
    assert_eq!(c.state(), PipelineState::Uninitialized);

    let reports = run_gestures(
        &mut c,
        &mb,
        &[Gesture::Shake { amplitude: 1000.0, ms: 2000 }],
        0,
    );
    assert!(reports.iter().all(|r| r.dispatched.is_empty()));
    assert!(reports.iter().all(|r| r.state == PipelineState::Uninitialized));
    // Physics still ran.
    assert!(reports.iter().any(|r| r.crossings > 0));

    let log = log.lock().unwrap();
    assert!(log.triggers.is_empty());
    assert!(log.params.is_empty());
}

#[test]
fn test_zero_density_falls_back_to_base_interval() {
    let mut cfg = test_config();
    cfg.resonance.probability = 0.0;
    let (c, mb, log) = controller(&cfg);
    let (ctl_tx, ctl_rx) = unbounded();
    let mut c = c.with_controls(ctl_rx);
    ctl_tx.send(ControlChange::Density(0.0)).unwrap();

    let reports = run_gestures(
        &mut c,
        &mb,
        &[Gesture::Shake { amplitude: 1200.0, ms: 6000 }],
        0,
    );

    let times = dispatch_times(&reports);
    assert!(times.len() >= 2, "got {} strikes", times.len());
    // base 1000ms, at most halved by intensity damping
    for w in times.windows(2) {
        assert!(w[1] - w[0] >= 500_000, "strikes {}µs apart", w[1] - w[0]);
    }
    let log = log.lock().unwrap();
    assert!(log.params.contains(&(PARAM_DENSITY.to_string(), 0.0)));
}

#[test]
fn test_no_input_stays_idle() {
    let cfg = test_config();
    let (mut c, _mb, log) = controller(&cfg);
    for i in 0..300 {
        let r = c.tick(i * FRAME_US);
        assert_eq!(r.state, PipelineState::Idle);
        assert!(r.dispatched.is_empty());
    }
    assert!(log.lock().unwrap().triggers.is_empty());
}

#[test]
fn test_teardown_cancels_neighbor_strikes() {
    let mut cfg = test_config();
    cfg.resonance.probability = 1.0;
    cfg.resonance.min_delay_ms = 5_000.0;
    cfg.resonance.max_delay_ms = 5_000.0;
    let (mut c, mb, log) = controller(&cfg);

    let reports = run_gestures(
        &mut c,
        &mb,
        &[Gesture::Swing { amplitude: 250.0, rate_hz: 1.0, ms: 3000 }],
        0,
    );
    let strikes = dispatch_times(&reports).len();
    assert!(strikes > 0);
    assert!(c.dispatcher().pending() > 0, "neighbors due after 5s are still pending");

    c.shutdown();
    assert_eq!(c.dispatcher().pending(), 0);
    assert_eq!(c.state(), PipelineState::Uninitialized);

    // Ticking past the due time fires nothing.
    c.tick(60_000_000);
    let log = log.lock().unwrap();
    assert!(log.stopped);
    assert_eq!(log.triggers_after_stop, 0);
    assert_eq!(log.triggers.len(), strikes);
}

#[test]
fn test_neighbor_strikes_fire_after_delay() {
    let mut cfg = test_config();
    cfg.resonance.probability = 1.0;
    let (mut c, mb, log) = controller(&cfg);

    let mut reports = run_gestures(
        &mut c,
        &mb,
        &[Gesture::Swing { amplitude: 250.0, rate_hz: 1.0, ms: 3000 }],
        0,
    );
    let last = reports.last().map(|r| r.timestamp_us).unwrap_or(0);
    reports.extend((1..30).map(|i| c.tick(last + i * FRAME_US)));

    let strikes = dispatch_times(&reports).len();
    assert!(strikes > 0);
    // Every strike scheduled exactly one neighbor; all but the latest have fired.
    let fired = log.lock().unwrap().triggers.len();
    assert_eq!(fired + c.dispatcher().pending(), strikes * 2);
    assert!(fired > strikes);
}

#[test]
fn test_reload_source_errors_unchanged_and_params_resynced() {
    let cfg = test_config();
    let (mut c, _mb, log) = controller(&cfg);

    let err = c.reload_source("syntax error").unwrap_err();
    match err {
        ChimeError::MalformedSource(msg) => assert_eq!(msg, "line 3: unexpected token"),
        other => panic!("unexpected error {:?}", other),
    }

    log.lock().unwrap().params.clear();
    c.reload_source("new voice").unwrap();
    let log = log.lock().unwrap();
    assert_eq!(log.sources, vec!["voice".to_string(), "new voice".to_string()]);
    assert!(log.params.contains(&(PARAM_THRESHOLD.to_string(), 0.1)));
    assert!(log.params.contains(&(PARAM_DENSITY.to_string(), 10.0)));
}

#[test]
fn test_continuous_output_forwards_intensity() {
    let mut cfg = test_config();
    cfg.continuous_output = true;
    let (mut c, mb, log) = controller(&cfg);
    run_gestures(&mut c, &mb, &[Gesture::Tilt { from: 600.0, to: 600.0, ms: 1000 }], 0);

    let log = log.lock().unwrap();
    let values: Vec<f64> = log
        .params
        .iter()
        .filter(|(n, _)| n == PARAM_INPUT_VELOCITY)
        .map(|(_, v)| *v)
        .collect();
    assert_eq!(values.len(), 60);
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(*values.last().unwrap(), 1.0, "600 deg/s saturates");
}

#[test]
fn test_threaded_run_with_simulator() {
    let cfg = test_config();
    let (engine, log) = RecordingEngine::new(false);
    let mailbox = SensorMailbox::new();
    let clock = SessionClock::new();
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let (report_tx, report_rx) = bounded::<FrameReport>(1024);

    let mut sim: Box<dyn SensorSource> =
        Box::new(Simulator::new(clock.clone(), 120, "storm").with_seed(1));
    assert_eq!(sim.request_permission(), Permission::Granted);
    let sink = MotionSink::new(mailbox.clone(), SensorAxis::RotationGamma);
    let sensor_rx = shutdown_rx.clone();
    let sensor = thread::spawn(move || sim.run(sink, sensor_rx));

    let mut c = Controller::new(&cfg, Box::new(engine), mailbox.clone()).with_reports(report_tx);
    c.initialize("voice").unwrap();
    let ctl_clock = clock.clone();
    let ctl = thread::spawn(move || c.run(&ctl_clock, 60, shutdown_rx));

    thread::sleep(Duration::from_millis(400));
    drop(shutdown_tx);
    ctl.join().unwrap();
    sensor.join().unwrap();

    let reports: Vec<FrameReport> = report_rx.try_iter().collect();
    assert!(reports.len() > 5, "got {} frames", reports.len());
    assert!(mailbox.posted() > 0);
    assert!(log.lock().unwrap().stopped);
}

#[test]
fn test_denied_permission_keeps_pipeline_idle() {
    let cfg = test_config();
    let (mut c, mb, log) = controller(&cfg);
    let mut sim = Simulator::new(SessionClock::new(), 60, "storm").with_denied_permission(true);
    assert_eq!(sim.request_permission(), Permission::Denied);

    // Nothing subscribed: the mailbox never fills.
    for i in 0..120 {
        let r = c.tick(i * FRAME_US);
        assert_eq!(r.state, PipelineState::Idle);
    }
    assert_eq!(mb.posted(), 0);
    assert!(log.lock().unwrap().triggers.is_empty());
}

#[test]
fn test_trace_replay_posts_readings() {
    let dir = std::env::temp_dir().join(format!("chime_trace_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("motion.jsonl");
    let mut text = String::from("{\"format\": \"chime-motion-trace\", \"rate_hz\": 100}\n");
    for i in 0..10u64 {
        text.push_str(&format!(
            "{{\"t\": {}, \"rr\": [0.0, 0.0, {}.0]}}\n",
            i * 10_000,
            i * 20
        ));
    }
    std::fs::write(&path, text).unwrap();

    let mailbox = SensorMailbox::new();
    let sink = MotionSink::new(mailbox.clone(), SensorAxis::RotationGamma);
    let (_tx, rx) = bounded::<()>(1);
    Box::new(TraceSource::new(&path, SessionClock::new())).run(sink, rx);

    assert_eq!(mailbox.posted(), 10);
    assert_eq!(mailbox.take_fresh().map(|s| s.value), Some(180.0));
    let _ = std::fs::remove_dir_all(&dir);
}
