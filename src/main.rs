use chime_motion::config::PipelineConfig;
use chime_motion::controller::Controller;
use chime_motion::engine::{NullEngine, SynthEngine, DEFAULT_VOICE_SOURCE};
use chime_motion::osc_engine::OscEngine;
use chime_motion::sensor::{MotionSink, SensorMailbox, SensorSource};
use chime_motion::simulator::Simulator;
use chime_motion::trace_reader::TraceSource;
use chime_motion::types::*;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chime-motion")]
#[command(about = "Motion-driven chime: sensor impulses to synth triggers")]
struct Cli {
    /// Pipeline config file (JSON). Missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective config to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// OSC target address of the synthesis engine
    #[arg(long, default_value = "127.0.0.1:9000")]
    osc_target: String,

    /// Run without a synthesis engine (triggers are computed and dropped)
    #[arg(long)]
    no_engine: bool,

    /// Voice source file handed to the engine. Defaults to the built-in chime.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Replay a recorded motion trace (JSONL) instead of the simulator
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Restart the trace when it ends
    #[arg(long)]
    loop_trace: bool,

    /// Simulator demo sequence: "basic" (default) or "storm"
    #[arg(long, default_value = "basic")]
    demo: String,

    /// Simulated sensor rate (Hz)
    #[arg(long, default_value_t = 60)]
    sensor_rate: u32,

    /// Control loop rate (Hz)
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Simulate the user refusing motion-sensor access
    #[arg(long)]
    deny_permission: bool,

    /// Forward the smoothed intensity to the engine every tick
    #[arg(long)]
    continuous: bool,

    /// Seed for detune and resonance randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many seconds (0 = run until killed)
    #[arg(long, default_value_t = 0)]
    duration: u64,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_or_default(path),
        None => PipelineConfig::default(),
    };
    if cli.continuous {
        config.continuous_output = true;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    if let Some(path) = &cli.write_config {
        if let Err(e) = config.save(path) {
            error!("Failed to write config: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let source = match &cli.source {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to read voice source {:?}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => DEFAULT_VOICE_SOURCE.to_string(),
    };

    info!("═══════════════════════════════════════════════");
    info!("  CHIME MOTION v{}", env!("CARGO_PKG_VERSION"));
    info!("  Slots: {}  {:.0} Hz → {:.0} Hz",
          config.motion.total_slots, config.voice.start_freq, config.voice.end_freq);
    info!("  Input: {}", match &cli.trace {
        Some(p) => format!("trace {:?}", p),
        None => format!("simulator ({})", cli.demo),
    });
    info!("  Engine: {}", if cli.no_engine { "none".to_string() } else { format!("OSC → {}", cli.osc_target) });
    info!("═══════════════════════════════════════════════");

    let clock = SessionClock::new();
    let mailbox = SensorMailbox::new();
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let mut handles = Vec::new();

    // ─── Sensor source ──────────────────────────────────────────────
    let mut sensor: Box<dyn SensorSource> = match &cli.trace {
        Some(path) => Box::new(TraceSource::new(path, clock.clone()).looping(cli.loop_trace)),
        None => Box::new(
            Simulator::new(clock.clone(), cli.sensor_rate, &cli.demo)
                .with_denied_permission(cli.deny_permission),
        ),
    };
    match sensor.request_permission() {
        Permission::Granted => {
            let sink = MotionSink::new(mailbox.clone(), config.motion.axis);
            let rx = shutdown_rx.clone();
            handles.push(thread::Builder::new().name("sensor".into()).spawn(move || {
                sensor.run(sink, rx);
            }).expect("spawn sensor thread"));
        }
        Permission::Denied => {
            warn!("Motion sensor permission denied; instrument will stay idle");
        }
    }

    // ─── Engine + controller ────────────────────────────────────────
    let engine: Box<dyn SynthEngine> = if cli.no_engine {
        Box::new(NullEngine)
    } else {
        Box::new(OscEngine::new(cli.osc_target.clone()))
    };
    let mut controller = Controller::new(&config, engine, mailbox);
    if let Err(e) = controller.initialize(&source) {
        error!("Engine unavailable ({}); running without sound", e);
    }

    // ─── Optional run time limit ────────────────────────────────────
    // Dropping the shutdown sender stops the controller and sensor threads.
    let _keep_running = if cli.duration > 0 {
        let secs = cli.duration;
        handles.push(thread::Builder::new().name("timer".into()).spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            info!("Run time of {}s reached", secs);
            drop(shutdown_tx);
        }).expect("spawn timer thread"));
        None
    } else {
        Some(shutdown_tx)
    };

    info!("Running. Press Ctrl+C to stop.");
    controller.run(&clock, cli.fps, shutdown_rx);

    for h in handles {
        let _ = h.join();
    }
}
