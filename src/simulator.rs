use crate::sensor::{MotionSink, SensorSource};
use crate::types::*;
use crossbeam_channel::{Receiver, TryRecvError};
use log::{info, warn};
use rand::prelude::*;
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Generates plausible handheld-motion readings so the whole pipeline can
/// run without a phone or sensor attached.
pub struct Simulator {
    clock: SessionClock,
    sensor_rate_hz: u32,
    demo: String,
    deny_permission: bool,
    rng: StdRng,
}

/// A scripted piece of motion.
#[derive(Debug, Clone)]
pub enum Gesture {
    /// No readings at all (sensor paused).
    Hold { ms: u32 },
    /// Device resting: small sensor noise only.
    Still { ms: u32 },
    /// Smooth back-and-forth rotation, deg/s peak.
    Swing { amplitude: f64, rate_hz: f64, ms: u32 },
    /// Violent random shaking, deg/s peak.
    Shake { amplitude: f64, ms: u32 },
    /// Rotation rate ramping linearly between two values.
    Tilt { from: f64, to: f64, ms: u32 },
}

impl Simulator {
    pub fn new(clock: SessionClock, sensor_rate_hz: u32, demo: &str) -> Self {
        Self {
            clock,
            sensor_rate_hz: sensor_rate_hz.max(1),
            demo: demo.to_string(),
            deny_permission: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Behave like a platform where the user refuses sensor access.
    pub fn with_denied_permission(mut self, deny: bool) -> Self {
        self.deny_permission = deny;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn tick_us(&self) -> u64 {
        1_000_000 / self.sensor_rate_hz as u64
    }

    /// Readings for one gesture, one per sensor tick. `Hold` yields `None`
    /// entries: time passes but nothing is delivered.
    pub fn render(&mut self, gesture: &Gesture) -> Vec<Option<MotionReading>> {
        let tick_us = self.tick_us();
        let ticks = |ms: u32| (ms as u64 * 1000 / tick_us) as usize;
        let rotation = |gamma: f64, beta: f64| {
            Some(MotionReading {
                rotation_rate: Some([0.0, beta, gamma]),
                linear_acceleration: Some([0.0, 0.0, 0.0]),
            })
        };

        match gesture {
            Gesture::Hold { ms } => vec![None; ticks(*ms)],
            Gesture::Still { ms } => (0..ticks(*ms))
                .map(|_| {
                    let g = self.rng.gen_range(-0.8..0.8);
                    let b = self.rng.gen_range(-0.8..0.8);
                    rotation(g, b)
                })
                .collect(),
            Gesture::Swing {
                amplitude,
                rate_hz,
                ms,
            } => (0..ticks(*ms))
                .map(|i| {
                    let t = (i as u64 * tick_us) as f64 / 1_000_000.0;
                    let g = amplitude * (2.0 * PI * rate_hz * t).sin();
                    rotation(g, g * 0.2)
                })
                .collect(),
            Gesture::Shake { amplitude, ms } => (0..ticks(*ms))
                .map(|_| {
                    let g = self.rng.gen_range(-*amplitude..=*amplitude);
                    let b = self.rng.gen_range(-*amplitude..=*amplitude) * 0.5;
                    rotation(g, b)
                })
                .collect(),
            Gesture::Tilt { from, to, ms } => {
                let n = ticks(*ms);
                (0..n)
                    .map(|i| {
                        let t = i as f64 / n.max(1) as f64;
                        rotation(lerp(*from, *to, smoothstep(t)), 0.0)
                    })
                    .collect()
            }
        }
    }

    fn execute(&mut self, gesture: &Gesture, sink: &MotionSink, shutdown: &Receiver<()>) -> bool {
        info!("  {:?}", gesture);
        let tick = Duration::from_micros(self.tick_us());
        for reading in self.render(gesture) {
            if stop_requested(shutdown) {
                return false;
            }
            if let Some(r) = reading {
                sink.push(&r, self.clock.now_us());
            }
            thread::sleep(tick);
        }
        true
    }
}

impl SensorSource for Simulator {
    fn request_permission(&mut self) -> Permission {
        if self.deny_permission {
            Permission::Denied
        } else {
            Permission::Granted
        }
    }

    fn run(mut self: Box<Self>, sink: MotionSink, shutdown: Receiver<()>) {
        let gestures = match self.demo.as_str() {
            "storm" => storm_sequence(),
            "basic" => demo_sequence(),
            other => {
                warn!("Unknown demo {:?}, using basic", other);
                demo_sequence()
            }
        };
        info!("Simulator starting {:?} demo at {} Hz...", self.demo, self.sensor_rate_hz);

        for gesture in &gestures {
            if !self.execute(gesture, &sink, &shutdown) {
                info!("Simulator stopped");
                return;
            }
        }

        info!("Demo sequence complete. Holding still...");
        let still = Gesture::Still { ms: 1000 };
        while self.execute(&still, &sink, &shutdown) {}
        info!("Simulator stopped");
    }
}

fn stop_requested(shutdown: &Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// About 15 seconds of handling the chime: pick up, gentle swings, one
/// hard flick, settle.
pub fn demo_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Still { ms: 500 },
        Gesture::Tilt { from: 0.0, to: 60.0, ms: 400 },
        Gesture::Tilt { from: 60.0, to: 0.0, ms: 400 },
        Gesture::Still { ms: 300 },
        Gesture::Swing { amplitude: 120.0, rate_hz: 0.8, ms: 3000 },
        Gesture::Still { ms: 800 },
        Gesture::Swing { amplitude: 250.0, rate_hz: 1.5, ms: 2000 },
        Gesture::Tilt { from: -400.0, to: 0.0, ms: 250 },
        Gesture::Still { ms: 1500 },
        Gesture::Hold { ms: 500 },
        Gesture::Swing { amplitude: 60.0, rate_hz: 0.5, ms: 4000 },
        Gesture::Still { ms: 1000 },
    ]
}

/// Sustained violent shaking to drive the throttle at its limit.
pub fn storm_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Still { ms: 300 },
        Gesture::Shake { amplitude: 900.0, ms: 5000 },
        Gesture::Swing { amplitude: 600.0, rate_hz: 4.0, ms: 3000 },
        Gesture::Shake { amplitude: 1500.0, ms: 2000 },
        Gesture::Still { ms: 2000 },
    ]
}

// ─── Math helpers ───────────────────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
