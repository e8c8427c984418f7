use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Sensor data ────────────────────────────────────────────────────────────

/// One reading from the motion sensor. Either vector may be missing
/// depending on what the platform reports.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionReading {
    /// Rotation rate in deg/s: [alpha, beta, gamma]
    pub rotation_rate: Option<[f64; 3]>,
    /// Linear acceleration in m/s² without gravity: [x, y, z]
    pub linear_acceleration: Option<[f64; 3]>,
}

/// Which component of a [`MotionReading`] drives the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorAxis {
    RotationAlpha,
    RotationBeta,
    RotationGamma,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
}

impl SensorAxis {
    /// Pull the scalar for this axis out of a reading. A missing vector
    /// reads as zero.
    pub fn extract(&self, reading: &MotionReading) -> f64 {
        let (vector, idx) = match self {
            SensorAxis::RotationAlpha => (reading.rotation_rate, 0),
            SensorAxis::RotationBeta => (reading.rotation_rate, 1),
            SensorAxis::RotationGamma => (reading.rotation_rate, 2),
            SensorAxis::AccelerationX => (reading.linear_acceleration, 0),
            SensorAxis::AccelerationY => (reading.linear_acceleration, 1),
            SensorAxis::AccelerationZ => (reading.linear_acceleration, 2),
        };
        vector.map(|v| v[idx]).unwrap_or(0.0)
    }
}

/// Raw scalar magnitude with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub value: f64,
    /// Microseconds since session start
    pub timestamp_us: u64,
}

/// Outcome of asking the platform for motion-sensor access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

// ─── Physics ────────────────────────────────────────────────────────────────

/// Snapshot of the integrator after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    /// Continuous position in slot-space, 0.0..=total_slots
    pub position: f64,
    /// Slots per tick, signed
    pub velocity: f64,
    pub friction: f64,
    pub sensitivity: f64,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pos={:>6.2}  vel={:>+6.3}  fr={:.3}  sens={:.2}",
            self.position, self.velocity, self.friction, self.sensitivity,
        )
    }
}

// ─── Triggers ───────────────────────────────────────────────────────────────

/// A discrete slot crossing, before throttling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub slot_index: usize,
    /// Normalized strike intensity, 0.0–1.0
    pub intensity: f64,
    pub timestamp_us: u64,
}

/// What the synthesis engine needs to strike one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioParams {
    pub frequency_hz: f64,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f64,
    pub strike_force: f64,
}

impl fmt::Display for AudioParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>7.1} Hz  pan={:>+5.2}  force={:.2}",
            self.frequency_hz, self.pan, self.strike_force,
        )
    }
}

// ─── Pipeline state ─────────────────────────────────────────────────────────

/// Process-level state of the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Engine not (or no longer) initialized. Triggers are dropped.
    Uninitialized,
    /// Engine confirmed, gate not evaluated yet.
    Ready,
    /// Smoothed intensity above threshold: crossings may trigger.
    Active,
    /// Below threshold: physics runs, triggers are suppressed.
    Idle,
}

/// Per-tick summary published by the controller.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub timestamp_us: u64,
    pub motion: MotionState,
    /// Signed smoothed sensor value that drives the mass
    pub smoothed: f64,
    /// Smoothed magnitude normalized to 0.0–1.0
    pub intensity: f64,
    pub state: PipelineState,
    /// Crossings detected this frame
    pub crossings: usize,
    /// Triggers that passed the throttle and were dispatched
    pub dispatched: Vec<AudioParams>,
}

// ─── Live control ───────────────────────────────────────────────────────────

/// A change coming from the control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlChange {
    Friction(f64),
    Sensitivity(f64),
    Threshold(f64),
    Density(f64),
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Rotation rate treated as full intensity (deg/s).
pub const FULL_SCALE_ROTATION: f64 = 300.0;

/// Engine parameter names used for continuous control.
pub const PARAM_INPUT_VELOCITY: &str = "input_velocity";
pub const PARAM_THRESHOLD: &str = "param_threshold";
pub const PARAM_DENSITY: &str = "param_density";
