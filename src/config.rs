//! Pipeline configuration: fixed physics/voice constants plus the live
//! control parameters.
//!
//! Every section defaults field-by-field, so a JSON file only needs the
//! values it wants to change.

use crate::error::{ChimeError, Result};
use crate::types::{SensorAxis, FULL_SCALE_ROTATION};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The four parameters the control surface can change while running.
/// Owned by the controller and passed by reference into the integrator
/// and throttle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlParams {
    /// Velocity retained per tick, in (0, 1)
    pub friction: f64,
    /// Scales sensor impulses, > 0
    pub sensitivity: f64,
    /// Normalized intensity above which triggers are allowed, 0.0–1.0
    pub threshold: f64,
    /// Target triggers per second
    pub density: f64,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            friction: 0.94,
            sensitivity: 1.0,
            threshold: 0.1,
            density: 10.0,
        }
    }
}

impl ControlParams {
    /// Friction is kept strictly inside (0, 1) and sensitivity strictly
    /// positive. Threshold is clamped to 0.0–1.0. Density is stored as given;
    /// the throttle clamps it at use.
    pub fn set_friction(&mut self, v: f64) {
        if v.is_finite() {
            self.friction = v.clamp(0.01, 0.999);
        }
    }

    pub fn set_sensitivity(&mut self, v: f64) {
        if v.is_finite() {
            self.sensitivity = v.max(0.01);
        }
    }

    pub fn set_threshold(&mut self, v: f64) {
        if v.is_finite() {
            self.threshold = v.clamp(0.0, 1.0);
        }
    }

    pub fn set_density(&mut self, v: f64) {
        if v.is_finite() {
            self.density = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub total_slots: usize,
    /// Speed cap in slots per tick
    pub max_speed: f64,
    /// Fraction of speed kept (sign-inverted) after hitting an end
    pub restitution: f64,
    /// Slots/tick of velocity per sensor unit
    pub impulse_gain: f64,
    /// Inputs smaller than this are sensor drift
    pub deadzone: f64,
    /// Inputs larger than this are glitches
    pub sensor_range: f64,
    /// Flip the impulse sign for sensors mounted the other way round
    pub invert_axis: bool,
    pub axis: SensorAxis,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            total_slots: 40,
            max_speed: 2.0,
            restitution: 0.45,
            impulse_gain: 0.002,
            deadzone: 2.0,
            sensor_range: 2000.0,
            invert_axis: false,
            axis: SensorAxis::RotationGamma,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Minimum |velocity| (slots/tick) for a crossing to count
    pub trigger_velocity: f64,
    /// Crossings spanning more slots than this emit only the terminal slot
    pub max_slot_jump: usize,
    pub min_strike: f64,
    pub max_strike: f64,
    /// Interval at density 1, milliseconds
    pub base_interval_ms: f64,
    /// How much a hard strike shortens the interval, 0.0–1.0
    pub damping: f64,
    /// Hard floor on the interval, milliseconds
    pub min_interval_ms: f64,
    /// Gate leaves Active below `threshold * gate_hysteresis`
    pub gate_hysteresis: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            trigger_velocity: 0.05,
            max_slot_jump: 4,
            min_strike: 0.15,
            max_strike: 1.0,
            base_interval_ms: 1000.0,
            damping: 0.5,
            min_interval_ms: 40.0,
            gate_hysteresis: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Frequency at slot 0
    pub start_freq: f64,
    /// Frequency approached at the far end
    pub end_freq: f64,
    pub min_force: f64,
    pub max_force: f64,
    /// Random detune per strike, in cents. 0 disables jitter.
    pub detune_cents: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            start_freq: 2500.0,
            end_freq: 500.0,
            min_force: 0.1,
            max_force: 1.0,
            detune_cents: 0.0,
        }
    }
}

/// Sympathetic "neighbor" strikes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceConfig {
    pub probability: f64,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    /// Neighbor intensity relative to the original strike
    pub intensity_scale: f64,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            probability: 0.3,
            min_delay_ms: 20.0,
            max_delay_ms: 80.0,
            intensity_scale: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub alpha: f64,
    /// Magnitude treated as intensity 1.0
    pub full_scale: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            full_scale: FULL_SCALE_ROTATION,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub control: ControlParams,
    pub motion: MotionConfig,
    pub trigger: TriggerConfig,
    pub voice: VoiceConfig,
    pub resonance: ResonanceConfig,
    pub smoothing: SmoothingConfig,
    /// Forward the smoothed intensity to the engine every tick
    pub continuous_output: bool,
    /// Seed for detune and resonance randomness. None = from entropy.
    pub seed: Option<u64>,
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: PipelineConfig = serde_json::from_str(&data)?;
        cfg.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(cfg)
    }

    /// Load a config file, falling back to defaults if it is absent or bad.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Using default config ({:?}: {})", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.control;
        if !(c.friction > 0.0 && c.friction < 1.0) {
            return Err(ChimeError::Config(format!(
                "friction {} must be in (0, 1)",
                c.friction
            )));
        }
        if !(c.sensitivity > 0.0) || !c.sensitivity.is_finite() {
            return Err(ChimeError::Config("sensitivity must be positive".into()));
        }
        if !(0.0..=1.0).contains(&c.threshold) {
            return Err(ChimeError::Config("threshold must be in [0, 1]".into()));
        }
        let m = &self.motion;
        if m.total_slots == 0 {
            return Err(ChimeError::Config("total_slots must be at least 1".into()));
        }
        if !(m.max_speed > 0.0) {
            return Err(ChimeError::Config("max_speed must be positive".into()));
        }
        if !(0.0..1.0).contains(&m.restitution) {
            return Err(ChimeError::Config("restitution must be in [0, 1)".into()));
        }
        let v = &self.voice;
        if !(v.start_freq > 0.0 && v.end_freq > 0.0) {
            return Err(ChimeError::Config("frequencies must be positive".into()));
        }
        if !(v.min_force > 0.0) || v.min_force > v.max_force {
            return Err(ChimeError::Config(format!(
                "force range [{}, {}] invalid",
                v.min_force, v.max_force
            )));
        }
        let t = &self.trigger;
        if t.min_strike > t.max_strike {
            return Err(ChimeError::Config("min_strike exceeds max_strike".into()));
        }
        if !(0.0..=1.0).contains(&t.damping) {
            return Err(ChimeError::Config("damping must be in [0, 1]".into()));
        }
        let r = &self.resonance;
        if !(0.0..=1.0).contains(&r.probability) {
            return Err(ChimeError::Config("resonance probability must be in [0, 1]".into()));
        }
        if r.min_delay_ms > r.max_delay_ms {
            return Err(ChimeError::Config("resonance min_delay exceeds max_delay".into()));
        }
        if !(self.smoothing.alpha > 0.0 && self.smoothing.alpha <= 1.0) {
            return Err(ChimeError::Config("smoothing alpha must be in (0, 1]".into()));
        }
        Ok(())
    }
}
