use crate::config::VoiceConfig;
use crate::types::AudioParams;
use rand::prelude::*;

/// Maps a slot and strike intensity to synthesis parameters.
///
/// Frequency interpolates exponentially from `start_freq` at slot 0 toward
/// `end_freq` at the far end, so equal slot steps are equal pitch steps.
/// Pan spreads linearly from hard left to right.
///
/// With `detune_cents > 0` each strike gets a small random detune. With
/// jitter disabled the mapping is a pure function of its inputs.
pub struct ParameterMapper {
    config: VoiceConfig,
    total_slots: usize,
    rng: StdRng,
}

impl ParameterMapper {
    pub fn new(config: VoiceConfig, total_slots: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            total_slots: total_slots.max(1),
            rng,
        }
    }

    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    /// Nominal frequency of a slot, without jitter.
    pub fn frequency_of(&self, slot_index: usize) -> f64 {
        let t = slot_index as f64 / self.total_slots as f64;
        let ratio = self.config.end_freq / self.config.start_freq;
        self.config.start_freq * ratio.powf(t)
    }

    pub fn pan_of(&self, slot_index: usize) -> f64 {
        let t = slot_index as f64 / self.total_slots as f64;
        (t * 2.0 - 1.0).clamp(-1.0, 1.0)
    }

    pub fn force_of(&self, intensity: f64) -> f64 {
        let intensity = if intensity.is_finite() { intensity } else { 0.0 };
        intensity.clamp(self.config.min_force, self.config.max_force)
    }

    pub fn map(&mut self, slot_index: usize, intensity: f64) -> AudioParams {
        let mut frequency_hz = self.frequency_of(slot_index);
        if self.config.detune_cents > 0.0 {
            let cents = self
                .rng
                .gen_range(-self.config.detune_cents..=self.config.detune_cents);
            frequency_hz *= 2f64.powf(cents / 1200.0);
        }
        AudioParams {
            frequency_hz,
            pan: self.pan_of(slot_index),
            strike_force: self.force_of(intensity),
        }
    }
}
