use crate::config::TriggerConfig;
use crate::types::{MotionState, TriggerEvent};
use log::trace;

/// Turns continuous position into discrete slot crossings.
///
/// Compares this frame's slot (floor of position) with the slot recorded
/// on the previous frame. The previous slot is tracked on every frame,
/// including frames that emit nothing, so slow drifts never produce a
/// burst of stale crossings later.
pub struct CrossingDetector {
    config: TriggerConfig,
    total_slots: usize,
    max_speed: f64,
    prev_slot: Option<usize>,
}

impl CrossingDetector {
    pub fn new(config: TriggerConfig, total_slots: usize, max_speed: f64) -> Self {
        Self {
            config,
            total_slots: total_slots.max(1),
            max_speed,
            prev_slot: None,
        }
    }

    /// Slot index for a position. The far end (position == total_slots)
    /// belongs to the last slot.
    pub fn slot_of(&self, position: f64) -> usize {
        let floor = position.max(0.0).floor() as usize;
        floor.min(self.total_slots - 1)
    }

    /// Strike intensity for a velocity, clamped into the strike range.
    pub fn intensity_of(&self, velocity: f64) -> f64 {
        let norm = if self.max_speed > 0.0 {
            velocity.abs() / self.max_speed
        } else {
            0.0
        };
        norm.clamp(self.config.min_strike, self.config.max_strike)
            .clamp(0.0, 1.0)
    }

    /// Detect crossings for this frame. Returns events in travel order.
    pub fn detect(&mut self, state: &MotionState, timestamp_us: u64) -> Vec<TriggerEvent> {
        let current = self.slot_of(state.position);
        let prev = match self.prev_slot.replace(current) {
            Some(p) => p,
            None => return Vec::new(),
        };
        if prev == current {
            return Vec::new();
        }
        if state.velocity.abs() <= self.config.trigger_velocity {
            trace!(
                "crossing {}→{} ignored, |vel| {:.3} under threshold",
                prev, current, state.velocity.abs()
            );
            return Vec::new();
        }

        let intensity = self.intensity_of(state.velocity);
        let event = |slot_index| TriggerEvent {
            slot_index,
            intensity,
            timestamp_us,
        };

        let span = prev.abs_diff(current);
        if span > self.config.max_slot_jump {
            trace!("crossing {}→{} spans {} slots, terminal only", prev, current, span);
            return vec![event(current)];
        }
        if current > prev {
            (prev + 1..=current).map(event).collect()
        } else {
            (current..prev).rev().map(event).collect()
        }
    }

    pub fn reset(&mut self) {
        self.prev_slot = None;
    }
}
