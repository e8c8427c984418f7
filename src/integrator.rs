use crate::config::{ControlParams, MotionConfig};
use crate::types::MotionState;
use log::trace;

/// One-dimensional mass on a rail of `total_slots` bars.
///
/// # Physics model
///
/// Explicit Euler at the tick rate, one step per display frame:
///
///   1. clamp velocity to ±max_speed
///   2. position += velocity
///   3. velocity *= friction
///   4. on leaving [0, total_slots]: clamp position, velocity *= -restitution
///
/// Sensor impulses nudge velocity between ticks. Absent impulses and
/// bounces, velocity after n ticks is exactly `v0 * friction^n`.
pub struct MotionIntegrator {
    config: MotionConfig,
    position: f64,
    velocity: f64,
}

impl MotionIntegrator {
    /// Start at rest in the middle of the rail.
    pub fn new(config: MotionConfig) -> Self {
        let position = config.total_slots as f64 / 2.0;
        Self {
            config,
            position,
            velocity: 0.0,
        }
    }

    /// Place the mass explicitly. Position is clamped into the rail and
    /// velocity to the speed cap.
    pub fn with_state(mut self, position: f64, velocity: f64) -> Self {
        self.place(position, velocity);
        self
    }

    pub fn place(&mut self, position: f64, velocity: f64) {
        self.position = position.clamp(0.0, self.total_slots());
        self.velocity = velocity.clamp(-self.config.max_speed, self.config.max_speed);
    }

    pub fn total_slots(&self) -> f64 {
        self.config.total_slots as f64
    }

    pub fn max_speed(&self) -> f64 {
        self.config.max_speed
    }

    /// Push the mass with one (smoothed) sensor value.
    ///
    /// Values under the deadzone are drift and are ignored. Non-finite or
    /// out-of-range values count as zero.
    pub fn apply_impulse(&mut self, input: f64, params: &ControlParams) {
        if !input.is_finite() || input.abs() > self.config.sensor_range {
            trace!("integrator: rejected impulse {}", input);
            return;
        }
        if input.abs() < self.config.deadzone {
            return;
        }
        let sign = if self.config.invert_axis { -1.0 } else { 1.0 };
        self.velocity -= sign * input * self.config.impulse_gain * params.sensitivity;
        self.velocity = self
            .velocity
            .clamp(-self.config.max_speed, self.config.max_speed);
    }

    /// Run one physics step and return the resulting state.
    pub fn advance(&mut self, params: &ControlParams) -> MotionState {
        let max = self.config.max_speed;
        let upper = self.total_slots();

        self.velocity = self.velocity.clamp(-max, max);
        self.position += self.velocity;
        self.velocity *= params.friction;

        if self.position < 0.0 {
            self.position = 0.0;
            self.velocity *= -self.config.restitution;
            trace!("integrator: bounce at 0, vel={:.3}", self.velocity);
        } else if self.position > upper {
            self.position = upper;
            self.velocity *= -self.config.restitution;
            trace!("integrator: bounce at {}, vel={:.3}", upper, self.velocity);
        }

        self.snapshot(params)
    }

    pub fn snapshot(&self, params: &ControlParams) -> MotionState {
        MotionState {
            position: self.position,
            velocity: self.velocity,
            friction: params.friction,
            sensitivity: params.sensitivity,
        }
    }
}
