/// One-pole low-pass filter on the raw sensor magnitude.
///
/// `smoothed += (raw - smoothed) * alpha`. At alpha = 0.1 a step change is
/// 90% settled after about 22 updates (0.9^22 ≈ 0.1) and a bit over 60%
/// after 10.
#[derive(Debug, Clone)]
pub struct SensorSmoother {
    alpha: f64,
    smoothed: f64,
}

impl SensorSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            smoothed: 0.0,
        }
    }

    /// Feed one raw value and return the new smoothed value.
    /// Non-finite input counts as zero.
    pub fn update(&mut self, raw: f64) -> f64 {
        let raw = if raw.is_finite() { raw } else { 0.0 };
        self.smoothed += (raw - self.smoothed) * self.alpha;
        self.smoothed
    }

    pub fn value(&self) -> f64 {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed = 0.0;
    }
}

impl Default for SensorSmoother {
    fn default() -> Self {
        Self::new(0.1)
    }
}
