use crate::config::{ControlParams, TriggerConfig};
use crate::types::TriggerEvent;
use log::trace;

/// Drop-policy rate limiter for trigger events.
///
/// The minimum spacing between emitted events is
///
///   base_interval / max(density, 1) * (1 - intensity * damping)
///
/// floored at `min_interval_ms`. Harder strikes may follow sooner. Events
/// arriving inside the interval are discarded, never queued.
pub struct TriggerThrottle {
    config: TriggerConfig,
    last_emitted_at: Option<u64>,
}

impl TriggerThrottle {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            last_emitted_at: None,
        }
    }

    /// Minimum interval (microseconds) for an event of this intensity.
    pub fn interval_us(&self, intensity: f64, params: &ControlParams) -> u64 {
        let density = if params.density.is_finite() {
            params.density.max(1.0)
        } else {
            1.0
        };
        let intensity = intensity.clamp(0.0, 1.0);
        let ms = self.config.base_interval_ms / density * (1.0 - intensity * self.config.damping);
        let ms = ms.max(self.config.min_interval_ms);
        (ms * 1000.0).round() as u64
    }

    /// Pass the event through if enough time has passed since the last
    /// emission; otherwise drop it.
    pub fn try_emit(
        &mut self,
        event: TriggerEvent,
        now_us: u64,
        params: &ControlParams,
    ) -> Option<TriggerEvent> {
        let interval = self.interval_us(event.intensity, params);
        if let Some(last) = self.last_emitted_at {
            let elapsed = now_us.saturating_sub(last);
            if elapsed < interval {
                trace!(
                    "throttle: drop slot {} ({}µs < {}µs)",
                    event.slot_index, elapsed, interval
                );
                return None;
            }
        }
        self.last_emitted_at = Some(now_us);
        Some(event)
    }

    pub fn last_emitted_at(&self) -> Option<u64> {
        self.last_emitted_at
    }

    pub fn reset(&mut self) {
        self.last_emitted_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(slot: usize, intensity: f64, t: u64) -> TriggerEvent {
        TriggerEvent {
            slot_index: slot,
            intensity,
            timestamp_us: t,
        }
    }

    fn params(density: f64) -> ControlParams {
        ControlParams {
            density,
            ..ControlParams::default()
        }
    }

    #[test]
    fn test_density_zero_clamps_to_base_interval() {
        let t = TriggerThrottle::new(TriggerConfig::default());
        assert_eq!(t.interval_us(0.0, &params(0.0)), 1_000_000);
        assert_eq!(t.interval_us(0.0, &params(-5.0)), 1_000_000);
        assert_eq!(t.interval_us(0.0, &params(f64::NAN)), 1_000_000);
    }

    #[test]
    fn test_interval_floor() {
        let t = TriggerThrottle::new(TriggerConfig::default());
        // 1000 / 100 * 0.5 = 5ms, floored at 40ms
        assert_eq!(t.interval_us(1.0, &params(100.0)), 40_000);
    }

    #[test]
    fn test_intensity_shortens_interval() {
        let t = TriggerThrottle::new(TriggerConfig::default());
        let p = params(10.0);
        assert_eq!(t.interval_us(0.0, &p), 100_000);
        assert_eq!(t.interval_us(1.0, &p), 50_000);
    }

    #[test]
    fn test_drops_inside_interval() {
        let mut t = TriggerThrottle::new(TriggerConfig::default());
        let p = params(10.0);
        assert!(t.try_emit(event(1, 0.0, 0), 0, &p).is_some());
        assert!(t.try_emit(event(2, 0.0, 50_000), 50_000, &p).is_none());
        assert_eq!(t.last_emitted_at(), Some(0));
        assert!(t.try_emit(event(3, 0.0, 100_000), 100_000, &p).is_some());
    }

    #[test]
    fn test_emitted_spacing_law() {
        let mut t = TriggerThrottle::new(TriggerConfig::default());
        let p = params(20.0);
        let mut emitted: Vec<TriggerEvent> = Vec::new();
        let mut now = 0u64;
        for i in 0..2000u64 {
            now += 7_000 + (i * 131) % 9_000;
            let intensity = ((i * 37) % 100) as f64 / 100.0;
            if let Some(e) = t.try_emit(event(i as usize % 40, intensity, now), now, &p) {
                emitted.push(e);
            }
        }
        assert!(emitted.len() > 10);
        for pair in emitted.windows(2) {
            let gap = pair[1].timestamp_us - pair[0].timestamp_us;
            assert!(gap >= t.interval_us(pair[1].intensity, &p));
            assert!(gap >= 40_000);
        }
    }
}
