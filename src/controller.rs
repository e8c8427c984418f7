use crate::config::{ControlParams, PipelineConfig};
use crate::crossing::CrossingDetector;
use crate::dispatcher::EventDispatcher;
use crate::engine::SynthEngine;
use crate::error::Result;
use crate::integrator::MotionIntegrator;
use crate::mapper::ParameterMapper;
use crate::sensor::SensorMailbox;
use crate::smoother::SensorSmoother;
use crate::throttle::TriggerThrottle;
use crate::types::*;
use crossbeam_channel::{select, tick, Receiver, Sender};
use log::{debug, info, trace};
use std::sync::Arc;
use std::time::Duration;

/// The controller owns the whole motion-to-trigger pipeline and runs it
/// once per display tick:
///
///   mailbox → smoother → integrator → crossing detector → throttle
///           → parameter mapper → dispatcher → engine
///
/// # Gate
///
/// Active/Idle is a hysteresis gate on the normalized smoothed magnitude
/// of the sensor value: it turns Active above `threshold` and Idle again
/// below `threshold * gate_hysteresis`. The magnitude has its own smoother,
/// so hard back-and-forth shaking reads as loud even though the signed
/// signal that pushes the mass averages out. The gate only decides whether crossings
/// become strikes. Physics advances either way, so the mass does not jump
/// when the gate opens.
///
/// # Control surface
///
/// `ControlChange`s are drained at the start of each tick. Threshold and
/// density are also forwarded to the engine as continuous parameters.
pub struct Controller {
    params: ControlParams,
    full_scale: f64,
    gate_hysteresis: f64,
    continuous_output: bool,
    mailbox: Arc<SensorMailbox>,
    last_raw: f64,
    smoother: SensorSmoother,
    magnitude: SensorSmoother,
    integrator: MotionIntegrator,
    detector: CrossingDetector,
    throttle: TriggerThrottle,
    mapper: ParameterMapper,
    dispatcher: EventDispatcher,
    gate_active: Option<bool>,
    control_rx: Option<Receiver<ControlChange>>,
    report_txs: Vec<Sender<FrameReport>>,
    frame_count: u64,
}

impl Controller {
    pub fn new(
        config: &PipelineConfig,
        engine: Box<dyn SynthEngine>,
        mailbox: Arc<SensorMailbox>,
    ) -> Self {
        let slots = config.motion.total_slots;
        let seed = config.seed;
        let mapper = ParameterMapper::new(config.voice.clone(), slots, seed);
        let neighbor_mapper =
            ParameterMapper::new(config.voice.clone(), slots, seed.map(|s| s.wrapping_add(1)));
        Self {
            params: config.control,
            full_scale: config.smoothing.full_scale,
            gate_hysteresis: config.trigger.gate_hysteresis,
            continuous_output: config.continuous_output,
            mailbox,
            last_raw: 0.0,
            smoother: SensorSmoother::new(config.smoothing.alpha),
            magnitude: SensorSmoother::new(config.smoothing.alpha),
            integrator: MotionIntegrator::new(config.motion.clone()),
            detector: CrossingDetector::new(
                config.trigger.clone(),
                slots,
                config.motion.max_speed,
            ),
            throttle: TriggerThrottle::new(config.trigger.clone()),
            mapper,
            dispatcher: EventDispatcher::new(engine, config.resonance.clone(), neighbor_mapper, seed),
            gate_active: None,
            control_rx: None,
            report_txs: Vec::new(),
            frame_count: 0,
        }
    }

    /// Accept live parameter changes from a control surface.
    pub fn with_controls(mut self, rx: Receiver<ControlChange>) -> Self {
        self.control_rx = Some(rx);
        self
    }

    /// Publish a [`FrameReport`] per tick to this channel.
    pub fn with_reports(mut self, tx: Sender<FrameReport>) -> Self {
        self.report_txs.push(tx);
        self
    }

    /// Start with the mass at a given place, e.g. for scripted tests.
    pub fn with_motion(mut self, position: f64, velocity: f64) -> Self {
        self.integrator.place(position, velocity);
        self
    }

    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn state(&self) -> PipelineState {
        if !self.dispatcher.is_ready() {
            return PipelineState::Uninitialized;
        }
        match self.gate_active {
            None => PipelineState::Ready,
            Some(true) => PipelineState::Active,
            Some(false) => PipelineState::Idle,
        }
    }

    /// Initialize the engine with the voice source. Blocking; call once
    /// before the loop. On failure the pipeline stays Uninitialized and
    /// every later trigger is dropped.
    pub fn initialize(&mut self, source: &str) -> Result<()> {
        self.dispatcher.initialize(source)?;
        self.gate_active = None;
        self.sync_engine_params();
        Ok(())
    }

    /// Swap the voice source. Engine errors are returned unchanged and the
    /// previous source stays in place.
    pub fn reload_source(&mut self, source: &str) -> Result<()> {
        self.dispatcher.reload_source(source)?;
        self.sync_engine_params();
        info!("Voice source reloaded");
        Ok(())
    }

    fn sync_engine_params(&mut self) {
        self.dispatcher
            .set_continuous_parameter(PARAM_THRESHOLD, self.params.threshold);
        self.dispatcher
            .set_continuous_parameter(PARAM_DENSITY, self.params.density);
    }

    pub fn apply_control(&mut self, change: ControlChange) {
        debug!("control: {:?}", change);
        match change {
            ControlChange::Friction(v) => self.params.set_friction(v),
            ControlChange::Sensitivity(v) => self.params.set_sensitivity(v),
            ControlChange::Threshold(v) => {
                self.params.set_threshold(v);
                self.dispatcher
                    .set_continuous_parameter(PARAM_THRESHOLD, self.params.threshold);
            }
            ControlChange::Density(v) => {
                self.params.set_density(v);
                self.dispatcher
                    .set_continuous_parameter(PARAM_DENSITY, self.params.density);
            }
        }
    }

    fn update_gate(&mut self, intensity: f64) {
        let was = self.gate_active.unwrap_or(false);
        let threshold = self.params.threshold;
        let now = if was {
            intensity >= threshold * self.gate_hysteresis
        } else {
            intensity > threshold
        };
        if self.gate_active != Some(now) && self.dispatcher.is_ready() {
            info!(
                "Gate {} (intensity {:.3}, threshold {:.3})",
                if now { "ACTIVE" } else { "IDLE" },
                intensity,
                threshold
            );
        }
        self.gate_active = Some(now);
    }

    /// Run one frame at `now_us`.
    pub fn tick(&mut self, now_us: u64) -> FrameReport {
        if let Some(rx) = self.control_rx.clone() {
            for change in rx.try_iter() {
                self.apply_control(change);
            }
        }

        self.dispatcher.poll(now_us);

        let fresh = self.mailbox.take_fresh();
        if let Some(sample) = fresh {
            self.last_raw = sample.value;
        }
        let smoothed = self.smoother.update(self.last_raw);
        if fresh.is_some() {
            self.integrator.apply_impulse(smoothed, &self.params);
        }

        let level = self.magnitude.update(self.last_raw.abs());
        let intensity = if self.full_scale > 0.0 {
            (level / self.full_scale).min(1.0)
        } else {
            0.0
        };
        self.update_gate(intensity);

        let motion = self.integrator.advance(&self.params);
        let crossings = self.detector.detect(&motion, now_us);
        let n_crossings = crossings.len();

        let mut dispatched = Vec::new();
        let open = self.state() == PipelineState::Active;
        for event in crossings {
            if !open {
                trace!("gate closed, slot {} suppressed", event.slot_index);
                continue;
            }
            if let Some(event) = self.throttle.try_emit(event, now_us, &self.params) {
                let params = self.mapper.map(event.slot_index, event.intensity);
                trace!("strike slot {:>2}: {}", event.slot_index, params);
                self.dispatcher.dispatch(&event, params);
                dispatched.push(params);
            }
        }

        if self.continuous_output {
            self.dispatcher
                .set_continuous_parameter(PARAM_INPUT_VELOCITY, intensity);
        }

        let report = FrameReport {
            timestamp_us: now_us,
            motion,
            smoothed,
            intensity,
            state: self.state(),
            crossings: n_crossings,
            dispatched,
        };
        for tx in &self.report_txs {
            let _ = tx.try_send(report.clone());
        }

        self.frame_count += 1;
        if self.frame_count % 600 == 0 {
            debug!(
                "Controller: {} frames, {} strikes",
                self.frame_count,
                self.dispatcher.dispatched()
            );
            trace!("Latest: {}", motion);
        }
        report
    }

    /// Tick at `fps` until `shutdown` fires or its sender is dropped, then
    /// tear the engine down. Blocks the calling thread.
    pub fn run(&mut self, clock: &SessionClock, fps: u32, shutdown: Receiver<()>) {
        let period = Duration::from_micros(1_000_000 / fps.max(1) as u64);
        let ticker = tick(period);
        info!("Controller running at {} Hz (state: {:?})", fps, self.state());

        loop {
            select! {
                recv(ticker) -> _ => {
                    self.tick(clock.now_us());
                }
                recv(shutdown) -> _ => break,
            }
        }

        self.shutdown();
    }

    /// Cancel pending neighbor strikes and stop the engine.
    pub fn shutdown(&mut self) {
        self.dispatcher.teardown();
        info!(
            "Controller shutting down after {} frames ({} sensor samples)",
            self.frame_count,
            self.mailbox.posted()
        );
    }
}
