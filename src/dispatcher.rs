use crate::config::ResonanceConfig;
use crate::engine::SynthEngine;
use crate::error::Result;
use crate::mapper::ParameterMapper;
use crate::types::{AudioParams, TriggerEvent};
use log::{debug, error, info, trace};
use rand::prelude::*;

/// Engine lifecycle as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
}

/// Handle for a scheduled neighbor strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// A neighbor strike waiting for its due time.
#[derive(Debug, Clone)]
struct DeferredTrigger {
    id: TaskId,
    due_us: u64,
    params: AudioParams,
}

/// Forwards finished triggers to the synthesis engine.
///
/// Owns the engine and its lifecycle. Until the engine confirms
/// initialization (and again after teardown) every dispatch is a no-op.
///
/// # Sympathetic resonance
///
/// With probability `resonance.probability` a strike schedules one weaker
/// strike on an adjacent slot after a short random delay. Pending strikes
/// live in an explicit task list that `poll` drains when due; `teardown`
/// cancels every one of them before the engine is stopped.
pub struct EventDispatcher {
    engine: Box<dyn SynthEngine>,
    state: EngineState,
    resonance: ResonanceConfig,
    neighbor_mapper: ParameterMapper,
    pending: Vec<DeferredTrigger>,
    next_id: u64,
    rng: StdRng,
    dispatched: u64,
}

impl EventDispatcher {
    pub fn new(
        engine: Box<dyn SynthEngine>,
        resonance: ResonanceConfig,
        neighbor_mapper: ParameterMapper,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s ^ 0x9E37_79B9_7F4A_7C15),
            None => StdRng::from_entropy(),
        };
        Self {
            engine,
            state: EngineState::Uninitialized,
            resonance,
            neighbor_mapper,
            pending: Vec::new(),
            next_id: 0,
            rng,
            dispatched: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Start the engine. On failure the dispatcher stays uninitialized and
    /// the error is returned once; there is no retry.
    pub fn initialize(&mut self, source: &str) -> Result<()> {
        match self.engine.initialize(source) {
            Ok(()) => {
                self.state = EngineState::Ready;
                info!("Engine ready");
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Uninitialized;
                error!("Engine initialization failed: {}", e);
                Err(e)
            }
        }
    }

    /// Hand the engine a new voice source. Errors come back unchanged.
    pub fn reload_source(&mut self, source: &str) -> Result<()> {
        if !self.is_ready() {
            return Err(crate::error::ChimeError::NotReady);
        }
        self.engine.load_source(source)
    }

    /// Strike now, and maybe schedule a neighbor.
    pub fn dispatch(&mut self, event: &TriggerEvent, params: AudioParams) {
        if !self.is_ready() {
            trace!("dispatch dropped: engine not ready");
            return;
        }
        self.engine.trigger(&params);
        self.dispatched += 1;

        let p = self.resonance.probability.clamp(0.0, 1.0);
        if p > 0.0 && self.rng.gen_bool(p) {
            if let Some(slot) = self.pick_neighbor(event.slot_index) {
                let intensity = event.intensity * self.resonance.intensity_scale;
                let delay_ms = if self.resonance.max_delay_ms > self.resonance.min_delay_ms {
                    self.rng
                        .gen_range(self.resonance.min_delay_ms..=self.resonance.max_delay_ms)
                } else {
                    self.resonance.min_delay_ms
                };
                let params = self.neighbor_mapper.map(slot, intensity);
                let due = event.timestamp_us + (delay_ms * 1000.0) as u64;
                self.schedule(due, params);
            }
        }
    }

    pub fn set_continuous_parameter(&mut self, name: &str, value: f64) {
        if self.is_ready() {
            self.engine.set_continuous_parameter(name, value);
        }
    }

    fn pick_neighbor(&mut self, slot: usize) -> Option<usize> {
        let last = self.neighbor_mapper.total_slots().saturating_sub(1);
        match (slot > 0, slot < last) {
            (true, true) => Some(if self.rng.gen_bool(0.5) { slot - 1 } else { slot + 1 }),
            (true, false) => Some(slot - 1),
            (false, true) => Some(slot + 1),
            (false, false) => None,
        }
    }

    /// Queue a strike for later. Returns a handle that can cancel it.
    pub fn schedule(&mut self, due_us: u64, params: AudioParams) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.pending.push(DeferredTrigger { id, due_us, params });
        trace!("scheduled neighbor {:?} at {}µs", id, due_us);
        id
    }

    /// Cancel one pending strike. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.id != id);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Fire every pending strike that is due. Returns how many fired.
    pub fn poll(&mut self, now_us: u64) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        if !self.is_ready() {
            self.pending.clear();
            return 0;
        }
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|t| t.due_us <= now_us);
        self.pending = waiting;
        for task in &due {
            self.engine.trigger(&task.params);
            self.dispatched += 1;
        }
        due.len()
    }

    /// Cancel everything pending and stop the engine. Dispatch is a no-op
    /// afterwards until the next successful `initialize`.
    pub fn teardown(&mut self) {
        let cancelled = self.cancel_all();
        if self.is_ready() {
            self.engine.stop();
        }
        self.state = EngineState::Uninitialized;
        info!("Engine torn down ({} pending strikes cancelled)", cancelled);
        debug!("Dispatcher sent {} strikes this session", self.dispatched);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}
