//! Sensor delivery: a single-slot mailbox between the sensor thread and the
//! control loop, and the [`SensorSource`] trait for anything that feeds it.
//!
//! Consumers don't need to know whether readings came from the simulator or
//! a recorded trace.

use crate::types::{MotionReading, Permission, SensorAxis, SensorSample};
use crossbeam_channel::Receiver;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Last-write-wins holding cell for the newest sensor sample.
///
/// A one-slot lock-free queue: writers `force_push`, displacing any sample
/// the control loop has not picked up yet. Value and timestamp travel
/// together, so the reader always sees a sample that was actually posted.
#[derive(Debug)]
pub struct SensorMailbox {
    slot: ArrayQueue<SensorSample>,
    posted: AtomicU64,
}

impl SensorMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: ArrayQueue::new(1),
            posted: AtomicU64::new(0),
        })
    }

    /// Store a sample, replacing whatever was waiting.
    pub fn post(&self, sample: SensorSample) {
        self.slot.force_push(sample);
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    /// The newest sample posted since the last call, if any.
    pub fn take_fresh(&self) -> Option<SensorSample> {
        self.slot.pop()
    }

    /// Total number of samples ever posted.
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }
}

/// Converts full readings to the configured scalar before posting.
#[derive(Clone)]
pub struct MotionSink {
    mailbox: Arc<SensorMailbox>,
    axis: SensorAxis,
}

impl MotionSink {
    pub fn new(mailbox: Arc<SensorMailbox>, axis: SensorAxis) -> Self {
        Self { mailbox, axis }
    }

    pub fn push(&self, reading: &MotionReading, timestamp_us: u64) {
        self.mailbox.post(SensorSample {
            value: self.axis.extract(reading),
            timestamp_us,
        });
    }
}

/// Anything that can deliver motion readings.
pub trait SensorSource: Send + 'static {
    /// Ask for access once, before subscribing. Denial is a normal outcome.
    fn request_permission(&mut self) -> Permission {
        Permission::Granted
    }

    /// Deliver readings until the source is exhausted or `shutdown` fires.
    /// Blocks the calling thread.
    fn run(self: Box<Self>, sink: MotionSink, shutdown: Receiver<()>);
}
