//! Motion trace reader: replays recorded sensor readings.
//!
//! A trace is JSONL. The first line is a header:
//!
//! ```text
//! {"format": "chime-motion-trace", "rate_hz": 60}
//! ```
//!
//! then one reading per line, each vector optional:
//!
//! ```text
//! {"t": 16000, "rr": [0.0, 1.5, -42.0], "la": [0.1, 0.0, 0.2]}
//! ```
//!
//! Works with any `BufRead`: files, in-memory buffers, stdin.

use crate::error::{ChimeError, Result};
use crate::sensor::{MotionSink, SensorSource};
use crate::types::{MotionReading, SessionClock};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TRACE_FORMAT: &str = "chime-motion-trace";

/// Parsed header (first line of a trace file).
#[derive(Debug)]
pub struct TraceHeader {
    pub rate_hz: u32,
    pub raw: serde_json::Value,
}

/// One recorded reading, short keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLine {
    /// Microseconds since recording start
    pub t: u64,
    #[serde(default)]
    pub rr: Option<[f64; 3]>,
    #[serde(default)]
    pub la: Option<[f64; 3]>,
}

impl From<&TraceLine> for MotionReading {
    fn from(l: &TraceLine) -> Self {
        Self {
            rotation_rate: l.rr,
            linear_acceleration: l.la,
        }
    }
}

/// Line-by-line trace reader.
pub struct TraceReader<R: BufRead> {
    reader: R,
    pub header: TraceHeader,
    line_buf: String,
}

impl<R: BufRead> TraceReader<R> {
    /// Read and validate the header line.
    pub fn open(mut reader: R) -> Result<Self> {
        let mut first_line = String::new();
        reader.read_line(&mut first_line)?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err(ChimeError::Trace("empty file".into()));
        }

        let raw: serde_json::Value = serde_json::from_str(first_line)?;
        let format = raw["format"]
            .as_str()
            .ok_or_else(|| ChimeError::Trace("missing \"format\" field".into()))?;
        if format != TRACE_FORMAT {
            return Err(ChimeError::Trace(format!("unknown format: {}", format)));
        }
        let rate_hz = raw["rate_hz"].as_u64().unwrap_or(60) as u32;

        Ok(Self {
            reader,
            header: TraceHeader { rate_hz, raw },
            line_buf: String::new(),
        })
    }

    /// Next line. `None` at EOF, `Err` for an unparseable line.
    pub fn next_line(&mut self) -> Option<Result<TraceLine>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(trimmed).map_err(ChimeError::from));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Read all remaining lines, skipping bad ones with a warning.
    pub fn read_all(&mut self) -> Vec<TraceLine> {
        let mut lines = Vec::new();
        let mut bad = 0usize;
        while let Some(res) = self.next_line() {
            match res {
                Ok(l) => lines.push(l),
                Err(e) => {
                    bad += 1;
                    if bad <= 3 {
                        warn!("Skipping trace line: {}", e);
                    }
                }
            }
        }
        if bad > 3 {
            warn!("Skipped {} bad trace lines in total", bad);
        }
        lines
    }
}

/// Sensor source that replays a trace file at its recorded pace.
pub struct TraceSource {
    path: PathBuf,
    clock: SessionClock,
    looping: bool,
}

impl TraceSource {
    pub fn new(path: &Path, clock: SessionClock) -> Self {
        Self {
            path: path.to_path_buf(),
            clock,
            looping: false,
        }
    }

    /// Start over at the end of the trace instead of going quiet.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Readings plus the recorded sample rate.
    fn load(&self) -> Result<(Vec<TraceLine>, u32)> {
        let file = File::open(&self.path)?;
        let mut reader = TraceReader::open(BufReader::new(file))?;
        let lines = reader.read_all();
        info!(
            "Trace {:?}: {} readings at {} Hz",
            self.path.file_name().unwrap_or_default(),
            lines.len(),
            reader.header.rate_hz
        );
        Ok((lines, reader.header.rate_hz.max(1)))
    }
}

impl SensorSource for TraceSource {
    fn run(self: Box<Self>, sink: MotionSink, shutdown: Receiver<()>) {
        let (lines, rate_hz) = match self.load() {
            Ok(l) => l,
            Err(e) => {
                warn!("Cannot replay trace {:?}: {}", self.path, e);
                return;
            }
        };
        if lines.is_empty() {
            return;
        }

        // Gaps never go below one sample period, so duplicate timestamps
        // and the wrap from last line back to first still pace the loop.
        let period_us = 1_000_000 / rate_hz as u64;
        let mut prev_t: Option<u64> = None;
        loop {
            for line in &lines {
                // Wait out the recorded gap, waking early on shutdown.
                let gap_us = match prev_t {
                    Some(p) => line.t.saturating_sub(p).max(period_us),
                    None => 0,
                };
                prev_t = Some(line.t);
                match shutdown.recv_timeout(Duration::from_micros(gap_us)) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
                sink.push(&MotionReading::from(line), self.clock.now_us());
            }
            if !self.looping {
                info!("Trace replay finished");
                return;
            }
        }
    }
}
