//! The external synthesis engine, as seen by the pipeline.

use crate::error::Result;
use crate::types::AudioParams;

/// Anything that can turn [`AudioParams`] into sound.
///
/// The engine owns the voice graph. `initialize` and `load_source` hand it
/// the source text as an opaque blob; after that every strike is plain data
/// through `trigger`.
pub trait SynthEngine: Send {
    /// Start the engine with the given voice source. Blocking.
    fn initialize(&mut self, source: &str) -> Result<()>;

    /// Replace the running voice source. On error the previous source
    /// keeps running.
    fn load_source(&mut self, source: &str) -> Result<()>;

    /// Fire-and-forget strike.
    fn trigger(&mut self, params: &AudioParams);

    fn set_continuous_parameter(&mut self, name: &str, value: f64);

    fn stop(&mut self);
}

/// Engine that accepts everything and plays nothing. Used when no engine
/// target is configured.
#[derive(Debug, Default)]
pub struct NullEngine;

impl SynthEngine for NullEngine {
    fn initialize(&mut self, _source: &str) -> Result<()> {
        Ok(())
    }
    fn load_source(&mut self, _source: &str) -> Result<()> {
        Ok(())
    }
    fn trigger(&mut self, _params: &AudioParams) {}
    fn set_continuous_parameter(&mut self, _name: &str, _value: f64) {}
    fn stop(&mut self) {}
}

/// Default voice graph: a struck modal bar through a small reverb, played
/// from the `trigger` message arguments.
pub const DEFAULT_VOICE_SOURCE: &str = r#"// chime voice
global float param_threshold;
global float param_density;

ModalBar bar => NRev rev => Pan2 out => dac;
1 => bar.preset;
0.08 => rev.mix;

fun void strike(float freq, float pan, float force) {
    freq => bar.freq;
    pan => out.pan;
    force => bar.noteOn;
}
"#;
