//! Error types for the chime pipeline.

pub type Result<T> = std::result::Result<T, ChimeError>;

#[derive(Debug, thiserror::Error)]
pub enum ChimeError {
    /// The synthesis engine refused to start or is unreachable
    #[error("engine initialization failed: {0}")]
    Engine(String),

    /// The engine rejected the synthesis source text
    #[error("malformed synthesis source: {0}")]
    MalformedSource(String),

    /// Operation needs an initialized engine
    #[error("engine not ready")]
    NotReady,

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Bad line in a recorded motion trace
    #[error("trace: {0}")]
    Trace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OSC error: {0}")]
    Osc(#[from] rosc::OscError),
}
