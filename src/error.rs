/// Error taxonomy shared by the scheduler, synthesis engine and session I/O
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Synthesis was invoked before the audio session was initialized.
    #[error("audio session is not ready")]
    AudioNotReady,
    /// An instrument id has no synthesis entry; the pattern/track invariant is broken.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
    #[error("malformed import: {0}")]
    MalformedImport(String),
    #[error("step index {0} is outside the 16-step grid")]
    InvalidStep(usize),
    #[error("audio backend error: {0}")]
    Backend(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
