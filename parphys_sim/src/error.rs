//! Harness errors.

use parphys_core::{ConfigError, EngineError, FrameError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid world: {0}")]
    InvalidWorld(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The engine aborted the run
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
