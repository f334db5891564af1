//! Error types for the ParPhys engine.
//!
//! Object- and batch-level failures are absorbed into the frame report.
//! Only [`EngineError`] aborts a run.

use crate::state::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of an [`UpdateError`], used as the report key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateErrorKind {
    NonFinite,
    NegativeQuantity,
    RegionViolation,
    Rejected,
    Panicked,
}

impl UpdateErrorKind {
    /// Returns the kind name.
    pub fn name(&self) -> &'static str {
        match self {
            UpdateErrorKind::NonFinite => "non_finite",
            UpdateErrorKind::NegativeQuantity => "negative_quantity",
            UpdateErrorKind::RegionViolation => "region_violation",
            UpdateErrorKind::Rejected => "rejected",
            UpdateErrorKind::Panicked => "panicked",
        }
    }
}

impl std::fmt::Display for UpdateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-object failure raised while applying the update function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpdateError {
    /// A state component became NaN or infinite
    #[error("non-finite {0} after update")]
    NonFinite(&'static str),

    /// Mass or energy went below zero
    #[error("negative {quantity}: {value}")]
    NegativeQuantity { quantity: &'static str, value: f64 },

    /// Field write outside the object's home region
    #[error("field write outside home region {home} (target region {target})")]
    RegionViolation { home: usize, target: usize },

    /// The update function refused the object
    #[error("update rejected: {0}")]
    Rejected(String),

    /// The update function panicked
    #[error("update panicked: {0}")]
    Panicked(String),
}

impl UpdateError {
    /// Creates a rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Returns the stable kind of this error.
    pub fn kind(&self) -> UpdateErrorKind {
        match self {
            UpdateError::NonFinite(_) => UpdateErrorKind::NonFinite,
            UpdateError::NegativeQuantity { .. } => UpdateErrorKind::NegativeQuantity,
            UpdateError::RegionViolation { .. } => UpdateErrorKind::RegionViolation,
            UpdateError::Rejected(_) => UpdateErrorKind::Rejected,
            UpdateError::Panicked(_) => UpdateErrorKind::Panicked,
        }
    }
}

/// Failure of a trained cost model. Never leaves the predictor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model produced invalid cost {0}")]
    InvalidOutput(f64),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// Violation of the batch partition invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("object {0} assigned to more than one batch")]
    Duplicate(ObjectId),

    #[error("active object {0} missing from every batch")]
    Missing(ObjectId),

    #[error("batch references unknown or inactive object {0}")]
    Unknown(ObjectId),

    #[error("expected {expected} batches, got {actual}")]
    WrongBatchCount { expected: usize, actual: usize },
}

/// Invalid frame construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("duplicate object id {0}")]
    DuplicateObject(ObjectId),
}

/// Invalid configuration or unreadable configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker count must be positive")]
    ZeroWorkers,

    #[error("frame deadline must be positive")]
    ZeroDeadline,

    #[error("max batch size must be positive")]
    ZeroBatchSize,

    #[error("max batch cost must be finite and positive, got {0}")]
    InvalidCostCeiling(f64),

    #[error("invalid grid spec: {0}")]
    InvalidGrid(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Fatal run-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The batcher broke the disjointness guarantee
    #[error("invalid batch partition: {0}")]
    InvalidBatchPartition(#[from] PartitionError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker {worker}: {source}")]
    WorkerSpawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    /// All workers exited; no frame can be dispatched
    #[error("worker pool shut down")]
    PoolShutDown,
}
