//! ParPhys Core - Predictive Batch-Scheduling Physics Engine
//!
//! Advances a population of physical objects through discrete frames:
//! 1. **Prediction**: each active object gets a relative cost estimate from a
//!    trained model, or a deterministic heuristic when the model is missing
//!    or misbehaves
//! 2. **Batching**: objects are packed into one batch per worker with a
//!    longest-processing-time-first greedy, ties broken by object id
//! 3. **Execution**: a long-lived worker pool runs the batches under a
//!    per-frame deadline, isolating failures per object
//! 4. **Aggregation**: results are folded in ascending object id, so the
//!    next frame never depends on thread scheduling
//!
//! # Architecture
//!
//! ```text
//!   Frame N ──► Predictor ──► DynamicBatcher ──► WorkerPool ──► Aggregator ──► Frame N+1
//!                  │                                 │              │
//!              CostModel                          UpdateFn      FrameReport
//! ```
//!
//! [`ReferenceEngine`] runs the same update function on one thread and is
//! the oracle the pipeline must match.
//!
//! # Usage
//!
//! ```ignore
//! use parphys_core::{Engine, EngineConfig, FieldGrid, Frame, GridSpec, QuantumPhysicsUpdate};
//! use std::sync::Arc;
//!
//! let grid = FieldGrid::new(GridSpec::default())?;
//! let frame = Frame::genesis(objects, grid)?;
//! let mut engine = Engine::new(EngineConfig::default(), frame, Arc::new(QuantumPhysicsUpdate), None)?;
//! let report = engine.step(0.1)?;
//! ```

pub mod aggregator;
pub mod batcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod formulas;
pub mod predictor;
pub mod reference;
pub mod scheduler;
pub mod state;
pub mod update;

// Re-export key types for convenience
pub use aggregator::{Aggregator, FrameReport};
pub use batcher::{validate_partition, Batch, BatchConstraints, DynamicBatcher, Partition};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{
    ConfigError, EngineError, FrameError, ModelError, PartitionError, UpdateError, UpdateErrorKind,
};
pub use formulas::QuantumPhysicsUpdate;
pub use predictor::{CostModel, LinearCostModel, PredictionRecord, PredictionSource, Predictor};
pub use reference::ReferenceEngine;
pub use scheduler::{BatchState, CancelToken, FrameOutcome, FrameResult, WorkerPool};
pub use state::{FieldGrid, Frame, GridSpec, ObjectId, ObjectStatus, PhysicsObject, RegionId};
pub use update::{execute_update, FieldRegion, UpdateFn};
