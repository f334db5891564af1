//! ParPhys Scenario Harness
//!
//! Drives the batch-scheduling engine through named workloads and checks
//! its guarantees after every frame:
//! - **Partition validity**: every active object lands in exactly one batch
//! - **Load balance**: predicted makespan stays within the greedy bound
//! - **Conformance**: output equals the sequential reference frame
//!
//! All randomness is derived from a single 64-bit seed.
//!
//! # Usage
//!
//! ```ignore
//! use parphys_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 100).with_frames(10).run(ScenarioId::ConstantCost);
//! assert!(result.passed);
//! ```

mod error;
mod faults;
mod runner;
mod world;
pub mod exporter;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{FormulaChart, SimExport};
pub use faults::{BrokenModel, FaultyUpdate};
pub use runner::{
    balance_ratio, constant_cost_model, mass_cost_model, ScenarioMetrics, ScenarioResult,
    ScenarioRunner,
};
pub use world::{generate, MassProfile, WorldConfig};
