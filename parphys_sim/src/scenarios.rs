//! Named workloads for the scenario runner.

use crate::world::MassProfile;
use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// PP-001: identical costs, batches must split evenly
    ConstantCost,

    /// PP-002: cost grows linearly with object id
    IncreasingCost,

    /// PP-003: uniformly random costs
    RandomCost,

    /// PP-004: heavy-tailed exponential costs
    ExponentialCost,

    /// PP-005: one object errors and one panics every frame
    FaultIsolation,

    /// PP-006: one object always overruns the frame deadline
    DeadlineOverrun,

    /// PP-007: the cost model only returns NaN
    BrokenModel,

    /// PP-008: tight per-batch object ceiling
    BatchCeiling,

    /// PP-009: run cancelled part way through
    Cancellation,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ConstantCost,
            ScenarioId::IncreasingCost,
            ScenarioId::RandomCost,
            ScenarioId::ExponentialCost,
            ScenarioId::FaultIsolation,
            ScenarioId::DeadlineOverrun,
            ScenarioId::BrokenModel,
            ScenarioId::BatchCeiling,
            ScenarioId::Cancellation,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ConstantCost => "constant_cost",
            ScenarioId::IncreasingCost => "increasing_cost",
            ScenarioId::RandomCost => "random_cost",
            ScenarioId::ExponentialCost => "exponential_cost",
            ScenarioId::FaultIsolation => "fault_isolation",
            ScenarioId::DeadlineOverrun => "deadline_overrun",
            ScenarioId::BrokenModel => "broken_model",
            ScenarioId::BatchCeiling => "batch_ceiling",
            ScenarioId::Cancellation => "cancellation",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ConstantCost => "Constant predicted cost, batches split evenly",
            ScenarioId::IncreasingCost => "Linearly increasing cost, LPT balance check",
            ScenarioId::RandomCost => "Uniform random cost, LPT balance check",
            ScenarioId::ExponentialCost => "Exponential cost tail, LPT balance check",
            ScenarioId::FaultIsolation => "Injected error + panic, other objects unaffected",
            ScenarioId::DeadlineOverrun => "Object sleeps past the deadline, frame still advances",
            ScenarioId::BrokenModel => "NaN cost model, every prediction falls back",
            ScenarioId::BatchCeiling => "Object ceiling per batch enforced over balance",
            ScenarioId::Cancellation => "Run-level cancel returns partial results and stops",
        }
    }

    /// Mass (and therefore cost) distribution of the generated world.
    pub fn mass_profile(&self) -> MassProfile {
        match self {
            ScenarioId::ConstantCost => MassProfile::Constant { mass: 1.0 },
            ScenarioId::IncreasingCost => MassProfile::Increasing {
                start: 0.5,
                step: 0.1,
            },
            ScenarioId::ExponentialCost | ScenarioId::BatchCeiling => {
                MassProfile::Exponential { mean: 3.0 }
            }
            _ => MassProfile::Uniform { min: 0.5, max: 10.0 },
        }
    }

    /// True if frames are expected to match the sequential reference.
    pub fn expects_conformance(&self) -> bool {
        !matches!(self, ScenarioId::DeadlineOverrun | ScenarioId::Cancellation)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "constant_cost" | "constant" | "pp-001" => Ok(ScenarioId::ConstantCost),
            "increasing_cost" | "increasing" | "pp-002" => Ok(ScenarioId::IncreasingCost),
            "random_cost" | "random" | "pp-003" => Ok(ScenarioId::RandomCost),
            "exponential_cost" | "exponential" | "pp-004" => Ok(ScenarioId::ExponentialCost),
            "fault_isolation" | "faults" | "pp-005" => Ok(ScenarioId::FaultIsolation),
            "deadline_overrun" | "deadline" | "timeout" | "pp-006" => Ok(ScenarioId::DeadlineOverrun),
            "broken_model" | "fallback" | "pp-007" => Ok(ScenarioId::BrokenModel),
            "batch_ceiling" | "ceiling" | "pp-008" => Ok(ScenarioId::BatchCeiling),
            "cancellation" | "cancel" | "pp-009" => Ok(ScenarioId::Cancellation),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
