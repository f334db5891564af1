//! Scenario runner - drives the engine and checks its guarantees every frame.
//!
//! Each frame is checked for:
//! - partition validity (every active object in exactly one batch)
//! - load balance (predicted makespan within the list-scheduling bound)
//! - conformance with the sequential reference, when nothing timed out
//!
//! plus the scenario's own assertions.

use crate::error::SimError;
use crate::exporter::SimExport;
use crate::faults::{BrokenModel, FaultyUpdate};
use crate::scenarios::ScenarioId;
use crate::world::{self, WorldConfig};

use parphys_core::{
    validate_partition, CostModel, Engine, EngineConfig, Frame, FrameReport, LinearCostModel,
    ObjectId, ObjectStatus, Partition, PhysicsObject, PredictionRecord, QuantumPhysicsUpdate,
    ReferenceEngine, UpdateFn,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deadline used by the overrun scenario.
const OVERRUN_DEADLINE: Duration = Duration::from_millis(100);

/// How long the overrunning object sleeps.
const OVERRUN_DELAY: Duration = Duration::from_millis(250);

/// Frame after which the cancellation scenario cancels the run.
const CANCEL_AFTER_FRAMES: usize = 2;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// The engine aborted the run
    pub aborted: bool,

    /// Frames produced
    pub frames_run: usize,

    /// Objects in the final frame
    pub final_object_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub removed: usize,
    pub quarantined: usize,
    pub boundary_crossings: usize,
    pub model_predicted: usize,
    pub fallback_predicted: usize,
    pub ceiling_overflows: usize,

    /// Frames compared against the sequential reference
    pub conformance_checks: usize,

    /// Worst predicted makespan over its lower bound
    pub worst_balance_ratio: f64,
}

impl ScenarioMetrics {
    fn absorb(&mut self, report: &FrameReport) {
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.timed_out += report.timed_out;
        self.cancelled += report.cancelled;
        self.removed += report.removed;
        self.quarantined += report.quarantined;
        self.boundary_crossings += report.boundary_crossings;
        self.model_predicted += report.model_predicted;
        self.fallback_predicted += report.fallback_predicted;
        self.ceiling_overflows += report.ceiling_overflows;
    }
}

/// Everything a scenario needs to build an engine.
struct Setup {
    world: WorldConfig,
    config: EngineConfig,
    update_fn: Arc<dyn UpdateFn>,
    model: Option<Arc<dyn CostModel>>,
    faulty: BTreeSet<ObjectId>,
    cancel_after: Option<usize>,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Objects per generated world
    object_count: usize,

    /// Frames per run
    frames: usize,

    /// Time step per frame
    dt: f64,

    /// Base engine configuration; scenarios override individual fields
    config: EngineConfig,

    /// Cost model used where the scenario does not supply its own
    model: Option<Arc<dyn CostModel>>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, object_count: usize) -> Self {
        Self {
            seed,
            object_count,
            frames: 10,
            dt: 0.1,
            config: EngineConfig::default(),
            model: None,
        }
    }

    /// Sets the number of frames.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Sets the time step.
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Sets the base engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the default cost model.
    pub fn with_model(mut self, model: Arc<dyn CostModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
    }

    /// Runs a scenario, recording every frame and report.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed, self.config.worker_count);
        let result = self.execute(scenario, Some(&mut export));
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let mut metrics = ScenarioMetrics::default();
        let mut failures = Vec::new();
        let outcome = self.drive(scenario, export, &mut metrics, &mut failures);

        let (aborted, frames_run, final_object_count) = match outcome {
            Ok((frames, objects)) => (false, frames, objects),
            Err(e) => {
                failures.push(format!("run aborted: {}", e));
                (true, 0, 0)
            }
        };

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failures.is_empty(),
            aborted,
            frames_run,
            final_object_count,
            failure_reason: (!failures.is_empty()).then(|| failures.join("; ")),
            metrics,
        }
    }

    fn setup(&self, scenario: ScenarioId) -> Setup {
        let world = WorldConfig {
            seed: self.seed,
            object_count: self.object_count,
            masses: scenario.mass_profile(),
            ..Default::default()
        };
        let mut setup = Setup {
            world,
            config: self.config.clone(),
            update_fn: Arc::new(QuantumPhysicsUpdate),
            model: self.model.clone(),
            faulty: BTreeSet::new(),
            cancel_after: None,
        };

        match scenario {
            ScenarioId::ConstantCost => {
                setup.config.predictor_enabled = true;
                setup.model = Some(Arc::new(constant_cost_model()));
            }
            ScenarioId::IncreasingCost
            | ScenarioId::RandomCost
            | ScenarioId::ExponentialCost => {
                setup.config.predictor_enabled = true;
                setup.model = Some(Arc::new(mass_cost_model()));
            }
            ScenarioId::FaultIsolation => {
                let failing = ObjectId(0);
                let panicking = ObjectId((self.object_count / 2) as u64);
                let faulty = FaultyUpdate::new(Arc::new(QuantumPhysicsUpdate))
                    .fail(failing)
                    .panic_on(panicking);
                setup.faulty = faulty.faulty_ids();
                setup.update_fn = Arc::new(faulty);
            }
            ScenarioId::DeadlineOverrun => {
                let slow = ObjectId(0);
                setup.update_fn = Arc::new(
                    FaultyUpdate::new(Arc::new(QuantumPhysicsUpdate)).delay(slow, OVERRUN_DELAY),
                );
                setup.faulty.insert(slow);
                setup.config.frame_deadline = OVERRUN_DEADLINE;
            }
            ScenarioId::BrokenModel => {
                setup.config.predictor_enabled = true;
                setup.model = Some(Arc::new(BrokenModel(f64::NAN)));
            }
            ScenarioId::BatchCeiling => {
                let workers = setup.config.worker_count.max(1);
                setup.config.max_batch_size = Some(self.object_count.div_ceil(workers).max(1));
                setup.model = Some(Arc::new(mass_cost_model()));
            }
            ScenarioId::Cancellation => {
                setup.cancel_after = Some(CANCEL_AFTER_FRAMES);
            }
        }
        setup
    }

    /// Returns (frames run, final object count).
    fn drive(
        &self,
        scenario: ScenarioId,
        mut export: Option<&mut SimExport>,
        metrics: &mut ScenarioMetrics,
        failures: &mut Vec<String>,
    ) -> Result<(usize, usize), SimError> {
        let setup = self.setup(scenario);
        let initial = world::generate(&setup.world)?;
        let initial_faulty: Vec<_> = setup
            .faulty
            .iter()
            .filter_map(|id| initial.object(*id).cloned())
            .collect();

        let oracle = ReferenceEngine::new(setup.update_fn.clone())
            .with_quarantine_after(setup.config.quarantine_after);
        let mut engine = Engine::new(
            setup.config.clone(),
            initial,
            setup.update_fn.clone(),
            setup.model.clone(),
        )?;
        if let Some(export) = export.as_deref_mut() {
            export.add_frame(engine.current_frame());
        }

        let workers = setup.config.worker_count;
        let check_balance =
            setup.config.max_batch_size.is_none() && setup.config.max_batch_cost.is_none();
        let mut frames_run = 0;

        for frame_no in 0..self.frames {
            if setup.cancel_after == Some(frame_no) {
                engine.cancel_token().cancel();
            }

            let previous = engine.current_frame().clone();
            let report = engine.step(self.dt)?;
            frames_run += 1;
            metrics.absorb(&report);
            let tag = format!("frame {}", report.frame_index);

            let partition = engine.last_partition();
            if let Err(e) = validate_partition(&partition.batches, &previous.active_ids(), workers) {
                failures.push(format!("{}: {}", tag, e));
            }

            if check_balance {
                let ratio = balance_ratio(partition, engine.last_predictions());
                metrics.worst_balance_ratio = metrics.worst_balance_ratio.max(ratio);
                let bound = 2.0 - 1.0 / workers as f64;
                if ratio > bound + 1e-9 {
                    failures.push(format!("{}: makespan ratio {:.3} exceeds {:.3}", tag, ratio, bound));
                }
            }

            if scenario.expects_conformance() && report.timed_out == 0 && report.cancelled == 0 {
                metrics.conformance_checks += 1;
                let expected = oracle.run_frame_sequential(&previous, self.dt);
                if engine.current_frame() != &expected {
                    failures.push(format!("{}: diverged from sequential reference", tag));
                }
            }

            self.check_scenario(scenario, &setup, &previous, &report, &engine, failures);

            if let Some(export) = export.as_deref_mut() {
                export.add_frame(engine.current_frame());
                export.add_report(&report);
            }

            if engine.cancel_token().is_cancelled() {
                warn!("{}: run cancelled", tag);
                break;
            }
        }

        self.check_final(scenario, &setup, &initial_faulty, &engine, frames_run, failures);
        Ok((frames_run, engine.current_frame().objects().len()))
    }

    fn check_scenario(
        &self,
        scenario: ScenarioId,
        setup: &Setup,
        previous: &Frame,
        report: &FrameReport,
        engine: &Engine,
        failures: &mut Vec<String>,
    ) {
        let tag = format!("frame {}", report.frame_index);
        let active = previous.active_ids().len();

        match scenario {
            ScenarioId::ConstantCost => {
                let lens: Vec<usize> = engine.last_partition().batches.iter().map(|b| b.len()).collect();
                let spread = lens.iter().max().unwrap_or(&0) - lens.iter().min().unwrap_or(&0);
                if spread > 1 {
                    failures.push(format!("{}: uneven batch sizes {:?}", tag, lens));
                }
            }
            ScenarioId::FaultIsolation => {
                let faulty_active = setup
                    .faulty
                    .iter()
                    .filter(|id| previous.object(**id).is_some_and(|o| o.is_active()))
                    .count();
                if report.failed != faulty_active || report.succeeded != active - faulty_active {
                    failures.push(format!(
                        "{}: expected {} failures and {} successes, got {} and {}",
                        tag,
                        faulty_active,
                        active - faulty_active,
                        report.failed,
                        report.succeeded
                    ));
                }
            }
            ScenarioId::DeadlineOverrun => {
                if active > 0 && report.timed_out == 0 {
                    failures.push(format!("{}: deadline never hit", tag));
                }
                if engine.current_frame().index() != previous.index() + 1 {
                    failures.push(format!("{}: frame did not advance", tag));
                }
            }
            ScenarioId::BrokenModel => {
                if report.model_predicted != 0 || report.fallback_predicted != active {
                    failures.push(format!(
                        "{}: {} of {} predictions fell back",
                        tag, report.fallback_predicted, active
                    ));
                }
                if engine.last_predictions().iter().any(|p| !(p.cost >= 0.0 && p.cost.is_finite())) {
                    failures.push(format!("{}: invalid fallback cost", tag));
                }
            }
            ScenarioId::BatchCeiling => {
                let ceiling = setup.config.max_batch_size.unwrap_or(usize::MAX);
                if let Some(batch) = engine.last_partition().batches.iter().find(|b| b.len() > ceiling) {
                    failures.push(format!(
                        "{}: batch {} holds {} objects over ceiling {}",
                        tag,
                        batch.index,
                        batch.len(),
                        ceiling
                    ));
                }
            }
            ScenarioId::Cancellation => {
                if engine.cancel_token().is_cancelled() {
                    if report.cancelled != active {
                        failures.push(format!(
                            "{}: {} of {} objects cancelled",
                            tag, report.cancelled, active
                        ));
                    }
                    if engine.current_frame().objects() != previous.objects() {
                        failures.push(format!("{}: cancelled frame changed objects", tag));
                    }
                }
            }
            ScenarioId::IncreasingCost | ScenarioId::RandomCost | ScenarioId::ExponentialCost => {}
        }
    }

    fn check_final(
        &self,
        scenario: ScenarioId,
        setup: &Setup,
        initial_faulty: &[PhysicsObject],
        engine: &Engine,
        frames_run: usize,
        failures: &mut Vec<String>,
    ) {
        let current = engine.current_frame();
        match scenario {
            ScenarioId::FaultIsolation | ScenarioId::DeadlineOverrun => {
                // faulty objects never update, so they keep their initial state
                for before in initial_faulty {
                    let Some(after) = current.object(before.id()) else {
                        failures.push(format!("object {} disappeared", before.id()));
                        continue;
                    };
                    if after.position != before.position || after.energy != before.energy {
                        failures.push(format!("object {} changed despite never updating", before.id()));
                    }
                }
                let quarantine_due = setup
                    .config
                    .quarantine_after
                    .is_some_and(|limit| frames_run >= limit as usize);
                if scenario == ScenarioId::FaultIsolation && quarantine_due {
                    let unquarantined = initial_faulty
                        .iter()
                        .filter(|o| {
                            current
                                .object(o.id())
                                .is_some_and(|after| after.status != ObjectStatus::Quarantined)
                        })
                        .count();
                    if unquarantined > 0 {
                        failures.push(format!("{} faulty objects not quarantined", unquarantined));
                    }
                }
            }
            ScenarioId::Cancellation => {
                let expected = setup.cancel_after.map(|n| (n + 1).min(self.frames));
                if expected.is_some_and(|n| frames_run != n) {
                    failures.push(format!("run continued for {} frames after cancel", frames_run));
                }
            }
            _ => {}
        }
    }
}

/// Cost model that charges every object the same.
pub fn constant_cost_model() -> LinearCostModel {
    LinearCostModel::new("constant", 1.0, [0.0; 5])
}

/// Cost model that charges by mass only.
pub fn mass_cost_model() -> LinearCostModel {
    LinearCostModel::new("mass-only", 0.0, [1.0, 0.0, 0.0, 0.0, 0.0])
}

/// Predicted makespan over its lower bound `max(total / m, largest cost)`.
pub fn balance_ratio(partition: &Partition, predictions: &[PredictionRecord]) -> f64 {
    if partition.batches.is_empty() {
        return 1.0;
    }
    let largest = predictions.iter().map(|p| p.cost).fold(0.0, f64::max);
    let lower_bound = (partition.total_cost() / partition.batches.len() as f64).max(largest);
    if lower_bound > 0.0 {
        partition.max_cost() / lower_bound
    } else {
        1.0
    }
}
