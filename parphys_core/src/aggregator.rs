//! Result aggregator: folds per-object results into the next canonical frame.
//!
//! Objects are visited in ascending id order and field deposits are applied
//! in that same order, so the next frame depends only on the previous frame,
//! the update function and the time step. Arrival order, batch assignment
//! and worker count never leak into it.

use crate::batcher::Partition;
use crate::error::UpdateErrorKind;
use crate::predictor::{PredictionRecord, PredictionSource};
use crate::scheduler::{BatchState, FrameExecution, FrameOutcome, FrameResult};
use crate::state::{Frame, ObjectId, ObjectStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, warn};

/// Per-frame counters for observability and visualization.
///
/// Consumed by reporting collaborators only; never fed back into the
/// simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Index of the frame this report produced
    pub frame_index: u64,
    /// Objects in the produced frame
    pub object_count: usize,
    /// Objects that received a result this frame
    pub scheduled: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_by_kind: BTreeMap<UpdateErrorKind, usize>,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Objects dropped because their update marked them removed
    pub removed: usize,
    /// Objects newly quarantined this frame
    pub quarantined: usize,
    /// Updated objects that moved into another field region
    pub boundary_crossings: usize,
    pub model_predicted: usize,
    pub fallback_predicted: usize,
    pub batch_count: usize,
    pub max_batch_cost: f64,
    pub mean_batch_cost: f64,
    pub ceiling_overflows: usize,
    pub batch_states: BTreeMap<BatchState, usize>,
    pub elapsed_us: u64,
}

impl FrameReport {
    /// Adds prediction source counts.
    pub fn record_predictions(&mut self, predictions: &[PredictionRecord]) {
        self.model_predicted = predictions
            .iter()
            .filter(|p| p.source == PredictionSource::Model)
            .count();
        self.fallback_predicted = predictions.len() - self.model_predicted;
    }

    /// Adds batch balance figures.
    pub fn record_partition(&mut self, partition: &Partition) {
        self.batch_count = partition.batches.len();
        self.max_batch_cost = partition.max_cost();
        self.mean_batch_cost = partition.mean_cost();
        self.ceiling_overflows = partition.ceiling_overflows;
    }

    /// Adds terminal batch states and wall-clock time.
    pub fn record_execution(&mut self, execution: &FrameExecution) {
        self.batch_states.clear();
        for batch in &execution.batches {
            *self.batch_states.entry(batch.state).or_default() += 1;
        }
        self.elapsed_us = execution.elapsed.as_micros() as u64;
    }

    /// True when every scheduled object updated successfully.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.timed_out == 0 && self.cancelled == 0
    }
}

/// Merges frame results into the next frame.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    quarantine_after: Option<u32>,
}

impl Aggregator {
    /// `quarantine_after` consecutive failures quarantine an object.
    pub fn new(quarantine_after: Option<u32>) -> Self {
        Self { quarantine_after }
    }

    pub fn quarantine_after(&self) -> Option<u32> {
        self.quarantine_after
    }

    /// Produces the next frame and its report.
    ///
    /// Successes replace prior state; failures, timeouts and cancellations
    /// keep it. Objects without a result are carried forward unchanged.
    pub fn aggregate(&self, previous: &Frame, results: Vec<FrameResult>) -> (Frame, FrameReport) {
        let mut outcomes: BTreeMap<ObjectId, FrameOutcome> = BTreeMap::new();
        for result in results {
            match outcomes.entry(result.id) {
                Entry::Vacant(slot) => {
                    slot.insert(result.outcome);
                }
                Entry::Occupied(_) => {
                    warn!(object = %result.id, "duplicate frame result ignored");
                }
            }
        }
        self.fold(previous, outcomes)
    }

    pub(crate) fn fold(
        &self,
        previous: &Frame,
        mut outcomes: BTreeMap<ObjectId, FrameOutcome>,
    ) -> (Frame, FrameReport) {
        let grid = previous.field();
        let mut report = FrameReport {
            frame_index: previous.index() + 1,
            ..Default::default()
        };
        let mut objects = Vec::with_capacity(previous.objects().len());
        let mut field = grid.clone();

        for prior in previous.objects() {
            let Some(outcome) = outcomes.remove(&prior.id()) else {
                objects.push(prior.clone());
                continue;
            };
            report.scheduled += 1;

            match outcome {
                FrameOutcome::Updated(update) => {
                    report.succeeded += 1;
                    for deposit in &update.deposits {
                        if !deposit.amount.is_finite() || !field.add(deposit.cell, deposit.amount) {
                            warn!(
                                object = %prior.id(),
                                cell = deposit.cell,
                                amount = deposit.amount,
                                "invalid field deposit dropped"
                            );
                        }
                    }

                    let mut next = update.object;
                    next.failure_streak = 0;
                    if grid.region_of(&prior.position) != grid.region_of(&next.position) {
                        report.boundary_crossings += 1;
                    }
                    if next.status == ObjectStatus::Removed {
                        report.removed += 1;
                        debug!(object = %next.id(), "object removed");
                        continue;
                    }
                    objects.push(next);
                }
                FrameOutcome::Failed { error, .. } => {
                    report.failed += 1;
                    *report.failed_by_kind.entry(error.kind()).or_default() += 1;

                    let mut kept = prior.clone();
                    kept.failure_streak = kept.failure_streak.saturating_add(1);
                    if self
                        .quarantine_after
                        .is_some_and(|limit| kept.failure_streak >= limit)
                        && kept.status == ObjectStatus::Active
                    {
                        kept.status = ObjectStatus::Quarantined;
                        report.quarantined += 1;
                        warn!(
                            object = %kept.id(),
                            failures = kept.failure_streak,
                            error = %error,
                            "object quarantined"
                        );
                    }
                    objects.push(kept);
                }
                FrameOutcome::TimedOut { .. } => {
                    report.timed_out += 1;
                    objects.push(prior.clone());
                }
                FrameOutcome::Cancelled { .. } => {
                    report.cancelled += 1;
                    objects.push(prior.clone());
                }
            }
        }

        for id in outcomes.keys() {
            warn!(object = %id, "result for unknown object ignored");
        }

        report.object_count = objects.len();
        (previous.successor(objects, field), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use crate::state::{FieldGrid, GridSpec, PhysicsObject};
    use crate::update::{FieldDeposit, ObjectUpdate};
    use nalgebra::Vector3;

    fn object(id: u64) -> PhysicsObject {
        PhysicsObject::new(
            ObjectId(id),
            Vector3::new(5.0, 5.0, 5.0),
            Vector3::zeros(),
            1.0,
            10.0,
        )
    }

    fn previous(n: u64) -> Frame {
        let grid = FieldGrid::new(GridSpec::default()).unwrap();
        Frame::genesis((0..n).map(object).collect(), grid).unwrap()
    }

    fn updated(id: u64, energy: f64, deposit: f64) -> FrameResult {
        let mut next = object(id);
        next.energy = energy;
        FrameResult {
            id: ObjectId(id),
            batch: 0,
            outcome: FrameOutcome::Updated(ObjectUpdate {
                object: next,
                deposits: vec![FieldDeposit { cell: 0, amount: deposit }],
            }),
        }
    }

    fn failed(id: u64) -> FrameResult {
        FrameResult {
            id: ObjectId(id),
            batch: 0,
            outcome: FrameOutcome::Failed {
                error: UpdateError::rejected("boom"),
                prior: object(id),
            },
        }
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let prev = previous(3);
        let forward = vec![updated(0, 1.0, 0.1), updated(1, 2.0, 0.2), updated(2, 3.0, 0.3)];
        let mut backward = forward.clone();
        backward.reverse();

        let aggregator = Aggregator::default();
        let (a, report_a) = aggregator.aggregate(&prev, forward);
        let (b, report_b) = aggregator.aggregate(&prev, backward);

        assert_eq!(a, b);
        assert_eq!(report_a, report_b);
        assert_eq!(a.index(), 1);
        assert_eq!(a.field().values()[0], 0.1 + 0.2 + 0.3);
    }

    #[test]
    fn test_failure_keeps_prior_state() {
        let prev = previous(3);
        let (next, report) =
            Aggregator::default().aggregate(&prev, vec![updated(0, 1.0, 0.0), failed(1), updated(2, 1.0, 0.0)]);

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_by_kind[&UpdateErrorKind::Rejected], 1);
        let kept = next.object(ObjectId(1)).unwrap();
        assert_eq!(kept.energy, 10.0);
        assert_eq!(kept.failure_streak, 1);
        assert_eq!(next.objects().len(), 3);
    }

    #[test]
    fn test_timeouts_and_cancellations_keep_prior_state() {
        let prev = previous(2);
        let results = vec![
            FrameResult {
                id: ObjectId(0),
                batch: 0,
                outcome: FrameOutcome::TimedOut { prior: object(0) },
            },
            FrameResult {
                id: ObjectId(1),
                batch: 1,
                outcome: FrameOutcome::Cancelled { prior: object(1) },
            },
        ];

        let (next, report) = Aggregator::default().aggregate(&prev, results);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.cancelled, 1);
        assert!(!report.is_clean());
        assert_eq!(next.objects(), prev.objects());
    }

    #[test]
    fn test_removed_objects_are_dropped() {
        let prev = previous(2);
        let mut gone = object(1);
        gone.status = ObjectStatus::Removed;
        let results = vec![
            updated(0, 1.0, 0.0),
            FrameResult {
                id: ObjectId(1),
                batch: 0,
                outcome: FrameOutcome::Updated(ObjectUpdate {
                    object: gone,
                    deposits: Vec::new(),
                }),
            },
        ];

        let (next, report) = Aggregator::default().aggregate(&prev, results);
        assert_eq!(report.removed, 1);
        assert_eq!(next.objects().len(), 1);
        assert!(next.object(ObjectId(1)).is_none());
    }

    #[test]
    fn test_repeated_failures_quarantine() {
        let aggregator = Aggregator::new(Some(2));
        let frame0 = previous(1);

        let (frame1, report1) = aggregator.aggregate(&frame0, vec![failed(0)]);
        assert_eq!(report1.quarantined, 0);
        assert!(frame1.object(ObjectId(0)).unwrap().is_active());

        let (frame2, report2) = aggregator.aggregate(&frame1, vec![failed(0)]);
        assert_eq!(report2.quarantined, 1);
        assert_eq!(frame2.object(ObjectId(0)).unwrap().status, ObjectStatus::Quarantined);
        assert_eq!(frame2.active_ids(), Vec::<ObjectId>::new());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let aggregator = Aggregator::new(Some(3));
        let (frame1, _) = aggregator.aggregate(&previous(1), vec![failed(0)]);
        let (frame2, _) = aggregator.aggregate(&frame1, vec![updated(0, 5.0, 0.0)]);
        assert_eq!(frame2.object(ObjectId(0)).unwrap().failure_streak, 0);
    }

    #[test]
    fn test_unscheduled_objects_carry_forward() {
        let prev = previous(3);
        let (next, report) = Aggregator::default().aggregate(&prev, vec![updated(1, 4.0, 0.0)]);
        assert_eq!(report.scheduled, 1);
        assert_eq!(next.object(ObjectId(0)), prev.object(ObjectId(0)));
        assert_eq!(next.object(ObjectId(1)).unwrap().energy, 4.0);
    }

    #[test]
    fn test_boundary_crossing_counted() {
        let prev = previous(1);
        let mut moved = object(0);
        moved.position.x = 55.0;
        let result = FrameResult {
            id: ObjectId(0),
            batch: 0,
            outcome: FrameOutcome::Updated(ObjectUpdate {
                object: moved,
                deposits: Vec::new(),
            }),
        };
        let (_, report) = Aggregator::default().aggregate(&prev, vec![result]);
        assert_eq!(report.boundary_crossings, 1);
    }

    #[test]
    fn test_invalid_deposits_are_dropped() {
        let prev = previous(1);
        let cells = prev.field().cell_count();
        let mut result = updated(0, 3.0, 0.5);
        if let FrameOutcome::Updated(update) = &mut result.outcome {
            update.deposits.push(FieldDeposit { cell: cells, amount: 1.0 });
            update.deposits.push(FieldDeposit { cell: 1, amount: f64::NAN });
        }

        let (next, report) = Aggregator::default().aggregate(&prev, vec![result]);
        assert_eq!(report.succeeded, 1);
        assert_eq!(next.object(ObjectId(0)).unwrap().energy, 3.0);
        assert_eq!(next.field().values()[0], 0.5);
        assert_eq!(next.field().values()[1], 0.0);
        assert_eq!(next.field().total(), 0.5);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let (_, mut report) = Aggregator::default().aggregate(&previous(1), vec![failed(0)]);
        report.batch_states.insert(BatchState::Failed, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_by_kind"]["rejected"], 1);
        assert_eq!(json["batch_states"]["failed"], 1);
    }
}
