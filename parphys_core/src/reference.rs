//! Sequential reference engine.
//!
//! Applies the update function to every active object on the calling
//! thread, in ascending id order, and folds the results through the same
//! [`Aggregator`] the parallel pipeline uses. Its output is the value the
//! pipeline must reproduce for a fault-free update function.

use crate::aggregator::{Aggregator, FrameReport};
use crate::scheduler::FrameOutcome;
use crate::state::{Frame, ObjectId};
use crate::update::{execute_update, UpdateFn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Single-threaded oracle for frame conformance.
#[derive(Clone)]
pub struct ReferenceEngine {
    update_fn: Arc<dyn UpdateFn>,
    aggregator: Aggregator,
}

impl ReferenceEngine {
    /// Creates an oracle with the default quarantine policy of [`Aggregator`].
    pub fn new(update_fn: Arc<dyn UpdateFn>) -> Self {
        Self {
            update_fn,
            aggregator: Aggregator::default(),
        }
    }

    /// Uses the same quarantine threshold as the engine under test.
    pub fn with_quarantine_after(mut self, quarantine_after: Option<u32>) -> Self {
        self.aggregator = Aggregator::new(quarantine_after);
        self
    }

    /// Advances `frame` by one step.
    pub fn run_frame_sequential(&self, frame: &Frame, dt: f64) -> Frame {
        self.step(frame, dt).0
    }

    /// Advances `frame` by one step, also returning the report.
    pub fn step(&self, frame: &Frame, dt: f64) -> (Frame, FrameReport) {
        let mut outcomes = BTreeMap::<ObjectId, FrameOutcome>::new();
        for object in frame.active_objects() {
            let outcome = match execute_update(self.update_fn.as_ref(), object, dt, frame.field()) {
                Ok(update) => FrameOutcome::Updated(update),
                Err(error) => FrameOutcome::Failed {
                    error,
                    prior: object.clone(),
                },
            };
            outcomes.insert(object.id(), outcome);
        }
        self.aggregator.fold(frame, outcomes)
    }

    /// Runs `frames` steps and returns every frame, starting with `initial`.
    pub fn run(&self, initial: Frame, frames: usize, dt: f64) -> Vec<Frame> {
        let mut history = Vec::with_capacity(frames + 1);
        history.push(initial);
        for _ in 0..frames {
            if let Some(last) = history.last() {
                let next = self.run_frame_sequential(last, dt);
                history.push(next);
            }
        }
        history
    }
}

impl std::fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("update_fn", &self.update_fn.name())
            .field("aggregator", &self.aggregator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use crate::formulas::QuantumPhysicsUpdate;
    use crate::state::{FieldGrid, GridSpec, ObjectStatus, PhysicsObject};
    use crate::update::FieldRegion;
    use nalgebra::Vector3;

    struct FailOdd;

    impl UpdateFn for FailOdd {
        fn apply(
            &self,
            object: &PhysicsObject,
            dt: f64,
            region: &mut FieldRegion<'_>,
        ) -> Result<PhysicsObject, UpdateError> {
            if object.id().0 % 2 == 1 {
                return Err(UpdateError::rejected("odd"));
            }
            QuantumPhysicsUpdate.apply(object, dt, region)
        }
    }

    fn frame(n: u64) -> Frame {
        let objects = (0..n)
            .map(|i| {
                PhysicsObject::new(
                    ObjectId(i),
                    Vector3::new(i as f64 * 7.0, 12.0, 30.0),
                    Vector3::new(1.0, -0.5, 0.0),
                    1.0 + i as f64,
                    50.0,
                )
            })
            .collect();
        let grid = FieldGrid::from_fn(GridSpec::default(), |p| (p.x * 0.01).sin()).unwrap();
        Frame::genesis(objects, grid).unwrap()
    }

    #[test]
    fn test_sequential_step_is_repeatable() {
        let oracle = ReferenceEngine::new(Arc::new(QuantumPhysicsUpdate));
        let start = frame(10);

        let a = oracle.run_frame_sequential(&start, 0.1);
        let b = oracle.run_frame_sequential(&start, 0.1);
        assert_eq!(a, b);
        assert_eq!(a.index(), 1);
        assert!(a.field().total() > 0.0);
    }

    #[test]
    fn test_previous_frame_is_untouched() {
        let oracle = ReferenceEngine::new(Arc::new(QuantumPhysicsUpdate));
        let start = frame(5);
        let snapshot = start.clone();

        let _ = oracle.run_frame_sequential(&start, 0.5);
        assert_eq!(start, snapshot);
    }

    #[test]
    fn test_failures_keep_prior_state() {
        let oracle = ReferenceEngine::new(Arc::new(FailOdd));
        let start = frame(4);

        let (next, report) = oracle.step(&start, 0.1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(next.object(ObjectId(1)).unwrap().energy, 50.0);
        assert!(next.object(ObjectId(0)).unwrap().energy < 50.0);
    }

    #[test]
    fn test_quarantined_objects_are_skipped() {
        let oracle = ReferenceEngine::new(Arc::new(FailOdd)).with_quarantine_after(Some(1));
        let history = oracle.run(frame(2), 2, 0.1);

        assert_eq!(history.len(), 3);
        let quarantined = history[1].object(ObjectId(1)).unwrap();
        assert_eq!(quarantined.status, ObjectStatus::Quarantined);
        assert_eq!(history[2].object(ObjectId(1)), Some(quarantined));
    }
}
