//! Dynamic batcher: balances predicted cost across a fixed number of batches.
//!
//! Greedy longest-processing-time-first assignment. Objects are taken in
//! descending cost (ties by ascending id) and each goes to the batch with
//! the lowest accumulated cost that still fits under the ceilings. Batch
//! ties are broken by object count, then batch index, so the result is a
//! pure function of the predictions.

use crate::error::{ConfigError, PartitionError};
use crate::predictor::PredictionRecord;
use crate::state::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::warn;

/// Objects assigned to one worker invocation for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    /// Ascending id order
    pub object_ids: Vec<ObjectId>,
    /// Sum of predicted costs
    pub predicted_cost: f64,
}

impl Batch {
    fn empty(index: usize) -> Self {
        Self {
            index,
            object_ids: Vec::new(),
            predicted_cost: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.object_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_ids.is_empty()
    }
}

/// Per-batch ceilings bounding worst-case single-worker latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchConstraints {
    /// Maximum objects per batch
    pub max_objects: Option<usize>,
    /// Maximum predicted cost sum per batch
    pub max_cost: Option<f64>,
}

impl BatchConstraints {
    /// Rejects a zero size ceiling or a non-positive cost ceiling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_objects == Some(0) {
            return Err(ConfigError::ZeroBatchSize);
        }
        if let Some(max) = self.max_cost {
            if !(max.is_finite() && max > 0.0) {
                return Err(ConfigError::InvalidCostCeiling(max));
            }
        }
        Ok(())
    }

    /// Returns true if a batch holding `len` objects at `cost` may take one
    /// more object of `extra` cost. An object costing more than the cost
    /// ceiling fits nowhere, not even in an empty batch.
    fn admits(&self, len: usize, cost: f64, extra: f64) -> bool {
        if self.max_objects.is_some_and(|max| len >= max) {
            return false;
        }
        if self.max_cost.is_some_and(|max| cost + extra > max) {
            return false;
        }
        true
    }
}

/// Result of partitioning one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub batches: Vec<Batch>,
    /// Objects placed over a ceiling because every batch was full
    pub ceiling_overflows: usize,
}

impl Partition {
    /// Largest batch cost (the predicted makespan).
    pub fn max_cost(&self) -> f64 {
        self.batches
            .iter()
            .map(|b| b.predicted_cost)
            .fold(0.0, f64::max)
    }

    pub fn total_cost(&self) -> f64 {
        self.batches.iter().map(|b| b.predicted_cost).sum()
    }

    pub fn mean_cost(&self) -> f64 {
        if self.batches.is_empty() {
            0.0
        } else {
            self.total_cost() / self.batches.len() as f64
        }
    }

    /// Max over mean batch cost; 1.0 is perfect balance.
    pub fn imbalance(&self) -> f64 {
        let mean = self.mean_cost();
        if mean > 0.0 {
            self.max_cost() / mean
        } else {
            1.0
        }
    }

    pub fn object_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Partitions active objects into exactly `worker_count` batches.
#[derive(Debug, Clone)]
pub struct DynamicBatcher {
    worker_count: usize,
    constraints: BatchConstraints,
}

impl DynamicBatcher {
    pub fn new(worker_count: usize, constraints: BatchConstraints) -> Result<Self, ConfigError> {
        if worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        constraints.validate()?;
        Ok(Self {
            worker_count,
            constraints,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn constraints(&self) -> &BatchConstraints {
        &self.constraints
    }

    /// Partitions the objects described by `predictions`.
    ///
    /// Zero predictions yield zero batches. Otherwise exactly
    /// `worker_count` batches are returned, none empty unless there are
    /// fewer objects than workers.
    pub fn partition(&self, predictions: &[PredictionRecord]) -> Partition {
        if predictions.is_empty() {
            return Partition::default();
        }

        let mut order: Vec<&PredictionRecord> = predictions.iter().collect();
        order.sort_by(|a, b| {
            sanitize(b.cost)
                .total_cmp(&sanitize(a.cost))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut batches: Vec<Batch> = (0..self.worker_count).map(Batch::empty).collect();
        let mut ceiling_overflows = 0;

        for record in order {
            let cost = sanitize(record.cost);
            let target = match self.least_loaded(&batches, Some(cost)) {
                Some(i) => i,
                None => {
                    ceiling_overflows += 1;
                    self.least_loaded(&batches, None).unwrap_or(0)
                }
            };
            let batch = &mut batches[target];
            batch.object_ids.push(record.id);
            batch.predicted_cost += cost;
        }

        for batch in &mut batches {
            batch.object_ids.sort_unstable();
        }

        if ceiling_overflows > 0 {
            warn!(
                ceiling_overflows,
                "every batch at its ceiling; objects placed on least-loaded batch"
            );
        }

        Partition {
            batches,
            ceiling_overflows,
        }
    }

    /// Index of the lowest (cost, len, index) batch, optionally restricted
    /// to batches that admit an object of the given cost.
    fn least_loaded(&self, batches: &[Batch], admit: Option<f64>) -> Option<usize> {
        batches
            .iter()
            .filter(|b| match admit {
                Some(cost) => self.constraints.admits(b.len(), b.predicted_cost, cost),
                None => true,
            })
            .min_by(|a, b| compare_load(a, b))
            .map(|b| b.index)
    }
}

fn compare_load(a: &Batch, b: &Batch) -> Ordering {
    a.predicted_cost
        .total_cmp(&b.predicted_cost)
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| a.index.cmp(&b.index))
}

fn sanitize(cost: f64) -> f64 {
    if cost.is_finite() && cost >= 0.0 {
        cost
    } else {
        0.0
    }
}

/// Checks that no object appears in more than one batch (or twice in one).
pub fn check_disjoint(batches: &[Batch]) -> Result<(), PartitionError> {
    let mut seen = BTreeSet::new();
    for id in batches.iter().flat_map(|b| b.object_ids.iter()) {
        if !seen.insert(*id) {
            return Err(PartitionError::Duplicate(*id));
        }
    }
    Ok(())
}

/// Checks that `batches` is an exact partition of `active`.
pub fn validate_partition(
    batches: &[Batch],
    active: &[ObjectId],
    worker_count: usize,
) -> Result<(), PartitionError> {
    let expected = if active.is_empty() { 0 } else { worker_count };
    if batches.len() != expected {
        return Err(PartitionError::WrongBatchCount {
            expected,
            actual: batches.len(),
        });
    }

    check_disjoint(batches)?;

    let active: BTreeSet<ObjectId> = active.iter().copied().collect();
    let assigned: BTreeSet<ObjectId> = batches
        .iter()
        .flat_map(|b| b.object_ids.iter().copied())
        .collect();

    if let Some(unknown) = assigned.difference(&active).next() {
        return Err(PartitionError::Unknown(*unknown));
    }
    if let Some(missing) = active.difference(&assigned).next() {
        return Err(PartitionError::Missing(*missing));
    }
    Ok(())
}
