//! Fault injection for scenario runs.

use parphys_core::predictor::CostFeatures;
use parphys_core::{CostModel, FieldRegion, ModelError, ObjectId, PhysicsObject, UpdateError, UpdateFn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Wraps an update function and misbehaves for chosen objects.
///
/// Faults are keyed by object id only, so a faulty run stays reproducible.
pub struct FaultyUpdate {
    inner: Arc<dyn UpdateFn>,
    failing: BTreeSet<ObjectId>,
    panicking: BTreeSet<ObjectId>,
    delays: BTreeMap<ObjectId, Duration>,
}

impl FaultyUpdate {
    pub fn new(inner: Arc<dyn UpdateFn>) -> Self {
        Self {
            inner,
            failing: BTreeSet::new(),
            panicking: BTreeSet::new(),
            delays: BTreeMap::new(),
        }
    }

    /// Returns an error for `id` every frame.
    pub fn fail(mut self, id: ObjectId) -> Self {
        self.failing.insert(id);
        self
    }

    /// Panics while updating `id`.
    pub fn panic_on(mut self, id: ObjectId) -> Self {
        self.panicking.insert(id);
        self
    }

    /// Sleeps before updating `id`.
    pub fn delay(mut self, id: ObjectId, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    /// Ids that never update successfully.
    pub fn faulty_ids(&self) -> BTreeSet<ObjectId> {
        self.failing.union(&self.panicking).copied().collect()
    }
}

impl UpdateFn for FaultyUpdate {
    fn apply(
        &self,
        object: &PhysicsObject,
        dt: f64,
        region: &mut FieldRegion<'_>,
    ) -> Result<PhysicsObject, UpdateError> {
        let id = object.id();
        if let Some(delay) = self.delays.get(&id) {
            std::thread::sleep(*delay);
        }
        if self.panicking.contains(&id) {
            panic!("injected panic for object {}", id);
        }
        if self.failing.contains(&id) {
            return Err(UpdateError::rejected(format!("injected failure for object {}", id)));
        }
        self.inner.apply(object, dt, region)
    }

    fn name(&self) -> &str {
        "faulty"
    }
}

/// Cost model that returns a fixed, possibly invalid, value.
#[derive(Debug, Clone, Copy)]
pub struct BrokenModel(pub f64);

impl CostModel for BrokenModel {
    fn version(&self) -> &str {
        "broken"
    }

    fn estimate(&self, _features: &CostFeatures) -> Result<f64, ModelError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parphys_core::{execute_update, FieldGrid, GridSpec, QuantumPhysicsUpdate, UpdateErrorKind};
    use nalgebra::Vector3;

    fn object(id: u64) -> PhysicsObject {
        PhysicsObject::new(ObjectId(id), Vector3::new(1.0, 1.0, 1.0), Vector3::zeros(), 1.0, 10.0)
    }

    #[test]
    fn test_faults_only_hit_chosen_ids() {
        let grid = FieldGrid::new(GridSpec::default()).unwrap();
        let update = FaultyUpdate::new(Arc::new(QuantumPhysicsUpdate))
            .fail(ObjectId(1))
            .panic_on(ObjectId(2));

        assert!(execute_update(&update, &object(0), 0.1, &grid).is_ok());

        let failed = execute_update(&update, &object(1), 0.1, &grid).unwrap_err();
        assert_eq!(failed.kind(), UpdateErrorKind::Rejected);

        let panicked = execute_update(&update, &object(2), 0.1, &grid).unwrap_err();
        assert_eq!(panicked.kind(), UpdateErrorKind::Panicked);

        assert_eq!(update.faulty_ids().len(), 2);
    }
}
