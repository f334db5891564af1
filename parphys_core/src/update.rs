//! The physics update collaborator and its field access view.

use crate::error::UpdateError;
use crate::state::{FieldGrid, PhysicsObject, RegionId};
use nalgebra::Vector3;
use std::panic::{self, AssertUnwindSafe};

/// A pure per-object physics update.
///
/// Implementations must be deterministic functions of the object, the time
/// step and the field they read. They never see other objects' pending
/// updates.
pub trait UpdateFn: Send + Sync {
    /// Produces the object's next state.
    ///
    /// Field writes go through `region`, which only accepts cells inside
    /// the object's home region.
    fn apply(
        &self,
        object: &PhysicsObject,
        dt: f64,
        region: &mut FieldRegion<'_>,
    ) -> Result<PhysicsObject, UpdateError>;

    /// Returns the name of this update function.
    fn name(&self) -> &str {
        "update"
    }
}

/// A staged write into one field cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDeposit {
    /// Linear cell index
    pub cell: usize,
    pub amount: f64,
}

/// Field view handed to an update: reads anywhere, writes only at home.
pub struct FieldRegion<'a> {
    grid: &'a FieldGrid,
    home: RegionId,
    deposits: Vec<FieldDeposit>,
}

impl<'a> FieldRegion<'a> {
    /// Creates a view homed at the region containing `position`.
    pub fn new(grid: &'a FieldGrid, position: &Vector3<f64>) -> Self {
        Self {
            grid,
            home: grid.region_of(position),
            deposits: Vec::new(),
        }
    }

    pub fn home(&self) -> RegionId {
        self.home
    }

    /// Read-only access to the whole grid of the previous frame.
    pub fn grid(&self) -> &FieldGrid {
        self.grid
    }

    pub fn sample(&self, position: &Vector3<f64>) -> f64 {
        self.grid.value_at(position)
    }

    pub fn gradient(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.grid.gradient_at(position)
    }

    /// Stages `amount` into the cell containing `position`.
    pub fn deposit(&mut self, position: &Vector3<f64>, amount: f64) -> Result<(), UpdateError> {
        if !amount.is_finite() {
            return Err(UpdateError::NonFinite("field deposit"));
        }
        let cell = self.grid.cell_of(position);
        let target = self.grid.region_of_cell(cell);
        if target != self.home {
            return Err(UpdateError::RegionViolation {
                home: self.home.0,
                target: target.0,
            });
        }
        self.deposits.push(FieldDeposit {
            cell: self.grid.linear_index(cell),
            amount,
        });
        Ok(())
    }

    pub(crate) fn into_deposits(self) -> Vec<FieldDeposit> {
        self.deposits
    }
}

/// A successful object update with its staged field writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUpdate {
    pub object: PhysicsObject,
    pub deposits: Vec<FieldDeposit>,
}

/// Applies `update_fn` to one object and checks the result.
///
/// Panics inside the update are caught and reported as
/// [`UpdateError::Panicked`]; the output must keep the object's id and hold
/// finite, non-negative quantities.
pub fn execute_update(
    update_fn: &dyn UpdateFn,
    object: &PhysicsObject,
    dt: f64,
    grid: &FieldGrid,
) -> Result<ObjectUpdate, UpdateError> {
    let mut region = FieldRegion::new(grid, &object.position);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| update_fn.apply(object, dt, &mut region)))
        .map_err(|payload| UpdateError::Panicked(panic_message(payload.as_ref())))?;
    let updated = outcome?;

    validate_update(object, &updated)?;

    Ok(ObjectUpdate {
        object: updated,
        deposits: region.into_deposits(),
    })
}

fn validate_update(before: &PhysicsObject, after: &PhysicsObject) -> Result<(), UpdateError> {
    if after.id() != before.id() {
        return Err(UpdateError::rejected(format!(
            "identity changed from {} to {}",
            before.id(),
            after.id()
        )));
    }
    if !after.position.iter().all(|c| c.is_finite()) {
        return Err(UpdateError::NonFinite("position"));
    }
    if !after.velocity.iter().all(|c| c.is_finite()) {
        return Err(UpdateError::NonFinite("velocity"));
    }
    if !after.mass.is_finite() {
        return Err(UpdateError::NonFinite("mass"));
    }
    if !after.energy.is_finite() {
        return Err(UpdateError::NonFinite("energy"));
    }
    if after.mass < 0.0 {
        return Err(UpdateError::NegativeQuantity {
            quantity: "mass",
            value: after.mass,
        });
    }
    if after.energy < 0.0 {
        return Err(UpdateError::NegativeQuantity {
            quantity: "energy",
            value: after.energy,
        });
    }
    Ok(())
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
