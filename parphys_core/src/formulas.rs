//! Physics formula set and the default update function.
//!
//! Every formula is pure and deterministic. The constants are tuning
//! values, not physical claims.

use crate::error::UpdateError;
use crate::state::{ObjectStatus, PhysicsObject};
use crate::update::{FieldRegion, UpdateFn};
use nalgebra::Vector3;

/// Rate at which a balancing constant damps mass.
pub const BALANCE_RATE: f64 = 0.1;

/// Fractional energy loss per second.
pub const ENERGY_DECAY: f64 = 0.05;

/// Fraction of dispersed energy converted into mass.
pub const MASS_GAIN: f64 = 0.001;

/// Speed of light (m/s), used by the normalised equivalence formula.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Coupling between the field gradient and the force on an object.
pub const FIELD_COUPLING: f64 = 0.5;

/// Scale applied to user input vectors.
pub const INTERACTION_SCALE: f64 = 0.25;

/// Energy below which a massless object is removed.
pub const REMOVAL_ENERGY: f64 = 1e-6;

/// Damps mass by a balancing constant.
pub fn constant_balance(mass: f64, constant: f64) -> f64 {
    mass / (1.0 + constant.abs() * BALANCE_RATE)
}

/// Correlation in [0, 0.5] between energy and mass.
pub fn energy_mass_correlation(energy: f64, mass: f64) -> f64 {
    let sum = energy + mass;
    if sum <= 0.0 {
        return 0.0;
    }
    (energy * mass).max(0.0).sqrt() / sum
}

/// Exponential energy decay over `elapsed` seconds.
pub fn evolve_energy(energy: f64, elapsed: f64) -> f64 {
    energy * (-ENERGY_DECAY * elapsed).exp()
}

/// Rotates-and-shifts a state vector under a scalar force.
pub fn quantum_transform(state: &Vector3<f64>, force: f64) -> Vector3<f64> {
    state.map(|x| x * force.cos() + 0.1 * force.sin())
}

/// Potential reached from `initial` after applying `action`.
pub fn action_potential(initial: f64, potential: f64, action: f64) -> f64 {
    initial + potential * (-0.1 * action).exp()
}

/// Survival score in [0, 1) given needs and adaptability.
pub fn dynamic_survival(needs: f64, adaptability: f64) -> f64 {
    (adaptability.max(0.0) / (1.0 + 0.01 * needs.max(0.0))).tanh()
}

/// Pulls every entry of an energy map halfway towards the mean.
pub fn disperse_energy(energy_map: &[f64]) -> Vec<f64> {
    if energy_map.is_empty() {
        return Vec::new();
    }
    let mean = energy_map.iter().sum::<f64>() / energy_map.len() as f64;
    energy_map.iter().map(|e| mean + (e - mean) * 0.5).collect()
}

/// Mass after absorbing `energy`.
pub fn mass_increase(energy: f64, mass: f64) -> f64 {
    mass + energy.max(0.0) * MASS_GAIN
}

/// Rest energy m·c² normalised by the object's current energy.
pub fn normalized_equivalence(energy: f64, mass: f64) -> f64 {
    mass * SPEED_OF_LIGHT * SPEED_OF_LIGHT / (energy.abs() + 1.0)
}

/// Saturating response of a quantum state to user input.
pub fn quantum_field_mapping(input: f64, state: f64) -> f64 {
    state * (1.0 - (-input.abs()).exp())
}

/// Force magnitude derived from a user input vector.
pub fn interaction_force(input: &Vector3<f64>) -> f64 {
    input.norm() * INTERACTION_SCALE
}

/// Default update: field-driven kinematics plus energy dispersion.
///
/// The object is pushed down the field gradient, loses energy through
/// [`evolve_energy`], converts part of the loss into mass and deposits the
/// rest into its home cell. Massless objects that run out of energy are
/// marked [`ObjectStatus::Removed`].
#[derive(Debug, Clone, Default)]
pub struct QuantumPhysicsUpdate;

impl UpdateFn for QuantumPhysicsUpdate {
    fn apply(
        &self,
        object: &PhysicsObject,
        dt: f64,
        region: &mut FieldRegion<'_>,
    ) -> Result<PhysicsObject, UpdateError> {
        let mut next = object.clone();

        if object.mass > 0.0 {
            let force = -region.gradient(&object.position) * FIELD_COUPLING;
            next.velocity += force / object.mass * dt;
        }
        next.position += next.velocity * dt;

        let evolved = evolve_energy(object.energy, dt);
        let dispersed = (object.energy - evolved).max(0.0);
        next.energy = evolved;
        next.mass = mass_increase(dispersed, object.mass);

        let released = dispersed * (1.0 - MASS_GAIN);
        if released > 0.0 {
            region.deposit(&object.position, released)?;
        }

        if next.mass == 0.0 && next.energy < REMOVAL_ENERGY {
            next.status = ObjectStatus::Removed;
        }

        Ok(next)
    }

    fn name(&self) -> &str {
        "quantum_physics"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FieldGrid, GridSpec, ObjectId};
    use crate::update::execute_update;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_balance() {
        assert_relative_eq!(constant_balance(10.0, 1.0), 10.0 / 1.1);
        assert_relative_eq!(constant_balance(50.0, 0.0), 50.0);
    }

    #[test]
    fn test_energy_mass_correlation_bounds() {
        assert_eq!(energy_mass_correlation(0.0, 0.0), 0.0);
        assert_relative_eq!(energy_mass_correlation(4.0, 4.0), 0.5);
        assert!(energy_mass_correlation(500.0, 20.0) < 0.5);
    }

    #[test]
    fn test_energy_evolution_decays() {
        assert_relative_eq!(evolve_energy(100.0, 0.0), 100.0);
        assert!(evolve_energy(100.0, 10.0) < evolve_energy(100.0, 1.0));
        assert_relative_eq!(evolve_energy(100.0, 20.0), 100.0 * (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_disperse_energy_preserves_total() {
        let dispersed = disperse_energy(&[100.0, 50.0, 25.0]);
        assert_relative_eq!(dispersed.iter().sum::<f64>(), 175.0, epsilon = 1e-9);
        assert_eq!(disperse_energy(&[50.0, 50.0, 50.0]), vec![50.0, 50.0, 50.0]);
        assert!(disperse_energy(&[]).is_empty());
    }

    #[test]
    fn test_survival_and_mapping() {
        assert!(dynamic_survival(10.0, 0.5) > dynamic_survival(50.0, 0.5));
        assert_eq!(quantum_field_mapping(0.0, 10.0), 0.0);
        assert!(quantum_field_mapping(2.0, 10.0) > quantum_field_mapping(0.5, 10.0));
        assert_relative_eq!(interaction_force(&Vector3::new(3.0, 4.0, 0.0)), 1.25);
        assert_relative_eq!(action_potential(10.0, 5.0, 0.0), 15.0);
        assert_eq!(quantum_transform(&Vector3::new(1.0, 1.0, 1.0), 0.0), Vector3::new(1.0, 1.0, 1.0));
        assert!(normalized_equivalence(100.0, 5.0) > 0.0);
        assert_relative_eq!(mass_increase(1000.0, 5.0), 6.0);
    }

    #[test]
    fn test_update_moves_and_disperses() {
        let grid = FieldGrid::new(GridSpec::default()).unwrap();
        let object = PhysicsObject::new(
            ObjectId(1),
            Vector3::new(5.0, 5.0, 5.0),
            Vector3::new(2.0, 0.0, 0.0),
            1.0,
            100.0,
        );

        let update = execute_update(&QuantumPhysicsUpdate, &object, 1.0, &grid).unwrap();

        assert_relative_eq!(update.object.position.x, 7.0);
        assert!(update.object.energy < 100.0);
        assert!(update.object.mass > 1.0);
        assert_eq!(update.deposits.len(), 1);

        // remaining + released + absorbed accounts for the initial energy
        let released = update.deposits[0].amount;
        let absorbed = update.object.mass - 1.0;
        assert_relative_eq!(update.object.energy + released + absorbed, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_update_follows_field_gradient() {
        let grid = FieldGrid::from_fn(GridSpec::default(), |p| p.x).unwrap();
        let object = PhysicsObject::new(
            ObjectId(1),
            Vector3::new(55.0, 55.0, 55.0),
            Vector3::zeros(),
            1.0,
            1.0,
        );

        let update = execute_update(&QuantumPhysicsUpdate, &object, 1.0, &grid).unwrap();
        assert!(update.object.velocity.x < 0.0);
    }

    #[test]
    fn test_massless_object_without_energy_is_removed() {
        let grid = FieldGrid::new(GridSpec::default()).unwrap();
        let object = PhysicsObject::new(ObjectId(1), Vector3::zeros(), Vector3::zeros(), 0.0, 0.0);

        let update = execute_update(&QuantumPhysicsUpdate, &object, 0.1, &grid).unwrap();
        assert_eq!(update.object.status, ObjectStatus::Removed);
        assert!(update.deposits.is_empty());
    }
}
