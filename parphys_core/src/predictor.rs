//! Complexity predictor: per-object cost estimates with a heuristic fallback.
//!
//! Costs are only compared within a frame; their absolute scale carries no
//! meaning. Prediction never fails: any problem with the trained model
//! degrades to [`heuristic_cost`] and the record is marked
//! [`PredictionSource::Fallback`].

use crate::error::{ConfigError, ModelError};
use crate::state::{Frame, ObjectId, PhysicsObject};
use crate::update::panic_message;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Where a cost estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Fallback,
}

/// Ephemeral per-object, per-frame cost estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: ObjectId,
    /// Non-negative, finite
    pub cost: f64,
    pub source: PredictionSource,
}

/// Read-only summary of the field around an object.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldSummary {
    /// |value| + |gradient| at the object's cell
    pub local_magnitude: f64,
    /// Active objects sharing the object's region (including itself)
    pub region_population: usize,
}

/// Features presented to a cost model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostFeatures {
    pub mass: f64,
    pub speed: f64,
    pub energy: f64,
    pub field_magnitude: f64,
    pub neighbor_density: f64,
}

impl CostFeatures {
    pub fn extract(object: &PhysicsObject, field: &FieldSummary) -> Self {
        Self {
            mass: object.mass,
            speed: object.speed(),
            energy: object.energy,
            field_magnitude: field.local_magnitude,
            neighbor_density: field.region_population.saturating_sub(1) as f64,
        }
    }

    pub fn as_array(&self) -> [f64; 5] {
        [
            self.mass,
            self.speed,
            self.energy,
            self.field_magnitude,
            self.neighbor_density,
        ]
    }
}

/// A trained cost estimator.
///
/// Models are immutable for the lifetime of a run and identified by a
/// version string.
pub trait CostModel: Send + Sync {
    /// Returns the model version.
    fn version(&self) -> &str;

    /// Estimates the relative cost of updating an object.
    fn estimate(&self, features: &CostFeatures) -> Result<f64, ModelError>;
}

/// Linear cost model: `bias + weights · features`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCostModel {
    pub version: String,
    pub bias: f64,
    /// Weights for mass, speed, energy, field magnitude, neighbor density
    pub weights: [f64; 5],
}

impl LinearCostModel {
    pub fn new(version: impl Into<String>, bias: f64, weights: [f64; 5]) -> Self {
        Self {
            version: version.into(),
            bias,
            weights,
        }
    }

    /// Loads a model from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl CostModel for LinearCostModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn estimate(&self, features: &CostFeatures) -> Result<f64, ModelError> {
        let cost = self.bias
            + self
                .weights
                .iter()
                .zip(features.as_array())
                .map(|(w, f)| w * f)
                .sum::<f64>();
        if cost.is_finite() && cost >= 0.0 {
            Ok(cost)
        } else {
            Err(ModelError::InvalidOutput(cost))
        }
    }
}

/// Deterministic fallback cost from mass, speed, field and neighbor density.
///
/// Always finite and at least 1.0; non-finite inputs count as zero.
pub fn heuristic_cost(features: &CostFeatures) -> f64 {
    let clean = |v: f64| if v.is_finite() { v.abs() } else { 0.0 };
    let cost = 1.0
        + 0.1 * clean(features.mass)
        + 0.5 * clean(features.speed)
        + 0.2 * clean(features.field_magnitude)
        + 0.05 * clean(features.neighbor_density);
    if cost.is_finite() {
        cost
    } else {
        f64::MAX
    }
}

/// The complexity predictor.
#[derive(Clone, Default)]
pub struct Predictor {
    model: Option<Arc<dyn CostModel>>,
}

impl Predictor {
    /// Creates a predictor backed by an optional trained model.
    pub fn new(model: Option<Arc<dyn CostModel>>) -> Self {
        Self { model }
    }

    /// Creates a predictor that always uses the heuristic.
    pub fn heuristic_only() -> Self {
        Self { model: None }
    }

    /// Returns the model version, if a model is configured.
    pub fn model_version(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.version())
    }

    /// Predicts the cost of one object's pending update.
    pub fn predict(&self, object: &PhysicsObject, field: &FieldSummary) -> PredictionRecord {
        let features = CostFeatures::extract(object, field);

        if let Some(model) = self.model.as_deref() {
            match run_model(model, &features) {
                Ok(cost) => {
                    return PredictionRecord {
                        id: object.id(),
                        cost,
                        source: PredictionSource::Model,
                    }
                }
                Err(e) => debug!(object = %object.id(), error = %e, "prediction fallback"),
            }
        }

        PredictionRecord {
            id: object.id(),
            cost: heuristic_cost(&features),
            source: PredictionSource::Fallback,
        }
    }

    /// Predicts every active object of a frame, in ascending id order.
    pub fn predict_frame(&self, frame: &Frame) -> Vec<PredictionRecord> {
        let occupancy = frame.region_occupancy();
        let field = frame.field();
        frame
            .active_objects()
            .map(|object| {
                let summary = FieldSummary {
                    local_magnitude: field.magnitude_at(&object.position),
                    region_population: occupancy[field.region_of(&object.position).0],
                };
                self.predict(object, &summary)
            })
            .collect()
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("model", &self.model_version())
            .finish()
    }
}

fn run_model(model: &dyn CostModel, features: &CostFeatures) -> Result<f64, ModelError> {
    let cost = panic::catch_unwind(AssertUnwindSafe(|| model.estimate(features)))
        .map_err(|payload| ModelError::Unavailable(panic_message(payload.as_ref())))??;
    if cost.is_finite() && cost >= 0.0 {
        Ok(cost)
    } else {
        Err(ModelError::InvalidOutput(cost))
    }
}
