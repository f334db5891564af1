//! Canonical per-frame state: physics objects, the field grid and frames.

use crate::error::{ConfigError, FrameError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Stable object identity, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle status of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Scheduled every frame
    Active,
    /// Failed repeatedly; carried forward unchanged, never scheduled
    Quarantined,
    /// Dropped from the next frame
    Removed,
}

/// A simulated physical object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsObject {
    id: ObjectId,

    /// Position in world units
    pub position: Vector3<f64>,

    /// Velocity in world units per second
    pub velocity: Vector3<f64>,

    /// Mass (>= 0)
    pub mass: f64,

    /// Energy (>= 0)
    pub energy: f64,

    pub status: ObjectStatus,

    /// Consecutive frames whose update failed
    #[serde(default)]
    pub failure_streak: u32,
}

impl PhysicsObject {
    /// Creates a new active object.
    pub fn new(
        id: ObjectId,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        mass: f64,
        energy: f64,
    ) -> Self {
        Self {
            id,
            position,
            velocity,
            mass,
            energy,
            status: ObjectStatus::Active,
            failure_streak: 0,
        }
    }

    /// Returns the immutable object id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.status == ObjectStatus::Active
    }

    /// Returns the speed (velocity magnitude).
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Identifier of a field-grid region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub usize);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed geometry of the field grid for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Cells per axis
    pub dims: [usize; 3],

    /// Cells per region along each axis
    pub region_size: [usize; 3],

    /// Edge length of a cell in world units
    pub cell_size: f64,

    /// World position of the corner of cell (0, 0, 0)
    pub origin: Vector3<f64>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            dims: [16, 16, 16],
            region_size: [4, 4, 4],
            cell_size: 10.0,
            origin: Vector3::zeros(),
        }
    }
}

impl GridSpec {
    /// Checks the spec can back a grid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dims.iter().any(|&d| d == 0) {
            return Err(ConfigError::InvalidGrid("zero-sized dimension".into()));
        }
        if self.region_size.iter().any(|&r| r == 0) {
            return Err(ConfigError::InvalidGrid("zero-sized region".into()));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(ConfigError::InvalidGrid(format!(
                "cell size {} is not positive",
                self.cell_size
            )));
        }
        if !self.origin.iter().all(|c| c.is_finite()) {
            return Err(ConfigError::InvalidGrid("non-finite origin".into()));
        }
        Ok(())
    }

    /// World-space extent of the grid along each axis.
    pub fn extent(&self) -> Vector3<f64> {
        Vector3::new(
            self.dims[0] as f64 * self.cell_size,
            self.dims[1] as f64 * self.cell_size,
            self.dims[2] as f64 * self.cell_size,
        )
    }

    fn region_dims(&self) -> [usize; 3] {
        [
            self.dims[0].div_ceil(self.region_size[0]),
            self.dims[1].div_ceil(self.region_size[1]),
            self.dims[2].div_ceil(self.region_size[2]),
        ]
    }
}

/// Scalar potential field over a fixed 3D grid.
///
/// Positions outside the grid are clamped to the nearest boundary cell for
/// every lookup and write. Regions are axis-aligned blocks of
/// `region_size` cells and never overlap. Deserialization checks the spec
/// and the cell count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldGridData")]
pub struct FieldGrid {
    spec: GridSpec,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct FieldGridData {
    spec: GridSpec,
    values: Vec<f64>,
}

impl TryFrom<FieldGridData> for FieldGrid {
    type Error = ConfigError;

    fn try_from(data: FieldGridData) -> Result<Self, Self::Error> {
        data.spec.validate()?;
        let expected: usize = data.spec.dims.iter().product();
        if data.values.len() != expected {
            return Err(ConfigError::InvalidGrid(format!(
                "expected {} cell values, got {}",
                expected,
                data.values.len()
            )));
        }
        Ok(Self {
            spec: data.spec,
            values: data.values,
        })
    }
}

impl FieldGrid {
    /// Creates a zeroed grid.
    pub fn new(spec: GridSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        let len = spec.dims.iter().product();
        Ok(Self {
            spec,
            values: vec![0.0; len],
        })
    }

    /// Creates a grid whose cells are initialised from their world-space centre.
    pub fn from_fn(
        spec: GridSpec,
        mut init: impl FnMut(Vector3<f64>) -> f64,
    ) -> Result<Self, ConfigError> {
        let mut grid = Self::new(spec)?;
        for linear in 0..grid.values.len() {
            let centre = grid.cell_centre(grid.cell_from_linear(linear));
            grid.values[linear] = init(centre);
        }
        Ok(grid)
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn cell_count(&self) -> usize {
        self.values.len()
    }

    pub fn region_count(&self) -> usize {
        self.spec.region_dims().iter().product()
    }

    /// Returns the (clamped) cell containing a world position.
    pub fn cell_of(&self, position: &Vector3<f64>) -> [usize; 3] {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let rel = (position[axis] - self.spec.origin[axis]) / self.spec.cell_size;
            // NaN collapses to 0 via max
            let floored = rel.floor().max(0.0) as usize;
            cell[axis] = floored.min(self.spec.dims[axis] - 1);
        }
        cell
    }

    pub fn linear_index(&self, cell: [usize; 3]) -> usize {
        let [nx, ny, _] = self.spec.dims;
        cell[0] + nx * (cell[1] + ny * cell[2])
    }

    pub fn cell_from_linear(&self, linear: usize) -> [usize; 3] {
        let [nx, ny, _] = self.spec.dims;
        [linear % nx, (linear / nx) % ny, linear / (nx * ny)]
    }

    /// World-space centre of a cell.
    pub fn cell_centre(&self, cell: [usize; 3]) -> Vector3<f64> {
        let half = self.spec.cell_size * 0.5;
        Vector3::new(
            self.spec.origin.x + cell[0] as f64 * self.spec.cell_size + half,
            self.spec.origin.y + cell[1] as f64 * self.spec.cell_size + half,
            self.spec.origin.z + cell[2] as f64 * self.spec.cell_size + half,
        )
    }

    pub fn region_of_cell(&self, cell: [usize; 3]) -> RegionId {
        let [rx, ry, _] = self.spec.region_dims();
        let r = [
            cell[0] / self.spec.region_size[0],
            cell[1] / self.spec.region_size[1],
            cell[2] / self.spec.region_size[2],
        ];
        RegionId(r[0] + rx * (r[1] + ry * r[2]))
    }

    pub fn region_of(&self, position: &Vector3<f64>) -> RegionId {
        self.region_of_cell(self.cell_of(position))
    }

    /// Field value at the cell containing `position`.
    pub fn value_at(&self, position: &Vector3<f64>) -> f64 {
        self.values[self.linear_index(self.cell_of(position))]
    }

    /// Central-difference gradient at the cell containing `position`.
    ///
    /// Falls back to one-sided differences on the boundary and to zero on
    /// axes with a single cell.
    pub fn gradient_at(&self, position: &Vector3<f64>) -> Vector3<f64> {
        let cell = self.cell_of(position);
        let mut gradient = Vector3::zeros();
        for axis in 0..3 {
            let lo = cell[axis].saturating_sub(1);
            let hi = (cell[axis] + 1).min(self.spec.dims[axis] - 1);
            if hi == lo {
                continue;
            }
            let mut lo_cell = cell;
            let mut hi_cell = cell;
            lo_cell[axis] = lo;
            hi_cell[axis] = hi;
            let dv = self.values[self.linear_index(hi_cell)] - self.values[self.linear_index(lo_cell)];
            gradient[axis] = dv / ((hi - lo) as f64 * self.spec.cell_size);
        }
        gradient
    }

    /// Local field magnitude: |value| + |gradient|.
    pub fn magnitude_at(&self, position: &Vector3<f64>) -> f64 {
        self.value_at(position).abs() + self.gradient_at(position).norm()
    }

    /// Sum of all cell values.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Adds `amount` to a cell; false if the cell does not exist.
    pub(crate) fn add(&mut self, linear: usize, amount: f64) -> bool {
        match self.values.get_mut(linear) {
            Some(value) => {
                *value += amount;
                true
            }
            None => false,
        }
    }
}

/// Immutable snapshot of all object and field state at one step.
///
/// Objects are kept in ascending id order, including after
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameData")]
pub struct Frame {
    index: u64,
    objects: Vec<PhysicsObject>,
    field: FieldGrid,
}

#[derive(Deserialize)]
struct FrameData {
    index: u64,
    objects: Vec<PhysicsObject>,
    field: FieldGrid,
}

impl TryFrom<FrameData> for Frame {
    type Error = FrameError;

    fn try_from(data: FrameData) -> Result<Self, Self::Error> {
        Self::new(data.index, data.objects, data.field)
    }
}

impl Frame {
    /// Creates a frame, sorting objects by id.
    pub fn new(
        index: u64,
        mut objects: Vec<PhysicsObject>,
        field: FieldGrid,
    ) -> Result<Self, FrameError> {
        objects.sort_by_key(|o| o.id);
        if let Some(pair) = objects.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(FrameError::DuplicateObject(pair[0].id));
        }
        Ok(Self {
            index,
            objects,
            field,
        })
    }

    /// Creates frame 0.
    pub fn genesis(objects: Vec<PhysicsObject>, field: FieldGrid) -> Result<Self, FrameError> {
        Self::new(0, objects, field)
    }

    /// Builds the successor frame from already-ordered objects.
    pub(crate) fn successor(&self, objects: Vec<PhysicsObject>, field: FieldGrid) -> Self {
        debug_assert!(objects.windows(2).all(|w| w[0].id < w[1].id));
        Self {
            index: self.index + 1,
            objects,
            field,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn objects(&self) -> &[PhysicsObject] {
        &self.objects
    }

    pub fn field(&self) -> &FieldGrid {
        &self.field
    }

    /// Looks up an object by id.
    pub fn object(&self, id: ObjectId) -> Option<&PhysicsObject> {
        self.objects
            .binary_search_by_key(&id, |o| o.id)
            .ok()
            .map(|i| &self.objects[i])
    }

    /// Active objects in ascending id order.
    pub fn active_objects(&self) -> impl Iterator<Item = &PhysicsObject> + '_ {
        self.objects.iter().filter(|o| o.is_active())
    }

    pub fn active_ids(&self) -> Vec<ObjectId> {
        self.active_objects().map(|o| o.id).collect()
    }

    /// Number of active objects per field region.
    pub fn region_occupancy(&self) -> Vec<usize> {
        let mut counts = vec![0; self.field.region_count()];
        for object in self.active_objects() {
            counts[self.field.region_of(&object.position).0] += 1;
        }
        counts
    }

    /// Total energy of all objects.
    pub fn total_energy(&self) -> f64 {
        self.objects.iter().map(|o| o.energy).sum()
    }

    /// Total mass of all objects.
    pub fn total_mass(&self) -> f64 {
        self.objects.iter().map(|o| o.mass).sum()
    }
}
