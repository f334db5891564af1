//! JSON exporter for external plotting.
//!
//! Two documents are produced: a run export (frames + reports) and a set of
//! formula comparison charts. Both are read-only views; nothing here feeds
//! back into the engine.

use crate::error::SimError;
use parphys_core::formulas::{
    action_potential, constant_balance, disperse_energy, dynamic_survival,
    energy_mass_correlation, evolve_energy, interaction_force, mass_increase,
    normalized_equivalence, quantum_field_mapping, quantum_transform,
};
use parphys_core::{
    FieldGrid, Frame, FrameReport, GridSpec, ObjectId, ObjectStatus, PhysicsObject,
    QuantumPhysicsUpdate, ReferenceEngine,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// State of one object in an exported frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub mass: f64,
    pub energy: f64,
    pub status: ObjectStatus,
}

impl ObjectSnapshot {
    pub fn new(object: &PhysicsObject) -> Self {
        Self {
            id: object.id().0,
            x: object.position.x,
            y: object.position.y,
            z: object.position.z,
            mass: object.mass,
            energy: object.energy,
            status: object.status,
        }
    }
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub index: u64,

    pub objects: Vec<ObjectSnapshot>,

    /// Sum of all field cells
    pub field_total: f64,

    pub total_energy: f64,

    pub total_mass: f64,
}

impl FrameSnapshot {
    pub fn new(frame: &Frame) -> Self {
        Self {
            index: frame.index(),
            objects: frame.objects().iter().map(ObjectSnapshot::new).collect(),
            field_total: frame.field().total(),
            total_energy: frame.total_energy(),
            total_mass: frame.total_mass(),
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub workers: usize,

    /// Frame 0 followed by every produced frame
    pub frames: Vec<FrameSnapshot>,

    /// One report per produced frame
    pub reports: Vec<FrameReport>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, workers: usize) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            workers,
            frames: Vec::new(),
            reports: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: &Frame) {
        self.frames.push(FrameSnapshot::new(frame));
    }

    pub fn add_report(&mut self, report: &FrameReport) {
        self.reports.push(report.clone());
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        write_json(path.as_ref(), self)
    }
}

/// One labelled line of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub values: Vec<f64>,
}

/// A formula comparison chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x: Vec<f64>,
    pub series: Vec<Series>,
}

impl FormulaChart {
    fn sweep(
        title: &str,
        (x_label, y_label): (&str, &str),
        x: Vec<f64>,
        params: &[f64],
        label: impl Fn(f64) -> String,
        f: impl Fn(f64, f64) -> f64,
    ) -> Self {
        let series = params
            .iter()
            .map(|&p| Series {
                label: label(p),
                values: x.iter().map(|&v| f(v, p)).collect(),
            })
            .collect();
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            x,
            series,
        }
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Builds every formula comparison chart.
pub fn formula_charts() -> Vec<FormulaChart> {
    vec![
        FormulaChart::sweep(
            "Mass Balance Comparison",
            ("Input Mass", "Balanced Mass"),
            linspace(1.0, 100.0, 50),
            &[1.0, 2.0, 5.0],
            |c| format!("const={}", c),
            constant_balance,
        ),
        FormulaChart::sweep(
            "Energy-Mass Correlation",
            ("Energy", "Correlation Value"),
            linspace(10.0, 500.0, 50),
            &[5.0, 10.0, 20.0],
            |m| format!("mass={}", m),
            energy_mass_correlation,
        ),
        FormulaChart::sweep(
            "Energy Evolution Over Time",
            ("Time", "Energy Level"),
            linspace(0.0, 20.0, 50),
            &[50.0, 100.0, 200.0],
            |e| format!("initial={}", e),
            |t, e| evolve_energy(e, t),
        ),
        FormulaChart::sweep(
            "Dynamic Survival Evaluation",
            ("Adaptability", "Survival Score"),
            linspace(0.1, 1.0, 50),
            &[10.0, 20.0, 50.0],
            |n| format!("needs={}", n),
            |a, n| dynamic_survival(n, a),
        ),
        FormulaChart::sweep(
            "Mass Increase with Energy",
            ("Energy Input", "Final Mass"),
            linspace(0.0, 500.0, 50),
            &[5.0, 10.0, 20.0, 50.0],
            |m| format!("initial_mass={}", m),
            mass_increase,
        ),
        FormulaChart::sweep(
            "Quantum State Transformation",
            ("Force", "Transformed Component"),
            linspace(0.0, std::f64::consts::PI, 50),
            &[0.5, 1.0, 2.0],
            |c| format!("component={}", c),
            |force, c| quantum_transform(&Vector3::repeat(c), force).x,
        ),
        FormulaChart::sweep(
            "Action Potential",
            ("Action", "Potential"),
            linspace(0.0, 20.0, 50),
            &[5.0, 10.0, 25.0],
            |p| format!("potential={}", p),
            |action, p| action_potential(10.0, p, action),
        ),
        FormulaChart::sweep(
            "Normalized Mass-Energy Equivalence",
            ("Energy", "m·c² / (E + 1)"),
            linspace(10.0, 500.0, 50),
            &[5.0, 10.0, 20.0],
            |m| format!("mass={}", m),
            |e, m| normalized_equivalence(e, m),
        ),
        FormulaChart::sweep(
            "User Interaction Response",
            ("Input Component", "Mapped State"),
            linspace(0.0, 5.0, 50),
            &[5.0, 10.0, 20.0],
            |q| format!("state={}", q),
            |c, q| quantum_field_mapping(interaction_force(&Vector3::repeat(c)), q),
        ),
        dispersion_chart(),
        evolution_chart(30),
    ]
}

/// Dispersion of a few three-component energy maps, one series per map.
fn dispersion_chart() -> FormulaChart {
    let maps: [[f64; 3]; 4] = [
        [100.0, 0.0, 0.0],
        [50.0, 50.0, 0.0],
        [60.0, 30.0, 10.0],
        [40.0, 40.0, 40.0],
    ];
    FormulaChart {
        title: "Energy Dispersion Patterns".to_string(),
        x_label: "Component".to_string(),
        y_label: "Dispersed Energy".to_string(),
        x: vec![1.0, 2.0, 3.0],
        series: maps
            .iter()
            .map(|map| Series {
                label: format!("{:?}", map),
                values: disperse_energy(map),
            })
            .collect(),
    }
}

/// One object stepped through the default update for `frames` frames.
fn evolution_chart(frames: usize) -> FormulaChart {
    let object = PhysicsObject::new(
        ObjectId(0),
        Vector3::new(80.0, 80.0, 80.0),
        Vector3::new(0.0, 0.0, 0.5),
        10.0,
        100.0,
    );
    let series = match FieldGrid::new(GridSpec::default())
        .ok()
        .and_then(|grid| Frame::genesis(vec![object], grid).ok())
    {
        Some(start) => {
            let history = ReferenceEngine::new(Arc::new(QuantumPhysicsUpdate)).run(start, frames, 1.0);
            let pick = |label: &str, f: fn(&PhysicsObject) -> f64| Series {
                label: label.to_string(),
                values: history
                    .iter()
                    .map(|frame| frame.objects().first().map(f).unwrap_or(0.0))
                    .collect(),
            };
            vec![
                pick("mass", |o| o.mass),
                pick("energy", |o| o.energy),
                pick("position_z", |o| o.position.z),
            ]
        }
        None => Vec::new(),
    };

    FormulaChart {
        title: format!("Default Update Evolution ({} Frames)", frames),
        x_label: "Frame".to_string(),
        y_label: "Value".to_string(),
        x: (0..=frames).map(|i| i as f64).collect(),
        series,
    }
}

/// Writes the formula charts to a JSON file.
pub fn write_formula_charts(path: impl AsRef<Path>) -> Result<(), SimError> {
    write_json(path.as_ref(), &formula_charts())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SimError> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
