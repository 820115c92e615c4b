//! TOML configuration deserialisation for simulation jobs.
//!
//! A job names the electrode array, the pulse trains to deliver and,
//! optionally, any simulation settings that differ from the defaults:
//!
//! ```toml
//! [array]
//! kind = "argus_ii"
//! rotate_deg = -25.0
//!
//! [[pulse_train]]
//! electrode = "C3"
//! amplitude = 30.0
//! frequency = 20.0
//! duration = 0.5
//!
//! [simulation.temporal]
//! dt = 1e-5
//!
//! [simulation.output.grid]
//! x_range = [-15.0, 15.0]
//! y_range = [-10.0, 10.0]
//! nx = 61
//! ny = 41
//!
//! [on_off]
//! sizes = [5, 11]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use phosphene_core::{OnOffParams, PulseTrain, SimulationConfig};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    /// A preset array; combined with any explicit electrodes.
    #[serde(default)]
    pub array: Option<ArrayConfig>,
    #[serde(default, rename = "electrode")]
    pub electrodes: Vec<ElectrodeConfig>,
    #[serde(default, rename = "pulse_train")]
    pub pulse_trains: Vec<PulseTrainConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// ON/OFF ganglion-cell filtering of the rendered percept, when present.
    #[serde(default)]
    pub on_off: Option<OnOffParams>,
    #[serde(default)]
    pub run: RunConfig,
}

/// A generated array layout and its placement on the tissue.
#[derive(Debug, Deserialize)]
pub struct ArrayConfig {
    #[serde(flatten)]
    pub layout: ArrayLayout,
    /// Rotation about the array centre (degrees, counter-clockwise).
    #[serde(default)]
    pub rotate_deg: f64,
    /// Translation applied after rotation (µm).
    #[serde(default)]
    pub translate: [f64; 3],
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrayLayout {
    ArgusIi,
    Grid {
        rows: usize,
        cols: usize,
        /// Centre-to-centre spacing (µm).
        spacing: f64,
        /// Contact radius (µm).
        radius: f64,
        /// Height above the tissue (µm).
        #[serde(default)]
        height: f64,
    },
}

/// A single explicitly placed contact.
#[derive(Debug, Deserialize)]
pub struct ElectrodeConfig {
    pub id: String,
    /// Centre in tissue coordinates (µm).
    pub position: [f64; 3],
    /// Disc radius (µm).
    pub radius: f64,
    #[serde(default)]
    pub orientation: Option<[f64; 3]>,
}

/// A pulse train on one electrode.
#[derive(Debug, Deserialize)]
pub struct PulseTrainConfig {
    pub electrode: String,
    #[serde(flatten)]
    pub train: PulseTrain,
}

/// How and where to run.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Compute backend: "cpu" or "serial". Default: "cpu".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Worker threads for the CPU backend; all cores when absent.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to write the full percept as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_percept: bool,
    /// Whether to write per-frame brightness statistics as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_trace: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            threads: None,
            directory: default_output_dir(),
            save_percept: true,
            save_trace: true,
        }
    }
}

fn default_backend() -> String {
    "cpu".into()
}
fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phosphene_core::Polarity;

    #[test]
    fn test_minimal_job_uses_defaults() {
        let job: JobConfig = toml::from_str(
            r#"
            [array]
            kind = "argus_ii"

            [[pulse_train]]
            electrode = "A1"
            amplitude = 40.0
            "#,
        )
        .unwrap();

        assert!(matches!(job.array.unwrap().layout, ArrayLayout::ArgusIi));
        assert_eq!(job.pulse_trains.len(), 1);
        let train = &job.pulse_trains[0].train;
        assert_eq!(train.amplitude, 40.0);
        assert_eq!(train.phase_duration, PulseTrain::default().phase_duration);
        assert_eq!(train.polarity, Polarity::CathodicFirst);
        assert_eq!(job.simulation, SimulationConfig::default());
        assert!(job.on_off.is_none());
        assert_eq!(job.run.backend, "cpu");
    }

    #[test]
    fn test_explicit_electrodes_and_settings() {
        let job: JobConfig = toml::from_str(
            r#"
            [[electrode]]
            id = "E1"
            position = [0.0, 0.0, 10.0]
            radius = 50.0

            [[electrode]]
            id = "E2"
            position = [400.0, 0.0, 10.0]
            radius = 50.0
            orientation = [0.0, 0.0, 1.0]

            [[pulse_train]]
            electrode = "E2"
            polarity = "anodic_first"
            interphase_gap = 1e-4

            [simulation.spatial]
            weight_tolerance = 0.01

            [simulation.execution]
            batch_size = 8

            [on_off]
            sizes = [7]

            [run]
            backend = "serial"
            directory = "out"
            "#,
        )
        .unwrap();

        assert!(job.array.is_none());
        assert_eq!(job.electrodes.len(), 2);
        assert_eq!(job.electrodes[1].orientation, Some([0.0, 0.0, 1.0]));
        assert_eq!(job.pulse_trains[0].train.polarity, Polarity::AnodicFirst);
        assert_eq!(job.simulation.spatial.weight_tolerance, 0.01);
        assert_eq!(job.simulation.execution.batch_size, 8);
        assert_eq!(job.run.directory, "out");
        let on_off = job.on_off.unwrap();
        assert_eq!(on_off.sizes, vec![7]);
        assert_eq!(on_off.sigma_off, OnOffParams::default().sigma_off);
    }

    #[test]
    fn test_grid_layout() {
        let job: JobConfig = toml::from_str(
            r#"
            [array]
            kind = "grid"
            rows = 4
            cols = 4
            spacing = 200.0
            radius = 25.0
            rotate_deg = 90.0
            translate = [500.0, 0.0, 0.0]
            "#,
        )
        .unwrap();
        let array = job.array.unwrap();
        assert_eq!(array.rotate_deg, 90.0);
        match array.layout {
            ArrayLayout::Grid { rows, height, .. } => {
                assert_eq!(rows, 4);
                assert_eq!(height, 0.0);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }
}
