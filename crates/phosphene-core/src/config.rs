//! Simulation configuration.
//!
//! Every field has a documented default, so a configuration file only needs
//! to name what it changes:
//!
//! ```toml
//! [spatial]
//! spread = { kind = "exponential", decay_length = 200.0 }
//!
//! [retinotopy]
//! kind = "watson"
//! max_eccentricity = 40.0
//!
//! [temporal]
//! dt = 1e-5
//! gain_control = { kind = "divisive", tau = 0.05, exponent = 2.0, semi_saturation = 1.0 }
//!
//! [output]
//! frame_interval = 0.02
//! ```

use phosphene_geometry::Retinotopy;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::render::OutputGrid;
use crate::spatial::SpreadModel;
use crate::temporal::{TemporalModel, TemporalParams};

/// Spread and sampling of the tissue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub spread: SpreadModel,
    /// Spacing of simulation locations (µm).
    pub tissue_step: f64,
    /// Locations whose spread weights are all below this are not simulated
    /// and render as background (default 0.05).
    ///
    /// The sigmoid nonlinearity rescales every trace with a positive peak to
    /// at least `asymptote·logistic(−shift/slope)`, so with a tolerance of 0
    /// even the faintest location is lifted to that floor.
    pub weight_tolerance: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            spread: SpreadModel::default(),
            tissue_step: 25.0,
            weight_tolerance: 0.05,
        }
    }
}

/// Output grid and framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub grid: OutputGrid,
    /// Time between rendered frames (s).
    pub frame_interval: f64,
    /// Value shown where there is no brightness.
    pub background: f64,
    /// Time simulated after the last stimulus sample (s).
    pub tail: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            grid: OutputGrid::default(),
            frame_interval: 5e-3,
            background: 0.0,
            tail: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Locations per scheduled batch; cancellation is checked between batches.
    ///
    /// Each running batch holds two traces at full `dt` resolution (8 bytes
    /// per sample each), independent of its size; the output keeps only one
    /// value per frame per location.
    pub batch_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { batch_size: 64 }
    }
}

/// All knobs of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub spatial: SpatialConfig,
    pub retinotopy: Retinotopy,
    pub temporal: TemporalParams,
    pub output: OutputConfig,
    pub execution: ExecutionConfig,
}

impl SimulationConfig {
    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<(), SimulationError> {
        self.spatial.spread.validate()?;
        if !(self.spatial.tissue_step.is_finite() && self.spatial.tissue_step > 0.0) {
            return Err(SimulationError::config(format!(
                "tissue_step must be positive, got {}",
                self.spatial.tissue_step
            )));
        }
        if !(self.spatial.weight_tolerance.is_finite() && self.spatial.weight_tolerance >= 0.0) {
            return Err(SimulationError::config(format!(
                "weight_tolerance must be non-negative, got {}",
                self.spatial.weight_tolerance
            )));
        }

        self.retinotopy.validate()?;
        TemporalModel::new(self.temporal.clone())?;

        self.output.grid.validate()?;
        if !(self.output.frame_interval.is_finite() && self.output.frame_interval > 0.0) {
            return Err(SimulationError::config(format!(
                "frame_interval must be positive, got {}",
                self.output.frame_interval
            )));
        }
        if !(self.output.tail.is_finite() && self.output.tail >= 0.0) {
            return Err(SimulationError::config(format!(
                "tail must be non-negative, got {}",
                self.output.tail
            )));
        }
        if !self.output.background.is_finite() {
            return Err(SimulationError::config("background is not finite"));
        }

        if self.execution.batch_size == 0 {
            return Err(SimulationError::config("batch_size must be at least 1"));
        }
        Ok(())
    }

    /// Samples between rendered frames.
    pub fn frame_stride(&self) -> usize {
        ((self.output.frame_interval / self.temporal.dt).round() as usize).max(1)
    }
}
