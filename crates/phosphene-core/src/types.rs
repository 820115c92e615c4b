//! Intermediate containers passed between pipeline stages.
//!
//! Both maps are transient: they hold one batch of locations and are
//! dropped once the batch's frames have been written.

use ndarray::Array2;

use crate::stimulus::TimeBase;

/// Activation (µA-equivalent effective current) for a set of locations.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationMap {
    /// Simulation-grid index of each row.
    pub locations: Vec<usize>,
    pub time_base: TimeBase,
    /// `(locations × time samples)`.
    pub values: Array2<f64>,
}

impl ActivationMap {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Largest activation over all rows and samples, or `0.0` when empty.
    pub fn peak(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// Brightness (a.u.) for the same locations as the activation it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessMap {
    pub locations: Vec<usize>,
    pub time_base: TimeBase,
    /// `(locations × time samples)`.
    pub values: Array2<f64>,
}
