//! Location-by-electrode spread weights.

use ndarray::Array2;
use phosphene_compute::ComputeBackend;
use phosphene_geometry::{Electrode, ElectrodeArray};

use super::grid::SimulationGrid;
use super::spread::{ContactSpread, SpreadFunction, SpreadModel};
use crate::error::SimulationError;

/// Spread weights `w[l, e]` for every grid location `l` and electrode `e`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    weights: Array2<f64>,
    /// Locations with at least one weight at or above the tolerance.
    active: Vec<bool>,
}

impl WeightMatrix {
    /// Evaluate `spread` between every location of `grid` and every electrode.
    ///
    /// A location whose weights all fall below `tolerance` is marked quiet and
    /// is skipped by the temporal stage.
    pub fn compute(
        array: &ElectrodeArray,
        grid: &SimulationGrid,
        spread: &SpreadModel,
        tolerance: f64,
        backend: &dyn ComputeBackend,
    ) -> Result<Self, SimulationError> {
        spread.validate()?;
        let contacts: Vec<(&Electrode, ContactSpread)> = array
            .iter()
            .map(|e| (e, spread.for_contact(e.radius())))
            .collect();

        let weights = backend.parallel_row_fill(grid.len(), array.len(), &|l, row| {
            let location = grid.location(l);
            for (w, (electrode, f)) in row.iter_mut().zip(&contacts) {
                *w = f.weight(electrode.distance_to(location));
            }
        })?;

        let active: Vec<bool> = weights
            .rows()
            .into_iter()
            .map(|row| row.iter().any(|&w| w >= tolerance))
            .collect();
        log::debug!(
            "Weight matrix {}x{}: {} of {} locations above tolerance {}",
            grid.len(),
            array.len(),
            active.iter().filter(|&&a| a).count(),
            grid.len(),
            tolerance
        );

        Ok(Self { weights, active })
    }

    /// `(locations × electrodes)`.
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn is_active(&self, location: usize) -> bool {
        self.active[location]
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use phosphene_compute::{CpuBackend, SerialBackend};

    fn single() -> ElectrodeArray {
        ElectrodeArray::new(vec![Electrode::new("E", [0.0, 0.0, 0.0], 50.0).unwrap()]).unwrap()
    }

    #[test]
    fn test_weights_follow_distance() {
        let grid = SimulationGrid::new([0.0, 0.0], 100.0, 4, 1).unwrap();
        let m = WeightMatrix::compute(&single(), &grid, &SpreadModel::InverseSquare, 0.0, &SerialBackend)
            .unwrap();
        let w = m.weights();
        assert_eq!(w[[0, 0]], 1.0);
        assert_relative_eq!(w[[1, 0]], 0.25, epsilon = 1e-15);
        assert_relative_eq!(w[[2, 0]], 1.0 / 16.0, epsilon = 1e-15);
    }

    #[test]
    fn test_tolerance_marks_quiet_locations() {
        let grid = SimulationGrid::new([0.0, 0.0], 100.0, 4, 1).unwrap();
        let m = WeightMatrix::compute(&single(), &grid, &SpreadModel::InverseSquare, 0.05, &SerialBackend)
            .unwrap();
        // (50/d)^2 >= 0.05 only within ~224 µm.
        assert!(m.is_active(0));
        assert!(m.is_active(1));
        assert!(m.is_active(2));
        assert!(!m.is_active(3));
        assert_eq!(m.active_count(), 3);
    }

    #[test]
    fn test_backends_agree() {
        let array = ElectrodeArray::argus_ii();
        let grid = SimulationGrid::new([-3000.0, -2000.0], 250.0, 25, 17).unwrap();
        let spread = SpreadModel::power_law();
        let serial = WeightMatrix::compute(&array, &grid, &spread, 0.0, &SerialBackend).unwrap();
        let parallel = WeightMatrix::compute(&array, &grid, &spread, 0.0, &CpuBackend::new()).unwrap();
        assert_eq!(serial, parallel);
    }
}
