//! Spatial activation model.
//!
//! Each electrode's current spreads through tissue according to a
//! [`SpreadFunction`] of distance. Contributions from different electrodes
//! superpose linearly:
//!
//! $$a(l, t) = \sum_e w(l, e)\, s(e, t)$$
//!
//! where `w` is the [`WeightMatrix`] and `s` the resampled stimulus. The
//! sum is accumulated in the electrode array's order, so a location's
//! activation does not depend on which batch it is computed in.

pub mod grid;
pub mod spread;
pub mod weights;

pub use grid::{SimulationGrid, Stencil};
pub use spread::{ContactSpread, Exponential, InverseSquare, PowerLaw, SpreadFunction, SpreadModel};
pub use weights::WeightMatrix;

use ndarray::{Array2, ArrayViewMut1};

use crate::stimulus::StimulusMatrix;
use crate::types::ActivationMap;

/// Activation of the given `locations` under `stimulus`.
pub fn activation_rows(
    weights: &WeightMatrix,
    stimulus: &StimulusMatrix,
    locations: &[usize],
) -> ActivationMap {
    let time_base = *stimulus.time_base();
    let mut values = Array2::zeros((locations.len(), time_base.len));
    for (out, &l) in values.rows_mut().into_iter().zip(locations) {
        activation_into(weights, stimulus, l, out);
    }

    ActivationMap {
        locations: locations.to_vec(),
        time_base,
        values,
    }
}

/// Overwrite `out` with the activation of one location.
///
/// `out` must hold one sample per time-base step.
pub fn activation_into(
    weights: &WeightMatrix,
    stimulus: &StimulusMatrix,
    location: usize,
    mut out: ArrayViewMut1<'_, f64>,
) {
    out.fill(0.0);
    let w = weights.weights();
    let s = stimulus.values();
    for (k, &e) in stimulus.electrodes().iter().enumerate() {
        let weight = w[[location, e]];
        if weight != 0.0 {
            out.scaled_add(weight, &s.row(k));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::{Stimulus, TimeBase, Waveform};
    use approx::assert_relative_eq;
    use phosphene_compute::SerialBackend;
    use phosphene_geometry::ElectrodeArray;

    fn setup() -> (ElectrodeArray, SimulationGrid, WeightMatrix) {
        let array = ElectrodeArray::grid(1, 3, 400.0, 50.0, 0.0).unwrap();
        let grid = SimulationGrid::new([-600.0, -100.0], 50.0, 25, 5).unwrap();
        let weights =
            WeightMatrix::compute(&array, &grid, &SpreadModel::InverseSquare, 0.0, &SerialBackend).unwrap();
        (array, grid, weights)
    }

    fn matrix(array: &ElectrodeArray, stimulus: &Stimulus) -> StimulusMatrix {
        let tb = TimeBase::covering(0.0, 2e-3, 1e-4).unwrap();
        StimulusMatrix::assemble(stimulus, array, tb).unwrap()
    }

    fn pulse(amplitude: f64) -> Waveform {
        Waveform::from_samples(vec![(0.0, amplitude), (1e-3, amplitude), (1.1e-3, 0.0)]).unwrap()
    }

    #[test]
    fn test_superposition_of_electrodes() {
        let (array, grid, weights) = setup();
        let locations: Vec<usize> = (0..grid.len()).collect();

        let both = matrix(&array, &Stimulus::new().with("A1", pulse(10.0)).with("A3", pulse(4.0)));
        let only_a1 = matrix(&array, &Stimulus::new().with("A1", pulse(10.0)));
        let only_a3 = matrix(&array, &Stimulus::new().with("A3", pulse(4.0)));

        let sum = activation_rows(&weights, &both, &locations).values;
        let parts = activation_rows(&weights, &only_a1, &locations).values
            + activation_rows(&weights, &only_a3, &locations).values;
        for (a, b) in sum.iter().zip(parts.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_doubling_amplitude_doubles_peak() {
        let (array, grid, weights) = setup();
        let locations: Vec<usize> = (0..grid.len()).collect();
        let stim = Stimulus::new().with("A2", pulse(10.0));

        let single = activation_rows(&weights, &matrix(&array, &stim), &locations);
        let double = activation_rows(&weights, &matrix(&array, &stim.scaled(2.0)), &locations);
        assert_relative_eq!(double.peak(), 2.0 * single.peak(), epsilon = 1e-12);
        // The peak sits on the electrode.
        assert_relative_eq!(single.peak(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_row_matches_batch() {
        let (array, grid, weights) = setup();
        let stim = matrix(&array, &Stimulus::new().with("A1", pulse(7.0)).with("A3", pulse(2.0)));
        let all: Vec<usize> = (0..grid.len()).collect();
        let whole = activation_rows(&weights, &stim, &all);

        // A dirty buffer is overwritten, not accumulated into.
        let mut row = ndarray::Array1::from_elem(stim.time_base().len, 99.0);
        for &l in &[0, 12, 60, grid.len() - 1] {
            activation_into(&weights, &stim, l, row.view_mut());
            assert_eq!(row.view(), whole.values.row(l));
        }
    }

    #[test]
    fn test_tiling_does_not_change_rows() {
        let (array, grid, weights) = setup();
        let stim = matrix(
            &array,
            &Stimulus::new()
                .with("A1", pulse(7.0))
                .with("A2", pulse(-3.0))
                .with("A3", pulse(5.0)),
        );
        let all: Vec<usize> = (0..grid.len()).collect();
        let whole = activation_rows(&weights, &stim, &all);

        for chunk in all.chunks(7) {
            let tile = activation_rows(&weights, &stim, chunk);
            for (r, &l) in chunk.iter().enumerate() {
                assert_eq!(tile.values.row(r), whole.values.row(l));
            }
        }
    }
}
