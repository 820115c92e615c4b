//! Static output nonlinearity.

use ndarray::ArrayViewMut1;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Applied to a location's whole gain-controlled trace before the slow stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputNonlinearity {
    Linear,
    /// Rescale the trace so its peak becomes
    /// `asymptote / (1 + exp(−(peak − shift)/slope))`.
    Sigmoid {
        asymptote: f64,
        slope: f64,
        shift: f64,
    },
}

impl Default for OutputNonlinearity {
    fn default() -> Self {
        OutputNonlinearity::Sigmoid {
            asymptote: 14.0,
            slope: 3.0,
            shift: 16.0,
        }
    }
}

impl OutputNonlinearity {
    pub fn validate(&self) -> Result<(), SimulationError> {
        match *self {
            OutputNonlinearity::Linear => Ok(()),
            OutputNonlinearity::Sigmoid {
                asymptote,
                slope,
                shift,
            } => {
                if !(asymptote.is_finite() && asymptote > 0.0) {
                    return Err(SimulationError::config(format!(
                        "sigmoid asymptote must be positive, got {}",
                        asymptote
                    )));
                }
                if !(slope.is_finite() && slope > 0.0) {
                    return Err(SimulationError::config(format!(
                        "sigmoid slope must be positive, got {}",
                        slope
                    )));
                }
                if !shift.is_finite() {
                    return Err(SimulationError::config("sigmoid shift is not finite"));
                }
                Ok(())
            }
        }
    }

    /// Upper bound on the output, if any.
    pub fn bound(&self) -> Option<f64> {
        match *self {
            OutputNonlinearity::Linear => None,
            OutputNonlinearity::Sigmoid { asymptote, .. } => Some(asymptote),
        }
    }

    /// Transform `trace` in place.
    pub fn apply(&self, mut trace: ArrayViewMut1<'_, f64>) {
        let OutputNonlinearity::Sigmoid {
            asymptote,
            slope,
            shift,
        } = *self
        else {
            return;
        };

        let peak = trace.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !(peak > 0.0) {
            trace.fill(0.0);
            return;
        }
        let target = asymptote / (1.0 + (-(peak - shift) / slope).exp());
        trace.mapv_inplace(|v| v * (target / peak));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_sigmoid_rescales_peak() {
        let nl = OutputNonlinearity::default();
        let mut trace = array![0.0, 8.0, 16.0, 4.0];
        nl.apply(trace.view_mut());
        // At the shift the logistic is one half.
        assert_relative_eq!(trace[2], 7.0, epsilon = 1e-12);
        assert_relative_eq!(trace[1], 3.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sigmoid_is_bounded_by_asymptote() {
        let nl = OutputNonlinearity::default();
        let mut trace = Array1::from_vec(vec![1e6, 10.0]);
        nl.apply(trace.view_mut());
        assert_eq!(nl.bound(), Some(14.0));
        assert_eq!(OutputNonlinearity::Linear.bound(), None);
        assert!(trace[0] <= 14.0 + 1e-12);
        assert_relative_eq!(trace[0], 14.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_positive_peak_gives_silence() {
        let nl = OutputNonlinearity::default();
        let mut trace = array![0.0, -2.0, 0.0];
        nl.apply(trace.view_mut());
        assert!(trace.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_linear_leaves_trace() {
        let mut trace = array![1.0, -2.0];
        OutputNonlinearity::Linear.apply(trace.view_mut());
        assert_eq!(trace, array![1.0, -2.0]);
    }
}
