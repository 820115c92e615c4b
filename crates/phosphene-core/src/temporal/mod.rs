//! Temporal response model.
//!
//! Each location's activation `a(t)` passes through a fixed cascade:
//!
//! | Stage | Operation | Default |
//! |-------|-----------|---------|
//! | Fast response | leaky integrator, `τ_fast` | 0.42 ms |
//! | Gain control | [`GainControlModel`] | subtractive, τ = 45.25 ms, ε = 8.73 |
//! | Output nonlinearity | [`OutputNonlinearity`] | sigmoid, asymptote 14 |
//! | Slow response | `slow_stages` leaky integrators, `τ_slow` | 3 × 26.25 ms |
//!
//! Every location starts at rest and is integrated independently, so the
//! arena of per-location records is processed in parallel without locks.
//! The familiar trajectory (rest, charging, adapting, decaying) emerges from
//! the dynamics; there are no explicit state flags.

pub mod gain;
pub mod integrator;
pub mod nonlinearity;

pub use gain::{AdaptationSource, Divisive, GainControl, GainControlModel, Subtractive};
pub use integrator::{IntegratorState, LeakyStage, LocationArena, LocationRecord, StepScheme};
pub use nonlinearity::OutputNonlinearity;

use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::types::{ActivationMap, BrightnessMap};

/// Parameters of the temporal cascade. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalParams {
    /// Integration step, also the simulation's sample interval.
    pub dt: f64,
    pub scheme: StepScheme,
    pub tau_fast: f64,
    pub gain_control: GainControlModel,
    pub nonlinearity: OutputNonlinearity,
    pub tau_slow: f64,
    pub slow_stages: usize,
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            dt: 5e-6,
            scheme: StepScheme::ExponentialEuler,
            tau_fast: 0.42e-3,
            gain_control: GainControlModel::default(),
            nonlinearity: OutputNonlinearity::default(),
            tau_slow: 26.25e-3,
            slow_stages: 3,
        }
    }
}

impl TemporalParams {
    /// The default time constants with gain control and the nonlinearity
    /// switched off, making the whole cascade linear in its input.
    pub fn linear() -> Self {
        Self {
            gain_control: GainControlModel::Off,
            nonlinearity: OutputNonlinearity::Linear,
            ..Self::default()
        }
    }

    /// The fastest time constant in use.
    pub fn fastest_time_constant(&self) -> f64 {
        let mut tau = self.tau_fast;
        if let Some((_, t)) = self.gain_control.adaptation() {
            tau = tau.min(t);
        }
        if self.slow_stages > 0 {
            tau = tau.min(self.tau_slow);
        }
        tau
    }
}

/// A validated temporal cascade, ready to integrate.
#[derive(Debug, Clone)]
pub struct TemporalModel {
    params: TemporalParams,
    fast: LeakyStage,
    adaptation: Option<(AdaptationSource, LeakyStage)>,
    slow: LeakyStage,
}

impl TemporalModel {
    pub fn new(params: TemporalParams) -> Result<Self, SimulationError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SimulationError::config(format!(
                    "temporal {} must be positive, got {}",
                    name, v
                )))
            }
        };
        positive("dt", params.dt)?;
        positive("tau_fast", params.tau_fast)?;
        if params.slow_stages > 0 {
            positive("tau_slow", params.tau_slow)?;
        }
        params.gain_control.validate()?;
        params.nonlinearity.validate()?;

        let tau_min = params.fastest_time_constant();
        let max_ratio = params.scheme.max_step_ratio();
        if params.dt / tau_min > max_ratio {
            return Err(SimulationError::IntegrationStability {
                scheme: params.scheme.name(),
                step: params.dt,
                tau: tau_min,
                max_ratio,
            });
        }

        let stage = |tau: f64| LeakyStage::new(params.scheme, params.dt, tau);
        Ok(Self {
            fast: stage(params.tau_fast),
            adaptation: params
                .gain_control
                .adaptation()
                .map(|(source, tau)| (source, stage(tau))),
            slow: stage(params.tau_slow),
            params,
        })
    }

    pub fn params(&self) -> &TemporalParams {
        &self.params
    }

    pub fn dt(&self) -> f64 {
        self.params.dt
    }

    /// Integrate one location's activation from `state`, writing brightness
    /// to `output`.
    pub fn integrate_trace(
        &self,
        state: &mut IntegratorState,
        input: ArrayView1<'_, f64>,
        mut output: ArrayViewMut1<'_, f64>,
    ) {
        let dt = self.params.dt;
        let gain = &self.params.gain_control;
        for (&a, y) in input.iter().zip(output.iter_mut()) {
            let r = self.fast.step(&mut state.fast, a);
            if let Some((source, stage)) = &self.adaptation {
                let drive = match source {
                    AdaptationSource::AccumulatedCharge => {
                        state.charge += a.max(0.0) * dt;
                        state.charge
                    }
                    AdaptationSource::RectifiedResponse => r.max(0.0),
                };
                stage.step(&mut state.adaptation, drive);
            }
            *y = gain.respond(r, state.adaptation);
        }

        self.params.nonlinearity.apply(output.view_mut());

        for _ in 0..self.params.slow_stages {
            let mut s = 0.0;
            output.iter_mut().for_each(|y| *y = self.slow.step(&mut s, *y));
        }
    }

    /// Integrate every row of `activation`, each from rest.
    pub fn integrate_map(&self, activation: &ActivationMap) -> BrightnessMap {
        let mut arena = LocationArena::at_rest(&activation.locations);
        let mut values = Array2::zeros(activation.values.raw_dim());

        Zip::from(ArrayViewMut1::from(arena.records_mut()))
            .and(values.rows_mut())
            .and(activation.values.rows())
            .par_for_each(|record, out, input| self.integrate_trace(&mut record.state, input, out));

        BrightnessMap {
            locations: activation.locations.clone(),
            time_base: activation.time_base,
            values,
        }
    }

    /// Response of a single location at rest to `input`.
    pub fn response(&self, input: &[f64]) -> Vec<f64> {
        let mut out = Array1::zeros(input.len());
        self.integrate_trace(
            &mut IntegratorState::default(),
            ArrayView1::from(input),
            out.view_mut(),
        );
        out.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::TimeBase;
    use approx::assert_relative_eq;

    fn pulse(len: usize, width: usize, amplitude: f64) -> Vec<f64> {
        (0..len).map(|i| if i < width { amplitude } else { 0.0 }).collect()
    }

    fn argmax(v: &[f64]) -> usize {
        v.iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &x)| if x > bv { (i, x) } else { (bi, bv) })
            .0
    }

    #[test]
    fn test_linear_mode_doubles_with_amplitude() {
        let model = TemporalModel::new(TemporalParams {
            dt: 1e-5,
            ..TemporalParams::linear()
        })
        .unwrap();
        let one = model.response(&pulse(20_000, 100, 10.0));
        let two = model.response(&pulse(20_000, 100, 20.0));
        for (a, b) in one.iter().zip(&two) {
            assert_eq!(2.0 * a, *b);
        }
    }

    #[test]
    fn test_response_rises_and_decays_to_rest() {
        let model = TemporalModel::new(TemporalParams {
            dt: 1e-5,
            ..TemporalParams::default()
        })
        .unwrap();
        let out = model.response(&pulse(40_000, 100, 30.0));
        let peak_at = argmax(&out);
        let peak = out[peak_at];
        assert!(peak > 0.0);
        assert!(peak_at > 100, "slow stages delay the peak past the pulse");
        assert!(*out.last().unwrap() < 0.01 * peak);
        let bound = model.params().nonlinearity.bound().unwrap();
        assert!(out.iter().all(|&v| v >= 0.0 && v <= bound + 1e-12));
    }

    #[test]
    fn test_decay_time_scales_with_slow_time_constant() {
        let settle_time = |tau_slow: f64| {
            let model = TemporalModel::new(TemporalParams {
                dt: 1e-5,
                tau_slow,
                ..TemporalParams::linear()
            })
            .unwrap();
            let out = model.response(&pulse(100_000, 20, 10.0));
            let peak = out.iter().copied().fold(0.0, f64::max);
            let last_above = out.iter().rposition(|&v| v > 0.01 * peak).unwrap();
            last_above as f64 * 1e-5
        };
        let t1 = settle_time(20e-3);
        let t2 = settle_time(40e-3);
        assert_relative_eq!(t2 / t1, 2.0, max_relative = 0.05);
    }

    #[test]
    fn test_divisive_adaptation_under_sustained_drive() {
        let model = TemporalModel::new(TemporalParams {
            dt: 1e-4,
            gain_control: GainControlModel::Divisive(Divisive {
                tau: 50e-3,
                exponent: 2.0,
                semi_saturation: 1.0,
            }),
            tau_slow: 5e-3,
            slow_stages: 1,
            ..TemporalParams::default()
        })
        .unwrap();
        let n = 5_000;
        let out = model.response(&vec![20.0; n]);
        let peak_at = argmax(&out);
        let peak = out[peak_at];

        assert!(peak_at > 0 && peak_at < n / 10, "peak at sample {}", peak_at);
        assert!(out[n - 1] < 0.2 * peak);
        assert!((out[n - 1] - out[n - 500]).abs() < 0.01 * peak, "not settled");
        let bound = model.params().nonlinearity.bound().unwrap();
        assert!(out.iter().all(|&v| v <= bound + 1e-12));
    }

    #[test]
    fn test_unstable_forward_euler_is_rejected() {
        let err = TemporalModel::new(TemporalParams {
            dt: 1e-3,
            scheme: StepScheme::ForwardEuler,
            ..TemporalParams::default()
        })
        .unwrap_err();
        match err {
            SimulationError::IntegrationStability { tau, .. } => {
                assert_relative_eq!(tau, 0.42e-3);
            }
            other => panic!("unexpected error: {}", other),
        }

        // The same step is accepted by exponential Euler.
        TemporalModel::new(TemporalParams {
            dt: 1e-3,
            ..TemporalParams::default()
        })
        .unwrap();
    }

    #[test]
    fn test_invalid_parameters_are_configuration_errors() {
        let err = TemporalModel::new(TemporalParams {
            tau_fast: -1.0,
            ..TemporalParams::default()
        })
        .unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn test_map_matches_single_trace_integration() {
        let model = TemporalModel::new(TemporalParams {
            dt: 1e-4,
            ..TemporalParams::default()
        })
        .unwrap();
        let rows = 6;
        let len = 3_000;
        let values = Array2::from_shape_fn((rows, len), |(r, t)| {
            if t < 10 * (r + 1) {
                5.0 * (r + 1) as f64
            } else {
                0.0
            }
        });
        let activation = ActivationMap {
            locations: (10..10 + rows).collect(),
            time_base: TimeBase {
                start: 0.0,
                step: 1e-4,
                len,
            },
            values,
        };
        let brightness = model.integrate_map(&activation);
        assert_eq!(brightness.locations, activation.locations);
        for r in 0..rows {
            let single = model.response(activation.values.row(r).as_slice().unwrap());
            assert_eq!(brightness.values.row(r).to_vec(), single);
        }
    }
}
