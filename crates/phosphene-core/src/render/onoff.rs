//! ON/OFF ganglion-cell filtering of a rendered percept.
//!
//! Each frame is convolved with difference-of-Gaussians receptive fields at
//! one or more sizes (in pixels). The signed response is split into an ON
//! channel (positive part) and an OFF channel (negated negative part), each
//! averaged over the sizes:
//!
//! $$k_n(x, y) = \frac{\Delta^2}{2\pi\sigma_{on}^2} e^{-r^2/2\sigma_{on}^2}
//!             - \frac{\Delta^2}{2\pi\sigma_{off}^2} e^{-r^2/2\sigma_{off}^2}$$
//!
//! with `x, y` sampled on `n` points spanning `[-1, 1]` and `Δ = 2/(n − 1)`.
//! Frames are padded with their own mean before filtering, so a uniform
//! frame gives a uniform response right up to its edges.
//!
//! [`recombine`] merges the channels the way normal vision would (ON − OFF)
//! and the way an electrode that drives both cell classes at once would
//! (ON + OFF).

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use super::{Percept, PerceptFrame};
use crate::error::SimulationError;

/// Receptive-field sizes and surround widths of the ON/OFF filter bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnOffParams {
    /// Kernel widths in pixels, at least 2 each.
    pub sizes: Vec<usize>,
    /// Centre Gaussian width, in units of the kernel half-width.
    pub sigma_on: f64,
    /// Surround Gaussian width, in units of the kernel half-width.
    pub sigma_off: f64,
}

impl Default for OnOffParams {
    fn default() -> Self {
        Self {
            sizes: vec![5, 11],
            sigma_on: 0.1,
            sigma_off: 0.25,
        }
    }
}

impl OnOffParams {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.sizes.is_empty() {
            return Err(SimulationError::config("on/off filter needs at least one size"));
        }
        if let Some(&n) = self.sizes.iter().find(|&&n| n < 2) {
            return Err(SimulationError::config(format!(
                "on/off kernel size must be at least 2 pixels, got {}",
                n
            )));
        }
        for (name, sigma) in [("sigma_on", self.sigma_on), ("sigma_off", self.sigma_off)] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(SimulationError::config(format!(
                    "on/off {} must be positive, got {}",
                    name, sigma
                )));
            }
        }
        Ok(())
    }
}

/// Difference-of-Gaussians kernel of `n × n` samples.
fn dog_kernel(n: usize, sigma_on: f64, sigma_off: f64) -> Array2<f64> {
    let dx = 2.0 / (n - 1) as f64;
    let gauss = |rsq: f64, sigma: f64| {
        let var = sigma * sigma;
        (-rsq / (2.0 * var)).exp() * dx * dx / (2.0 * std::f64::consts::PI * var)
    };
    Array2::from_shape_fn((n, n), |(i, j)| {
        let y = -1.0 + i as f64 * dx;
        let x = -1.0 + j as f64 * dx;
        let rsq = x * x + y * y;
        gauss(rsq, sigma_on) - gauss(rsq, sigma_off)
    })
}

/// Split one frame into its (ON, OFF) responses.
fn filter_frame(
    values: &Array2<f64>,
    kernels: &[Array2<f64>],
    pad: usize,
) -> (Array2<f64>, Array2<f64>) {
    let (ny, nx) = values.dim();
    let fill = values.mean().unwrap_or(0.0);
    let mut padded = Array2::from_elem((ny + 2 * pad, nx + 2 * pad), fill);
    padded.slice_mut(s![pad..pad + ny, pad..pad + nx]).assign(values);

    let mut on = Array2::<f64>::zeros((ny, nx));
    let mut off = Array2::<f64>::zeros((ny, nx));
    let share = 1.0 / kernels.len() as f64;
    let mut response = Array2::<f64>::zeros((ny, nx));
    for kernel in kernels {
        // Centred convolution; `pad` exceeds every kernel width, so the
        // shifted windows stay inside the padded frame.
        let n = kernel.nrows();
        let h = (n - 1) / 2;
        response.fill(0.0);
        for ((a, b), &k) in kernel.indexed_iter() {
            let r0 = pad + h - a;
            let c0 = pad + h - b;
            response.scaled_add(k, &padded.slice(s![r0..r0 + ny, c0..c0 + nx]));
        }
        on.zip_mut_with(&response, |o, &r| *o += share * r.max(0.0));
        off.zip_mut_with(&response, |o, &r| *o += share * (-r).max(0.0));
    }
    (on, off)
}

fn with_frames(template: &Percept, frames: Vec<PerceptFrame>) -> Percept {
    Percept {
        frames,
        grid: template.grid.clone(),
        frame_interval: template.frame_interval,
        units: template.units.clone(),
        background: 0.0,
    }
}

/// Filter every frame of `percept` through the ON/OFF bank.
///
/// Returns `(on, off)`; both are non-negative and share the input's grid,
/// frame times and units, with a background of zero.
pub fn filter_on_off(
    percept: &Percept,
    params: &OnOffParams,
) -> Result<(Percept, Percept), SimulationError> {
    params.validate()?;
    let kernels: Vec<Array2<f64>> = params
        .sizes
        .iter()
        .map(|&n| dog_kernel(n, params.sigma_on, params.sigma_off))
        .collect();
    let pad = 2 * params.sizes.iter().copied().max().unwrap_or(0);

    let (on, off): (Vec<_>, Vec<_>) = percept
        .frames
        .iter()
        .map(|frame| {
            let (on, off) = filter_frame(&frame.values, &kernels, pad);
            (
                PerceptFrame {
                    time: frame.time,
                    values: on,
                },
                PerceptFrame {
                    time: frame.time,
                    values: off,
                },
            )
        })
        .unzip();
    log::debug!(
        "ON/OFF filtered {} frames at sizes {:?}",
        percept.len(),
        params.sizes
    );

    Ok((with_frames(percept, on), with_frames(percept, off)))
}

/// Recombine ON and OFF channels into `(normal, prosthetic)`:
/// `on − off` and `on + off`.
pub fn recombine(on: &Percept, off: &Percept) -> Result<(Percept, Percept), SimulationError> {
    if on.grid != off.grid || on.len() != off.len() {
        return Err(SimulationError::config(
            "ON and OFF percepts must share a grid and frame count",
        ));
    }
    let combine = |sign: f64| -> Vec<PerceptFrame> {
        on.frames
            .iter()
            .zip(&off.frames)
            .map(|(a, b)| PerceptFrame {
                time: a.time,
                values: &a.values + &(&b.values * sign),
            })
            .collect()
    };
    Ok((with_frames(on, combine(-1.0)), with_frames(on, combine(1.0))))
}
