//! Regular tissue-space grid of simulation locations.

use std::hash::{Hash, Hasher};

use phosphene_geometry::RetinotopicMap;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::render::OutputGrid;

/// Locations `origin + (ix, iy) * step` (µm), stored row-major with `x`
/// varying fastest. A grid may be empty when no output pixel maps to tissue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationGrid {
    pub origin: [f64; 2],
    pub step: f64,
    pub nx: usize,
    pub ny: usize,
}

/// Four-point bilinear stencil: `(location index, weight)` pairs.
pub type Stencil = [(usize, f64); 4];

impl SimulationGrid {
    pub fn new(origin: [f64; 2], step: f64, nx: usize, ny: usize) -> Result<Self, SimulationError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(SimulationError::config(format!(
                "tissue step must be positive, got {}",
                step
            )));
        }
        if !(origin[0].is_finite() && origin[1].is_finite()) {
            return Err(SimulationError::config("grid origin is not finite"));
        }
        Ok(Self { origin, step, nx, ny })
    }

    /// The grid, at `step` spacing, covering the tissue image of every
    /// in-domain pixel of `output`, padded by one step on each side.
    pub fn covering<M: RetinotopicMap>(
        output: &OutputGrid,
        map: &M,
        step: f64,
    ) -> Result<Self, SimulationError> {
        let mut bounds: Option<([f64; 2], [f64; 2])> = None;
        for tissue in map.map_to_retina_batch(&output.points()).into_iter().flatten() {
            bounds = Some(match bounds {
                None => (tissue, tissue),
                Some((lo, hi)) => (
                    [lo[0].min(tissue[0]), lo[1].min(tissue[1])],
                    [hi[0].max(tissue[0]), hi[1].max(tissue[1])],
                ),
            });
        }
        let Some((lo, hi)) = bounds else {
            log::warn!("No output pixel lies inside the {} map's domain", map.name());
            return Self::new([0.0, 0.0], step, 0, 0);
        };

        let origin = [lo[0] - step, lo[1] - step];
        let count = |extent: f64| (extent / step - 1e-9).ceil().max(0.0) as usize + 3;
        Self::new(origin, step, count(hi[0] - lo[0]), count(hi[1] - lo[1]))
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tissue coordinates (µm) of location `index`.
    pub fn location(&self, index: usize) -> [f64; 2] {
        let ix = index % self.nx.max(1);
        let iy = index / self.nx.max(1);
        [
            self.origin[0] + ix as f64 * self.step,
            self.origin[1] + iy as f64 * self.step,
        ]
    }

    /// Bilinear stencil for a tissue point, or `None` if it lies outside the grid.
    pub fn stencil(&self, point: [f64; 2]) -> Option<Stencil> {
        let (x0, x1, tx) = axis_weights((point[0] - self.origin[0]) / self.step, self.nx)?;
        let (y0, y1, ty) = axis_weights((point[1] - self.origin[1]) / self.step, self.ny)?;
        let at = |ix: usize, iy: usize| iy * self.nx + ix;
        Some([
            (at(x0, y0), (1.0 - tx) * (1.0 - ty)),
            (at(x1, y0), tx * (1.0 - ty)),
            (at(x0, y1), (1.0 - tx) * ty),
            (at(x1, y1), tx * ty),
        ])
    }

    pub fn content_hash<H: Hasher>(&self, state: &mut H) {
        self.origin[0].to_bits().hash(state);
        self.origin[1].to_bits().hash(state);
        self.step.to_bits().hash(state);
        self.nx.hash(state);
        self.ny.hash(state);
    }
}

/// Lower node, upper node and fractional offset along one axis of `n` nodes.
fn axis_weights(f: f64, n: usize) -> Option<(usize, usize, f64)> {
    const EDGE: f64 = 1e-9;
    if n == 0 || !f.is_finite() || f < -EDGE || f > (n - 1) as f64 + EDGE {
        return None;
    }
    if n == 1 {
        return Some((0, 0, 0.0));
    }
    let i0 = (f.floor().max(0.0) as usize).min(n - 2);
    let t = (f - i0 as f64).clamp(0.0, 1.0);
    Some((i0, i0 + 1, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use phosphene_geometry::{LinearRetinotopy, Retinotopy};

    #[test]
    fn test_covering_grid_contains_every_pixel() {
        let output = OutputGrid {
            x_range: [-2.0, 2.0],
            y_range: [-1.0, 1.0],
            nx: 9,
            ny: 5,
        };
        let map = Retinotopy::Linear(LinearRetinotopy::default());
        let grid = SimulationGrid::covering(&output, &map, 25.0).unwrap();
        for p in output.points() {
            let tissue = map.map_to_retina(p).unwrap();
            assert!(grid.stencil(tissue).is_some(), "{:?} not covered", p);
        }
        assert_abs_diff_eq!(grid.origin[0], -2.0 * 280.0 - 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stencil_interpolates_bilinearly() {
        let grid = SimulationGrid::new([0.0, 0.0], 10.0, 3, 3).unwrap();
        let values: Vec<f64> = (0..grid.len())
            .map(|i| {
                let [x, y] = grid.location(i);
                2.0 * x + 3.0 * y + 1.0
            })
            .collect();
        let stencil = grid.stencil([13.0, 7.5]).unwrap();
        let v: f64 = stencil.iter().map(|&(i, w)| w * values[i]).sum();
        assert_abs_diff_eq!(v, 2.0 * 13.0 + 3.0 * 7.5 + 1.0, epsilon = 1e-12);

        let weight_sum: f64 = stencil.iter().map(|&(_, w)| w).sum();
        assert_abs_diff_eq!(weight_sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stencil_outside_grid() {
        let grid = SimulationGrid::new([0.0, 0.0], 10.0, 3, 3).unwrap();
        assert!(grid.stencil([-1.0, 5.0]).is_none());
        assert!(grid.stencil([5.0, 20.5]).is_none());
        assert!(grid.stencil([20.0, 20.0]).is_some());
    }

    #[test]
    fn test_empty_when_no_pixel_in_domain() {
        let output = OutputGrid {
            x_range: [100.0, 120.0],
            y_range: [0.0, 0.0],
            nx: 3,
            ny: 1,
        };
        let map = Retinotopy::Linear(LinearRetinotopy::default());
        let grid = SimulationGrid::covering(&output, &map, 25.0).unwrap();
        assert!(grid.is_empty());
        assert!(grid.stencil([0.0, 0.0]).is_none());
    }
}
