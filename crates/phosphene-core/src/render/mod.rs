//! Percept rendering.
//!
//! Each output pixel is a visual-field point (degrees). The renderer maps it
//! to tissue once, when the simulation is built, and keeps the bilinear
//! stencil into the simulation grid. Pixels that fall outside the map's
//! domain, or outside the grid, show the background level.
//!
//! Rendered values are `background + brightness`, so a silent stimulus
//! yields a uniform frame at exactly the background level.
//!
//! [`onoff`] post-processes a rendered percept through ON and OFF ganglion
//! cell filters.

pub mod onoff;

pub use onoff::{filter_on_off, recombine, OnOffParams};

use ndarray::Array2;
use phosphene_geometry::RetinotopicMap;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::spatial::{SimulationGrid, Stencil};

/// Units attached to every rendered percept.
pub const BRIGHTNESS_UNITS: &str = "brightness (a.u.)";

/// Regular grid of output pixels in visual-field degrees.
///
/// Row `iy` lies at `y_range[0] + iy * dy` and column `ix` at
/// `x_range[0] + ix * dx`, so row 0 is the lowest elevation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputGrid {
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub nx: usize,
    pub ny: usize,
}

impl Default for OutputGrid {
    fn default() -> Self {
        Self {
            x_range: [-15.0, 15.0],
            y_range: [-15.0, 15.0],
            nx: 61,
            ny: 61,
        }
    }
}

impl OutputGrid {
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (axis, range, n) in [("x", self.x_range, self.nx), ("y", self.y_range, self.ny)] {
            if n == 0 {
                return Err(SimulationError::config(format!(
                    "output grid needs at least one {} sample",
                    axis
                )));
            }
            if !(range[0].is_finite() && range[1].is_finite()) {
                return Err(SimulationError::config(format!("output {}_range is not finite", axis)));
            }
            let ordered = if n == 1 {
                range[0] <= range[1]
            } else {
                range[0] < range[1]
            };
            if !ordered {
                return Err(SimulationError::config(format!(
                    "output {}_range {:?} must be increasing",
                    axis, range
                )));
            }
        }
        Ok(())
    }

    fn coordinate(range: [f64; 2], n: usize, i: usize) -> f64 {
        if n <= 1 {
            range[0]
        } else {
            range[0] + i as f64 * (range[1] - range[0]) / (n - 1) as f64
        }
    }

    pub fn x(&self, ix: usize) -> f64 {
        Self::coordinate(self.x_range, self.nx, ix)
    }

    pub fn y(&self, iy: usize) -> f64 {
        Self::coordinate(self.y_range, self.ny, iy)
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every pixel centre, row-major.
    pub fn points(&self) -> Vec<[f64; 2]> {
        (0..self.ny)
            .flat_map(|iy| (0..self.nx).map(move |ix| [self.x(ix), self.y(iy)]))
            .collect()
    }
}

/// Brightness over the output grid at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptFrame {
    /// Time (s).
    pub time: f64,
    /// `(ny, nx)` rendered values.
    pub values: Array2<f64>,
}

/// A rendered percept: frames at a fixed interval over the output grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percept {
    frames: Vec<PerceptFrame>,
    grid: OutputGrid,
    frame_interval: f64,
    units: String,
    background: f64,
}

impl Percept {
    pub fn frames(&self) -> &[PerceptFrame] {
        &self.frames
    }

    pub fn times(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.time).collect()
    }

    pub fn grid(&self) -> &OutputGrid {
        &self.grid
    }

    /// Seconds between consecutive frames.
    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn background(&self) -> f64 {
        self.background
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Largest rendered value over all frames and pixels.
    pub fn peak(&self) -> f64 {
        self.frames
            .iter()
            .flat_map(|f| f.values.iter().copied())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// The frame nearest to `time`.
    pub fn frame_at(&self, time: f64) -> Option<&PerceptFrame> {
        self.frames
            .iter()
            .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
    }

    /// One pixel's value in every frame.
    pub fn pixel_trace(&self, ix: usize, iy: usize) -> Option<Vec<f64>> {
        if ix >= self.grid.nx || iy >= self.grid.ny {
            return None;
        }
        Some(self.frames.iter().map(|f| f.values[[iy, ix]]).collect())
    }
}

/// Maps per-location brightness onto the output grid.
#[derive(Debug, Clone)]
pub struct Renderer {
    grid: OutputGrid,
    /// One entry per pixel, row-major; `None` shows background.
    stencils: Vec<Option<Stencil>>,
    background: f64,
}

impl Renderer {
    pub fn new<M: RetinotopicMap>(
        grid: OutputGrid,
        map: &M,
        sim_grid: &SimulationGrid,
        background: f64,
    ) -> Result<Self, SimulationError> {
        grid.validate()?;
        if !background.is_finite() {
            return Err(SimulationError::config("background is not finite"));
        }
        let stencils: Vec<Option<Stencil>> = map
            .map_to_retina_batch(&grid.points())
            .into_iter()
            .map(|tissue| tissue.ok().and_then(|p| sim_grid.stencil(p)))
            .collect();
        let covered = stencils.iter().filter(|s| s.is_some()).count();
        if covered < stencils.len() {
            log::debug!(
                "{} of {} output pixels lie outside the {} map or the simulation grid",
                stencils.len() - covered,
                stencils.len(),
                map.name()
            );
        }
        Ok(Self {
            grid,
            stencils,
            background,
        })
    }

    pub fn grid(&self) -> &OutputGrid {
        &self.grid
    }

    /// Render one frame per column of `brightness` (`locations × frames`).
    pub fn render(&self, brightness: &Array2<f64>, times: &[f64], frame_interval: f64) -> Percept {
        let frames = times
            .iter()
            .enumerate()
            .map(|(f, &time)| {
                let column = brightness.column(f);
                let mut values = Array2::from_elem((self.grid.ny, self.grid.nx), self.background);
                for (v, stencil) in values.iter_mut().zip(&self.stencils) {
                    if let Some(stencil) = stencil {
                        let b: f64 = stencil.iter().map(|&(l, w)| w * column[l]).sum();
                        *v = self.background + b;
                    }
                }
                PerceptFrame { time, values }
            })
            .collect();

        Percept {
            frames,
            grid: self.grid.clone(),
            frame_interval,
            units: BRIGHTNESS_UNITS.to_string(),
            background: self.background,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use phosphene_geometry::{LinearRetinotopy, Retinotopy};

    fn linear() -> Retinotopy {
        Retinotopy::Linear(LinearRetinotopy::new(100.0, 90.0).unwrap())
    }

    #[test]
    fn test_pixel_coordinates() {
        let g = OutputGrid {
            x_range: [-1.0, 1.0],
            y_range: [0.0, 3.0],
            nx: 5,
            ny: 4,
        };
        assert_abs_diff_eq!(g.x(1), -0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(g.y(3), 3.0, epsilon = 1e-15);
        let pts = g.points();
        assert_eq!(pts.len(), 20);
        assert_eq!(pts[6], [g.x(1), g.y(1)]);
    }

    #[test]
    fn test_invalid_grids() {
        let mut g = OutputGrid::default();
        g.nx = 0;
        assert!(g.validate().is_err());
        let g = OutputGrid {
            x_range: [1.0, -1.0],
            ..OutputGrid::default()
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_render_interpolates_and_adds_background() {
        let output = OutputGrid {
            x_range: [-1.0, 1.0],
            y_range: [0.0, 0.0],
            nx: 3,
            ny: 1,
        };
        // Nodes at -100, 0, 100 µm along x and a single row at y = 0.
        let sim = SimulationGrid::new([-100.0, 0.0], 100.0, 3, 1).unwrap();
        let renderer = Renderer::new(output, &linear(), &sim, 0.5).unwrap();
        let brightness = Array2::from_shape_vec((3, 2), vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0]).unwrap();
        let percept = renderer.render(&brightness, &[0.0, 0.1], 0.1);

        assert_eq!(percept.len(), 2);
        assert_eq!(percept.units(), BRIGHTNESS_UNITS);
        assert_abs_diff_eq!(percept.frames()[0].values[[0, 0]], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(percept.frames()[0].values[[0, 2]], 3.5, epsilon = 1e-12);
        assert!(percept.frames()[1].values.iter().all(|&v| v == 0.5));
        assert_abs_diff_eq!(percept.peak(), 3.5, epsilon = 1e-12);
        assert_eq!(percept.pixel_trace(1, 0).unwrap().len(), 2);
        assert!(percept.pixel_trace(3, 0).is_none());
        assert_eq!(percept.frame_at(0.07).unwrap().time, 0.1);
    }

    #[test]
    fn test_uncovered_pixels_show_background() {
        let output = OutputGrid {
            x_range: [-5.0, 5.0],
            y_range: [0.0, 0.0],
            nx: 3,
            ny: 1,
        };
        let sim = SimulationGrid::new([-100.0, 0.0], 100.0, 3, 1).unwrap();
        let renderer = Renderer::new(output, &linear(), &sim, 0.25).unwrap();
        let brightness = Array2::from_elem((3, 1), 9.0);
        let rendered = renderer.render(&brightness, &[0.0], 1.0);
        let frame = &rendered.frames()[0];
        assert_eq!(frame.values[[0, 0]], 0.25);
        assert_abs_diff_eq!(frame.values[[0, 1]], 9.25, epsilon = 1e-12);
        assert_eq!(frame.values[[0, 2]], 0.25);
    }

    #[test]
    fn test_percept_serialises() {
        let output = OutputGrid {
            x_range: [0.0, 0.0],
            y_range: [0.0, 0.0],
            nx: 1,
            ny: 1,
        };
        let sim = SimulationGrid::new([0.0, 0.0], 10.0, 1, 1).unwrap();
        let renderer = Renderer::new(output, &linear(), &sim, 0.0).unwrap();
        let percept = renderer.render(&Array2::from_elem((1, 1), 2.0), &[0.0], 0.5);
        let json = serde_json::to_string(&percept).unwrap();
        let back: Percept = serde_json::from_str(&json).unwrap();
        assert_eq!(back, percept);
    }
}
