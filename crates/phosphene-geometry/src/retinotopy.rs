//! Retinotopic and cortical coordinate maps.
//!
//! A [`RetinotopicMap`] converts visual-field coordinates (degrees, fovea at
//! the origin) into tissue coordinates (micrometres on the stimulated surface)
//! and back. Each map is bijective on a documented domain; any point outside
//! it yields [`GeometryError::OutOfDomain`] instead of a defaulted value.
//!
//! "Retina" in the method names refers to whichever tissue surface the implant
//! sits on; for [`CorticalLogPolar`] that is the surface of V1.
//!
//! | Map | Forward | Domain |
//! |-----|---------|--------|
//! | [`LinearRetinotopy`] | $r = s\,\theta$ | $\lvert\theta\rvert \le \theta_{\max}$ |
//! | [`WatsonRetinotopy`] | $r_{mm} = 0.268\theta + 3.427\cdot10^{-4}\theta^2 - 8.3309\cdot10^{-7}\theta^3$ | $\theta \le \theta_{\max} \le 90°$ |
//! | [`CorticalLogPolar`] | $w = k \log(z + a)$ | $x \ge 0$, $\lvert z\rvert \le \theta_{\max}$ |

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Relative slack applied to domain boundaries so that round trips of
/// boundary points do not fail on the last ulp.
const DOMAIN_SLACK: f64 = 1e-9;

/// Bidirectional mapping between visual field and tissue coordinates.
pub trait RetinotopicMap {
    /// Short name used in error messages.
    fn name(&self) -> &'static str;

    /// Visual-field point (deg) to tissue point (µm).
    fn map_to_retina(&self, visual: [f64; 2]) -> Result<[f64; 2], GeometryError>;

    /// Tissue point (µm) to visual-field point (deg).
    fn map_to_visual_field(&self, tissue: [f64; 2]) -> Result<[f64; 2], GeometryError>;

    /// Map many visual-field points; each point succeeds or fails independently.
    fn map_to_retina_batch(&self, points: &[[f64; 2]]) -> Vec<Result<[f64; 2], GeometryError>> {
        points.iter().map(|&p| self.map_to_retina(p)).collect()
    }

    /// Map many tissue points; each point succeeds or fails independently.
    fn map_to_visual_field_batch(
        &self,
        points: &[[f64; 2]],
    ) -> Vec<Result<[f64; 2], GeometryError>> {
        points.iter().map(|&p| self.map_to_visual_field(p)).collect()
    }
}

fn require_finite(map: &'static str, p: [f64; 2]) -> Result<(), GeometryError> {
    if p[0].is_finite() && p[1].is_finite() {
        Ok(())
    } else {
        Err(GeometryError::out_of_domain(map, p, "coordinates are not finite"))
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), GeometryError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GeometryError::InvalidParameter(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

// ─────────────────────────────────────────────────────────────
// Linear
// ─────────────────────────────────────────────────────────────

/// Uniform scaling between degrees and micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRetinotopy {
    /// Retinal distance per degree of visual angle (µm/deg).
    pub microns_per_degree: f64,
    /// Largest eccentricity (deg) covered by the map.
    pub max_eccentricity: f64,
}

impl Default for LinearRetinotopy {
    fn default() -> Self {
        Self {
            microns_per_degree: 280.0,
            max_eccentricity: 90.0,
        }
    }
}

impl LinearRetinotopy {
    pub fn new(microns_per_degree: f64, max_eccentricity: f64) -> Result<Self, GeometryError> {
        let map = Self {
            microns_per_degree,
            max_eccentricity,
        };
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        require_positive("microns_per_degree", self.microns_per_degree)?;
        require_positive("max_eccentricity", self.max_eccentricity)
    }
}

impl RetinotopicMap for LinearRetinotopy {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn map_to_retina(&self, visual: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        require_finite(self.name(), visual)?;
        let ecc = visual[0].hypot(visual[1]);
        if ecc > self.max_eccentricity * (1.0 + DOMAIN_SLACK) {
            return Err(GeometryError::out_of_domain(
                self.name(),
                visual,
                "eccentricity exceeds max_eccentricity",
            ));
        }
        Ok([
            visual[0] * self.microns_per_degree,
            visual[1] * self.microns_per_degree,
        ])
    }

    fn map_to_visual_field(&self, tissue: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        require_finite(self.name(), tissue)?;
        let visual = [
            tissue[0] / self.microns_per_degree,
            tissue[1] / self.microns_per_degree,
        ];
        if visual[0].hypot(visual[1]) > self.max_eccentricity * (1.0 + DOMAIN_SLACK) {
            return Err(GeometryError::out_of_domain(
                self.name(),
                tissue,
                "tissue point maps beyond max_eccentricity",
            ));
        }
        Ok(visual)
    }
}

// ─────────────────────────────────────────────────────────────
// Watson (2014)
// ─────────────────────────────────────────────────────────────

/// Radial eccentricity polynomial of Watson, *J. Vision* **14**(7):15 (2014).
///
/// The polynomial is strictly increasing up to roughly 490°, so it is
/// invertible on any domain up to the 90° limit enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatsonRetinotopy {
    /// Largest eccentricity (deg) covered by the map; at most 90.
    pub max_eccentricity: f64,
}

impl Default for WatsonRetinotopy {
    fn default() -> Self {
        Self {
            max_eccentricity: 80.0,
        }
    }
}

impl WatsonRetinotopy {
    const C1: f64 = 0.268;
    const C2: f64 = 0.000_342_7;
    const C3: f64 = -8.3309e-7;
    const NEWTON_MAX_ITER: usize = 64;

    pub fn new(max_eccentricity: f64) -> Result<Self, GeometryError> {
        let map = Self { max_eccentricity };
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        require_positive("max_eccentricity", self.max_eccentricity)?;
        if self.max_eccentricity > 90.0 {
            return Err(GeometryError::InvalidParameter(format!(
                "Watson map is limited to 90 deg eccentricity, got {}",
                self.max_eccentricity
            )));
        }
        Ok(())
    }

    /// Eccentricity (deg) to retinal radius (µm).
    fn radius_um(theta: f64) -> f64 {
        1000.0 * theta * (Self::C1 + theta * (Self::C2 + theta * Self::C3))
    }

    fn radius_derivative_um(theta: f64) -> f64 {
        1000.0 * (Self::C1 + theta * (2.0 * Self::C2 + theta * 3.0 * Self::C3))
    }

    /// Retinal radius (µm) to eccentricity (deg) by safeguarded Newton iteration.
    fn eccentricity(&self, radius_um: f64) -> f64 {
        let upper = self.max_eccentricity;
        let mut theta = (radius_um / (1000.0 * Self::C1)).clamp(0.0, upper);
        for _ in 0..Self::NEWTON_MAX_ITER {
            let f = Self::radius_um(theta) - radius_um;
            let step = f / Self::radius_derivative_um(theta);
            let next = (theta - step).clamp(0.0, upper);
            if (next - theta).abs() <= 1e-14 * theta.max(1.0) {
                return next;
            }
            theta = next;
        }
        theta
    }
}

impl RetinotopicMap for WatsonRetinotopy {
    fn name(&self) -> &'static str {
        "watson"
    }

    fn map_to_retina(&self, visual: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        require_finite(self.name(), visual)?;
        let theta = visual[0].hypot(visual[1]);
        if theta > self.max_eccentricity * (1.0 + DOMAIN_SLACK) {
            return Err(GeometryError::out_of_domain(
                self.name(),
                visual,
                "eccentricity exceeds max_eccentricity",
            ));
        }
        if theta == 0.0 {
            return Ok([0.0, 0.0]);
        }
        let scale = Self::radius_um(theta) / theta;
        Ok([visual[0] * scale, visual[1] * scale])
    }

    fn map_to_visual_field(&self, tissue: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        require_finite(self.name(), tissue)?;
        let r = tissue[0].hypot(tissue[1]);
        if r > Self::radius_um(self.max_eccentricity) * (1.0 + DOMAIN_SLACK) {
            return Err(GeometryError::out_of_domain(
                self.name(),
                tissue,
                "tissue point maps beyond max_eccentricity",
            ));
        }
        if r == 0.0 {
            return Ok([0.0, 0.0]);
        }
        let scale = self.eccentricity(r) / r;
        Ok([tissue[0] * scale, tissue[1] * scale])
    }
}

// ─────────────────────────────────────────────────────────────
// Cortical log-polar (Schwartz monopole)
// ─────────────────────────────────────────────────────────────

/// Monopole log-polar model of the V1 surface, $w = k \log(z + a)$.
///
/// Models one hemisphere: only the contralateral (right, `x >= 0`) hemifield
/// is in the domain. Cortical coordinates are returned in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorticalLogPolar {
    /// Cortical scaling constant `k` (mm).
    pub k: f64,
    /// Foveal offset `a` (deg).
    pub a: f64,
    /// Largest eccentricity (deg) covered by the map.
    pub max_eccentricity: f64,
}

impl Default for CorticalLogPolar {
    fn default() -> Self {
        Self {
            k: 15.0,
            a: 0.7,
            max_eccentricity: 60.0,
        }
    }
}

impl CorticalLogPolar {
    pub fn new(k: f64, a: f64, max_eccentricity: f64) -> Result<Self, GeometryError> {
        let map = Self {
            k,
            a,
            max_eccentricity,
        };
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        require_positive("k", self.k)?;
        require_positive("a", self.a)?;
        require_positive("max_eccentricity", self.max_eccentricity)
    }

    fn in_domain(&self, z: Complex64) -> Result<(), &'static str> {
        if z.re < -DOMAIN_SLACK * self.max_eccentricity {
            return Err("point lies in the ipsilateral hemifield (x < 0)");
        }
        if z.norm() > self.max_eccentricity * (1.0 + DOMAIN_SLACK) {
            return Err("eccentricity exceeds max_eccentricity");
        }
        Ok(())
    }
}

impl RetinotopicMap for CorticalLogPolar {
    fn name(&self) -> &'static str {
        "cortical log-polar"
    }

    fn map_to_retina(&self, visual: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        require_finite(self.name(), visual)?;
        let z = Complex64::new(visual[0], visual[1]);
        self.in_domain(z)
            .map_err(|reason| GeometryError::out_of_domain(self.name(), visual, reason))?;
        let w = (z + self.a).ln() * self.k;
        Ok([w.re * 1000.0, w.im * 1000.0])
    }

    fn map_to_visual_field(&self, tissue: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        require_finite(self.name(), tissue)?;
        let w = Complex64::new(tissue[0] / 1000.0, tissue[1] / 1000.0);
        // Outside (-π/2, π/2) the exponential folds onto the ipsilateral side.
        if w.im.abs() / self.k > std::f64::consts::FRAC_PI_2 {
            return Err(GeometryError::out_of_domain(
                self.name(),
                tissue,
                "cortical point lies outside the modelled hemisphere",
            ));
        }
        let z = (w / self.k).exp() - self.a;
        self.in_domain(z)
            .map_err(|reason| GeometryError::out_of_domain(self.name(), tissue, reason))?;
        Ok([z.re, z.im])
    }
}

// ─────────────────────────────────────────────────────────────
// Configuration-selected map
// ─────────────────────────────────────────────────────────────

/// The closed set of maps, selected by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Retinotopy {
    Linear(LinearRetinotopy),
    Watson(WatsonRetinotopy),
    CorticalLogPolar(CorticalLogPolar),
}

impl Default for Retinotopy {
    fn default() -> Self {
        Retinotopy::Linear(LinearRetinotopy::default())
    }
}

impl Retinotopy {
    /// Check the map's parameters.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Retinotopy::Linear(m) => m.validate(),
            Retinotopy::Watson(m) => m.validate(),
            Retinotopy::CorticalLogPolar(m) => m.validate(),
        }
    }
}

impl RetinotopicMap for Retinotopy {
    fn name(&self) -> &'static str {
        match self {
            Retinotopy::Linear(m) => m.name(),
            Retinotopy::Watson(m) => m.name(),
            Retinotopy::CorticalLogPolar(m) => m.name(),
        }
    }

    fn map_to_retina(&self, visual: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        match self {
            Retinotopy::Linear(m) => m.map_to_retina(visual),
            Retinotopy::Watson(m) => m.map_to_retina(visual),
            Retinotopy::CorticalLogPolar(m) => m.map_to_retina(visual),
        }
    }

    fn map_to_visual_field(&self, tissue: [f64; 2]) -> Result<[f64; 2], GeometryError> {
        match self {
            Retinotopy::Linear(m) => m.map_to_visual_field(tissue),
            Retinotopy::Watson(m) => m.map_to_visual_field(tissue),
            Retinotopy::CorticalLogPolar(m) => m.map_to_visual_field(tissue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn visual_samples() -> Vec<[f64; 2]> {
        let mut pts = Vec::new();
        for &x in &[0.0, 0.25, 1.0, 5.0, 12.5, 30.0] {
            for &y in &[-20.0, -3.0, 0.0, 0.5, 7.0, 25.0] {
                pts.push([x, y]);
            }
        }
        pts
    }

    fn assert_round_trip<M: RetinotopicMap>(map: &M) {
        for p in visual_samples() {
            let tissue = map.map_to_retina(p).unwrap();
            let back = map.map_to_visual_field(tissue).unwrap();
            assert_abs_diff_eq!(back[0], p[0], epsilon = 1e-9);
            assert_abs_diff_eq!(back[1], p[1], epsilon = 1e-9);

            let again = map.map_to_retina(back).unwrap();
            assert_abs_diff_eq!(again[0], tissue[0], epsilon = 1e-6);
            assert_abs_diff_eq!(again[1], tissue[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_round_trip_all_maps() {
        assert_round_trip(&LinearRetinotopy::default());
        assert_round_trip(&WatsonRetinotopy::default());
        assert_round_trip(&CorticalLogPolar::default());
        assert_round_trip(&Retinotopy::Watson(WatsonRetinotopy::new(60.0).unwrap()));
    }

    #[test]
    fn test_linear_scale() {
        let map = LinearRetinotopy::default();
        let t = map.map_to_retina([1.0, -2.0]).unwrap();
        assert_abs_diff_eq!(t[0], 280.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t[1], -560.0, epsilon = 1e-12);
    }

    #[test]
    fn test_watson_matches_polynomial() {
        let map = WatsonRetinotopy::default();
        let t = map.map_to_retina([10.0, 0.0]).unwrap();
        let expected_mm = 0.268 * 10.0 + 0.0003427 * 100.0 - 8.3309e-7 * 1000.0;
        assert_abs_diff_eq!(t[0], expected_mm * 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_domain_is_reported() {
        let linear = LinearRetinotopy::new(280.0, 10.0).unwrap();
        assert!(matches!(
            linear.map_to_retina([11.0, 0.0]),
            Err(GeometryError::OutOfDomain { .. })
        ));
        assert!(matches!(
            linear.map_to_visual_field([280.0 * 11.0, 0.0]),
            Err(GeometryError::OutOfDomain { .. })
        ));

        let cortex = CorticalLogPolar::default();
        assert!(matches!(
            cortex.map_to_retina([-1.0, 0.0]),
            Err(GeometryError::OutOfDomain { .. })
        ));
        assert!(matches!(
            cortex.map_to_retina([f64::NAN, 0.0]),
            Err(GeometryError::OutOfDomain { .. })
        ));
    }

    #[test]
    fn test_batch_reports_per_point() {
        let map = LinearRetinotopy::new(280.0, 10.0).unwrap();
        let out = map.map_to_retina_batch(&[[1.0, 1.0], [50.0, 0.0], [0.0, 2.0]]);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert_abs_diff_eq!(out[2].as_ref().unwrap()[1], 560.0, epsilon = 1e-12);
    }

    #[test]
    fn test_watson_rejects_excessive_domain() {
        assert!(WatsonRetinotopy::new(120.0).is_err());
    }

    #[test]
    fn test_cortical_magnification_decreases_with_eccentricity() {
        let map = CorticalLogPolar::default();
        let near = map.map_to_retina([1.0, 0.0]).unwrap()[0] - map.map_to_retina([0.0, 0.0]).unwrap()[0];
        let far = map.map_to_retina([21.0, 0.0]).unwrap()[0] - map.map_to_retina([20.0, 0.0]).unwrap()[0];
        assert!(near > 5.0 * far, "near={} far={}", near, far);
    }
}
