//! Gain control between the fast response and the output nonlinearity.
//!
//! Two forms are offered. The subtractive form removes a slowly accumulating
//! charge term from the fast response (Horsager et al. 2009, Nanduri et al.
//! 2012). The divisive form normalises the response by its own recent
//! history, which produces the same rise-then-adapt trajectory under
//! sustained drive but saturates instead of cutting off.

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Maps the fast response and the current adaptation level to the
/// gain-controlled response.
pub trait GainControl {
    fn respond(&self, drive: f64, adaptation: f64) -> f64;
}

/// `max(r − scale · adaptation, 0)`, adaptation following accumulated charge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subtractive {
    /// Adaptation time constant (s).
    pub tau: f64,
    /// Weight of the charge term (ε).
    pub scale: f64,
}

impl Default for Subtractive {
    fn default() -> Self {
        Self {
            tau: 45.25e-3,
            scale: 8.73,
        }
    }
}

impl GainControl for Subtractive {
    fn respond(&self, drive: f64, adaptation: f64) -> f64 {
        (drive - self.scale * adaptation).max(0.0)
    }
}

/// `max(r, 0) / (1 + (adaptation/σ)^p)`, adaptation following the rectified response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Divisive {
    /// Adaptation time constant (s).
    pub tau: f64,
    pub exponent: f64,
    pub semi_saturation: f64,
}

impl Default for Divisive {
    fn default() -> Self {
        Self {
            tau: 50e-3,
            exponent: 2.0,
            semi_saturation: 1.0,
        }
    }
}

impl GainControl for Divisive {
    fn respond(&self, drive: f64, adaptation: f64) -> f64 {
        drive.max(0.0) / (1.0 + (adaptation.max(0.0) / self.semi_saturation).powf(self.exponent))
    }
}

/// What a gain-control stage's adaptation integrator is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationSource {
    /// The running integral of rectified activation.
    AccumulatedCharge,
    /// The rectified fast response.
    RectifiedResponse,
}

/// The configured gain-control stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GainControlModel {
    Off,
    Subtractive(Subtractive),
    Divisive(Divisive),
}

impl Default for GainControlModel {
    fn default() -> Self {
        GainControlModel::Subtractive(Subtractive::default())
    }
}

impl GainControlModel {
    /// Adaptation input and time constant, or `None` when disabled.
    pub fn adaptation(&self) -> Option<(AdaptationSource, f64)> {
        match self {
            GainControlModel::Off => None,
            GainControlModel::Subtractive(s) => Some((AdaptationSource::AccumulatedCharge, s.tau)),
            GainControlModel::Divisive(d) => Some((AdaptationSource::RectifiedResponse, d.tau)),
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SimulationError::config(format!(
                    "gain control {} must be positive, got {}",
                    name, v
                )))
            }
        };
        match self {
            GainControlModel::Off => Ok(()),
            GainControlModel::Subtractive(s) => {
                positive("tau", s.tau)?;
                if s.scale.is_finite() && s.scale >= 0.0 {
                    Ok(())
                } else {
                    Err(SimulationError::config(format!(
                        "gain control scale must be non-negative, got {}",
                        s.scale
                    )))
                }
            }
            GainControlModel::Divisive(d) => {
                positive("tau", d.tau)?;
                positive("exponent", d.exponent)?;
                positive("semi_saturation", d.semi_saturation)
            }
        }
    }
}

impl GainControl for GainControlModel {
    fn respond(&self, drive: f64, adaptation: f64) -> f64 {
        match self {
            GainControlModel::Off => drive,
            GainControlModel::Subtractive(s) => s.respond(drive, adaptation),
            GainControlModel::Divisive(d) => d.respond(drive, adaptation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_subtractive_clips_at_zero() {
        let s = Subtractive { tau: 0.05, scale: 2.0 };
        assert_relative_eq!(s.respond(10.0, 1.0), 8.0);
        assert_eq!(s.respond(1.0, 1.0), 0.0);
    }

    #[test]
    fn test_divisive_halves_at_semi_saturation() {
        let d = Divisive {
            tau: 0.05,
            exponent: 2.0,
            semi_saturation: 3.0,
        };
        assert_relative_eq!(d.respond(8.0, 0.0), 8.0);
        assert_relative_eq!(d.respond(8.0, 3.0), 4.0);
        assert_eq!(d.respond(-8.0, 0.0), 0.0);
    }

    #[test]
    fn test_off_is_identity() {
        assert_eq!(GainControlModel::Off.respond(-3.5, 100.0), -3.5);
        assert!(GainControlModel::Off.adaptation().is_none());
    }

    #[test]
    fn test_validation() {
        assert!(GainControlModel::Divisive(Divisive {
            semi_saturation: 0.0,
            ..Divisive::default()
        })
        .validate()
        .is_err());
        assert!(GainControlModel::Subtractive(Subtractive { tau: 0.05, scale: -1.0 })
            .validate()
            .is_err());
        GainControlModel::default().validate().unwrap();
    }

    #[test]
    fn test_config_tagging() {
        let g: GainControlModel =
            serde_json::from_str(r#"{"kind": "divisive", "tau": 0.1, "exponent": 1.5, "semi_saturation": 2.0}"#)
                .unwrap();
        assert_eq!(
            g,
            GainControlModel::Divisive(Divisive {
                tau: 0.1,
                exponent: 1.5,
                semi_saturation: 2.0
            })
        );
        let off: GainControlModel = serde_json::from_str(r#"{"kind": "off"}"#).unwrap();
        assert_eq!(off, GainControlModel::Off);
    }
}
