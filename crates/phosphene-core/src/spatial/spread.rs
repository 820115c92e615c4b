//! Current-spread functions.
//!
//! | Model | Weight at distance `d` (µm) |
//! |-------|-----------------------------|
//! | Inverse square | `1` for `d ≤ r`, `(r/d)²` beyond |
//! | Exponential | `exp(−max(d − r, 0)/λ)` |
//! | Power law | `α / (α + dⁿ)` |
//!
//! `r` is the contact radius. All three are non-increasing in `d` and equal
//! to one at the contact.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Fraction of an electrode's current reaching a location `distance` µm away.
pub trait SpreadFunction {
    fn weight(&self, distance: f64) -> f64;
}

/// Inverse-square falloff outside a uniform disc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseSquare {
    pub radius: f64,
}

impl SpreadFunction for InverseSquare {
    fn weight(&self, distance: f64) -> f64 {
        if distance <= self.radius {
            1.0
        } else {
            let q = self.radius / distance;
            q * q
        }
    }
}

/// Exponential decay from the contact edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    pub radius: f64,
    pub decay_length: f64,
}

impl SpreadFunction for Exponential {
    fn weight(&self, distance: f64) -> f64 {
        (-(distance - self.radius).max(0.0) / self.decay_length).exp()
    }
}

/// Empirical power-law fit to measured current spread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLaw {
    pub alpha: f64,
    pub exponent: f64,
}

impl SpreadFunction for PowerLaw {
    fn weight(&self, distance: f64) -> f64 {
        self.alpha / (self.alpha + distance.max(0.0).powf(self.exponent))
    }
}

/// The configured spread model, before it is bound to a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpreadModel {
    InverseSquare,
    Exponential {
        /// Length constant λ (µm).
        decay_length: f64,
    },
    PowerLaw {
        alpha: f64,
        exponent: f64,
    },
}

impl Default for SpreadModel {
    fn default() -> Self {
        SpreadModel::InverseSquare
    }
}

impl SpreadModel {
    /// The fitted power law of Nanduri et al. (2012).
    pub fn power_law() -> Self {
        SpreadModel::PowerLaw {
            alpha: 14000.0,
            exponent: 1.69,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let check = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SimulationError::config(format!(
                    "spread {} must be positive and finite, got {}",
                    name, v
                )))
            }
        };
        match *self {
            SpreadModel::InverseSquare => Ok(()),
            SpreadModel::Exponential { decay_length } => check("decay_length", decay_length),
            SpreadModel::PowerLaw { alpha, exponent } => {
                check("alpha", alpha)?;
                check("exponent", exponent)
            }
        }
    }

    /// Bind the model to a contact of the given radius (µm).
    pub fn for_contact(&self, radius: f64) -> ContactSpread {
        match *self {
            SpreadModel::InverseSquare => ContactSpread::InverseSquare(InverseSquare { radius }),
            SpreadModel::Exponential { decay_length } => {
                ContactSpread::Exponential(Exponential {
                    radius,
                    decay_length,
                })
            }
            SpreadModel::PowerLaw { alpha, exponent } => {
                ContactSpread::PowerLaw(PowerLaw { alpha, exponent })
            }
        }
    }

    /// Feed the variant and its parameters into a hasher.
    pub fn content_hash<H: Hasher>(&self, state: &mut H) {
        match *self {
            SpreadModel::InverseSquare => 0u8.hash(state),
            SpreadModel::Exponential { decay_length } => {
                1u8.hash(state);
                decay_length.to_bits().hash(state);
            }
            SpreadModel::PowerLaw { alpha, exponent } => {
                2u8.hash(state);
                alpha.to_bits().hash(state);
                exponent.to_bits().hash(state);
            }
        }
    }
}

/// A spread model bound to one contact's radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactSpread {
    InverseSquare(InverseSquare),
    Exponential(Exponential),
    PowerLaw(PowerLaw),
}

impl SpreadFunction for ContactSpread {
    fn weight(&self, distance: f64) -> f64 {
        match self {
            ContactSpread::InverseSquare(f) => f.weight(distance),
            ContactSpread::Exponential(f) => f.weight(distance),
            ContactSpread::PowerLaw(f) => f.weight(distance),
        }
    }
}
