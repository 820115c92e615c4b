//! Error types for geometry construction and coordinate mapping.

use thiserror::Error;

/// Errors raised while building electrode arrays or mapping coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Point ({x:.3}, {y:.3}) is outside the valid domain of the {map} map: {reason}")]
    OutOfDomain {
        map: &'static str,
        x: f64,
        y: f64,
        reason: &'static str,
    },

    #[error("Duplicate electrode identifier '{0}'")]
    DuplicateElectrode(String),

    #[error("Invalid electrode '{id}': {reason}")]
    InvalidElectrode { id: String, reason: String },

    #[error("Invalid geometry parameter: {0}")]
    InvalidParameter(String),
}

impl GeometryError {
    pub(crate) fn out_of_domain(map: &'static str, point: [f64; 2], reason: &'static str) -> Self {
        GeometryError::OutOfDomain {
            map,
            x: point[0],
            y: point[1],
            reason,
        }
    }
}
