//! # Phosphene Geometry
//!
//! Geometry handling for the Phosphene framework. This crate provides:
//!
//! - **Electrodes** ([`electrode`]) — Individual stimulation contacts and the
//!   immutable arrays that own them, including grid and Argus II presets.
//! - **Transformations** ([`transform`]) — Rotate, scale, and translate
//!   operations used to place an array on the tissue surface.
//! - **Retinotopy** ([`retinotopy`]) — Mappings between visual-field degrees
//!   and tissue micrometres (linear, Watson 2014, cortical log-polar).
//!
//! All tissue coordinates are in micrometres on the stimulated surface
//! (`z = 0`), with `z` measuring height above it. Visual-field coordinates are
//! in degrees relative to the fovea.

pub mod electrode;
pub mod error;
pub mod retinotopy;
pub mod transform;

pub use electrode::{Electrode, ElectrodeArray};
pub use error::GeometryError;
pub use retinotopy::{
    CorticalLogPolar, LinearRetinotopy, RetinotopicMap, Retinotopy, WatsonRetinotopy,
};
pub use transform::Transform;
