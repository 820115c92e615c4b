//! # Phosphene Core
//!
//! The simulation pipeline of the Phosphene framework: from per-electrode
//! current waveforms to the brightness a prosthesis user would see.
//!
//! ## Architecture
//!
//! ```text
//! Stimulus ──► spatial spread ──► temporal cascade ──► renderer ──► Percept
//!  (µA, s)     (location × t)     (per location)       (deg grid)
//! ```
//!
//! The [`simulation::Simulation`] orchestrator drives the stages over a
//! [`phosphene_compute::ComputeBackend`], caching the spread weights between
//! runs.
//!
//! ## Modules
//!
//! - [`stimulus`] — Waveforms, pulse trains, and resampling onto a time base.
//! - [`spatial`] — Current spread, weight matrix, and activation.
//! - [`temporal`] — Leaky-integrator cascade with gain control.
//! - [`render`] — Output grid, percept frames, and ON/OFF filtering.
//! - [`simulation`] — Orchestrator with weight cache and cancellation.
//! - [`config`] — Serde configuration with defaults.
//! - [`types`] — Intermediate activation and brightness maps.
//! - [`error`] — Error taxonomy.

pub mod config;
pub mod error;
pub mod render;
pub mod simulation;
pub mod spatial;
pub mod stimulus;
pub mod temporal;
pub mod types;

pub use config::SimulationConfig;
pub use error::{SamplingError, SimulationError};
pub use render::{OnOffParams, OutputGrid, Percept, PerceptFrame};
pub use simulation::Simulation;
pub use stimulus::{Polarity, PulseTrain, Stimulus, TimeBase, Waveform};
