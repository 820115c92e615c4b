//! Error taxonomy for the simulation pipeline.

use phosphene_compute::ComputeError;
use phosphene_geometry::GeometryError;
use thiserror::Error;

/// A resampling request that would alias a waveform's features.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Time step {requested_step:.3e} s exceeds the waveform's feature width {feature_width:.3e} s")]
pub struct SamplingError {
    pub requested_step: f64,
    pub feature_width: f64,
}

/// Errors that can occur while building or running a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Coordinate outside the retinotopic domain: {0}")]
    OutOfDomain(#[source] GeometryError),

    #[error("Stimulus references electrode '{0}', which is not in the array")]
    UnknownElectrode(String),

    #[error("Cannot sample stimulus on electrode '{electrode}': {source}")]
    Sampling {
        electrode: String,
        #[source]
        source: SamplingError,
    },

    #[error(
        "Time step {step:.3e} s is unstable for {scheme} with time constant {tau:.3e} s \
         (dt/tau must not exceed {max_ratio})"
    )]
    IntegrationStability {
        scheme: &'static str,
        step: f64,
        tau: f64,
        max_ratio: f64,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Simulation cancelled after {completed_batches} of {total_batches} batches")]
    Cancelled {
        completed_batches: usize,
        total_batches: usize,
    },

    #[error("Compute backend error: {0}")]
    Compute(#[source] ComputeError),
}

impl SimulationError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SimulationError::Configuration(msg.into())
    }
}

impl From<GeometryError> for SimulationError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::OutOfDomain { .. } => SimulationError::OutOfDomain(e),
            other => SimulationError::Configuration(other.to_string()),
        }
    }
}

impl From<ComputeError> for SimulationError {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::Cancelled {
                completed_batches,
                total_batches,
            } => SimulationError::Cancelled {
                completed_batches,
                total_batches,
            },
            other => SimulationError::Compute(other),
        }
    }
}
