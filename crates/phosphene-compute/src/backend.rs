//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution strategies (thread
//! pool, single thread) so that the simulation stages in `phosphene-core`
//! remain scheduling-agnostic. The hot paths of the pipeline are all
//! row-parallel: one row per spatial location, written independently.

use std::ops::Range;

use ndarray::Array2;
use thiserror::Error;

use crate::cancel::CancelToken;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Computation cancelled after {completed_batches} of {total_batches} batches")]
    Cancelled {
        completed_batches: usize,
        total_batches: usize,
    },

    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub threads: usize,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
    Serial,
}

/// Fills one row: `(row_index, row_slice)`.
pub type RowFill<'a> = dyn Fn(usize, &mut [f64]) + Send + Sync + 'a;

/// Fills a contiguous block of rows: `(row_range, row_major_block)`.
pub type BatchFill<'a> = dyn Fn(Range<usize>, &mut [f64]) + Send + Sync + 'a;

/// Abstraction over compute backends.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Build a `rows x cols` matrix, calling `fill_row` once per row.
    ///
    /// Used for the spread-weight matrix, where each location's weights
    /// against every electrode are independent.
    fn parallel_row_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_row: &RowFill<'_>,
    ) -> Result<Array2<f64>, ComputeError>;

    /// Build a `rows x cols` matrix in blocks of `batch_rows` rows.
    ///
    /// `cancel` is checked before each batch starts. If it is set, no further
    /// batches run and the partially filled matrix is discarded.
    fn batched_fill(
        &self,
        rows: usize,
        cols: usize,
        batch_rows: usize,
        cancel: &CancelToken,
        fill_batch: &BatchFill<'_>,
    ) -> Result<Array2<f64>, ComputeError>;
}

/// Number of batches needed to cover `rows` in blocks of `batch_rows`.
pub(crate) fn batch_count(rows: usize, batch_rows: usize) -> usize {
    rows.div_ceil(batch_rows.max(1))
}

pub(crate) fn into_matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Array2<f64>, ComputeError> {
    Array2::from_shape_vec((rows, cols), data).map_err(|e| ComputeError::DeviceError(e.to_string()))
}
