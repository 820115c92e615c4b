//! Single-threaded backend, mainly a reference for the parallel one.

use ndarray::Array2;

use crate::backend::{
    batch_count, into_matrix, BackendType, BatchFill, ComputeBackend, ComputeError, DeviceInfo,
    RowFill,
};
use crate::cancel::CancelToken;

/// Runs every row and batch in order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl SerialBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            threads: 1,
        }
    }

    fn parallel_row_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_row: &RowFill<'_>,
    ) -> Result<Array2<f64>, ComputeError> {
        let mut data = vec![0.0; rows * cols];
        if cols > 0 {
            for (i, row) in data.chunks_mut(cols).enumerate() {
                fill_row(i, row);
            }
        }
        into_matrix(rows, cols, data)
    }

    fn batched_fill(
        &self,
        rows: usize,
        cols: usize,
        batch_rows: usize,
        cancel: &CancelToken,
        fill_batch: &BatchFill<'_>,
    ) -> Result<Array2<f64>, ComputeError> {
        let batch_rows = batch_rows.max(1);
        let total = batch_count(rows, batch_rows);
        let mut data = vec![0.0; rows * cols];

        for b in 0..total {
            if cancel.is_cancelled() {
                return Err(ComputeError::Cancelled {
                    completed_batches: b,
                    total_batches: total,
                });
            }
            let start = b * batch_rows;
            let end = (start + batch_rows).min(rows);
            fill_batch(start..end, &mut data[start * cols..end * cols]);
        }

        into_matrix(rows, cols, data)
    }
}
