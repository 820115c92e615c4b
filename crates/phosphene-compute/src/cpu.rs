//! CPU compute backend using Rayon for shared-memory parallelism.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;

use crate::backend::{
    batch_count, into_matrix, BackendType, BatchFill, ComputeBackend, ComputeError, DeviceInfo,
    RowFill,
};
use crate::cancel::CancelToken;

/// CPU backend that parallelises work across threads via Rayon.
pub struct CpuBackend {
    num_threads: usize,
    /// Dedicated pool when a thread count was requested; otherwise the global pool.
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CpuBackend {
    /// Create a new CPU backend using the global Rayon pool.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with its own pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("phosphene-worker-{}", i))
            .build()
            .map_err(|e| ComputeError::Unavailable(format!("Failed to build thread pool: {}", e)))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(Arc::new(pool)),
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            threads: self.num_threads,
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
            self.install(|| {
                data.par_chunks_mut(cols)
                    .enumerate()
                    .for_each(|(i, row)| fill_row(i, row));
            });
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
        if cancel.is_cancelled() {
            return Err(ComputeError::Cancelled {
                completed_batches: 0,
                total_batches: total,
            });
        }

        let mut data = vec![0.0; rows * cols];
        let completed = AtomicUsize::new(0);

        if cols > 0 {
            self.install(|| {
                data.par_chunks_mut(batch_rows * cols)
                    .enumerate()
                    .for_each(|(b, block)| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let start = b * batch_rows;
                        let end = (start + batch_rows).min(rows);
                        fill_batch(start..end, block);
                        completed.fetch_add(1, Ordering::Relaxed);
                    });
            });
        } else {
            completed.store(total, Ordering::Relaxed);
        }

        let completed = completed.into_inner();
        if cancel.is_cancelled() && completed < total {
            log::debug!("Batched fill cancelled: {}/{} batches done", completed, total);
            return Err(ComputeError::Cancelled {
                completed_batches: completed,
                total_batches: total,
            });
        }

        into_matrix(rows, cols, data)
    }
}
