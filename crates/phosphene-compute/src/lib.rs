//! # Phosphene Compute
//!
//! Compute backend abstraction for the Phosphene framework. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the simulation stages from how row-parallel work is scheduled.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |
//! | Serial | always | Implemented |
//!
//! Every backend produces bit-identical output for the same fill closure:
//! each row is written by exactly one call and rows never observe each other.

pub mod backend;
pub mod cancel;
pub mod serial;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, BatchFill, ComputeBackend, ComputeError, DeviceInfo, RowFill};
pub use cancel::CancelToken;
pub use serial::SerialBackend;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
