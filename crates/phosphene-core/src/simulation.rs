//! Simulation orchestrator.
//!
//! A [`Simulation`] owns the immutable geometry and configuration and runs
//! any number of stimuli through the pipeline:
//!
//! 1. check that every stimulated electrode exists;
//! 2. build a shared time base spanning the stimulus plus the decay tail;
//! 3. resample every waveform onto it;
//! 4. fetch the spread weights, rebuilding them only when geometry, spread
//!    or grid changed;
//! 5. integrate batches of locations on the compute backend, keeping one
//!    sample per frame (each batch works through its locations one by one,
//!    holding two full-resolution traces);
//! 6. render the frames onto the output grid.
//!
//! Cancellation is checked between batches. A cancelled run returns
//! [`SimulationError::Cancelled`] and no partial percept.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use ndarray::Array1;
use phosphene_compute::{CancelToken, ComputeBackend, CpuBackend};
use phosphene_geometry::{ElectrodeArray, RetinotopicMap};

use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::render::{Percept, Renderer};
use crate::spatial::{activation_into, SimulationGrid, SpreadModel, WeightMatrix};
use crate::stimulus::{Stimulus, StimulusMatrix, TimeBase};
use crate::temporal::{IntegratorState, TemporalModel};

struct CachedWeights {
    key: u64,
    weights: Arc<WeightMatrix>,
}

/// A configured simulation of one electrode array.
pub struct Simulation {
    array: ElectrodeArray,
    config: SimulationConfig,
    backend: Arc<dyn ComputeBackend>,
    temporal: TemporalModel,
    grid: SimulationGrid,
    renderer: Renderer,
    cache: Mutex<Option<CachedWeights>>,
    rebuilds: AtomicUsize,
}

impl Simulation {
    /// Validate `config` and prepare the grid and renderer for `array`.
    pub fn new(
        array: ElectrodeArray,
        config: SimulationConfig,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let temporal = TemporalModel::new(config.temporal.clone())?;
        let grid = SimulationGrid::covering(
            &config.output.grid,
            &config.retinotopy,
            config.spatial.tissue_step,
        )?;
        let renderer = Renderer::new(
            config.output.grid.clone(),
            &config.retinotopy,
            &grid,
            config.output.background,
        )?;

        log::info!(
            "Simulation: {} electrodes, {} map, {}x{} tissue grid at {} µm, backend {}",
            array.len(),
            config.retinotopy.name(),
            grid.nx,
            grid.ny,
            grid.step,
            backend.device_info().name
        );

        Ok(Self {
            array,
            config,
            backend,
            temporal,
            grid,
            renderer,
            cache: Mutex::new(None),
            rebuilds: AtomicUsize::new(0),
        })
    }

    /// Same as [`new`](Self::new) on the CPU backend with the global thread pool.
    pub fn with_cpu(array: ElectrodeArray, config: SimulationConfig) -> Result<Self, SimulationError> {
        Self::new(array, config, Arc::new(CpuBackend::new()))
    }

    pub fn array(&self) -> &ElectrodeArray {
        &self.array
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &SimulationGrid {
        &self.grid
    }

    /// Replace the spread model. The cached weights are dropped.
    pub fn set_spread(&mut self, spread: SpreadModel) -> Result<(), SimulationError> {
        spread.validate()?;
        self.config.spatial.spread = spread;
        self.invalidate_cache();
        Ok(())
    }

    /// Drop the cached weights so the next run rebuilds them.
    pub fn invalidate_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// How many times the weight matrix has been computed.
    pub fn weight_rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Hash of everything the weight matrix depends on.
    pub fn cache_key(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.array.content_hash(&mut h);
        self.config.spatial.spread.content_hash(&mut h);
        self.config.spatial.weight_tolerance.to_bits().hash(&mut h);
        self.grid.content_hash(&mut h);
        h.finish()
    }

    fn weights(&self) -> Result<Arc<WeightMatrix>, SimulationError> {
        let key = self.cache_key();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref().filter(|c| c.key == key) {
            log::debug!("Reusing cached weights ({:016x})", key);
            return Ok(Arc::clone(&cached.weights));
        }

        let started = Instant::now();
        let weights = Arc::new(WeightMatrix::compute(
            &self.array,
            &self.grid,
            &self.config.spatial.spread,
            self.config.spatial.weight_tolerance,
            self.backend.as_ref(),
        )?);
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        log::debug!("Weight matrix rebuilt in {:.2?}", started.elapsed());

        *cache = Some(CachedWeights {
            key,
            weights: Arc::clone(&weights),
        });
        Ok(weights)
    }

    /// Run `stimulus` to completion.
    pub fn run(&self, stimulus: &Stimulus) -> Result<Percept, SimulationError> {
        self.run_with_cancel(stimulus, &CancelToken::new())
    }

    /// Run `stimulus`, stopping between batches once `cancel` is set.
    pub fn run_with_cancel(
        &self,
        stimulus: &Stimulus,
        cancel: &CancelToken,
    ) -> Result<Percept, SimulationError> {
        let started = Instant::now();
        if let Some(unknown) = stimulus.electrode_ids().find(|id| self.array.index_of(id).is_none()) {
            return Err(SimulationError::UnknownElectrode(unknown.to_string()));
        }

        let dt = self.temporal.dt();
        let (start, end) = stimulus.time_range().unwrap_or((0.0, 0.0));
        let time_base = TimeBase::covering(start, end + self.config.output.tail, dt)?;
        let matrix = StimulusMatrix::assemble(stimulus, &self.array, time_base)?;
        let weights = self.weights()?;

        let stride = self.config.frame_stride();
        let frame_samples: Vec<usize> = (0..time_base.len).step_by(stride).collect();
        let n_frames = frame_samples.len();
        let silent = matrix.is_silent();
        log::debug!(
            "Time base: {} samples of {:.3e} s from {:.4} s, {} frames",
            time_base.len,
            dt,
            time_base.start,
            n_frames
        );

        let brightness = self.backend.batched_fill(
            self.grid.len(),
            n_frames,
            self.config.execution.batch_size,
            cancel,
            &|rows, block| {
                if silent {
                    return;
                }
                // One location at a time through reused buffers, so a batch
                // holds two time-base traces whatever its size.
                let mut activation = Array1::<f64>::zeros(time_base.len);
                let mut response = Array1::<f64>::zeros(time_base.len);
                for l in rows.clone().filter(|&l| weights.is_active(l)) {
                    activation_into(&weights, &matrix, l, activation.view_mut());
                    self.temporal.integrate_trace(
                        &mut IntegratorState::default(),
                        activation.view(),
                        response.view_mut(),
                    );
                    let offset = (l - rows.start) * n_frames;
                    let out = &mut block[offset..offset + n_frames];
                    for (o, &k) in out.iter_mut().zip(&frame_samples) {
                        *o = response[k];
                    }
                }
            },
        )?;

        let times: Vec<f64> = frame_samples.iter().map(|&k| time_base.time(k)).collect();
        let percept = self.renderer.render(&brightness, &times, stride as f64 * dt);
        log::info!(
            "Simulated {} of {} locations over {} samples in {:.2?}; peak {:.4} {}",
            weights.active_count(),
            self.grid.len(),
            time_base.len,
            started.elapsed(),
            percept.peak(),
            percept.units()
        );
        Ok(percept)
    }
}
