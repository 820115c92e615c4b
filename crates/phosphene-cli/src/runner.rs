//! Job runner: builds the array, stimulus and backend from a job config,
//! runs the simulation and writes the results.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use phosphene_compute::{ComputeBackend, CpuBackend, SerialBackend};
use phosphene_core::render::{filter_on_off, recombine};
use phosphene_core::{OnOffParams, Percept, Simulation, Stimulus};
use phosphene_geometry::{Electrode, ElectrodeArray, Transform};

use crate::config::{ArrayConfig, ArrayLayout, JobConfig, RunConfig};

/// Build the electrode array: the preset (placed) followed by any explicit contacts.
pub fn build_array(job: &JobConfig) -> Result<ElectrodeArray> {
    let mut electrodes: Vec<Electrode> = match &job.array {
        Some(preset) => place_preset(preset)?.electrodes().to_vec(),
        None => Vec::new(),
    };

    for cfg in &job.electrodes {
        let mut electrode = Electrode::new(cfg.id.clone(), cfg.position, cfg.radius)
            .with_context(|| format!("Invalid electrode '{}'", cfg.id))?;
        if let Some(orientation) = cfg.orientation {
            electrode = electrode
                .with_orientation(orientation)
                .with_context(|| format!("Invalid orientation for electrode '{}'", cfg.id))?;
        }
        electrodes.push(electrode);
    }

    if electrodes.is_empty() {
        bail!("Job defines no electrodes: add an [array] preset or [[electrode]] entries");
    }
    ElectrodeArray::new(electrodes).context("Failed to assemble electrode array")
}

fn place_preset(preset: &ArrayConfig) -> Result<ElectrodeArray> {
    let array = match &preset.layout {
        ArrayLayout::ArgusIi => ElectrodeArray::argus_ii(),
        ArrayLayout::Grid {
            rows,
            cols,
            spacing,
            radius,
            height,
        } => ElectrodeArray::grid(*rows, *cols, *spacing, *radius, *height)
            .context("Invalid grid array")?,
    };

    // Rotate about the footprint centre, then move into place.
    let [cx, cy] = match array.footprint() {
        Some((lo, hi)) => [(lo[0] + hi[0]) / 2.0, (lo[1] + hi[1]) / 2.0],
        None => [0.0, 0.0],
    };
    let [dx, dy, dz] = preset.translate;
    let placement = Transform::translation(-cx, -cy, 0.0)
        .then(&Transform::rotation_z(preset.rotate_deg.to_radians()))
        .then(&Transform::translation(cx + dx, cy + dy, dz));
    Ok(array.transformed(&placement))
}

/// Render every configured pulse train at the simulation time step.
pub fn build_stimulus(job: &JobConfig) -> Result<Stimulus> {
    let dt = job.simulation.temporal.dt;
    let trains = job
        .pulse_trains
        .iter()
        .map(|p| (p.electrode.clone(), p.train.clone()));
    Stimulus::from_pulse_trains(trains, dt).context("Failed to build stimulus")
}

/// Select the compute backend named in the run section.
pub fn create_backend(run: &RunConfig) -> Result<Arc<dyn ComputeBackend>> {
    match run.backend.to_lowercase().as_str() {
        "serial" => Ok(Arc::new(SerialBackend::new())),
        "cpu" | "auto" => match run.threads {
            Some(n) => Ok(Arc::new(
                CpuBackend::with_threads(n).context("Failed to start CPU thread pool")?,
            )),
            None => Ok(Arc::new(CpuBackend::new())),
        },
        other => bail!("Unknown backend '{}': expected \"cpu\" or \"serial\"", other),
    }
}

/// Build everything a job needs without running it.
pub fn prepare(job: &JobConfig) -> Result<(Simulation, Stimulus)> {
    let array = build_array(job)?;
    let stimulus = build_stimulus(job)?;
    let backend = create_backend(&job.run)?;
    let simulation = Simulation::new(array, job.simulation.clone(), backend)
        .context("Invalid simulation settings")?;
    Ok((simulation, stimulus))
}

/// Run a job to completion.
pub fn run_simulation(job: &JobConfig) -> Result<Percept> {
    let (simulation, stimulus) = prepare(job)?;
    println!(
        "  {} electrodes, {} stimulated, {}x{} tissue grid",
        simulation.array().len(),
        stimulus.len(),
        simulation.grid().nx,
        simulation.grid().ny
    );
    simulation.run(&stimulus).context("Simulation failed")
}

/// Write the full percept as JSON.
pub fn write_percept_json(percept: &Percept, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), percept)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Percept written to {}", path.display());
    Ok(())
}

/// Write per-frame peak and mean brightness as CSV.
pub fn write_trace_csv(percept: &Percept, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let grid = percept.grid();
    writeln!(out, "# Phosphene brightness trace")?;
    writeln!(
        out,
        "# grid: x [{}, {}] deg, y [{}, {}] deg, {}x{} pixels",
        grid.x_range[0], grid.x_range[1], grid.y_range[0], grid.y_range[1], grid.nx, grid.ny
    )?;
    writeln!(out, "# background: {}", percept.background())?;
    writeln!(out, "time_s,peak,mean")?;
    for frame in percept.frames() {
        let peak = frame.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = frame.values.mean().unwrap_or(0.0);
        writeln!(out, "{:.6e},{:.6e},{:.6e}", frame.time, peak, mean)?;
    }
    out.flush()?;
    log::info!("Brightness trace written to {}", path.display());
    Ok(())
}

/// Filter through the ON/OFF bank and write the normal (ON − OFF) and
/// prosthetic (ON + OFF) brightness traces.
pub fn write_on_off_traces(
    percept: &Percept,
    params: &OnOffParams,
    out_dir: &Path,
) -> Result<()> {
    let (on, off) = filter_on_off(percept, params).context("ON/OFF filtering failed")?;
    let (normal, prosthetic) = recombine(&on, &off).context("ON/OFF recombination failed")?;
    write_trace_csv(&normal, &out_dir.join("brightness_normal.csv"))?;
    write_trace_csv(&prosthetic, &out_dir.join("brightness_prosthetic.csv"))?;
    Ok(())
}
