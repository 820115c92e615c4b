//! Phosphene command-line interface.
//!
//! Run percept simulations from TOML job files:
//! ```sh
//! phosphene run job.toml
//! phosphene validate job.toml
//! phosphene electrodes job.toml
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phosphene")]
#[command(about = "Phosphene: visual prosthesis percept simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML job file.
    Run {
        /// Path to the job file.
        config: PathBuf,
        /// Output directory (overrides the job file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a job file and build its array, stimulus and grid without running.
    Validate {
        /// Path to the job file.
        config: PathBuf,
    },
    /// List the placed electrodes of a job's array.
    Electrodes {
        /// Path to the job file.
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Phosphene percept simulator");
            println!("===========================");
            let job = config::load_config(&config)?;
            println!("Job: {}", config.display());

            let percept = runner::run_simulation(&job)?;
            println!(
                "  {} frames at {:.1} ms, peak {:.4} {}",
                percept.len(),
                percept.frame_interval() * 1e3,
                percept.peak(),
                percept.units()
            );

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.run.directory));

            if job.run.save_trace {
                runner::write_trace_csv(&percept, &out_dir.join("brightness.csv"))?;
            }
            if job.run.save_percept {
                runner::write_percept_json(&percept, &out_dir.join("percept.json"))?;
            }
            if let Some(params) = &job.on_off {
                runner::write_on_off_traces(&percept, params, &out_dir)?;
            }

            println!("Results written to {}", out_dir.display());
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let (simulation, stimulus) = runner::prepare(&job)?;
            if let Some(params) = &job.on_off {
                params.validate()?;
            }
            println!("Job is valid: {}", config.display());
            println!(
                "  {} electrodes, {} stimulated, {} tissue locations",
                simulation.array().len(),
                stimulus.len(),
                simulation.grid().len()
            );
            Ok(())
        }
        Commands::Electrodes { config } => {
            let job = config::load_config(&config)?;
            let array = runner::build_array(&job)?;
            println!("{:<6} {:>10} {:>10} {:>8} {:>8}", "id", "x (µm)", "y (µm)", "z (µm)", "r (µm)");
            for e in &array {
                let [x, y, z] = e.position();
                println!("{:<6} {:>10.1} {:>10.1} {:>8.1} {:>8.1}", e.id(), x, y, z, e.radius());
            }
            Ok(())
        }
    }
}
