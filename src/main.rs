//! Transfer Analyzer - diagnostic plots for P2P backup simulation runs.
//!
//! Loads a metrics archive saved by a simulation run, detects whether the
//! run used single or parallel transfer mode, and renders the analysis
//! report for it.

mod analysis;
mod metrics;
mod plot;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use metrics::LoadError;
use std::path::PathBuf;
use std::process::ExitCode;

/// Analyze P2P transfer data from a simulation run
#[derive(Parser, Debug)]
#[command(name = "xferplot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Simulation data file (.json, extension optional)
    filename: String,

    /// Name for the output plot
    #[arg(long, default_value = "plot.svg")]
    plot_name: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("P2P Transfer Analysis");
    info!("{}", "=".repeat(50));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(LoadError::NotFound(_)) = err.downcast_ref::<LoadError>() {
                error!("{err}");
                error!("Make sure to run the simulation first and save metrics.");
                ExitCode::from(2)
            } else {
                error!("Error during analysis: {err:#}");
                ExitCode::FAILURE
            }
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let record = metrics::load_metrics(&args.filename)?;

    let mode_name = if record.metadata.parallel_enabled {
        "parallel"
    } else {
        "single"
    };
    info!(
        "Loaded {} mode data: {} transfers",
        mode_name,
        record.transfers.len()
    );
    info!(
        "  Simulation time: {:.2} years",
        record.metadata.simulation_end_time / analysis::SECONDS_PER_YEAR
    );
    info!("  Total nodes: {}", record.metadata.total_nodes);
    info!("  Data loss events: {}", record.metadata.data_loss_events);

    info!("Generating {mode_name} mode analysis plots...");
    plot::render_report(&record, &args.plot_name)?;

    info!("Analysis complete! File saved as {}", args.plot_name.display());
    Ok(())
}
