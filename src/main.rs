use std::path::PathBuf;

use arcgis_scrap::{aggregate, info_time, paginate, Result, ScraperConfig, Termination};
use chrono::Local;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(version, about = "Fetch an ArcGIS FeatureServer layer in object ID windows")]
struct Cli {
    /// JSON setup file describing the layer.
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the layer into partial files.
    Paginate,
    /// Merge every partial file in the save directory into one CSV.
    Aggregate,
    /// Paginate, then optionally aggregate.
    Run {
        /// Create the CSV once all windows are fetched.
        #[arg(long)]
        aggregate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let cli = Cli::parse();
    let config = ScraperConfig::from_file(&cli.config)?;

    match cli.command {
        Command::Paginate => {
            run_paginate(&config).await?;
        }
        Command::Aggregate => {
            aggregate(&config).await?;
        }
        Command::Run { aggregate: and_aggregate } => {
            let finished = run_paginate(&config).await?;
            if and_aggregate && finished {
                info_time!("Creating CSV file.");
                aggregate(&config).await?;
            } else {
                info_time!("No CSV file created.");
            }
        }
    }
    info_time!(start_time, "Full program time:");

    Ok(())
}

/// Returns `false` when the run stopped without fetching anything usable.
async fn run_paginate(config: &ScraperConfig) -> Result<bool> {
    let report = paginate(config).await?;
    info_time!("{}", "=".repeat(50));
    Ok(!matches!(report.termination, Termination::UnsupportedFormat(_)))
}
