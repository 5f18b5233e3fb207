//! genrisk - Genetic risk assessment toolkit.
//! Entry point for the `genrisk` binary: model-run records and the run store.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use genrisk_config::Config;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Genetic risk assessment toolkit
#[derive(Parser)]
#[command(name = "genrisk")]
#[command(about = "Inspect, validate and record genrisk model-training runs")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Tracking directory holding run records (overrides genrisk.toml)
    #[arg(long, global = true)]
    tracking_root: Option<PathBuf>,

    /// Experiment id inside the tracking directory
    #[arg(long, global = true)]
    experiment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a model-run record
    Inspect {
        /// MLmodel file or the model directory containing it
        path: PathBuf,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a model-run record, its model files and its input example
    Validate {
        /// MLmodel file or the model directory containing it
        path: PathBuf,
    },

    /// Record a new training run in the run store
    Record(commands::record::RecordArgs),

    /// Browse the run store
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
}

#[derive(Subcommand)]
enum RunsCommand {
    /// List every recorded run, oldest first
    List,

    /// Show the newest run
    Latest {
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load().context("loading genrisk configuration")?;
    if let Some(root) = cli.tracking_root {
        config.tracking.root = root;
    }
    if let Some(experiment) = cli.experiment {
        config.tracking.experiment_id = experiment;
    }

    let filter = if cli.verbose {
        EnvFilter::new("genrisk=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(
        tracking_root = %config.tracking.root.display(),
        experiment = %config.tracking.experiment_id,
        "genrisk {}",
        env!("CARGO_PKG_VERSION")
    );

    match cli.command {
        Commands::Inspect { path, json } => commands::inspect::run(&path, json),
        Commands::Validate { path } => commands::validate::run(&path),
        Commands::Record(args) => commands::record::run(&config, args),
        Commands::Runs { command } => match command {
            RunsCommand::List => commands::runs::list(&config),
            RunsCommand::Latest { json } => commands::runs::latest(&config, json),
        },
    }
}
