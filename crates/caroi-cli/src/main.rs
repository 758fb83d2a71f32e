mod commands;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "caroi", about = "Calcium imaging ROI analysis tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads for parallel stages (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recording metadata
    Info(commands::info::InfoArgs),
    /// Fit photobleaching models to the mean intensity
    Bleaching(commands::bleaching::BleachingArgs),
    /// Compute the per-pixel fluctuation map
    Fluctuation(commands::fluctuation::FluctuationArgs),
    /// Detect ROIs from the fluctuation map
    AutoRoi(commands::auto_roi::AutoRoiArgs),
    /// Extract intensity traces for given ROIs
    Traces(commands::traces::TracesArgs),
    /// Run the full analysis into a workspace directory
    Analyze(commands::analyze::AnalyzeArgs),
    /// Print a default session config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Bleaching(args) => commands::bleaching::run(args),
        Commands::Fluctuation(args) => commands::fluctuation::run(args),
        Commands::AutoRoi(args) => commands::auto_roi::run(args),
        Commands::Traces(args) => commands::traces::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
