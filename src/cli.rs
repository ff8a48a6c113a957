use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cadenza_knn::DistanceMetric;

/// Cadenza exact nearest-neighbor search.
#[derive(Parser)]
#[command(
    name = "cadenza",
    version,
    about = "Exact k-nearest-neighbor search with scalar and data-parallel backends"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Probe every device kind and report the backend that would be used.
    Probe(ProbeArgs),
    /// Compare the selected backend against the scalar reference on random data.
    Bench(BenchArgs),
}

/// Arguments for the `probe` subcommand.
#[derive(clap::Args)]
pub struct ProbeArgs {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `bench` subcommand.
#[derive(clap::Args)]
pub struct BenchArgs {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override number of candidate rows.
    #[arg(short = 'n', long)]
    pub candidates: Option<usize>,

    /// Override feature dimension.
    #[arg(short, long)]
    pub dims: Option<usize>,

    /// Override number of queries.
    #[arg(short, long)]
    pub queries: Option<usize>,

    /// Override RNG seed.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Override number of neighbors.
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Override distance metric (euclidean or manhattan).
    #[arg(short, long)]
    pub metric: Option<DistanceMetric>,
}
