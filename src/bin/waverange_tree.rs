//! Waverange tree-mode driver
//!
//! Builds a disk-resident metric tree from a dataset file and runs a batch
//! of range queries against it.
//!
//! Usage:
//!     waverange-tree [radius [dataset [query [page_size]]]]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use waverange::driver::{self, Mode, QueryConfig};

/// Range search over a disk-resident metric tree of wavelet vectors
#[derive(Parser)]
#[command(name = "waverange-tree")]
#[command(version)]
#[command(about = "Range queries over a disk-resident metric tree", long_about = None)]
struct Cli {
    /// Search radius
    #[arg(default_value_t = 10000.0)]
    radius: f64,

    /// Dataset file (one labeled vector per line)
    #[arg(default_value = "../data/dados-hist/dataHist20k-3.txt")]
    dataset: PathBuf,

    /// Query file (same format as the dataset)
    #[arg(default_value = "../data/dados-hist/dataHist20k-3-500.txt")]
    query: PathBuf,

    /// Disk page size in bytes
    #[arg(default_value_t = 131072)]
    page_size: usize,

    /// Also run a k-nearest batch after the range batch
    #[arg(long)]
    nearest: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    if cli.page_size == 0 {
        error!("page size must be greater than zero");
        return ExitCode::from(1);
    }
    if cli.radius < 0.0 {
        warn!(radius = cli.radius, "negative radius: distances are non-negative, expect no results");
    }

    let config = QueryConfig {
        mode: Mode::Tree,
        page_size: cli.page_size,
        dataset_path: cli.dataset,
        query_path: cli.query,
        radius: cli.radius,
        nearest: cli.nearest,
    };

    match driver::run(&config) {
        Ok(Some(report)) => {
            driver::emit_report(&report);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "tree run failed");
            ExitCode::from(2)
        }
    }
}
