//! Waverange scan-mode driver
//!
//! Writes the dataset to a page-aligned scratch file and answers every
//! range query by rereading the whole file, one page at a time. The
//! brute-force baseline the tree is measured against.
//!
//! Usage:
//!     waverange-scan <page_size> <radius> <dataset> <query>

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use waverange::driver::{self, Mode, QueryConfig};

/// Range search by paged sequential scan over wavelet vectors
#[derive(Parser)]
#[command(name = "waverange-scan")]
#[command(version)]
#[command(about = "Range queries by paged sequential scan", long_about = None)]
struct Cli {
    /// Disk page size in bytes
    page_size: usize,

    /// Search radius
    radius: f64,

    /// Dataset file (one labeled vector per line)
    dataset: PathBuf,

    /// Query file (same format as the dataset)
    query: PathBuf,
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
        mode: Mode::Scan,
        page_size: cli.page_size,
        dataset_path: cli.dataset,
        query_path: cli.query,
        radius: cli.radius,
        nearest: None,
    };

    match driver::run(&config) {
        Ok(Some(report)) => {
            driver::emit_report(&report);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "scan run failed");
            ExitCode::from(2)
        }
    }
}
