//! # Query Driver
//!
//! Runs a batch of range queries from a query file against one of the two
//! back-ends and reports per-query statistics.
//!
//! ## Statistics reset policy
//!
//! The two back-ends reset their counters differently, and the difference
//! is deliberate:
//! - **tree**: counters are reset once before the batch; the reported
//!   averages are batch totals divided by the query count.
//! - **scan**: counters are reset before every query, because the paged
//!   file is reread from the start each time; per-query figures are summed
//!   and then divided by the query count.
//!
//! A query whose distance evaluation fails is logged and skipped; the
//! batch continues, and the final report covers the successful pairs. The
//! JSON block is emitted whenever at least one query completed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::dataset::{Dataset, LoadError};
use crate::adapters::scan::ScanIndex;
use crate::adapters::slim::SlimTree;
use crate::core::{ComplexObject, WaveletDistance};
use crate::ports::{IndexError, MetricIndex};

/// Scratch file used by the tree back-end's page manager
pub const TREE_SCRATCH_FILE: &str = "SlimTreeComplex.dat";

/// Scratch file used by the scan back-end's paged store
pub const SCAN_SCRATCH_FILE: &str = "complex_objects_paged.dat";

/// Which back-end answers the queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Tree,
    Scan,
}

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub mode: Mode,
    pub page_size: usize,
    pub dataset_path: PathBuf,
    pub query_path: PathBuf,
    pub radius: f64,
    /// Also run a k-nearest batch after the range batch
    pub nearest: Option<usize>,
}

/// Per-batch averages, one JSON block per run
#[derive(Debug, Serialize)]
pub struct QueryReport {
    /// Milliseconds per query
    pub avg_time: f64,
    /// Pages read per query
    pub disk_access: f64,
    /// Distance evaluations per query
    pub avg_dist_calc: f64,
    /// Result objects per query
    pub avg_obj_result: f64,
    /// The radius the batch ran with
    pub radius: f64,
    /// Number of query objects
    pub num_consults: usize,
}

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Load, build, query, report.
///
/// Returns `None` when there was nothing to report: no query objects, or
/// no query completed successfully.
pub fn run(config: &QueryConfig) -> Result<Option<QueryReport>, DriverError> {
    let dataset = Dataset::load(&config.dataset_path)?;
    info!(
        path = %config.dataset_path.display(),
        summary = %dataset.describe(),
        "dataset loaded"
    );

    let evaluator = Arc::new(WaveletDistance::new());
    let mut index: Box<dyn MetricIndex> = match config.mode {
        Mode::Tree => Box::new(build_tree(&dataset, config.page_size, evaluator.clone())?),
        Mode::Scan => Box::new(build_scan(&dataset, config.page_size, evaluator.clone())?),
    };

    let queries = Dataset::load(&config.query_path)?;
    info!(
        path = %config.query_path.display(),
        summary = %queries.describe(),
        "query objects loaded"
    );
    if queries.is_empty() {
        warn!("no query objects loaded; skipping the query batch");
        return Ok(None);
    }

    let report = run_range_batch(index.as_mut(), &evaluator, queries.objects(), config);

    if let Some(k) = config.nearest {
        run_nearest_batch(index.as_mut(), queries.objects(), k, config.mode);
    }

    Ok(report)
}

fn build_tree(
    dataset: &Dataset,
    page_size: usize,
    evaluator: Arc<WaveletDistance>,
) -> Result<SlimTree, DriverError> {
    let mut tree = SlimTree::create(TREE_SCRATCH_FILE, page_size, evaluator)?;
    let started = Instant::now();
    for object in dataset.objects() {
        tree.insert(object)?;
    }
    info!(
        objects = tree.object_count(),
        pages_written = tree.page_writes(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "metric tree built"
    );
    Ok(tree)
}

fn build_scan(
    dataset: &Dataset,
    page_size: usize,
    evaluator: Arc<WaveletDistance>,
) -> Result<ScanIndex, DriverError> {
    let mut scan = ScanIndex::new(SCAN_SCRATCH_FILE, page_size, evaluator);
    let started = Instant::now();
    for object in dataset.objects() {
        scan.insert(object)?;
    }
    scan.commit()?;
    info!(
        objects = scan.object_count(),
        pages_written = scan.page_writes(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "paged scan file written"
    );
    Ok(scan)
}

/// Execute the range batch and compute the averages
fn run_range_batch(
    index: &mut dyn MetricIndex,
    evaluator: &WaveletDistance,
    queries: &[ComplexObject],
    config: &QueryConfig,
) -> Option<QueryReport> {
    let count = queries.len();
    info!(queries = count, radius = config.radius, "running range query batch");

    let mut total_results: u64 = 0;
    let mut total_distances: u64 = 0;
    let mut total_reads: u64 = 0;
    let mut completed = 0usize;

    if config.mode == Mode::Tree {
        index.reset_statistics();
    }

    let started = Instant::now();
    for (i, query) in queries.iter().enumerate() {
        if config.mode == Mode::Scan {
            index.reset_statistics();
        }
        match index.range_query(query, config.radius) {
            Ok(hits) => {
                total_results += hits.len() as u64;
                completed += 1;
                if config.mode == Mode::Scan {
                    total_distances += evaluator.distance_count();
                    total_reads += index.page_reads();
                }
            }
            Err(err) => {
                error!(query = i, label = query.label(), error = %err, "range query failed; continuing");
            }
        }
    }
    let elapsed = started.elapsed();

    if config.mode == Mode::Tree {
        total_distances = evaluator.distance_count();
        total_reads = index.page_reads();
    }

    if completed == 0 {
        error!("no query completed; nothing to report");
        return None;
    }

    info!(
        completed,
        failed = count - completed,
        elapsed_ms = elapsed.as_millis() as u64,
        total_results,
        "range query batch finished"
    );

    Some(QueryReport {
        avg_time: elapsed.as_secs_f64() * 1000.0 / count as f64,
        disk_access: total_reads as f64 / count as f64,
        avg_dist_calc: total_distances as f64 / count as f64,
        avg_obj_result: total_results as f64 / count as f64,
        radius: config.radius,
        num_consults: count,
    })
}

/// Execute a k-nearest batch, reporting through the log only
fn run_nearest_batch(
    index: &mut dyn MetricIndex,
    queries: &[ComplexObject],
    k: usize,
    mode: Mode,
) {
    let count = queries.len();
    info!(queries = count, k, "running nearest query batch");

    index.reset_statistics();
    let mut total_results: u64 = 0;
    let mut total_reads: u64 = 0;
    let mut completed = 0usize;

    let started = Instant::now();
    for (i, query) in queries.iter().enumerate() {
        if mode == Mode::Scan {
            index.reset_statistics();
        }
        match index.nearest_query(query, k) {
            Ok(hits) => {
                total_results += hits.len() as u64;
                completed += 1;
                if mode == Mode::Scan {
                    total_reads += index.page_reads();
                }
            }
            Err(err) => {
                error!(query = i, label = query.label(), error = %err, "nearest query failed; continuing");
            }
        }
    }
    let elapsed = started.elapsed();

    if mode == Mode::Tree {
        total_reads = index.page_reads();
    }

    info!(
        completed,
        failed = count - completed,
        elapsed_ms = elapsed.as_millis() as u64,
        avg_time_ms = elapsed.as_secs_f64() * 1000.0 / count as f64,
        avg_disk_access = total_reads as f64 / count as f64,
        avg_obj_result = total_results as f64 / count as f64,
        "nearest query batch finished"
    );
}

/// Print the human summary and the JSON block to stdout
pub fn emit_report(report: &QueryReport) {
    println!("\n--- Range query batch ---");
    println!("  queries:                {}", report.num_consults);
    println!("  radius:                 {}", report.radius);
    println!("  avg time per query:     {:.3} ms", report.avg_time);
    println!("  avg page reads:         {:.3}", report.disk_access);
    println!("  avg distance calcs:     {:.3}", report.avg_dist_calc);
    println!("  avg objects returned:   {:.3}", report.avg_obj_result);

    println!("\n================JSON================");
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(err) => error!(error = %err, "failed to render the JSON report"),
    }
    println!("================JSON================");
}
