//! # Sequential Scan Adapter
//!
//! The brute-force counterpart of the metric tree: the dataset is written
//! once to a paged scratch file, and every query reads the whole file back
//! page by page, scoring each object against the query.
//!
//! Exactly one distance is evaluated per (query, stored object) pair, and
//! page reads accumulate per query because the file is reread each time.
//! That makes this back-end the ground truth the tree is measured against:
//! both must return the same result multiset for any query and radius.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{ComplexObject, WaveletDistance};
use crate::ports::{IndexResult, MetricIndex};

use super::store;

/// Paged sequential scan over complex objects
pub struct ScanIndex {
    path: PathBuf,
    page_size: usize,
    evaluator: Arc<WaveletDistance>,
    staged: Vec<ComplexObject>,
    committed: bool,
    reads: u64,
    writes: u64,
}

impl ScanIndex {
    /// Create a scan back-end writing its paged file to `path`
    pub fn new(
        path: impl AsRef<Path>,
        page_size: usize,
        evaluator: Arc<WaveletDistance>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            page_size,
            evaluator,
            staged: Vec::new(),
            committed: false,
            reads: 0,
            writes: 0,
        }
    }

    /// The shared distance evaluator
    pub fn evaluator(&self) -> &Arc<WaveletDistance> {
        &self.evaluator
    }

    /// Write the staged objects to the paged scratch file.
    ///
    /// Runs automatically before the first query after an insert; calling
    /// it explicitly separates build I/O from query statistics.
    pub fn commit(&mut self) -> IndexResult<()> {
        if self.committed {
            return Ok(());
        }
        let pages = store::write_paged(&self.path, &mut self.staged, self.page_size)?;
        self.writes += pages as u64;
        self.committed = true;
        Ok(())
    }

    /// Reread the paged file, counting the pages into this index
    fn reload(&mut self) -> IndexResult<Vec<ComplexObject>> {
        let (objects, reads) = store::read_paged(&self.path, self.page_size)?;
        self.reads += reads;
        Ok(objects)
    }
}

impl MetricIndex for ScanIndex {
    fn insert(&mut self, object: &ComplexObject) -> IndexResult<()> {
        self.staged.push(object.clone());
        self.committed = false;
        Ok(())
    }

    fn range_query(
        &mut self,
        query: &ComplexObject,
        radius: f64,
    ) -> IndexResult<Vec<ComplexObject>> {
        self.commit()?;
        let mut hits = Vec::new();
        for object in self.reload()? {
            let d = self.evaluator.distance(query, &object)?;
            if d <= radius {
                hits.push(object);
            }
        }
        Ok(hits)
    }

    fn nearest_query(
        &mut self,
        query: &ComplexObject,
        k: usize,
    ) -> IndexResult<Vec<ComplexObject>> {
        self.commit()?;
        let mut scored = Vec::new();
        for object in self.reload()? {
            let d = self.evaluator.distance(query, &object)?;
            scored.push((d, object));
        }
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, object)| object).collect())
    }

    fn object_count(&self) -> usize {
        self.staged.len()
    }

    fn reset_statistics(&mut self) {
        self.evaluator.reset_statistics();
        self.reads = 0;
        self.writes = 0;
    }

    fn page_reads(&self) -> u64 {
        self.reads
    }

    fn page_writes(&self) -> u64 {
        self.writes
    }
}
