//! # Waverange
//!
//! Range search over Haar-multiresolution feature vectors.
//!
//! ## Overview
//!
//! Waverange indexes labeled double-precision vectors under a metric
//! distance computed on their Haar wavelet approximation coefficients.
//! Operands at different resolutions are normalized to a common one before
//! measuring, so a query at full resolution can be matched against stored
//! objects kept at any compression level.
//!
//! Two interchangeable back-ends answer range queries:
//! - a disk-resident metric tree ([`SlimTree`]), which prunes subtrees via
//!   the triangle inequality, and
//! - a paged sequential scan ([`ScanIndex`]), which rereads a page-aligned
//!   binary file for every query.
//!
//! Both implement the [`MetricIndex`] port, return identical result sets,
//! and report comparable statistics: distance evaluations, page reads and
//! wall time per query.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use waverange::{ComplexObject, MetricIndex, SlimTree, WaveletDistance};
//!
//! let evaluator = Arc::new(WaveletDistance::new());
//! let mut tree = SlimTree::create("tree.dat", 4096, evaluator)?;
//!
//! tree.insert(&ComplexObject::new("v1", 0, vec![4.0, 2.0, 6.0, 8.0]))?;
//! let hits = tree.range_query(&ComplexObject::new("q", 0, vec![4.0, 2.0, 6.0, 8.0]), 2.5)?;
//! ```
//!
//! The `waverange-tree` and `waverange-scan` binaries wrap the
//! [`driver`] module, which loads datasets, runs query batches and emits a
//! JSON statistics block.

pub mod adapters;
pub mod core;
pub mod driver;
pub mod ports;

// Re-exports for convenience
pub use self::core::{ComplexObject, DistanceError, ObjectError, WaveletDistance};
pub use adapters::dataset::{Dataset, LoadError};
pub use adapters::scan::ScanIndex;
pub use adapters::slim::SlimTree;
pub use adapters::store::StoreError;
pub use ports::{IndexError, IndexResult, MetricIndex};
