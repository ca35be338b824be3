//! # Wavelet Distance
//!
//! Manhattan (L1) distance over the approximation coefficients of two
//! objects, after normalizing both operands to a common resolution.
//!
//! Normalization always targets the SECOND operand: when the resolutions
//! differ, the first operand is cloned and compressed (or decompressed) to
//! the second's resolution before measuring. The returned value is
//! commutative; the side effects are not. Callers that care about which
//! object pays for the temporary clone should pass the query first.
//!
//! Every call, including the degenerate zero-length cases, increments a
//! shared call counter so query drivers can report distance-calculation
//! statistics per batch.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::warn;

use super::object::{approx_prefix, ComplexObject, ObjectError};

/// Result type for distance operations
pub type DistanceResult<T> = Result<T, DistanceError>;

/// Errors raised while evaluating a distance
#[derive(Debug, Error)]
pub enum DistanceError {
    /// The two objects do not share an underlying vector length
    #[error("objects have different data lengths: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// The transform stopped before reaching the target resolution
    #[error("could not reach resolution {target}: transform stopped at {achieved}")]
    ResolutionUnreachable { target: i32, achieved: i32 },

    /// The wavelet transform itself failed
    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Resolution-normalizing Manhattan distance evaluator
///
/// # Example
/// ```
/// use waverange::{ComplexObject, WaveletDistance};
/// let eval = WaveletDistance::new();
/// let a = ComplexObject::new("a", 0, vec![1.5, 2.5, 3.5]);
/// let c = ComplexObject::new("c", 0, vec![1.5, 3.5, 4.5]);
/// assert_eq!(eval.distance(&a, &c).unwrap(), 2.0);
/// assert_eq!(eval.distance_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct WaveletDistance {
    calls: AtomicU64,
}

impl WaveletDistance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance from `query` to `stored`, measured at `stored`'s resolution.
    ///
    /// The temporary clone created for normalization is released before this
    /// returns, on success and on error alike.
    pub fn distance(&self, query: &ComplexObject, stored: &ComplexObject) -> DistanceResult<f64> {
        let target = stored.resolution();
        let len = stored.len();

        let normalized;
        let left: &[f64] = if query.resolution() != target {
            if query.len() != len {
                return Err(DistanceError::DimensionMismatch {
                    left: query.len(),
                    right: len,
                });
            }
            let mut clone = query.clone();
            clone.compress(target - query.resolution())?;
            if clone.resolution() != target {
                return Err(DistanceError::ResolutionUnreachable {
                    target,
                    achieved: clone.resolution(),
                });
            }
            normalized = clone;
            normalized.data()
        } else {
            if query.len() != len {
                return Err(DistanceError::DimensionMismatch {
                    left: query.len(),
                    right: len,
                });
            }
            query.data()
        };

        if len == 0 {
            self.bump();
            return Ok(0.0);
        }

        let prefix = approx_prefix(len, target).min(len);
        if prefix == 0 {
            warn!(
                resolution = target,
                data_len = len,
                "resolution leaves no approximation coefficients; distance defaults to 0"
            );
            self.bump();
            return Ok(0.0);
        }

        let sum = left[..prefix]
            .iter()
            .zip(&stored.data()[..prefix])
            .map(|(a, b)| (a - b).abs())
            .sum();

        self.bump();
        Ok(sum)
    }

    /// Number of distance evaluations since the last reset
    pub fn distance_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Zero the call counter
    pub fn reset_statistics(&self) {
        self.calls.store(0, Ordering::Relaxed);
    }

    fn bump(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_objects() {
        let eval = WaveletDistance::new();
        let a = ComplexObject::new("a", 0, vec![1.5, 2.5, 3.5]);
        let b = ComplexObject::new("b", 0, vec![1.5, 2.5, 3.5]);
        assert_eq!(eval.distance(&a, &b).unwrap(), 0.0);
        assert_eq!(eval.distance_count(), 1);
    }

    #[test]
    fn test_known_distance() {
        let eval = WaveletDistance::new();
        let a = ComplexObject::new("a", 0, vec![1.5, 2.5, 3.5]);
        let c = ComplexObject::new("c", 0, vec![1.5, 3.5, 4.5]);
        assert!((eval.distance(&a, &c).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_normalization() {
        // The query is compressed to the stored operand's resolution, then
        // only the approximation prefix [3, 7] is compared.
        let eval = WaveletDistance::new();
        let q = ComplexObject::new("q", 0, vec![4.0, 2.0, 6.0, 8.0]);
        let o = ComplexObject::new("o", 1, vec![3.0, 7.0, 1.0, -1.0]);
        assert_eq!(eval.distance(&q, &o).unwrap(), 0.0);

        // The query itself is untouched.
        assert_eq!(q.resolution(), 0);
        assert_eq!(q.data(), &[4.0, 2.0, 6.0, 8.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let eval = WaveletDistance::new();
        let a = ComplexObject::new("a", 0, vec![1.5, 2.5, 3.5]);
        let short = ComplexObject::new("s", 0, vec![1.0]);
        let err = eval.distance(&a, &short).unwrap_err();
        assert!(matches!(err, DistanceError::DimensionMismatch { left: 3, right: 1 }));
        assert_eq!(eval.distance_count(), 0);
    }

    #[test]
    fn test_resolution_unreachable() {
        // 6 values compress once (prefix 6 -> 3) and then stall on the odd
        // prefix, so resolution 2 can never be reached.
        let eval = WaveletDistance::new();
        let q = ComplexObject::new("q", 0, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let o = ComplexObject::new("o", 2, vec![0.0; 6]);
        let err = eval.distance(&q, &o).unwrap_err();
        assert!(matches!(
            err,
            DistanceError::ResolutionUnreachable { target: 2, achieved: 1 }
        ));
    }

    #[test]
    fn test_empty_vectors() {
        let eval = WaveletDistance::new();
        let a = ComplexObject::new("e1", 2, vec![]);
        let b = ComplexObject::new("e2", 2, vec![]);
        assert_eq!(eval.distance(&a, &b).unwrap(), 0.0);
        assert_eq!(eval.distance_count(), 1);
    }

    #[test]
    fn test_zero_prefix_counts_and_returns_zero() {
        // Resolution 4 over 8 values leaves no approximation coefficients.
        let eval = WaveletDistance::new();
        let a = ComplexObject::new("a", 4, vec![1.0; 8]);
        let b = ComplexObject::new("b", 4, vec![2.0; 8]);
        assert_eq!(eval.distance(&a, &b).unwrap(), 0.0);
        assert_eq!(eval.distance_count(), 1);
    }

    #[test]
    fn test_counter_accumulates_and_resets() {
        let eval = WaveletDistance::new();
        let a = ComplexObject::new("a", 0, vec![1.0, 2.0]);
        let b = ComplexObject::new("b", 0, vec![2.0, 1.0]);
        for _ in 0..5 {
            eval.distance(&a, &b).unwrap();
        }
        assert_eq!(eval.distance_count(), 5);
        eval.reset_statistics();
        assert_eq!(eval.distance_count(), 0);
    }
}
