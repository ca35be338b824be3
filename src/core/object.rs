//! # Complex Object
//!
//! A labeled vector of doubles carrying a Haar wavelet resolution state.
//!
//! At resolution `r`, the first `floor(len / 2^r)` elements of `data` are
//! approximation coefficients; the rest are detail coefficients accumulated
//! by earlier compression steps (innermost level first). Compression and
//! decompression rewrite the vector in place and never change its length,
//! so an object can move between resolutions freely.
//!
//! Objects serialize to a fixed little-endian record layout:
//!
//! ```text
//! offset  size  field
//!  0      4     resolution (i32)
//!  4      8     data_len   (u64, number of f64 elements)
//! 12      8     label_len  (u64, bytes of UTF-8 label)
//! 20      L     label bytes (no terminator)
//! 20+L    8*D   data (f64, little-endian)
//! ```

use std::fmt;

use thiserror::Error;

/// Size of the fixed record header: resolution + data length + label length.
pub const HEADER_SIZE: usize = 4 + 8 + 8;

/// Result type for object operations
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Errors raised by deserialization and the wavelet transform
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The serialized buffer is shorter than the record it declares
    #[error("serialized buffer too short: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The stored resolution state does not match the data layout
    #[error("wavelet invariant violated: {0}")]
    InvariantViolation(String),
}

/// A labeled feature vector with a Haar resolution state
///
/// Equality compares `resolution` and `data` elementwise. The label is
/// deliberately excluded: two measurements of the same signal under
/// different names are the same object.
///
/// # Example
/// ```
/// use waverange::ComplexObject;
/// let mut obj = ComplexObject::new("s1", 0, vec![4.0, 2.0, 6.0, 8.0]);
/// obj.compress(1).unwrap();
/// assert_eq!(obj.resolution(), 1);
/// assert_eq!(obj.data(), &[3.0, 7.0, 1.0, -1.0]);
/// ```
#[derive(Debug)]
pub struct ComplexObject {
    label: String,
    resolution: i32,
    data: Vec<f64>,

    /// Cached serialized form. Invalidated by any mutation, never cloned.
    serialized: Option<Vec<u8>>,
}

impl ComplexObject {
    /// Create a new object. No validation is performed on the fields.
    pub fn new(label: impl Into<String>, resolution: i32, data: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            resolution,
            data,
            serialized: None,
        }
    }

    /// The descriptive label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of Haar compression steps applied (0 = original signal)
    pub fn resolution(&self) -> i32 {
        self.resolution
    }

    /// The coefficient vector at the current resolution
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Total number of coefficients. Fixed for the object's lifetime.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the object carries no coefficients
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size in bytes of the serialized record
    pub fn serialized_size(&self) -> usize {
        HEADER_SIZE + self.label.len() + self.data.len() * 8
    }

    /// Serialize into the record layout, caching the buffer.
    ///
    /// The cache is dropped by [`compress`](Self::compress), so the returned
    /// bytes always reflect the current state.
    pub fn serialize(&mut self) -> &[u8] {
        if self.serialized.is_none() {
            self.serialized = Some(self.to_bytes());
        }
        self.serialized.as_deref().unwrap_or(&[])
    }

    /// Serialize into a fresh buffer without touching the cache
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        buf.extend_from_slice(&self.resolution.to_le_bytes());
        buf.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.label.len() as u64).to_le_bytes());
        buf.extend_from_slice(self.label.as_bytes());
        for value in &self.data {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Rebuild an object from its serialized record
    pub fn unserialize(bytes: &[u8]) -> ObjectResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ObjectError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let resolution = i32::from_le_bytes(read_array(bytes, 0));
        let data_len = u64::from_le_bytes(read_array(bytes, 4));
        let label_len = u64::from_le_bytes(read_array(bytes, 12));

        let needed = record_size(label_len, data_len).ok_or(ObjectError::InsufficientData {
            needed: usize::MAX,
            available: bytes.len(),
        })?;
        if bytes.len() < needed {
            return Err(ObjectError::InsufficientData {
                needed,
                available: bytes.len(),
            });
        }

        let label_end = HEADER_SIZE + label_len as usize;
        let label = std::str::from_utf8(&bytes[HEADER_SIZE..label_end])
            .map_err(|_| ObjectError::InvariantViolation("label is not valid UTF-8".into()))?
            .to_string();

        let mut data = Vec::with_capacity(data_len as usize);
        let mut offset = label_end;
        for _ in 0..data_len {
            data.push(f64::from_le_bytes(read_array(bytes, offset)));
            offset += 8;
        }

        Ok(Self {
            label,
            resolution,
            data,
            serialized: None,
        })
    }

    /// Full size of the record starting at `bytes`, read from its header
    pub fn peek_record_size(bytes: &[u8]) -> ObjectResult<usize> {
        if bytes.len() < HEADER_SIZE {
            return Err(ObjectError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let data_len = u64::from_le_bytes(read_array(bytes, 4));
        let label_len = u64::from_le_bytes(read_array(bytes, 12));
        record_size(label_len, data_len).ok_or_else(|| {
            ObjectError::InvariantViolation("declared record size overflows".into())
        })
    }

    /// Read just the resolution field of a serialized record
    pub fn peek_resolution(bytes: &[u8]) -> ObjectResult<i32> {
        if bytes.len() < 4 {
            return Err(ObjectError::InsufficientData {
                needed: 4,
                available: bytes.len(),
            });
        }
        Ok(i32::from_le_bytes(read_array(bytes, 0)))
    }

    /// Apply the Haar transform in place.
    ///
    /// Positive `levels` compress that many times, negative levels apply the
    /// inverse transform, zero is a no-op. Compression stops early when the
    /// approximation prefix can no longer be halved (shorter than 2 or odd);
    /// applying fewer levels than requested is not an error. Decompression
    /// stops at resolution 0.
    pub fn compress(&mut self, levels: i32) -> ObjectResult<()> {
        if levels == 0 {
            return Ok(());
        }
        self.serialized = None;
        if levels > 0 {
            self.do_compress(levels as u32)
        } else {
            self.do_decompress(levels.unsigned_abs())
        }
    }

    fn do_compress(&mut self, levels: u32) -> ObjectResult<()> {
        if self.data.is_empty() {
            return Ok(());
        }
        for _ in 0..levels {
            let prefix = approx_prefix(self.data.len(), self.resolution);
            if prefix < 2 || prefix % 2 != 0 {
                break;
            }
            let half = prefix / 2;
            // Positions past the prefix hold details from earlier levels
            // and carry over untouched.
            let mut next = self.data.clone();
            for i in 0..half {
                let a = self.data[2 * i];
                let b = self.data[2 * i + 1];
                next[i] = (a + b) / 2.0;
                next[half + i] = (a - b) / 2.0;
            }
            self.data = next;
            self.resolution += 1;
        }
        Ok(())
    }

    fn do_decompress(&mut self, levels: u32) -> ObjectResult<()> {
        if self.data.is_empty() {
            return Ok(());
        }
        for _ in 0..levels {
            if self.resolution == 0 {
                break;
            }
            let prefix = approx_prefix(self.data.len(), self.resolution);
            if prefix == 0 {
                return Err(ObjectError::InvariantViolation(format!(
                    "no approximation coefficients at resolution {} for {} values",
                    self.resolution,
                    self.data.len()
                )));
            }
            if prefix * 2 > self.data.len() {
                return Err(ObjectError::InvariantViolation(format!(
                    "approximation prefix {} too large to reconstruct {} values",
                    prefix,
                    self.data.len()
                )));
            }
            let mut next = self.data.clone();
            for i in 0..prefix {
                let approx = self.data[i];
                let detail = self.data[i + prefix];
                next[2 * i] = approx + detail;
                next[2 * i + 1] = approx - detail;
            }
            self.data = next;
            self.resolution -= 1;
        }
        Ok(())
    }
}

impl Clone for ComplexObject {
    /// Deep copy of label and data. The serialized cache is not copied.
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            resolution: self.resolution,
            data: self.data.clone(),
            serialized: None,
        }
    }
}

impl PartialEq for ComplexObject {
    fn eq(&self, other: &Self) -> bool {
        self.resolution == other.resolution && self.data == other.data
    }
}

impl fmt::Display for ComplexObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Object label={}; res={}; len={}]",
            self.label,
            self.resolution,
            self.data.len()
        )
    }
}

/// Length of the approximation prefix for `len` values at `resolution`
pub(crate) fn approx_prefix(len: usize, resolution: i32) -> usize {
    if resolution <= 0 {
        len
    } else if resolution >= 64 {
        0
    } else {
        len >> resolution
    }
}

/// Full record size for the given variable-part lengths, or `None` on overflow
pub(crate) fn record_size(label_len: u64, data_len: u64) -> Option<usize> {
    let label = usize::try_from(label_len).ok()?;
    let data = usize::try_from(data_len).ok()?;
    data.checked_mul(8)?
        .checked_add(label)?
        .checked_add(HEADER_SIZE)
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haar_one_step() {
        let mut obj = ComplexObject::new("s1", 0, vec![4.0, 2.0, 6.0, 8.0]);
        obj.compress(1).unwrap();
        assert_eq!(obj.resolution(), 1);
        assert_eq!(obj.data(), &[3.0, 7.0, 1.0, -1.0]);

        obj.compress(-1).unwrap();
        assert_eq!(obj.resolution(), 0);
        assert_eq!(obj.data(), &[4.0, 2.0, 6.0, 8.0]);
    }

    #[test]
    fn test_haar_means_and_half_differences() {
        let mut obj = ComplexObject::new("energy", 0, vec![1.0, 3.0, 10.0, 4.0, -2.0, 2.0]);
        obj.compress(1).unwrap();
        // First half: pairwise means. Second half: half-differences.
        assert_eq!(obj.data(), &[2.0, 7.0, 0.0, -1.0, 3.0, -2.0]);
    }

    #[test]
    fn test_haar_inverse_roundtrip() {
        let original: Vec<f64> = (0..8).map(|i| (i as f64) * 1.25 - 3.0).collect();
        for levels in 0..=3 {
            let mut obj = ComplexObject::new("inv", 0, original.clone());
            obj.compress(levels).unwrap();
            assert_eq!(obj.resolution(), levels);
            obj.compress(-levels).unwrap();
            assert_eq!(obj.resolution(), 0);
            for (got, want) in obj.data().iter().zip(&original) {
                assert!((got - want).abs() < 1e-9, "levels={levels}: {got} != {want}");
            }
        }
    }

    #[test]
    fn test_compress_stops_at_odd_prefix() {
        // 6 values: one step leaves a prefix of 3, which cannot be halved.
        let mut obj = ComplexObject::new("odd", 0, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        obj.compress(4).unwrap();
        assert_eq!(obj.resolution(), 1);
    }

    #[test]
    fn test_compress_zero_is_noop() {
        let mut obj = ComplexObject::new("z", 0, vec![1.0, 2.0]);
        obj.compress(0).unwrap();
        assert_eq!(obj.resolution(), 0);
        assert_eq!(obj.data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_decompress_stops_at_resolution_zero() {
        let mut obj = ComplexObject::new("floor", 0, vec![4.0, 2.0]);
        obj.compress(-3).unwrap();
        assert_eq!(obj.resolution(), 0);
        assert_eq!(obj.data(), &[4.0, 2.0]);
    }

    #[test]
    fn test_decompress_rejects_corrupt_resolution() {
        // Resolution 2 over 3 values leaves an empty approximation prefix,
        // so there is nothing to reconstruct from.
        let mut obj = ComplexObject::new("bad", 2, vec![1.0, 2.0, 3.0]);
        let err = obj.compress(-1).unwrap_err();
        assert!(matches!(err, ObjectError::InvariantViolation(_)));

        // A negative resolution claims a prefix wider than the vector.
        let mut neg = ComplexObject::new("neg", -1, vec![1.0, 2.0]);
        let err = neg.compress(-1).unwrap_err();
        assert!(matches!(err, ObjectError::InvariantViolation(_)));
    }

    #[test]
    fn test_equality_ignores_label() {
        let a = ComplexObject::new("one", 3, vec![1.0, 2.0]);
        let b = ComplexObject::new("two", 3, vec![1.0, 2.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_checks_resolution_and_data() {
        let a = ComplexObject::new("a", 1, vec![1.0, 2.0]);
        assert_ne!(a, ComplexObject::new("a", 2, vec![1.0, 2.0]));
        assert_ne!(a, ComplexObject::new("a", 1, vec![1.0, 3.0]));
        assert_ne!(a, ComplexObject::new("a", 1, vec![1.0]));
    }

    #[test]
    fn test_clone_is_equal() {
        let a = ComplexObject::new("orig", 5, vec![5.5, 6.6]);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.label(), b.label());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut obj = ComplexObject::new("SerializeMe", 55, vec![7.7, 8.8, 9.9, 10.1]);
        let bytes = obj.serialize().to_vec();
        assert_eq!(bytes.len(), obj.serialized_size());

        let restored = ComplexObject::unserialize(&bytes).unwrap();
        assert_eq!(restored, obj);
        assert_eq!(restored.label(), "SerializeMe");
    }

    #[test]
    fn test_serialize_roundtrip_empty_data() {
        let mut obj = ComplexObject::new("empty", 2, vec![]);
        let bytes = obj.serialize().to_vec();
        let restored = ComplexObject::unserialize(&bytes).unwrap();
        assert_eq!(restored, obj);
        assert_eq!(restored.label(), "empty");
    }

    #[test]
    fn test_serialize_reflects_mutation() {
        let mut obj = ComplexObject::new("cache", 0, vec![4.0, 2.0]);
        let before = obj.serialize().to_vec();
        obj.compress(1).unwrap();
        let after = obj.serialize().to_vec();
        assert_ne!(before, after);
        assert_eq!(ComplexObject::unserialize(&after).unwrap().resolution(), 1);
    }

    #[test]
    fn test_unserialize_rejects_short_buffer() {
        let err = ComplexObject::unserialize(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ObjectError::InsufficientData { .. }));

        let mut obj = ComplexObject::new("short", 1, vec![1.0, 2.0]);
        let bytes = obj.serialize();
        let err = ComplexObject::unserialize(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ObjectError::InsufficientData { .. }));
    }

    #[test]
    fn test_peek_resolution() {
        let mut obj = ComplexObject::new("peek", 7, vec![1.0]);
        assert_eq!(ComplexObject::peek_resolution(obj.serialize()).unwrap(), 7);
    }

    #[test]
    fn test_serialized_size_formula() {
        let obj = ComplexObject::new("abc", 0, vec![1.0, 2.0]);
        assert_eq!(obj.serialized_size(), HEADER_SIZE + 3 + 16);
    }

    #[test]
    fn test_approx_prefix() {
        assert_eq!(approx_prefix(8, 0), 8);
        assert_eq!(approx_prefix(8, 1), 4);
        assert_eq!(approx_prefix(8, 3), 1);
        assert_eq!(approx_prefix(8, 4), 0);
        assert_eq!(approx_prefix(6, 1), 3);
        assert_eq!(approx_prefix(8, 70), 0);
    }
}
