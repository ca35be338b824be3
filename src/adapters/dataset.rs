//! # Dataset Loader
//!
//! Parses whitespace-delimited text files into uniform-length datasets.
//!
//! Each non-blank line is `<label> <resolution> <v1> <v2> ... <vk>`. The
//! first accepted line fixes the vector width for the whole file. Malformed
//! lines are skipped with a warning; a width mismatch aborts the load,
//! because a dataset of mixed dimensionality cannot be queried.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::core::ComplexObject;

/// Result type for dataset loading
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that abort a load
#[derive(Debug, Error)]
pub enum LoadError {
    /// Opening or reading the file failed
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line carries a different number of values than the first one
    #[error("line {line} has {found} values, expected {expected}: {content:?}")]
    InconsistentDimension {
        line: usize,
        expected: usize,
        found: usize,
        content: String,
    },
}

/// An ordered collection of objects sharing one vector width
#[derive(Debug, Default)]
pub struct Dataset {
    objects: Vec<ComplexObject>,
    width: usize,
}

impl Dataset {
    /// Load a dataset from a text file.
    ///
    /// Returns an empty dataset (width 0) when the file contains no valid
    /// lines. On [`LoadError::InconsistentDimension`] nothing is kept.
    pub fn load(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut objects = Vec::new();
        let mut width: Option<usize> = None;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let number = index + 1;
            let line = line.map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let Some((label, resolution, data)) = parse_line(&line, number) else {
                continue;
            };

            match width {
                None => width = Some(data.len()),
                Some(expected) if expected != data.len() => {
                    return Err(LoadError::InconsistentDimension {
                        line: number,
                        expected,
                        found: data.len(),
                        content: line,
                    });
                }
                Some(_) => {}
            }

            objects.push(ComplexObject::new(label, resolution, data));
        }

        if objects.is_empty() {
            warn!(path = %path.display(), "no valid data lines found");
        }

        Ok(Self {
            width: width.unwrap_or(0),
            objects,
        })
    }

    /// The loaded objects, in file order
    pub fn objects(&self) -> &[ComplexObject] {
        &self.objects
    }

    /// Consume the dataset, yielding its objects
    pub fn into_objects(self) -> Vec<ComplexObject> {
        self.objects
    }

    /// Number of values per object
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Short human-readable summary for diagnostics
    pub fn describe(&self) -> String {
        format!("{} objects, {} values per object", self.len(), self.width)
    }
}

/// Parse one line into (label, resolution, data), or `None` to skip it
fn parse_line(line: &str, number: usize) -> Option<(String, i32, Vec<f64>)> {
    let mut tokens = line.split_whitespace();

    let Some(label) = tokens.next() else {
        warn!(line = number, "skipping blank line");
        return None;
    };

    let Some(resolution) = tokens.next().and_then(|t| t.parse::<i32>().ok()) else {
        warn!(line = number, "skipping malformed line: expected a label and an integer resolution");
        return None;
    };

    let mut data = Vec::new();
    for token in tokens {
        match token.parse::<f64>() {
            Ok(value) => data.push(value),
            Err(_) => {
                warn!(line = number, token, "skipping line: non-numeric value after the data");
                return None;
            }
        }
    }

    Some((label.to_string(), resolution, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_basic() {
        let file = write_file("a 0 1.0 2.0 3.0\nb 0 4.0 5.0 6.0\n");
        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.width(), 3);
        assert_eq!(dataset.objects()[0].label(), "a");
        assert_eq!(dataset.objects()[1].data(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let file = write_file("a 0 1.0 2.0\nb 1 3.0 4.0\n");
        let first = Dataset::load(file.path()).unwrap();
        let second = Dataset::load(file.path()).unwrap();
        assert_eq!(first.objects(), second.objects());
        for (x, y) in first.objects().iter().zip(second.objects()) {
            assert_eq!(x.label(), y.label());
        }
    }

    #[test]
    fn test_skips_blank_and_malformed_lines() {
        let file = write_file("a 0 1.0 2.0\n\n   \nnolabel\nc notanint 1.0 2.0\nd 0 3.0 4.0\n");
        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.objects()[1].label(), "d");
    }

    #[test]
    fn test_skips_line_with_trailing_garbage() {
        let file = write_file("a 0 1.0 2.0\nb 0 1.0 oops\nc 0 5.0 6.0\n");
        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.objects()[1].label(), "c");
    }

    #[test]
    fn test_inconsistent_width_is_fatal() {
        let file = write_file("a 0 1.0 2.0 3.0\nb 0 1.0 2.0\n");
        let err = Dataset::load(file.path()).unwrap_err();
        match err {
            LoadError::InconsistentDimension { line, expected, found, .. } => {
                assert_eq!(line, 2);
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_surfaces_io_error() {
        let err = Dataset::load("/nonexistent/dataset.txt").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_empty_file() {
        let file = write_file("");
        let dataset = Dataset::load(file.path()).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.width(), 0);
    }

    #[test]
    fn test_long_labels_are_kept_verbatim() {
        let label = "x".repeat(300);
        let file = write_file(&format!("{label} 0 1.0\n"));
        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.objects()[0].label().len(), 300);
    }
}
