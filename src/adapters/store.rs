//! # Paged Object Store
//!
//! Packs serialized objects into fixed-size pages and reads them back.
//!
//! ## Format
//!
//! A store file is a sequence of pages of `page_size` bytes. Within a page,
//! object records (see [`crate::core::ComplexObject`]) are concatenated from
//! offset 0; the space after the last record is zero-filled. A record never
//! crosses a page boundary: an object that does not fit the remaining space
//! starts the next page. The file size is always a multiple of the page
//! size.
//!
//! An all-zero record header (resolution 0, no data, no label) is the
//! padding sentinel. The writer refuses to emit an object that would match
//! it, which keeps the sentinel unambiguous on the read side.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::core::{record_size, ComplexObject, ObjectError, HEADER_SIZE};
use crate::ports::IndexError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the paged store
#[derive(Debug, Error)]
pub enum StoreError {
    /// File access failed
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An object cannot fit in a single page
    #[error("object {label:?} serializes to {size} bytes, which exceeds the page size {page_size}")]
    ObjectTooLarge {
        label: String,
        size: usize,
        page_size: usize,
    },

    /// An empty object at resolution 0 would be indistinguishable from padding
    #[error("refusing to write an empty unlabeled object at resolution 0; it would read back as page padding")]
    EmptyObject,

    /// Record decoding failed
    #[error(transparent)]
    Object(#[from] ObjectError),
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { source, .. } => IndexError::Io(source),
            StoreError::Object(inner) => IndexError::Object(inner),
            other => IndexError::Backend(other.to_string()),
        }
    }
}

/// Write `objects` to `path` as a paged file. Returns the page count.
///
/// On [`StoreError::ObjectTooLarge`] or [`StoreError::EmptyObject`] the
/// partially written output is removed.
pub fn write_paged(
    path: impl AsRef<Path>,
    objects: &mut [ComplexObject],
    page_size: usize,
) -> StoreResult<usize> {
    let path = path.as_ref();
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    let mut page = vec![0u8; page_size];
    let mut cursor = 0usize;
    let mut pages = 0usize;

    for object in objects.iter_mut() {
        if object.resolution() == 0 && object.label().is_empty() && object.is_empty() {
            drop(writer);
            let _ = fs::remove_file(path);
            return Err(StoreError::EmptyObject);
        }

        let size = object.serialized_size();
        if size > page_size {
            drop(writer);
            let _ = fs::remove_file(path);
            return Err(StoreError::ObjectTooLarge {
                label: object.label().to_string(),
                size,
                page_size,
            });
        }

        if cursor + size > page_size {
            writer.write_all(&page).map_err(io_err)?;
            pages += 1;
            page.fill(0);
            cursor = 0;
        }

        page[cursor..cursor + size].copy_from_slice(object.serialize());
        cursor += size;
    }

    if cursor > 0 {
        writer.write_all(&page).map_err(io_err)?;
        pages += 1;
    }
    writer.flush().map_err(io_err)?;

    Ok(pages)
}

/// Read every object back from a paged file.
///
/// Returns the objects in file order together with the number of pages
/// read. A record that fails to decode is reported and the rest of its
/// page abandoned; reading continues with the next page.
pub fn read_paged(
    path: impl AsRef<Path>,
    page_size: usize,
) -> StoreResult<(Vec<ComplexObject>, u64)> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let mut page = vec![0u8; page_size];
    let mut objects = Vec::new();
    let mut reads: u64 = 0;

    loop {
        let filled = fill_page(&mut reader, &mut page).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if filled == 0 {
            break;
        }
        if filled < page_size {
            warn!(
                path = %path.display(),
                bytes = filled,
                "ignoring truncated trailing page"
            );
            break;
        }
        reads += 1;
        unpack_page(&page, page_size, reads, &mut objects);
    }

    Ok((objects, reads))
}

/// Decode the records of one page, appending them to `out`
fn unpack_page(page: &[u8], page_size: usize, page_number: u64, out: &mut Vec<ComplexObject>) {
    let mut cursor = 0usize;
    while cursor < page_size {
        if page_size - cursor < HEADER_SIZE {
            break;
        }

        let resolution = le_i32(&page[cursor..cursor + 4]);
        let data_len = le_u64(&page[cursor + 4..cursor + 12]);
        let label_len = le_u64(&page[cursor + 12..cursor + 20]);

        // The canonical zero-padding sentinel: rest of the page is filler.
        if resolution == 0 && data_len == 0 && label_len == 0 {
            break;
        }

        let expected = match record_size(label_len, data_len) {
            Some(size) if size <= page_size => size,
            _ => {
                warn!(
                    page = page_number,
                    offset = cursor,
                    data_len,
                    label_len,
                    "record header larger than any page; abandoning page"
                );
                break;
            }
        };

        // Records never span pages; the rest of this one lives on the next.
        if cursor + expected > page_size {
            break;
        }

        match ComplexObject::unserialize(&page[cursor..cursor + expected]) {
            Ok(object) => {
                out.push(object);
                cursor += expected;
            }
            Err(err) => {
                warn!(
                    page = page_number,
                    offset = cursor,
                    error = %err,
                    "failed to decode record; abandoning page"
                );
                break;
            }
        }
    }
}

fn le_i32(bytes: &[u8]) -> i32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    i32::from_le_bytes(out)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    u64::from_le_bytes(out)
}

/// Read until `buf` is full or the stream ends; returns the bytes read
fn fill_page(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
