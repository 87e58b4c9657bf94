//! Raw little-endian element-array files.
//!
//! Compiled programs arrive as one file per buffer: `i8` inputs/weights,
//! `i32` accumulator seeds, `u32` micro-ops and `u128` instruction records.
//! Files carry no header; the element count is the file size divided by the
//! element size, and a trailing partial element is an error rather than a
//! short read.

use std::path::{Path, PathBuf};

use bytemuck::Pod;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {len} bytes is not a whole number of {elem_size}-byte elements")]
    TrailingBytes {
        path: PathBuf,
        len: usize,
        elem_size: usize,
    },
}

/// Read a whole file as an array of `T`.
pub fn read_elems<T: Pod>(path: impl AsRef<Path>) -> Result<Vec<T>, IoError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_owned(),
        source,
    })?;
    let elem_size = std::mem::size_of::<T>();
    if bytes.len() % elem_size != 0 {
        return Err(IoError::TrailingBytes {
            path: path.to_owned(),
            len: bytes.len(),
            elem_size,
        });
    }
    // Copy element-wise: the file buffer carries no alignment guarantee.
    Ok(bytes
        .chunks_exact(elem_size)
        .map(|chunk| bytemuck::pod_read_unaligned(chunk))
        .collect())
}

/// Write an array of `T` as raw little-endian bytes.
pub fn write_elems<T: Pod>(path: impl AsRef<Path>, elems: &[T]) -> Result<(), IoError> {
    let path = path.as_ref();
    std::fs::write(path, bytemuck::cast_slice::<T, u8>(elems)).map_err(|source| IoError::Write {
        path: path.to_owned(),
        source,
    })
}
