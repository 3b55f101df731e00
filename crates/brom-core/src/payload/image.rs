//! Auth certificate and download agent images.
//!
//! Both blobs are read once at session start and never modified afterwards.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} truncated: wanted {expected} bytes at offset 0x{offset:X}, got {actual}")]
    Truncated {
        path: String,
        offset: u64,
        expected: usize,
        actual: usize,
    },
    #[error("{0} is empty")]
    Empty(String),
}

/// Vendor-signed auth certificate, sent byte for byte.
#[derive(Debug, Clone)]
pub struct AuthBlob {
    data: Vec<u8>,
}

impl AuthBlob {
    /// Read the whole file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if data.is_empty() {
            return Err(ImageError::Empty(path.display().to_string()));
        }
        info!(len = data.len(), "Loaded auth file");
        Ok(Self { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Download agent image sliced out of a larger file.
#[derive(Debug, Clone)]
pub struct DaBlob {
    data: Vec<u8>,
}

impl DaBlob {
    /// Read exactly `len` bytes starting at `offset`.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display(), offset = %format!("0x{:X}", offset), len = len))]
    pub fn load<P: AsRef<Path>>(path: P, offset: u64, len: usize) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let io_err = |source| ImageError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        file.seek(SeekFrom::Start(offset)).map_err(io_err)?;

        let mut data = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut data)
            .map_err(io_err)?;

        if data.len() != len {
            return Err(ImageError::Truncated {
                path: path.display().to_string(),
                offset,
                expected: len,
                actual: data.len(),
            });
        }

        info!(len = data.len(), "Loaded DA image");
        Ok(Self { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split into upload chunks. A trailing partial chunk is only yielded
    /// when `include_partial` is set.
    pub fn chunks(&self, chunk_size: usize, include_partial: bool) -> ChunkIterator<'_> {
        ChunkIterator::new(&self.data, chunk_size, include_partial)
    }
}

/// Iterator over fixed-size chunks with optional residual.
#[derive(Debug)]
pub struct ChunkIterator<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    full_chunks: usize,
    residual_bytes: usize,
    include_partial: bool,
    current_chunk: usize,
}

impl<'a> ChunkIterator<'a> {
    pub fn new(data: &'a [u8], chunk_size: usize, include_partial: bool) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            data,
            chunk_size,
            offset: 0,
            full_chunks: data.len() / chunk_size,
            residual_bytes: data.len() % chunk_size,
            include_partial,
            current_chunk: 0,
        }
    }

    /// Number of chunks this iterator yields in total.
    pub fn total(&self) -> usize {
        if self.include_partial && self.residual_bytes > 0 {
            self.full_chunks + 1
        } else {
            self.full_chunks
        }
    }

    /// Bytes at the tail that will never be yielded.
    pub fn dropped_bytes(&self) -> usize {
        if self.include_partial {
            0
        } else {
            self.residual_bytes
        }
    }
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_chunk >= self.total() {
            return None;
        }

        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = &self.data[self.offset..end];
        self.offset = end;
        self.current_chunk += 1;

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total() - self.current_chunk;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkIterator<'_> {}
