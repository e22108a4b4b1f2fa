//! Fixed-capacity capture storage, filled one whole chunk at a time.

use crate::error::{PipelineError, Result};

/// Append-only byte arena sized `chunk_size * max_chunks`.
///
/// Allocated once and reused across recording sessions; `reset` only rewinds
/// the offset. Bytes past `offset` are stale and never exposed.
#[derive(Debug)]
pub struct CaptureBuffer {
    storage: Vec<u8>,
    chunk_size: usize,
    offset: usize,
}

impl CaptureBuffer {
    pub fn new(chunk_size: usize, max_chunks: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size % 2 != 0 {
            return Err(PipelineError::Config(format!(
                "chunk size must be a non-zero even byte count, got {chunk_size}"
            )));
        }
        if max_chunks == 0 {
            return Err(PipelineError::Config("max_chunks must be at least 1".into()));
        }
        let capacity = chunk_size
            .checked_mul(max_chunks)
            .ok_or_else(|| PipelineError::Config("capture capacity overflows usize".into()))?;

        Ok(Self {
            storage: vec![0u8; capacity],
            chunk_size,
            offset: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn chunks(&self) -> usize {
        self.offset / self.chunk_size
    }

    pub fn is_full(&self) -> bool {
        self.offset == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// The populated prefix `storage[..offset]`.
    pub fn filled(&self) -> &[u8] {
        &self.storage[..self.offset]
    }

    /// Hand the next chunk slot to `fill` and commit it only if `fill` succeeds.
    ///
    /// Returns the new offset. A failed fill leaves the offset where it was, so
    /// a half-read chunk never becomes part of the recording.
    pub fn append_with<F>(&mut self, fill: F) -> Result<usize>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        if self.is_full() {
            return Err(PipelineError::CaptureOverflow {
                capacity: self.capacity(),
            });
        }
        let end = self.offset + self.chunk_size;
        fill(&mut self.storage[self.offset..end])?;
        self.offset = end;
        Ok(self.offset)
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}
