//! Outbound helper that splits message payloads into chunks.
//!
//! [`Chunker`] tracks the per-connection monotonic message id counter and
//! splits payloads into chunks capped at a fixed content size, tagging each
//! chunk with a [`ChunkHeader`]. Ids restart from one after
//! [`Chunker::reset`], which the connection layer calls on every disconnect
//! so a fresh session never correlates against stale ids.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use super::{
    CHUNK_HEADER_SIZE,
    chunk::{Chunk, ChunkHeader, ChunkX},
    error::CodecError,
};

/// Splits logical messages into chunk-sized frames.
#[derive(Debug)]
pub struct Chunker {
    max_content: usize,
    next_message_id: AtomicU64,
}

impl Chunker {
    /// Create a chunker for chunks of at most `chunk_length` bytes, header
    /// included. Lengths at or below the header size leave room for a single
    /// content byte per chunk.
    #[must_use]
    pub fn new(chunk_length: usize) -> Self {
        Self {
            max_content: chunk_length.saturating_sub(CHUNK_HEADER_SIZE).max(1),
            next_message_id: AtomicU64::new(0),
        }
    }

    /// Maximum content bytes per chunk.
    #[must_use]
    pub const fn max_content(&self) -> usize { self.max_content }

    /// Return the next message id, strictly increasing per chunker.
    ///
    /// Relaxed ordering suffices: uniqueness comes from the atomic increment
    /// itself and no other memory operation synchronises with the counter.
    #[must_use]
    pub fn next_message_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Restart the id sequence. Only safe once every pending request of the
    /// previous session has been failed or resolved.
    pub fn reset(&self) { self.next_message_id.store(0, Ordering::Relaxed); }

    /// Split `payload` into chunks tagged with `message_id`.
    ///
    /// A payload that fits one chunk is tagged with the "first and only"
    /// sentinel; larger payloads get a first chunk carrying the chunk count
    /// and following chunks carrying their index.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooManyChunks`] if the payload needs more chunks
    /// than the combined chunkX field can encode.
    pub fn chunk_message(&self, message_id: u64, payload: &Bytes) -> Result<Vec<Chunk>, CodecError> {
        let message_length = payload.len() as u64;
        if payload.len() <= self.max_content {
            let header = ChunkHeader::new(ChunkX::SINGLE, message_id, message_length, payload.len());
            return Ok(vec![Chunk::new(header, payload.clone())]);
        }

        let count = payload.len().div_ceil(self.max_content);
        let encodable = u32::try_from(count)
            .ok()
            .filter(|c| *c <= u32::MAX >> 1)
            .ok_or(CodecError::TooManyChunks { count })?;

        let mut chunks = Vec::with_capacity(count);
        let mut offset = 0usize;
        let mut index = 0u32;
        while offset < payload.len() {
            let end = (offset + self.max_content).min(payload.len());
            let chunk_x = if index == 0 {
                ChunkX::first(encodable)
            } else {
                ChunkX::following(index)
            };
            let content = payload.slice(offset..end);
            let header = ChunkHeader::new(chunk_x, message_id, message_length, content.len());
            chunks.push(Chunk::new(header, content));
            offset = end;
            index += 1;
        }
        Ok(chunks)
    }
}
