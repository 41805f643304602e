//! Inbound helpers that stitch chunks back into complete messages.
//!
//! [`MessageAssembler`] collects chunk content keyed by message id. The first
//! chunk's header sizes the accumulation buffer up front: a single-chunk
//! message completes immediately, a multi-chunk message reserves the full
//! declared length. Completion is detected when the accumulated bytes equal
//! the declared total; any disagreement is fatal for the owning connection.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::{
    MAX_MESSAGE_LENGTH,
    chunk::{Chunk, ChunkCodec},
    error::CodecError,
};

#[derive(Debug)]
struct PartialMessage {
    declared: u64,
    buffer: BytesMut,
}

/// Stateful per-connection reassembly table.
#[derive(Debug)]
pub struct MessageAssembler {
    max_message_length: usize,
    pending: HashMap<u64, PartialMessage>,
}

impl MessageAssembler {
    /// Create an assembler enforcing a maximum reconstructed payload size.
    #[must_use]
    pub fn new(max_message_length: usize) -> Self {
        Self {
            max_message_length,
            pending: HashMap::new(),
        }
    }

    /// Create an assembler with the default [`MAX_MESSAGE_LENGTH`] cap.
    #[must_use]
    pub fn with_default_limit() -> Self { Self::new(MAX_MESSAGE_LENGTH) }

    /// Process one chunk.
    ///
    /// Returns `Ok(Some((message_id, payload)))` when the chunk completes its
    /// message and `Ok(None)` while more chunks are required.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the chunk duplicates a first chunk,
    /// continues an unknown message, overruns the declared length, or would
    /// exceed the configured cap. Any error leaves the affected message
    /// discarded; callers treat these as fatal for the connection.
    pub fn push(&mut self, chunk: Chunk) -> Result<Option<(u64, Bytes)>, CodecError> {
        let (header, content) = chunk.into_parts();
        let message_id = header.message_id();

        if header.chunk_x().is_first() {
            if self.pending.contains_key(&message_id) {
                self.pending.remove(&message_id);
                return Err(CodecError::DuplicateMessage { message_id });
            }
            // Single-chunk fast path: the buffer is the chunk content itself.
            if header.chunk_x().number_of_chunks() == Some(1) {
                if header.message_length() != content.len() as u64 {
                    return Err(CodecError::LengthMismatch {
                        message_id,
                        declared: header.message_length(),
                        received: content.len() as u64,
                    });
                }
                return Ok(Some((message_id, content)));
            }

            let declared = header.message_length();
            let capacity = usize::try_from(declared)
                .ok()
                .filter(|len| *len <= self.max_message_length)
                .ok_or(CodecError::OversizedMessage {
                    message_id,
                    attempted: usize::try_from(declared).unwrap_or(usize::MAX),
                    max: self.max_message_length,
                })?;
            if content.len() as u64 > declared {
                return Err(CodecError::LengthMismatch {
                    message_id,
                    declared,
                    received: content.len() as u64,
                });
            }
            // The completion rule applies on the first chunk too: a frame
            // that already carries the full declared length must not be
            // parked waiting for continuations.
            if content.len() as u64 == declared {
                return Ok(Some((message_id, content)));
            }
            let mut buffer = BytesMut::with_capacity(capacity);
            buffer.extend_from_slice(&content);
            self.pending.insert(message_id, PartialMessage { declared, buffer });
            return Ok(None);
        }

        let Some(partial) = self.pending.get_mut(&message_id) else {
            return Err(CodecError::UnknownMessage { message_id });
        };
        partial.buffer.extend_from_slice(&content);
        let received = partial.buffer.len() as u64;
        if received > partial.declared {
            let declared = partial.declared;
            self.pending.remove(&message_id);
            return Err(CodecError::LengthMismatch {
                message_id,
                declared,
                received,
            });
        }
        if received == partial.declared {
            let complete = self
                .pending
                .remove(&message_id)
                .map(|partial| partial.buffer.freeze());
            return Ok(complete.map(|payload| (message_id, payload)));
        }
        Ok(None)
    }

    /// Number of messages currently mid-reassembly.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.pending.len() }

    /// Drop all partial reassembly state. Called on connection teardown.
    pub fn discard(&mut self) { self.pending.clear(); }
}

/// Streaming decoder combining chunk framing and message reassembly.
///
/// Bytes may be fed in arbitrary slices, byte-at-a-time through
/// whole-buffer-at-once; partial headers and partial content are retained
/// across calls.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use velostream::codec::{Chunker, ChunkCodec, MessageDecoder};
/// use tokio_util::codec::Encoder;
///
/// let chunker = Chunker::new(64);
/// let payload = Bytes::from_static(b"hello");
/// let chunks = chunker.chunk_message(7, &payload)?;
///
/// let mut codec = ChunkCodec::default();
/// let mut wire = bytes::BytesMut::new();
/// for chunk in chunks {
///     codec.encode(chunk, &mut wire)?;
/// }
///
/// let mut decoder = MessageDecoder::default();
/// let messages = decoder.feed(&wire)?;
/// assert_eq!(messages, vec![(7, payload)]);
/// # Ok::<(), velostream::codec::CodecError>(())
/// ```
#[derive(Debug)]
pub struct MessageDecoder {
    codec: ChunkCodec,
    assembler: MessageAssembler,
    buffer: BytesMut,
}

impl MessageDecoder {
    /// Create a decoder from explicit codec and assembler halves.
    #[must_use]
    pub fn new(codec: ChunkCodec, assembler: MessageAssembler) -> Self {
        Self {
            codec,
            assembler,
            buffer: BytesMut::new(),
        }
    }

    /// Feed raw bytes, returning zero or more completed messages.
    ///
    /// # Errors
    ///
    /// Propagates any [`CodecError`] from framing or reassembly; the decoder
    /// must be discarded afterwards.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<(u64, Bytes)>, CodecError> {
        self.buffer.extend_from_slice(bytes);
        let mut completed = Vec::new();
        while let Some(chunk) = self.codec.decode(&mut self.buffer)? {
            if let Some(message) = self.assembler.push(chunk)? {
                completed.push(message);
            }
        }
        Ok(completed)
    }

    /// Number of messages currently mid-reassembly.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.assembler.pending_len() }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(ChunkCodec::default(), MessageAssembler::with_default_limit())
    }
}
