//! Chunk header layout and the resumable chunk codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{CHUNK_HEADER_SIZE, MAX_CHUNK_LENGTH, error::CodecError};

/// Combined chunk-count/index field.
///
/// The low bit flags "is first chunk". A first chunk encodes the total number
/// of chunks in the remaining bits; a following chunk encodes its index.
/// A single-chunk message is its own first chunk with a count of one.
///
/// # Examples
///
/// ```
/// use velostream::codec::ChunkX;
///
/// assert_eq!(ChunkX::SINGLE, ChunkX::first(1));
/// assert_eq!(ChunkX::first(3).number_of_chunks(), Some(3));
/// assert_eq!(ChunkX::following(2).number_of_chunks(), None);
/// assert_eq!(ChunkX::following(2).value(), 2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkX(u32);

impl ChunkX {
    /// The "first and only" sentinel carried by single-chunk messages.
    pub const SINGLE: Self = Self::first(1);

    /// Build the field for the first of `number_of_chunks` chunks.
    #[must_use]
    pub const fn first(number_of_chunks: u32) -> Self { Self((number_of_chunks << 1) | 1) }

    /// Build the field for a following chunk at `index` (1-based position,
    /// counted from the first chunk at index zero).
    #[must_use]
    pub const fn following(index: u32) -> Self { Self(index << 1) }

    /// Reconstruct the field from its raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self { Self(raw) }

    /// Raw wire value.
    #[must_use]
    pub const fn raw(self) -> u32 { self.0 }

    /// Whether this chunk opens a message.
    #[must_use]
    pub const fn is_first(self) -> bool { self.0 & 1 == 1 }

    /// Total chunk count, when this is a first chunk.
    #[must_use]
    pub const fn number_of_chunks(self) -> Option<u32> {
        if self.is_first() { Some(self.0 >> 1) } else { None }
    }

    /// The count-or-index payload without the first-chunk flag.
    #[must_use]
    pub const fn value(self) -> u32 { self.0 >> 1 }
}

/// Fixed-size header preceding every chunk's content.
///
/// All integers are little-endian on the wire. `length` covers the header
/// itself plus this chunk's content; `message_length` is the total payload
/// length of the logical message across all of its chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    length: u32,
    chunk_x: ChunkX,
    message_id: u64,
    message_length: u64,
}

impl ChunkHeader {
    /// Build a header for a chunk carrying `content_length` bytes.
    ///
    /// The frame length must fit the `u32` wire field; the chunker and codec
    /// caps keep every reachable caller far below it.
    #[must_use]
    pub fn new(chunk_x: ChunkX, message_id: u64, message_length: u64, content_length: usize) -> Self {
        debug_assert!(
            CHUNK_HEADER_SIZE + content_length <= u32::MAX as usize,
            "chunk frame length overflows the u32 header field"
        );
        let length = u32::try_from(CHUNK_HEADER_SIZE + content_length)
            .unwrap_or(u32::MAX);
        Self {
            length,
            chunk_x,
            message_id,
            message_length,
        }
    }

    /// Total frame length: header plus content.
    #[must_use]
    pub const fn length(&self) -> u32 { self.length }

    /// Combined chunk-count/index field.
    #[must_use]
    pub const fn chunk_x(&self) -> ChunkX { self.chunk_x }

    /// Message id correlating this chunk with its message.
    #[must_use]
    pub const fn message_id(&self) -> u64 { self.message_id }

    /// Total payload length of the logical message.
    #[must_use]
    pub const fn message_length(&self) -> u64 { self.message_length }

    /// Content bytes carried by this chunk.
    #[must_use]
    pub const fn content_length(&self) -> usize { self.length as usize - CHUNK_HEADER_SIZE }

    /// Append the wire representation to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(CHUNK_HEADER_SIZE);
        dst.put_u32_le(self.length);
        dst.put_u32_le(self.chunk_x.raw());
        dst.put_u64_le(self.message_id);
        dst.put_u64_le(self.message_length);
    }

    /// Consume one header from the front of `src`.
    ///
    /// The caller must have verified that at least [`CHUNK_HEADER_SIZE`]
    /// bytes are available.
    fn read_from(src: &mut BytesMut) -> Self {
        let length = src.get_u32_le();
        let chunk_x = ChunkX::from_raw(src.get_u32_le());
        let message_id = src.get_u64_le();
        let message_length = src.get_u64_le();
        Self {
            length,
            chunk_x,
            message_id,
            message_length,
        }
    }
}

/// One decoded chunk: header plus content bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    header: ChunkHeader,
    content: Bytes,
}

impl Chunk {
    /// Pair a header with its content.
    #[must_use]
    pub const fn new(header: ChunkHeader, content: Bytes) -> Self { Self { header, content } }

    /// The chunk header.
    #[must_use]
    pub const fn header(&self) -> &ChunkHeader { &self.header }

    /// The chunk content bytes.
    #[must_use]
    pub const fn content(&self) -> &Bytes { &self.content }

    /// Consume the chunk, returning its components.
    #[must_use]
    pub fn into_parts(self) -> (ChunkHeader, Bytes) { (self.header, self.content) }
}

/// Resumable chunk framing over a byte stream.
///
/// Decoding alternates between reading a fixed-size header and reading
/// `content_length` bytes of payload; partial reads across network buffer
/// boundaries are retained in the source buffer, and state only advances once
/// a whole chunk is available.
#[derive(Clone, Debug)]
pub struct ChunkCodec {
    max_chunk_length: usize,
}

impl ChunkCodec {
    /// Create a codec accepting chunks up to `max_chunk_length` bytes.
    ///
    /// The limit is clamped to at most [`MAX_CHUNK_LENGTH`] and at least one
    /// content byte beyond the header.
    #[must_use]
    pub fn new(max_chunk_length: usize) -> Self {
        Self {
            max_chunk_length: max_chunk_length.clamp(CHUNK_HEADER_SIZE + 1, MAX_CHUNK_LENGTH),
        }
    }

    /// Maximum accepted chunk length.
    #[must_use]
    pub const fn max_chunk_length(&self) -> usize { self.max_chunk_length }
}

impl Default for ChunkCodec {
    fn default() -> Self { Self::new(MAX_CHUNK_LENGTH) }
}

impl Decoder for ChunkCodec {
    type Item = Chunk;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < CHUNK_HEADER_SIZE {
            src.reserve(CHUNK_HEADER_SIZE - src.len());
            return Ok(None);
        }

        // Peek the declared length without consuming the header, so partial
        // content reads leave the buffer positioned for the next call.
        let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let declared_len = declared as usize;
        if declared_len < CHUNK_HEADER_SIZE {
            return Err(CodecError::TruncatedChunk { length: declared });
        }
        if declared_len > self.max_chunk_length {
            return Err(CodecError::OversizedChunk {
                length: declared_len,
                max: self.max_chunk_length,
            });
        }
        if src.len() < declared_len {
            src.reserve(declared_len - src.len());
            return Ok(None);
        }

        let header = ChunkHeader::read_from(src);
        let content = src.split_to(header.content_length()).freeze();
        Ok(Some(Chunk::new(header, content)))
    }
}

impl Encoder<Chunk> for ChunkCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame_len = CHUNK_HEADER_SIZE + item.content().len();
        if frame_len > self.max_chunk_length {
            return Err(CodecError::OversizedChunk {
                length: frame_len,
                max: self.max_chunk_length,
            });
        }
        let (header, content) = item.into_parts();
        dst.reserve(frame_len);
        header.write_to(dst);
        dst.extend_from_slice(&content);
        Ok(())
    }
}
