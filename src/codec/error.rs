//! Error taxonomy for the framing layer.

use std::io;

use thiserror::Error;

use super::CHUNK_HEADER_SIZE;

/// Errors raised while framing, defragmenting, or parsing message heads.
///
/// All variants except [`CodecError::Io`] indicate a protocol violation and
/// are fatal for the owning connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A chunk declared a total length smaller than its own header.
    #[error("chunk declares length {length}, below the {CHUNK_HEADER_SIZE}-byte header")]
    TruncatedChunk {
        /// Declared frame length.
        length: u32,
    },

    /// A chunk declared a length above the accepted maximum.
    #[error("chunk exceeds max length: {length} > {max}")]
    OversizedChunk {
        /// Declared frame length.
        length: usize,
        /// Maximum accepted frame length.
        max: usize,
    },

    /// A message would need more chunks than the combined field can encode.
    #[error("message requires {count} chunks, above the encodable maximum")]
    TooManyChunks {
        /// Number of chunks required.
        count: usize,
    },

    /// A continuation chunk arrived for a message id with no first chunk.
    #[error("continuation chunk for unknown message {message_id}")]
    UnknownMessage {
        /// The unrecognised message id.
        message_id: u64,
    },

    /// A first chunk arrived for a message id already being reassembled.
    #[error("duplicate first chunk for message {message_id}")]
    DuplicateMessage {
        /// The colliding message id.
        message_id: u64,
    },

    /// Accumulated content disagrees with the declared message length.
    #[error("message {message_id} length mismatch: declared {declared}, received {received}")]
    LengthMismatch {
        /// The affected message id.
        message_id: u64,
        /// Length declared in the first chunk.
        declared: u64,
        /// Bytes actually accumulated.
        received: u64,
    },

    /// A reassembled message would exceed the configured cap.
    #[error("message {message_id} too large: {attempted} > {max}")]
    OversizedMessage {
        /// The affected message id.
        message_id: u64,
        /// Size the message would have reached.
        attempted: usize,
        /// Maximum accepted message size.
        max: usize,
    },

    /// A message head failed to encode.
    #[error("failed to encode message head")]
    HeadEncode(#[source] bincode::error::EncodeError),

    /// A message head failed to decode.
    #[error("failed to decode message head")]
    HeadDecode(#[source] bincode::error::DecodeError),

    /// A message head carried an unexpected message type.
    #[error("unexpected message type {found}, expected {expected}")]
    UnexpectedMessageType {
        /// Type found on the wire.
        found: u32,
        /// Type required in this position.
        expected: u32,
    },

    /// Transport-level I/O failure while framing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
