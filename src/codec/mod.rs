//! VST chunk framing: splitting messages into length-prefixed chunks and
//! reassembling inbound chunks into complete messages.
//!
//! Each chunk carries a fixed 24-byte little-endian header
//! (`u32 length | u32 chunkX | u64 message id | u64 message length`) followed
//! by content bytes. The combined `chunkX` field lets a receiver, seeing only
//! the first chunk, pre-allocate a reassembly buffer sized either to the
//! single chunk's content (one-chunk case) or to the full message length.
//!
//! The layer is split by direction:
//!
//! - [`Chunker`] assigns monotonic message ids and splits outbound payloads.
//! - [`ChunkCodec`] is a `tokio_util` [`Decoder`](tokio_util::codec::Decoder)
//!   / [`Encoder`](tokio_util::codec::Encoder) pair, resumable across partial
//!   reads.
//! - [`MessageAssembler`] stitches decoded chunks back into complete message
//!   payloads keyed by message id.
//! - [`MessageDecoder`] combines codec and assembler behind the plain
//!   `feed(bytes)` contract used where no socket is involved.
//!
//! Malformed headers and size mismatches are fatal for the owning connection:
//! they surface as a [`CodecError`] that the connection layer turns into a
//! teardown failing every pending request.

pub mod assembler;
pub mod chunk;
pub mod chunker;
pub mod error;

pub use assembler::{MessageAssembler, MessageDecoder};
pub use chunk::{Chunk, ChunkCodec, ChunkHeader, ChunkX};
pub use chunker::Chunker;
pub use error::CodecError;

/// Fixed chunk header size in bytes.
pub const CHUNK_HEADER_SIZE: usize = 24;

/// Maximum chunk length (header plus content) the decoder accepts (16 MiB).
///
/// Bounds allocation when reading headers from an untrusted peer; the peer
/// chooses its own outbound chunk size, so this is deliberately generous.
pub const MAX_CHUNK_LENGTH: usize = 16 * 1024 * 1024;

/// Maximum reassembled message length the assembler accepts (256 MiB).
pub const MAX_MESSAGE_LENGTH: usize = 256 * 1024 * 1024;

/// Literal protocol marker sent as the first bytes after connect.
pub const PROTOCOL_MARKER: &[u8] = b"VST/1.1\r\n\r\n";

#[cfg(test)]
mod tests;
