//! Unit tests for chunk framing, splitting, and reassembly.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::{
    CHUNK_HEADER_SIZE,
    Chunk,
    ChunkCodec,
    ChunkHeader,
    ChunkX,
    Chunker,
    CodecError,
    MessageAssembler,
    MessageDecoder,
};

fn encode_message(message_id: u64, payload: &[u8], chunk_length: usize) -> BytesMut {
    let chunker = Chunker::new(chunk_length);
    let chunks = chunker
        .chunk_message(message_id, &Bytes::copy_from_slice(payload))
        .expect("payload chunks");
    let mut codec = ChunkCodec::default();
    let mut wire = BytesMut::new();
    for chunk in chunks {
        codec.encode(chunk, &mut wire).expect("chunk encodes");
    }
    wire
}

#[rstest]
#[case(ChunkX::SINGLE, true, Some(1))]
#[case(ChunkX::first(5), true, Some(5))]
#[case(ChunkX::following(1), false, None)]
#[case(ChunkX::following(4), false, None)]
fn chunk_x_field_layout(
    #[case] chunk_x: ChunkX,
    #[case] is_first: bool,
    #[case] count: Option<u32>,
) {
    assert_eq!(chunk_x.is_first(), is_first);
    assert_eq!(chunk_x.number_of_chunks(), count);
    assert_eq!(ChunkX::from_raw(chunk_x.raw()), chunk_x);
}

#[test]
fn single_chunk_uses_sentinel() {
    let chunker = Chunker::new(1024);
    let chunks = chunker
        .chunk_message(9, &Bytes::from_static(b"small payload"))
        .expect("chunks");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].header().chunk_x(), ChunkX::SINGLE);
    assert_eq!(chunks[0].header().message_length(), 13);
}

#[test]
fn multi_chunk_headers_carry_count_then_index() {
    let chunker = Chunker::new(CHUNK_HEADER_SIZE + 4);
    let payload = Bytes::from_static(b"0123456789");
    let chunks = chunker.chunk_message(3, &payload).expect("chunks");
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].header().chunk_x(), ChunkX::first(3));
    assert_eq!(chunks[1].header().chunk_x(), ChunkX::following(1));
    assert_eq!(chunks[2].header().chunk_x(), ChunkX::following(2));
    for chunk in &chunks {
        assert_eq!(chunk.header().message_id(), 3);
        assert_eq!(chunk.header().message_length(), 10);
    }
}

#[test]
fn message_ids_are_monotonic_and_reset() {
    let chunker = Chunker::new(1024);
    assert_eq!(chunker.next_message_id(), 1);
    assert_eq!(chunker.next_message_id(), 2);
    chunker.reset();
    assert_eq!(chunker.next_message_id(), 1);
}

#[test]
fn decoder_waits_for_full_header_and_content() {
    let wire = encode_message(5, b"some payload bytes", 1024);
    let mut codec = ChunkCodec::default();
    let mut buf = BytesMut::new();

    // Header split mid-way: nothing decodes yet.
    buf.extend_from_slice(&wire[..10]);
    assert!(codec.decode(&mut buf).expect("no error").is_none());
    // Header complete, content partial: still nothing.
    buf.extend_from_slice(&wire[10..30]);
    assert!(codec.decode(&mut buf).expect("no error").is_none());
    // Remainder arrives: one chunk.
    buf.extend_from_slice(&wire[30..]);
    let chunk = codec.decode(&mut buf).expect("no error").expect("chunk");
    assert_eq!(chunk.header().message_id(), 5);
    assert_eq!(chunk.content().as_ref(), b"some payload bytes");
}

#[test]
fn truncated_length_is_fatal() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&10u32.to_le_bytes());
    buf.extend_from_slice(&[0u8; 20]);
    let mut codec = ChunkCodec::default();
    let err = codec.decode(&mut buf).expect_err("truncated length rejected");
    assert!(matches!(err, CodecError::TruncatedChunk { length: 10 }));
}

#[test]
fn oversized_chunk_is_fatal() {
    let mut buf = BytesMut::new();
    let declared = u32::try_from(CHUNK_HEADER_SIZE + 100).expect("fits");
    buf.extend_from_slice(&declared.to_le_bytes());
    buf.extend_from_slice(&[0u8; 20]);
    let mut codec = ChunkCodec::new(CHUNK_HEADER_SIZE + 50);
    let err = codec.decode(&mut buf).expect_err("oversized chunk rejected");
    assert!(matches!(err, CodecError::OversizedChunk { .. }));
}

#[test]
fn assembler_rejects_unknown_continuation() {
    let mut assembler = MessageAssembler::with_default_limit();
    let header = ChunkHeader::new(ChunkX::following(1), 42, 10, 4);
    let err = assembler
        .push(Chunk::new(header, Bytes::from_static(b"abcd")))
        .expect_err("unknown continuation rejected");
    assert!(matches!(err, CodecError::UnknownMessage { message_id: 42 }));
}

#[test]
fn assembler_rejects_duplicate_first_chunk() {
    let mut assembler = MessageAssembler::with_default_limit();
    let first = ChunkHeader::new(ChunkX::first(2), 7, 8, 4);
    assert!(
        assembler
            .push(Chunk::new(first, Bytes::from_static(b"abcd")))
            .expect("first chunk accepted")
            .is_none()
    );
    let err = assembler
        .push(Chunk::new(first, Bytes::from_static(b"abcd")))
        .expect_err("duplicate first chunk rejected");
    assert!(matches!(err, CodecError::DuplicateMessage { message_id: 7 }));
}

#[test]
fn assembler_rejects_single_chunk_length_mismatch() {
    let mut assembler = MessageAssembler::with_default_limit();
    let header = ChunkHeader::new(ChunkX::SINGLE, 8, 99, 4);
    let err = assembler
        .push(Chunk::new(header, Bytes::from_static(b"abcd")))
        .expect_err("length mismatch rejected");
    assert!(matches!(
        err,
        CodecError::LengthMismatch {
            message_id: 8,
            declared: 99,
            received: 4,
        }
    ));
}

#[test]
fn assembler_rejects_content_overrun() {
    let mut assembler = MessageAssembler::with_default_limit();
    let first = ChunkHeader::new(ChunkX::first(2), 11, 6, 4);
    assert!(
        assembler
            .push(Chunk::new(first, Bytes::from_static(b"abcd")))
            .expect("first chunk accepted")
            .is_none()
    );
    let follow = ChunkHeader::new(ChunkX::following(1), 11, 6, 4);
    let err = assembler
        .push(Chunk::new(follow, Bytes::from_static(b"efgh")))
        .expect_err("overrun rejected");
    assert!(matches!(err, CodecError::LengthMismatch { message_id: 11, .. }));
    assert_eq!(assembler.pending_len(), 0);
}

#[test]
fn assembler_enforces_message_cap() {
    let mut assembler = MessageAssembler::new(8);
    let first = ChunkHeader::new(ChunkX::first(3), 12, 100, 4);
    let err = assembler
        .push(Chunk::new(first, Bytes::from_static(b"abcd")))
        .expect_err("oversized message rejected");
    assert!(matches!(err, CodecError::OversizedMessage { message_id: 12, .. }));
}

#[test]
#[should_panic(expected = "overflows the u32 header field")]
fn header_rejects_frame_length_overflow() {
    let _ = ChunkHeader::new(ChunkX::SINGLE, 1, 0, u32::MAX as usize);
}

#[test]
fn full_length_first_chunk_completes_immediately() {
    // Declares two chunks but already carries the whole message; it must
    // complete rather than wait for continuations that carry nothing.
    let mut assembler = MessageAssembler::with_default_limit();
    let header = ChunkHeader::new(ChunkX::first(2), 21, 4, 4);
    let done = assembler
        .push(Chunk::new(header, Bytes::from_static(b"abcd")))
        .expect("accepted")
        .expect("completes on the first chunk");
    assert_eq!(done, (21, Bytes::from_static(b"abcd")));
    assert_eq!(assembler.pending_len(), 0);
}

#[test]
fn interleaved_messages_reassemble_independently() {
    let chunker = Chunker::new(CHUNK_HEADER_SIZE + 4);
    let a = Bytes::from_static(b"aaaaaaaa");
    let b = Bytes::from_static(b"bbbbbbbb");
    let chunks_a = chunker.chunk_message(1, &a).expect("chunks");
    let chunks_b = chunker.chunk_message(2, &b).expect("chunks");

    let mut assembler = MessageAssembler::with_default_limit();
    assert!(assembler.push(chunks_a[0].clone()).expect("ok").is_none());
    assert!(assembler.push(chunks_b[0].clone()).expect("ok").is_none());
    let done_b = assembler.push(chunks_b[1].clone()).expect("ok").expect("b completes");
    let done_a = assembler.push(chunks_a[1].clone()).expect("ok").expect("a completes");
    assert_eq!(done_a, (1, a));
    assert_eq!(done_b, (2, b));
    assert_eq!(assembler.pending_len(), 0);
}

proptest! {
    /// Round trip: any payload, any chunk size above the header, any feed
    /// granularity from byte-at-a-time up to the whole buffer.
    #[test]
    fn chunk_round_trip(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
        chunk_length in (CHUNK_HEADER_SIZE + 1)..512usize,
        feed_size in 1..600usize,
    ) {
        let message_id = 77u64;
        let wire = encode_message(message_id, &payload, chunk_length);

        let mut decoder = MessageDecoder::default();
        let mut completed = Vec::new();
        for piece in wire.chunks(feed_size) {
            completed.extend(decoder.feed(piece).expect("feed succeeds"));
        }

        prop_assert_eq!(completed.len(), 1);
        let (id, reassembled) = completed.remove(0);
        prop_assert_eq!(id, message_id);
        prop_assert_eq!(reassembled.as_ref(), payload.as_slice());
        prop_assert_eq!(decoder.pending_len(), 0);
    }
}
