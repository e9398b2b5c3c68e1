//! Round-trip and determinism properties for the segment codec.
//!
//! Encoder and decoder share one cache here, the matched-cache setting in
//! which every reference the encoder emits is resolvable locally; the
//! learning conversation for mismatched caches is exercised by the protocol
//! crate's peering tests.

use std::collections::BTreeSet;

use dupcodec_buffer::Buffer;
use dupcodec_codec::{
    is_special, Decoder, Encoder, SegmentCache, SharedCache, ESCAPE_CHAR, SEGMENT_LENGTH,
};
use proptest::prelude::*;

fn matched_pair() -> (Encoder, Decoder, SharedCache) {
    let cache = SegmentCache::new().into_shared();
    (
        Encoder::new(cache.clone()),
        Decoder::new(cache.clone()),
        cache,
    )
}

fn encode(encoder: &mut Encoder, data: &[u8]) -> Buffer {
    let mut input = Buffer::from(data);
    let mut output = Buffer::new();
    encoder.encode(&mut output, &mut input);
    assert!(input.is_empty(), "encode must consume its input");
    output
}

fn decode(decoder: &mut Decoder, mut encoded: Buffer) -> Vec<u8> {
    let mut output = Buffer::new();
    let mut unknown = BTreeSet::new();
    decoder
        .decode(&mut output, &mut encoded, &mut unknown)
        .expect("matched caches never reject the stream");
    assert!(unknown.is_empty(), "matched caches never suspend");
    assert!(encoded.is_empty(), "no partial tokens in a complete stream");
    output.to_vec()
}

fn round_trip(chunks: &[Vec<u8>]) {
    let (mut encoder, mut decoder, _cache) = matched_pair();
    for chunk in chunks {
        let encoded = encode(&mut encoder, chunk);
        assert_eq!(&decode(&mut decoder, encoded), chunk);
    }
}

#[test]
fn empty_input_round_trips() {
    round_trip(&[Vec::new()]);
}

#[test]
fn repetitive_stream_round_trips_across_calls() {
    let chunk: Vec<u8> = b"the same twelve bytes again and again ".repeat(4);
    round_trip(&[chunk.clone(), chunk.clone(), chunk]);
}

#[test]
fn reserved_bytes_in_literals_round_trip() {
    // A referenced window surrounded by literal runs stuffed with every
    // reserved value.
    let mut data = vec![ESCAPE_CHAR; 8];
    data.extend(std::iter::repeat(0xf3).take(8));
    data.extend(std::iter::repeat(b'm').take(SEGMENT_LENGTH * 2));
    data.extend([0xf4, 0xf5, ESCAPE_CHAR]);
    round_trip(&[data.clone(), data]);
}

#[test]
fn shared_content_between_calls_round_trips() {
    let common: Vec<u8> = (0u16..SEGMENT_LENGTH as u16 * 3)
        .map(|value| (value % 241) as u8)
        .collect();
    let mut second = b"prefix that never matches".to_vec();
    second.extend_from_slice(&common);
    second.extend_from_slice(b"suffix");
    round_trip(&[common, second]);
}

proptest! {
    #[test]
    fn arbitrary_long_inputs_round_trip(
        data in proptest::collection::vec(any::<u8>(), SEGMENT_LENGTH..SEGMENT_LENGTH * 8),
    ) {
        round_trip(&[data]);
    }

    #[test]
    fn short_inputs_pass_through_verbatim(
        data in proptest::collection::vec(
            any::<u8>().prop_filter("reserved bytes are not literal-safe below one window", |byte| {
                !is_special(*byte)
            }),
            0..SEGMENT_LENGTH,
        ),
    ) {
        let (mut encoder, mut decoder, _cache) = matched_pair();
        let encoded = encode(&mut encoder, &data);
        prop_assert_eq!(encoded.to_vec(), data.clone());
        prop_assert_eq!(decode(&mut decoder, encoded), data);
    }

    #[test]
    fn chunked_streams_round_trip(
        chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), SEGMENT_LENGTH..SEGMENT_LENGTH * 4),
            1..5,
        ),
    ) {
        round_trip(&chunks);
    }

    #[test]
    fn encoding_is_deterministic_across_fresh_states(
        data in proptest::collection::vec(any::<u8>(), 0..SEGMENT_LENGTH * 6),
    ) {
        let (mut first, _, _) = matched_pair();
        let (mut second, _, _) = matched_pair();
        prop_assert_eq!(
            encode(&mut first, &data).to_vec(),
            encode(&mut second, &data).to_vec()
        );
    }

    #[test]
    fn warm_cache_output_still_round_trips(
        data in proptest::collection::vec(any::<u8>(), SEGMENT_LENGTH..SEGMENT_LENGTH * 4),
    ) {
        // Encode the same bytes twice through one encoder: the second pass
        // leans on the cache and back-reference window populated by the
        // first, and a lockstep decoder follows both.
        round_trip(&[data.clone(), data]);
    }
}
