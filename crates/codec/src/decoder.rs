use std::collections::BTreeSet;

use dupcodec_buffer::Buffer;
use dupcodec_checksums::RollingHash;

use crate::cache::{lock, SharedCache};
use crate::{
    is_special, BackrefWindow, CodecError, Segment, BACKREF_CHAR, DECLARE_CHAR, ESCAPE_CHAR,
    HASHREF_CHAR, SEGMENT_LENGTH,
};

/// Reassembles plaintext from a stream of declarations, references, and
/// escaped literals.
///
/// The decoder consumes whole tokens only: a token truncated by the end of
/// the input is left in place and the call returns successfully, to be
/// resumed when more bytes arrive. A full-hash reference whose hash is not
/// in the cache suspends the decoder instead: the hash is recorded in the
/// caller's unknown set and the token stays at the front of the input until
/// the surrounding protocol has learned the segment and calls again.
#[derive(Debug)]
pub struct Decoder {
    cache: SharedCache,
    window: BackrefWindow,
}

impl Decoder {
    /// Creates a decoder resolving references against `cache`, with an empty
    /// back-reference window.
    #[must_use]
    pub fn new(cache: SharedCache) -> Self {
        Self {
            cache,
            window: BackrefWindow::new(),
        }
    }

    /// Decodes as much of `input` as possible, appending plaintext to
    /// `output`.
    ///
    /// On return, `input` retains any trailing partial token, and
    /// `unknown_hashes` carries every hash the decoder is suspended on.
    /// Callers must not treat the produced output as complete while the
    /// unknown set is nonempty.
    ///
    /// # Errors
    ///
    /// Any error is a protocol violation that must terminate the peering:
    /// a declaration whose bytes do not rehash to its key
    /// ([`CodecError::DeclarationMismatch`]), a declaration colliding with
    /// an interned segment ([`CodecError::Collision`]), or a back-reference
    /// token pointing at an empty window slot
    /// ([`CodecError::UnknownBackref`]).
    pub fn decode(
        &mut self,
        output: &mut Buffer,
        input: &mut Buffer,
        unknown_hashes: &mut BTreeSet<u64>,
    ) -> Result<(), CodecError> {
        while let Some(first) = input.peek() {
            match first {
                ESCAPE_CHAR => {
                    let Some(escaped) = input.peek_at(1) else {
                        return Ok(());
                    };
                    input.skip(2);
                    output.push(escaped ^ 0xff);
                }
                DECLARE_CHAR => {
                    const TOKEN_LENGTH: usize = 1 + 8 + SEGMENT_LENGTH;
                    if input.len() < TOKEN_LENGTH {
                        return Ok(());
                    }
                    let Some(declared) = input.peek_u64_le(1) else {
                        return Ok(());
                    };
                    let bytes = input.extract(9, SEGMENT_LENGTH);
                    let computed = RollingHash::digest(&bytes);
                    if computed != declared {
                        return Err(CodecError::DeclarationMismatch { declared, computed });
                    }
                    let segment = Segment::from_bytes(bytes)?;
                    lock(&self.cache).enter(declared, segment.clone())?;
                    self.window.declare(declared, segment);
                    input.skip(TOKEN_LENGTH);
                }
                HASHREF_CHAR => {
                    let Some(hash) = input.peek_u64_le(1) else {
                        return Ok(());
                    };
                    let Some(segment) = lock(&self.cache).lookup(hash) else {
                        // Suspend: leave the token in place and let the
                        // protocol layer request the segment.
                        unknown_hashes.insert(hash);
                        return Ok(());
                    };
                    input.skip(9);
                    output.append_shared(segment.shared());
                    self.window.declare(hash, segment);
                }
                BACKREF_CHAR => {
                    let Some(token) = input.peek_at(1) else {
                        return Ok(());
                    };
                    let Some(segment) = self.window.dereference(token) else {
                        return Err(CodecError::UnknownBackref { token });
                    };
                    let bytes = segment.shared();
                    input.skip(2);
                    output.append_shared(bytes);
                }
                _ => {
                    let run = input.prefix_length(|byte| !is_special(byte));
                    input.moveout(output, 0, run);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SegmentCache;

    fn decoder() -> Decoder {
        Decoder::new(SegmentCache::new().into_shared())
    }

    fn declaration(segment: &[u8]) -> Vec<u8> {
        let mut wire = vec![DECLARE_CHAR];
        wire.extend_from_slice(&RollingHash::digest(segment).to_le_bytes());
        wire.extend_from_slice(segment);
        wire
    }

    #[test]
    fn plain_literals_pass_through() {
        let mut decoder = decoder();
        let mut input = Buffer::from(&b"plain old text"[..]);
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        decoder
            .decode(&mut output, &mut input, &mut unknown)
            .expect("literals decode");
        assert_eq!(output.to_vec(), b"plain old text");
        assert!(input.is_empty());
        assert!(unknown.is_empty());
    }

    #[test]
    fn escaped_literals_are_complemented() {
        let mut decoder = decoder();
        let mut input = Buffer::from(&[ESCAPE_CHAR, DECLARE_CHAR ^ 0xff, b'x'][..]);
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        decoder
            .decode(&mut output, &mut input, &mut unknown)
            .expect("escape decodes");
        assert_eq!(output.to_vec(), vec![DECLARE_CHAR, b'x']);
    }

    #[test]
    fn declaration_interns_without_emitting() {
        let mut decoder = decoder();
        let segment = [b'z'; SEGMENT_LENGTH];
        let mut input = Buffer::from(declaration(&segment));
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        decoder
            .decode(&mut output, &mut input, &mut unknown)
            .expect("declaration decodes");
        assert!(output.is_empty());
        assert!(input.is_empty());
        let hash = RollingHash::digest(&segment);
        assert!(lock(&decoder.cache).lookup(hash).is_some());
    }

    #[test]
    fn corrupted_declaration_is_rejected() {
        let mut decoder = decoder();
        let segment = [b'z'; SEGMENT_LENGTH];
        let mut wire = declaration(&segment);
        wire[1] ^= 0x01;
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        let result = decoder.decode(&mut output, &mut Buffer::from(wire), &mut unknown);
        assert!(matches!(
            result,
            Err(CodecError::DeclarationMismatch { .. })
        ));
    }

    #[test]
    fn unknown_hash_reference_suspends() {
        let mut decoder = decoder();
        let mut wire = vec![b'l', b'i', b't', HASHREF_CHAR];
        wire.extend_from_slice(&0xdead_beefu64.to_le_bytes());
        let mut input = Buffer::from(wire);
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        decoder
            .decode(&mut output, &mut input, &mut unknown)
            .expect("suspension is not an error");
        assert_eq!(output.to_vec(), b"lit");
        assert_eq!(unknown.iter().copied().collect::<Vec<_>>(), vec![0xdead_beef]);
        // The reference token is retained for the post-learning retry.
        assert_eq!(input.len(), 9);
        assert_eq!(input.peek(), Some(HASHREF_CHAR));
    }

    #[test]
    fn learned_hash_resumes_from_the_retained_token() {
        let mut decoder = decoder();
        let segment = Segment::from_array([b'q'; SEGMENT_LENGTH]);
        let hash = segment.hash();
        let mut wire = vec![HASHREF_CHAR];
        wire.extend_from_slice(&hash.to_le_bytes());
        let mut input = Buffer::from(wire);
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();

        decoder
            .decode(&mut output, &mut input, &mut unknown)
            .expect("suspension is not an error");
        assert!(output.is_empty());
        assert!(unknown.contains(&hash));

        lock(&decoder.cache)
            .enter(hash, segment)
            .expect("learned segment enters");
        unknown.clear();
        decoder
            .decode(&mut output, &mut input, &mut unknown)
            .expect("resume decodes");
        assert_eq!(output.to_vec(), vec![b'q'; SEGMENT_LENGTH]);
        assert!(input.is_empty());
    }

    #[test]
    fn back_reference_replays_declared_segment() {
        let mut decoder = decoder();
        let segment = [7u8; SEGMENT_LENGTH];
        let mut wire = declaration(&segment);
        wire.extend_from_slice(&[BACKREF_CHAR, 0]);
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        decoder
            .decode(&mut output, &mut Buffer::from(wire), &mut unknown)
            .expect("backref decodes");
        assert_eq!(output.to_vec(), vec![7u8; SEGMENT_LENGTH]);
    }

    #[test]
    fn dangling_back_reference_is_fatal() {
        let mut decoder = decoder();
        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        let result = decoder.decode(
            &mut output,
            &mut Buffer::from(&[BACKREF_CHAR, 9][..]),
            &mut unknown,
        );
        assert_eq!(result, Err(CodecError::UnknownBackref { token: 9 }));
    }

    #[test]
    fn truncated_tokens_are_retained_for_resumption() {
        let mut decoder = decoder();
        let segment = [1u8; SEGMENT_LENGTH];
        let wire = declaration(&segment);

        for cut in 1..wire.len() {
            let mut fresh = Decoder::new(SegmentCache::new().into_shared());
            let mut head = Buffer::from(&wire[..cut]);
            let mut output = Buffer::new();
            let mut unknown = BTreeSet::new();
            fresh
                .decode(&mut output, &mut head, &mut unknown)
                .expect("partial token is not an error");
            assert_eq!(head.len(), cut, "cut at {cut} must consume nothing");

            head.append_slice(&wire[cut..]);
            fresh
                .decode(&mut output, &mut head, &mut unknown)
                .expect("completed token decodes");
            assert!(head.is_empty());
            assert!(output.is_empty());
        }
    }

    #[test]
    fn window_mirrors_encoder_registration_order() {
        // Declarations and hash references advance the window; back
        // references must not, or the rings would drift apart.
        let mut decoder = decoder();
        let first = [1u8; SEGMENT_LENGTH];
        let second = Segment::from_array([2u8; SEGMENT_LENGTH]);
        lock(&decoder.cache)
            .enter(second.hash(), second.clone())
            .expect("seeded segment enters");

        let mut wire = declaration(&first);
        wire.push(BACKREF_CHAR);
        wire.push(0);
        wire.push(HASHREF_CHAR);
        wire.extend_from_slice(&second.hash().to_le_bytes());
        wire.push(BACKREF_CHAR);
        wire.push(1);

        let mut output = Buffer::new();
        let mut unknown = BTreeSet::new();
        decoder
            .decode(&mut output, &mut Buffer::from(wire), &mut unknown)
            .expect("mixed stream decodes");

        let mut expected = vec![1u8; SEGMENT_LENGTH];
        expected.extend_from_slice(&[2u8; SEGMENT_LENGTH]);
        expected.extend_from_slice(&[2u8; SEGMENT_LENGTH]);
        assert_eq!(output.to_vec(), expected);
    }
}
