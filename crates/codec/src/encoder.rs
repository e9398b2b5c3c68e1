use std::collections::VecDeque;

use dupcodec_buffer::Buffer;
use dupcodec_checksums::RollingHash;
use tracing::debug;

use crate::cache::{lock, SharedCache};
use crate::{
    is_special, BackrefWindow, Segment, BACKREF_CHAR, DECLARE_CHAR, ESCAPE_CHAR, HASHREF_CHAR,
    SEGMENT_LENGTH,
};

/// Rewrites a plaintext stream as declarations, references, and escaped
/// literals.
///
/// The encoder walks its input twice per call. The first pass rolls the hash
/// over every byte and collects two ordered queues: candidate positions with
/// their window hashes, and positions whose hash already resolved to a
/// byte-identical cached segment. The second pass walks the candidates in
/// stream order, declares the windows the cache does not know yet, discards
/// candidates that would overlap an already chosen window, and emits the
/// literal gaps between windows through the escape transform.
///
/// Output is deterministic given the cache and back-reference window state
/// at entry; the back-reference window advances exactly on declarations and
/// full-hash references so the peer's decoder window stays in lockstep.
#[derive(Debug)]
pub struct Encoder {
    cache: SharedCache,
    window: BackrefWindow,
}

impl Encoder {
    /// Creates an encoder interning into `cache`, with an empty
    /// back-reference window.
    #[must_use]
    pub fn new(cache: SharedCache) -> Self {
        Self {
            cache,
            window: BackrefWindow::new(),
        }
    }

    /// Consumes all of `input` and appends its encoded form to `output`.
    ///
    /// Inputs shorter than one segment are copied through verbatim: there is
    /// no window to match, and the framing above this layer already
    /// delimits the bytes.
    pub fn encode(&mut self, output: &mut Buffer, input: &mut Buffer) {
        if input.len() < SEGMENT_LENGTH {
            output.append_buffer(input);
            return;
        }

        let mut hash = RollingHash::new();
        let mut candidates: VecDeque<(usize, u64)> = VecDeque::new();
        let mut confirmed: VecDeque<(usize, Segment)> = VecDeque::new();
        let mut pending = Buffer::new();
        let mut offset = 0usize;
        let mut base = 0usize;

        while let Some(chunk) = input.pop_chunk() {
            pending.append_shared(chunk.clone());
            for &byte in chunk.iter() {
                offset += 1;
                hash.roll(byte);
                if offset - base < SEGMENT_LENGTH {
                    continue;
                }

                let start = offset - SEGMENT_LENGTH;
                let window_hash = hash.value();
                let cached = lock(&self.cache).lookup(window_hash);
                if let Some(cached) = cached {
                    let mut window_bytes = [0u8; SEGMENT_LENGTH];
                    pending.copyout(start, &mut window_bytes);
                    if !cached.matches(&window_bytes) {
                        debug!(hash = window_hash, "collision in candidate scan");
                        continue;
                    }
                    // Identical bytes are already interned; adopt them and
                    // refuse to window into this segment again.
                    confirmed.push_back((start, cached));
                    base = offset;
                }
                candidates.push_back((start, window_hash));
            }
        }

        let mut emitted = 0usize;
        while let Some((start, window_hash)) = candidates.pop_front() {
            let end = start + SEGMENT_LENGTH;

            let adopted = match confirmed.front() {
                Some(&(confirmed_start, _)) if confirmed_start == start => {
                    confirmed.pop_front().map(|(_, segment)| segment)
                }
                Some(&(confirmed_start, _))
                    if start < confirmed_start && end > confirmed_start =>
                {
                    // Would overlap an upcoming confirmed match; the match
                    // wins.
                    continue;
                }
                _ => None,
            };

            let segment = match adopted {
                Some(segment) => segment,
                None => {
                    let mut window_bytes = [0u8; SEGMENT_LENGTH];
                    pending.copyout(start - emitted, &mut window_bytes);

                    // Earlier declarations in this very call may have grown
                    // the cache, so the hash has to be resolved again.
                    let cached = lock(&self.cache).lookup(window_hash);
                    let resolved = match cached {
                        Some(cached) => {
                            if cached.matches(&window_bytes) {
                                Some(cached)
                            } else {
                                debug!(hash = window_hash, "collision in emission pass");
                                None
                            }
                        }
                        None => {
                            let segment = Segment::from_array(window_bytes);
                            if lock(&self.cache)
                                .enter(window_hash, segment.clone())
                                .is_err()
                            {
                                debug!(hash = window_hash, "collision while declaring");
                                None
                            } else {
                                output.push(DECLARE_CHAR);
                                output.append_slice(&window_hash.to_le_bytes());
                                output.append_shared(segment.shared());
                                self.window.declare(window_hash, segment.clone());
                                Some(segment)
                            }
                        }
                    };
                    let Some(segment) = resolved else {
                        continue;
                    };

                    while candidates
                        .front()
                        .is_some_and(|&(next_start, _)| next_start < end)
                    {
                        candidates.pop_front();
                    }
                    segment
                }
            };

            if emitted != start {
                let mut literal = Buffer::new();
                pending.moveout(&mut literal, 0, start - emitted);
                literal.escape(ESCAPE_CHAR, is_special);
                output.append_buffer(&mut literal);
            }
            pending.skip(SEGMENT_LENGTH);
            emitted = end;

            if let Some(token) = self.window.present(window_hash) {
                output.push(BACKREF_CHAR);
                output.push(token);
            } else {
                output.push(HASHREF_CHAR);
                output.append_slice(&window_hash.to_le_bytes());
                self.window.declare(window_hash, segment);
            }
        }

        debug_assert!(confirmed.is_empty(), "confirmed match left unconsumed");

        if !pending.is_empty() {
            pending.escape(ESCAPE_CHAR, is_special);
            output.append_buffer(&mut pending);
        }
    }
}
