#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Content-addressed segment codec.
//!
//! Recurring 64-byte windows of a byte stream are interned in a shared
//! [`SegmentCache`] keyed by their rolling hash and replaced on the wire by
//! short references. The [`Encoder`] scans outbound plaintext for windows it
//! can reference, declaring new segments as it goes; the [`Decoder`] resolves
//! references back into plaintext, pausing whenever it meets a hash its cache
//! does not know yet so the surrounding protocol can ask the peer to teach
//! it. A [`BackrefWindow`] on each side squeezes recently used hashes down to
//! one-byte tokens.
//!
//! The crate deals purely in buffers and cache state; framing, control
//! messages, and the learning conversation live in `dupcodec-protocol`.

mod backref;
mod cache;
mod decoder;
mod encoder;
mod error;
mod segment;

pub use backref::{BackrefWindow, WINDOW_COUNT};
pub use cache::{lock, CacheRegistry, SegmentCache, SharedCache};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::CodecError;
pub use segment::Segment;

/// Number of plaintext bytes covered by one interned segment.
pub const SEGMENT_LENGTH: usize = dupcodec_checksums::WINDOW_LENGTH;

/// Escape prefix for literal bytes that collide with the reserved values.
pub const ESCAPE_CHAR: u8 = 0xf2;

/// Introduces a `(hash, segment)` declaration: 8-byte little-endian hash
/// followed by the segment bytes.
pub const DECLARE_CHAR: u8 = 0xf3;

/// Introduces a one-byte back-reference token.
pub const BACKREF_CHAR: u8 = 0xf4;

/// Introduces an 8-byte little-endian hash reference.
pub const HASHREF_CHAR: u8 = 0xf5;

/// Returns `true` for byte values that cannot appear bare in literal data.
#[inline]
#[must_use]
pub const fn is_special(byte: u8) -> bool {
    matches!(byte, ESCAPE_CHAR | DECLARE_CHAR | BACKREF_CHAR | HASHREF_CHAR)
}
