use bytes::Bytes;
use dupcodec_checksums::RollingHash;

use crate::{CodecError, SEGMENT_LENGTH};

/// An immutable, reference-counted slab of exactly [`SEGMENT_LENGTH`] bytes.
///
/// Segments are the unit of interning: once a `(hash, segment)` pair enters a
/// cache it never changes, so clones merely bump the slab's reference count
/// and every holder observes the same bytes. Equality is by content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    bytes: Bytes,
}

impl Segment {
    /// Wraps a shared slab, verifying the length invariant.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SegmentLength`] unless the slab holds exactly
    /// [`SEGMENT_LENGTH`] bytes.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, CodecError> {
        if bytes.len() != SEGMENT_LENGTH {
            return Err(CodecError::SegmentLength {
                length: bytes.len(),
                expected: SEGMENT_LENGTH,
            });
        }
        Ok(Self { bytes })
    }

    /// Builds a segment from a correctly sized array, copying it into a
    /// fresh slab.
    #[must_use]
    pub fn from_array(bytes: [u8; SEGMENT_LENGTH]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(&bytes),
        }
    }

    /// Returns the segment contents.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns a shared handle to the underlying slab.
    #[inline]
    #[must_use]
    pub fn shared(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Returns `true` if the segment holds exactly `data`.
    #[inline]
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        self.bytes.as_ref() == data
    }

    /// Computes the segment's content address.
    #[must_use]
    pub fn hash(&self) -> u64 {
        RollingHash::digest(&self.bytes)
    }
}
