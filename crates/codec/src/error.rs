use std::io;

use thiserror::Error;

/// Errors surfaced by cache insertion and stream decoding.
///
/// Encoding itself never fails: candidate windows whose cached bytes
/// disagree with the stream are silently skipped. The decoder, by contrast,
/// treats every variant here as a protocol violation that must terminate the
/// peering.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CodecError {
    /// Two different segments claimed the same cache key.
    #[error("segment cache already holds different bytes for hash {hash:#018x}")]
    Collision {
        /// The contested cache key.
        hash: u64,
    },

    /// A declared segment does not hash to its declared key.
    #[error("declared segment hashes to {computed:#018x}, not {declared:#018x}")]
    DeclarationMismatch {
        /// Hash carried by the declaration.
        declared: u64,
        /// Hash recomputed from the declared bytes.
        computed: u64,
    },

    /// A back-reference token named a window slot holding nothing, or a
    /// different hash than the encoder placed there.
    #[error("back-reference token {token} does not name a live window slot")]
    UnknownBackref {
        /// The dangling token.
        token: u8,
    },

    /// A segment was built from a slab of the wrong size.
    #[error("segment requires exactly {expected} bytes, got {length}")]
    SegmentLength {
        /// Length of the rejected slab.
        length: usize,
        /// Required segment length.
        expected: usize,
    },
}

impl From<CodecError> for io::Error {
    fn from(error: CodecError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_both_hashes_for_mismatches() {
        let error = CodecError::DeclarationMismatch {
            declared: 0x1122,
            computed: 0x3344,
        };
        let rendered = error.to_string();
        assert!(rendered.contains("0x0000000000003344"));
        assert!(rendered.contains("0x0000000000001122"));
    }

    #[test]
    fn io_conversion_preserves_kind() {
        let error: io::Error = CodecError::UnknownBackref { token: 7 }.into();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
