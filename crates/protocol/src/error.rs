use std::io;

use dupcodec_codec::CodecError;
use thiserror::Error;

/// Connection-terminating protocol violations.
///
/// Everything here is fatal: the pipe pair returns the error to its owner,
/// no further output is produced, and the peering must be torn down. The
/// recoverable conditions of the stream (short reads, decoder suspension on
/// unknown hashes) are not errors and never appear here.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame began with something other than the protocol magic.
    #[error("expected frame magic, got {byte:#04x}")]
    BadMagic {
        /// The byte found where [`crate::MAGIC`] was required.
        byte: u8,
    },

    /// A control message began with something other than the protocol
    /// magic.
    #[error("expected control magic, got {byte:#04x}")]
    BadControlMagic {
        /// The offending byte.
        byte: u8,
    },

    /// A frame header carried an opcode this implementation does not know.
    #[error("unknown opcode {opcode:#04x} in frame header")]
    UnknownOpcode {
        /// The unrecognized opcode byte.
        opcode: u8,
    },

    /// A frame header carried an opcode that is only valid inside control
    /// payloads.
    #[error("unframed control opcode {opcode:#04x}; peer speaks an incompatible dialect")]
    UnframedData {
        /// The misplaced opcode byte.
        opcode: u8,
    },

    /// A control payload carried an opcode that is not a control message.
    #[error("unsupported operation {opcode:#04x} in control stream")]
    UnknownControlOp {
        /// The unrecognized opcode byte.
        opcode: u8,
    },

    /// A frame length fell outside `1..=FRAME_LENGTH`.
    #[error("invalid frame length {length}")]
    InvalidLength {
        /// The rejected length field.
        length: u16,
    },

    /// Encoded payload arrived before the peer introduced its cache.
    #[error("frame data received before HELLO")]
    FrameBeforeHello,

    /// A control message was cut short by the end of its payload.
    #[error("truncated control message")]
    TruncatedControl,

    /// The peer introduced its cache a second time.
    #[error("duplicate HELLO")]
    DuplicateHello,

    /// A `HELLO` carried an identity of the wrong size.
    #[error("unsupported HELLO identity length {length}")]
    HelloLength {
        /// The advertised identity length.
        length: u8,
    },

    /// The peer asked before we introduced ourselves, so it cannot have
    /// seen any of our references.
    #[error("ASK received before sending HELLO")]
    AskBeforeHello,

    /// The peer asked for a hash our cache does not hold.
    #[error("ASK for unknown hash {hash:#018x}")]
    AskUnknownHash {
        /// The unanswerable hash.
        hash: u64,
    },

    /// A `LEARN` arrived before the peer introduced its cache.
    #[error("LEARN received before HELLO")]
    LearnBeforeHello,

    /// A taught segment collided with an interned one.
    #[error("LEARN collides with cached segment for hash {hash:#018x}")]
    LearnCollision {
        /// The contested hash.
        hash: u64,
    },

    /// The peer signalled end-of-stream twice.
    #[error("duplicate EOS")]
    DuplicateEos,

    /// The peer acknowledged an end-of-stream we never sent.
    #[error("EOS_ACK received before sending EOS")]
    PrematureEosAck,

    /// The peer acknowledged our end-of-stream twice.
    #[error("duplicate EOS_ACK")]
    DuplicateEosAck,

    /// The caller pushed more stream data after signalling end-of-stream.
    #[error("encoder input after EOS")]
    EncodeAfterEos,

    /// The decoder rejected the encoded stream.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<ProtocolError> for io::Error {
    fn from(error: ProtocolError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_pass_through_transparently() {
        let inner = CodecError::UnknownBackref { token: 3 };
        let error = ProtocolError::from(inner.clone());
        assert_eq!(error.to_string(), inner.to_string());
    }

    #[test]
    fn io_conversion_preserves_kind() {
        let error: io::Error = ProtocolError::DuplicateHello.into();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
