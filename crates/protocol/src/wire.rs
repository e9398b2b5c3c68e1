use dupcodec_buffer::Buffer;

/// Leading byte of every frame and every control message.
pub const MAGIC: u8 = 0xf1;

/// Maximum payload bytes carried by a single frame.
pub const FRAME_LENGTH: usize = 32_768;

/// Length of the cache identity carried in a `HELLO`.
pub const UUID_SIZE: usize = 16;

/// Bytes in a frame header: magic, opcode, and big-endian length.
pub const HEADER_LENGTH: usize = 4;

/// Operation bytes used on the wire.
///
/// [`Frame`](Opcode::Frame) and [`Oob`](Opcode::Oob) appear in frame
/// headers; the remaining values appear inside out-of-band payloads, each
/// preceded by its own [`MAGIC`] byte.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Opcode {
    /// Introduces the sender's cache identity.
    Hello = 0x00,
    /// Teaches one segment; the receiver derives the hash itself.
    Learn = 0x01,
    /// Requests a segment by hash (big-endian).
    Ask = 0x02,
    /// The sender's encoder has no further data.
    Eos = 0x03,
    /// Acknowledges the peer's `EOS`.
    EosAck = 0x04,
    /// Frame payload: encoded stream bytes.
    Frame = 0x05,
    /// Frame payload: concatenated control messages.
    Oob = 0x06,
}

impl Opcode {
    /// Returns the numeric wire representation.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Maps a wire byte back to its opcode.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Hello),
            0x01 => Some(Self::Learn),
            0x02 => Some(Self::Ask),
            0x03 => Some(Self::Eos),
            0x04 => Some(Self::EosAck),
            0x05 => Some(Self::Frame),
            0x06 => Some(Self::Oob),
            _ => None,
        }
    }
}

/// Frames the entire contents of `input` onto `output`, splitting at
/// [`FRAME_LENGTH`].
///
/// `input` is drained; slab references move without copying.
pub fn encode_frames(output: &mut Buffer, input: &mut Buffer) {
    while !input.is_empty() {
        let frame_length = input.len().min(FRAME_LENGTH);
        output.push(MAGIC);
        output.push(Opcode::Frame.as_u8());
        output.append_slice(&(frame_length as u16).to_be_bytes());
        input.moveout(output, 0, frame_length);
    }
}

/// Wraps one or more control messages in a single out-of-band frame.
///
/// `message` is drained.
///
/// # Panics
///
/// Panics if `message` is empty or exceeds [`FRAME_LENGTH`]; control
/// messages are built by this crate and always fit one frame.
pub fn encode_oob(output: &mut Buffer, message: &mut Buffer) {
    assert!(
        !message.is_empty() && message.len() <= FRAME_LENGTH,
        "control message must fit a single frame"
    );
    output.push(MAGIC);
    output.push(Opcode::Oob.as_u8());
    output.append_slice(&(message.len() as u16).to_be_bytes());
    message.moveout(output, 0, message.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_round_trip() {
        for opcode in [
            Opcode::Hello,
            Opcode::Learn,
            Opcode::Ask,
            Opcode::Eos,
            Opcode::EosAck,
            Opcode::Frame,
            Opcode::Oob,
        ] {
            assert_eq!(Opcode::from_u8(opcode.as_u8()), Some(opcode));
        }
        assert_eq!(Opcode::from_u8(0x07), None);
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn small_payload_fits_one_frame() {
        let mut output = Buffer::new();
        let mut input = Buffer::from(&b"abc"[..]);
        encode_frames(&mut output, &mut input);
        assert!(input.is_empty());
        assert_eq!(
            output.to_vec(),
            vec![MAGIC, Opcode::Frame.as_u8(), 0x00, 0x03, b'a', b'b', b'c']
        );
    }

    #[test]
    fn oversized_payload_splits_at_frame_length() {
        let mut output = Buffer::new();
        let mut input = Buffer::from(vec![9u8; FRAME_LENGTH + 10]);
        encode_frames(&mut output, &mut input);

        assert_eq!(output.peek(), Some(MAGIC));
        assert_eq!(output.peek_at(1), Some(Opcode::Frame.as_u8()));
        assert_eq!(output.peek_u16_be(2), Some(FRAME_LENGTH as u16));

        let second_header = HEADER_LENGTH + FRAME_LENGTH;
        assert_eq!(output.peek_at(second_header), Some(MAGIC));
        assert_eq!(
            output.peek_u16_be(second_header + 2),
            Some(10)
        );
        assert_eq!(output.len(), 2 * HEADER_LENGTH + FRAME_LENGTH + 10);
    }

    #[test]
    fn oob_wraps_message_with_header() {
        let mut output = Buffer::new();
        let mut message = Buffer::from(&[MAGIC, Opcode::Eos.as_u8()][..]);
        encode_oob(&mut output, &mut message);
        assert_eq!(
            output.to_vec(),
            vec![MAGIC, Opcode::Oob.as_u8(), 0x00, 0x02, MAGIC, Opcode::Eos.as_u8()]
        );
    }

    #[test]
    #[should_panic(expected = "control message must fit a single frame")]
    fn empty_oob_message_panics() {
        let mut output = Buffer::new();
        encode_oob(&mut output, &mut Buffer::new());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn framed_payloads_parse_back_to_the_input(
                payload in proptest::collection::vec(any::<u8>(), 1..3 * FRAME_LENGTH),
            ) {
                let mut output = Buffer::new();
                let mut input = Buffer::from(payload.clone());
                encode_frames(&mut output, &mut input);

                let mut reassembled = Vec::new();
                while !output.is_empty() {
                    prop_assert_eq!(output.peek(), Some(MAGIC));
                    prop_assert_eq!(output.peek_at(1), Some(Opcode::Frame.as_u8()));
                    let length = output.peek_u16_be(2).expect("header is complete");
                    prop_assert!(length >= 1);
                    prop_assert!(usize::from(length) <= FRAME_LENGTH);
                    let mut body = Buffer::new();
                    output.moveout(&mut body, HEADER_LENGTH, usize::from(length));
                    reassembled.extend_from_slice(&body.to_vec());
                }
                prop_assert_eq!(reassembled, payload);
            }
        }
    }
}
