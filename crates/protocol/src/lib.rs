#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Framing and control protocol around the segment codec.
//!
//! Each endpoint of a peering owns one [`PipePair`]: the encoder half turns
//! application bytes into framed, encoded wire data, and the decoder half
//! parses inbound frames, routes out-of-band control messages, and produces
//! decoded plaintext. The control channel carries the cache greeting
//! (`HELLO`), the learning conversation (`ASK`/`LEARN`) that resolves
//! references to segments the peer has not seen, and the `EOS`/`EOS_ACK`
//! handshake that closes a stream cleanly.
//!
//! The wire is a sequence of frames, `MAGIC | op | length | payload`, over
//! any reliable ordered byte stream; transport, event loop, and scheduling
//! live outside this crate.

mod condition;
mod error;
mod pipe;
mod wire;

pub use condition::{Condition, WaitHandle};
pub use error::ProtocolError;
pub use pipe::{DecoderOutput, EncoderOutput, PipePair};
pub use wire::{
    encode_frames, encode_oob, Opcode, FRAME_LENGTH, HEADER_LENGTH, MAGIC, UUID_SIZE,
};
