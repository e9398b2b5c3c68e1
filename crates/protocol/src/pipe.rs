use std::collections::BTreeSet;

use dupcodec_buffer::Buffer;
use dupcodec_checksums::RollingHash;
use dupcodec_codec::{
    lock, CacheRegistry, Decoder, Encoder, Segment, SharedCache, SEGMENT_LENGTH,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::condition::Condition;
use crate::error::ProtocolError;
use crate::wire::{encode_frames, encode_oob, Opcode, FRAME_LENGTH, HEADER_LENGTH, MAGIC, UUID_SIZE};

/// Wire bytes produced by feeding the encoder half of a [`PipePair`].
#[derive(Debug, Default)]
pub struct EncoderOutput {
    /// Framed bytes to deliver to the peer.
    pub wire: Buffer,
    /// `true` when the wire side should be closed without further output.
    pub shutdown: bool,
}

/// Everything produced by feeding inbound wire bytes to a [`PipePair`].
#[derive(Debug, Default)]
pub struct DecoderOutput {
    /// Decoded plaintext for the application.
    pub output: Buffer,
    /// `true` when the peer's stream ended and the application should see
    /// end-of-file.
    pub output_eof: bool,
    /// Control responses (`LEARN`, `ASK`, `EOS_ACK`) to deliver to the peer.
    pub wire: Buffer,
    /// `true` when the shutdown handshake completed and the wire side
    /// should be closed.
    pub shutdown: bool,
}

enum PayloadKind {
    Frame,
    Control,
}

/// One endpoint of a compressing duplex channel.
///
/// The pair owns both directions: [`encoder_consume`](Self::encoder_consume)
/// turns outbound application bytes into framed wire data, and
/// [`decoder_consume`](Self::decoder_consume) turns inbound wire data into
/// decoded plaintext plus whatever control responses the conversation
/// requires. The first outbound bytes are preceded by a `HELLO` that
/// introduces the local cache identity; the decoder half is only born when
/// the peer's `HELLO` arrives, bound to the cache the registry resolves for
/// the peer's identity.
///
/// A decoder meeting a reference it cannot resolve parks the stream and
/// emits an `ASK`; the matching `LEARN` interns the missing segment,
/// signals the resume condition, and decoding picks up exactly where it
/// stopped. End-of-stream is a two-way handshake: each side's `EOS` must be
/// answered by the other's `EOS_ACK` before the wire closes.
///
/// All methods run on the owner's thread; any returned [`ProtocolError`] is
/// fatal and the pair must be discarded.
pub struct PipePair {
    cache: SharedCache,
    registry: CacheRegistry,
    encoder: Option<Encoder>,
    decoder: Option<Decoder>,
    decoder_cache: Option<SharedCache>,
    wire_buffer: Buffer,
    frame_buffer: Buffer,
    unknown_hashes: BTreeSet<u64>,
    asked_hashes: BTreeSet<u64>,
    resume: Condition,
    sent_eos: bool,
    received_eos: bool,
    received_eos_ack: bool,
}

impl PipePair {
    /// Creates an endpoint encoding against `cache`, resolving peer
    /// identities through the process-wide registry.
    #[must_use]
    pub fn new(cache: SharedCache) -> Self {
        Self::with_registry(cache, CacheRegistry::global())
    }

    /// Creates an endpoint with an explicit registry.
    ///
    /// Separate registries model separate hosts, which is how tests run
    /// both ends of a peering inside one process without accidentally
    /// sharing segment state.
    #[must_use]
    pub fn with_registry(cache: SharedCache, registry: CacheRegistry) -> Self {
        Self {
            cache,
            registry,
            encoder: None,
            decoder: None,
            decoder_cache: None,
            wire_buffer: Buffer::new(),
            frame_buffer: Buffer::new(),
            unknown_hashes: BTreeSet::new(),
            asked_hashes: BTreeSet::new(),
            resume: Condition::new(),
            sent_eos: false,
            received_eos: false,
            received_eos_ack: false,
        }
    }

    /// Returns a handle to the condition signalled whenever learning
    /// empties the unknown-hash set and decoding can resume.
    #[must_use]
    pub fn resume_condition(&self) -> Condition {
        self.resume.clone()
    }

    /// Returns `true` while the decoder is parked on unlearned segments.
    #[must_use]
    pub fn awaiting_segments(&self) -> bool {
        !self.unknown_hashes.is_empty()
    }

    /// Consumes outbound application bytes, producing framed wire data.
    ///
    /// An empty `input` signals the end of the outbound stream: the pair
    /// emits `EOS` (or, if nothing was ever sent, simply closes) and refuses
    /// further input.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EncodeAfterEos`] if called again after the
    /// empty input that ended the stream.
    pub fn encoder_consume(&mut self, input: &mut Buffer) -> Result<EncoderOutput, ProtocolError> {
        if self.sent_eos {
            return Err(ProtocolError::EncodeAfterEos);
        }

        let mut produced = EncoderOutput::default();

        if self.encoder.is_none() {
            if input.is_empty() {
                info!("outbound stream ended before any data; closing without handshake");
                produced.shutdown = true;
                return Ok(produced);
            }

            let identity = lock(&self.cache).uuid_bytes();
            let mut hello = Buffer::new();
            hello.push(MAGIC);
            hello.push(Opcode::Hello.as_u8());
            hello.push(UUID_SIZE as u8);
            hello.append_slice(&identity);
            encode_oob(&mut produced.wire, &mut hello);
        }
        let encoder = self
            .encoder
            .get_or_insert_with(|| Encoder::new(self.cache.clone()));

        if input.is_empty() {
            debug!("outbound stream ended; sending EOS");
            let mut eos = Buffer::new();
            eos.push(MAGIC);
            eos.push(Opcode::Eos.as_u8());
            encode_oob(&mut produced.wire, &mut eos);
            self.sent_eos = true;
        } else {
            let mut encoded = Buffer::new();
            encoder.encode(&mut encoded, input);
            encode_frames(&mut produced.wire, &mut encoded);
        }

        Ok(produced)
    }

    /// Consumes inbound wire bytes, producing decoded plaintext and control
    /// responses.
    ///
    /// Incomplete frames are buffered until more bytes arrive. An empty
    /// `input` reports that the peer closed the connection; the application
    /// sees end-of-file, with an error logged if undecoded data was still
    /// pending.
    ///
    /// # Errors
    ///
    /// Any framing or control violation, and any decoder error, is fatal;
    /// see [`ProtocolError`].
    pub fn decoder_consume(&mut self, input: &mut Buffer) -> Result<DecoderOutput, ProtocolError> {
        let mut produced = DecoderOutput::default();

        if input.is_empty() {
            if !self.wire_buffer.is_empty() || !self.frame_buffer.is_empty() {
                error!("peer closed the connection with data outstanding");
            }
            produced.output_eof = true;
            return Ok(produced);
        }

        self.wire_buffer.append_buffer(input);

        while !self.wire_buffer.is_empty() {
            if self.wire_buffer.len() < HEADER_LENGTH {
                break;
            }

            let Some(magic) = self.wire_buffer.peek() else {
                break;
            };
            if magic != MAGIC {
                error!(byte = magic, "bad frame magic");
                return Err(ProtocolError::BadMagic { byte: magic });
            }

            let Some(op_byte) = self.wire_buffer.peek_at(1) else {
                break;
            };
            let kind = match Opcode::from_u8(op_byte) {
                Some(Opcode::Frame) => {
                    if self.decoder.is_none() {
                        error!("frame data before the peer introduced its cache");
                        return Err(ProtocolError::FrameBeforeHello);
                    }
                    PayloadKind::Frame
                }
                Some(Opcode::Oob) => PayloadKind::Control,
                Some(_) => {
                    error!(opcode = op_byte, "control opcode in frame header");
                    return Err(ProtocolError::UnframedData { opcode: op_byte });
                }
                None => {
                    error!(opcode = op_byte, "unknown opcode in frame header");
                    return Err(ProtocolError::UnknownOpcode { opcode: op_byte });
                }
            };

            let Some(length) = self.wire_buffer.peek_u16_be(2) else {
                break;
            };
            if length == 0 || usize::from(length) > FRAME_LENGTH {
                error!(length, "invalid frame length");
                return Err(ProtocolError::InvalidLength { length });
            }

            if self.wire_buffer.len() < HEADER_LENGTH + usize::from(length) {
                break;
            }

            let mut payload = Buffer::new();
            self.wire_buffer
                .moveout(&mut payload, HEADER_LENGTH, usize::from(length));

            match kind {
                PayloadKind::Control => self.handle_control(&mut payload, &mut produced)?,
                PayloadKind::Frame => {
                    let count = payload.len();
                    payload.moveout(&mut self.frame_buffer, 0, count);
                }
            }

            if self.frame_buffer.is_empty() {
                continue;
            }
            if !self.unknown_hashes.is_empty() {
                debug!("waiting for unknown hashes before decoding further");
                continue;
            }
            self.run_decoder(&mut produced)?;
        }

        if self.wire_buffer.is_empty() && self.frame_buffer.is_empty() {
            if self.received_eos_ack {
                debug!("stream drained and EOS acknowledged; closing the wire");
                produced.shutdown = true;
            } else if self.received_eos {
                debug!("stream drained after peer EOS; acknowledging");
                let mut eos_ack = Buffer::new();
                eos_ack.push(MAGIC);
                eos_ack.push(Opcode::EosAck.as_u8());
                encode_oob(&mut produced.wire, &mut eos_ack);
            }
        }

        Ok(produced)
    }

    fn run_decoder(&mut self, produced: &mut DecoderOutput) -> Result<(), ProtocolError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(ProtocolError::FrameBeforeHello);
        };

        let mut plaintext = Buffer::new();
        decoder.decode(&mut plaintext, &mut self.frame_buffer, &mut self.unknown_hashes)?;
        produced.output.append_buffer(&mut plaintext);

        for hash in self.unknown_hashes.iter().copied().collect::<Vec<_>>() {
            if !self.asked_hashes.insert(hash) {
                continue;
            }
            debug!(hash, "requesting unknown segment from peer");
            let mut ask = Buffer::new();
            ask.push(MAGIC);
            ask.push(Opcode::Ask.as_u8());
            ask.append_slice(&hash.to_be_bytes());
            encode_oob(&mut produced.wire, &mut ask);
        }

        Ok(())
    }

    fn handle_control(
        &mut self,
        payload: &mut Buffer,
        produced: &mut DecoderOutput,
    ) -> Result<(), ProtocolError> {
        while !payload.is_empty() {
            let Some(magic) = payload.peek() else {
                break;
            };
            if magic != MAGIC {
                error!(byte = magic, "bad control magic");
                return Err(ProtocolError::BadControlMagic { byte: magic });
            }
            let Some(op_byte) = payload.peek_at(1) else {
                error!("control message missing its operation");
                return Err(ProtocolError::TruncatedControl);
            };
            payload.skip(2);

            match Opcode::from_u8(op_byte) {
                Some(Opcode::Hello) => self.control_hello(payload)?,
                Some(Opcode::Ask) => self.control_ask(payload, produced)?,
                Some(Opcode::Learn) => self.control_learn(payload)?,
                Some(Opcode::Eos) => {
                    if self.received_eos {
                        error!("duplicate EOS");
                        return Err(ProtocolError::DuplicateEos);
                    }
                    self.received_eos = true;
                }
                Some(Opcode::EosAck) => {
                    if !self.sent_eos {
                        error!("EOS_ACK before we sent EOS");
                        return Err(ProtocolError::PrematureEosAck);
                    }
                    if self.received_eos_ack {
                        error!("duplicate EOS_ACK");
                        return Err(ProtocolError::DuplicateEosAck);
                    }
                    self.received_eos_ack = true;
                }
                _ => {
                    error!(opcode = op_byte, "unsupported control operation");
                    return Err(ProtocolError::UnknownControlOp { opcode: op_byte });
                }
            }
        }
        Ok(())
    }

    fn control_hello(&mut self, payload: &mut Buffer) -> Result<(), ProtocolError> {
        if self.decoder_cache.is_some() {
            error!("duplicate HELLO");
            return Err(ProtocolError::DuplicateHello);
        }

        let Some(length) = payload.peek() else {
            error!("truncated HELLO");
            return Err(ProtocolError::TruncatedControl);
        };
        payload.skip(1);
        if payload.len() < usize::from(length) {
            error!("truncated HELLO identity");
            return Err(ProtocolError::TruncatedControl);
        }
        if usize::from(length) != UUID_SIZE {
            error!(length, "unsupported HELLO identity length");
            return Err(ProtocolError::HelloLength { length });
        }

        let mut identity = [0u8; UUID_SIZE];
        payload.copyout(0, &mut identity);
        payload.skip(UUID_SIZE);
        let uuid = Uuid::from_bytes(identity);

        let cache = self.registry.resolve(uuid);
        self.decoder = Some(Decoder::new(cache.clone()));
        self.decoder_cache = Some(cache);
        debug!(%uuid, "peer connected");
        Ok(())
    }

    fn control_ask(
        &mut self,
        payload: &mut Buffer,
        produced: &mut DecoderOutput,
    ) -> Result<(), ProtocolError> {
        if self.encoder.is_none() {
            error!("ASK before we sent HELLO");
            return Err(ProtocolError::AskBeforeHello);
        }

        let Some(hash) = payload.peek_u64_be(0) else {
            error!("truncated ASK");
            return Err(ProtocolError::TruncatedControl);
        };
        payload.skip(8);

        let Some(segment) = lock(&self.cache).lookup(hash) else {
            error!(hash, "peer asked for a hash we do not hold");
            return Err(ProtocolError::AskUnknownHash { hash });
        };

        debug!(hash, "answering ASK with LEARN");
        let mut learn = Buffer::new();
        learn.push(MAGIC);
        learn.push(Opcode::Learn.as_u8());
        learn.append_shared(segment.shared());
        encode_oob(&mut produced.wire, &mut learn);
        Ok(())
    }

    fn control_learn(&mut self, payload: &mut Buffer) -> Result<(), ProtocolError> {
        let Some(cache) = self.decoder_cache.as_ref() else {
            error!("LEARN before HELLO");
            return Err(ProtocolError::LearnBeforeHello);
        };

        if payload.len() < SEGMENT_LENGTH {
            error!("truncated LEARN");
            return Err(ProtocolError::TruncatedControl);
        }
        let bytes = payload.extract(0, SEGMENT_LENGTH);
        payload.skip(SEGMENT_LENGTH);

        let hash = RollingHash::digest(&bytes);
        let segment = Segment::from_bytes(bytes)?;

        if lock(cache).enter(hash, segment).is_err() {
            error!(hash, "LEARN collides with an interned segment");
            return Err(ProtocolError::LearnCollision { hash });
        }

        if self.unknown_hashes.remove(&hash) {
            debug!(hash, "segment learned");
            self.asked_hashes.remove(&hash);
            if self.unknown_hashes.is_empty() {
                self.resume.signal();
            }
        } else {
            info!(hash, "gratuitous LEARN without ASK");
        }
        Ok(())
    }
}

impl std::fmt::Debug for PipePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipePair")
            .field("encoder_started", &self.encoder.is_some())
            .field("decoder_bound", &self.decoder.is_some())
            .field("buffered_wire", &self.wire_buffer.len())
            .field("buffered_frames", &self.frame_buffer.len())
            .field("unknown_hashes", &self.unknown_hashes.len())
            .field("sent_eos", &self.sent_eos)
            .field("received_eos", &self.received_eos)
            .field("received_eos_ack", &self.received_eos_ack)
            .finish()
    }
}
