#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Rope-style byte buffer built from reference-counted slabs.
//!
//! [`Buffer`] is the working currency of the codec: encoder input, encoder
//! output, the wire stream, and reassembled frame payloads are all ropes of
//! shared [`Bytes`] slabs. Moving data between buffers transfers slab
//! references instead of copying, so a 32 KiB frame payload travels from the
//! wire buffer to the frame buffer to the decoder without being duplicated.
//!
//! Small appends (single reference tokens, length fields) are staged in a
//! mutable tail slab and only frozen into a shared slab when a reader or a
//! bulk operation needs the rope in its canonical form, which keeps
//! byte-granular writers from fragmenting the rope into one-byte segments.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

/// A queue of reference-counted byte slabs with cheap front consumption.
///
/// All destructive operations work from the front of the rope; appends go to
/// the back. Offsets given to the peek/copy family are relative to the
/// current front. Operations are O(1) or O(affected slabs) apart from the
/// byte copies they inherently perform.
#[derive(Clone, Default)]
pub struct Buffer {
    segments: VecDeque<Bytes>,
    tail: BytesMut,
    length: usize,
}

impl Buffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of readable bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the buffer holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Removes all contents.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.tail.clear();
        self.length = 0;
    }

    /// Appends a single byte.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.tail.put_u8(byte);
        self.length += 1;
    }

    /// Appends a borrowed byte slice, copying it into the staging tail.
    pub fn append_slice(&mut self, bytes: &[u8]) {
        self.tail.extend_from_slice(bytes);
        self.length += bytes.len();
    }

    /// Appends a shared slab without copying its contents.
    ///
    /// Empty slabs are dropped rather than enqueued so the rope never holds
    /// zero-length segments.
    pub fn append_shared(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.flush_tail();
        self.length += bytes.len();
        self.segments.push_back(bytes);
    }

    /// Moves the entire contents of `other` onto the back of `self`.
    ///
    /// Slab references transfer without copying; `other` is left empty.
    pub fn append_buffer(&mut self, other: &mut Buffer) {
        other.flush_tail();
        self.flush_tail();
        self.length += other.length;
        self.segments.append(&mut other.segments);
        other.length = 0;
    }

    /// Returns the first byte without consuming it.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    /// Returns the byte at `offset` from the front without consuming it.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        if offset >= self.length {
            return None;
        }
        let mut remaining = offset;
        for chunk in self.chunks() {
            if remaining < chunk.len() {
                return Some(chunk[remaining]);
            }
            remaining -= chunk.len();
        }
        None
    }

    /// Reads a big-endian `u16` at `offset` without consuming it.
    #[must_use]
    pub fn peek_u16_be(&self, offset: usize) -> Option<u16> {
        let mut raw = [0u8; 2];
        self.try_copyout(offset, &mut raw)
            .then(|| u16::from_be_bytes(raw))
    }

    /// Reads a big-endian `u64` at `offset` without consuming it.
    #[must_use]
    pub fn peek_u64_be(&self, offset: usize) -> Option<u64> {
        let mut raw = [0u8; 8];
        self.try_copyout(offset, &mut raw)
            .then(|| u64::from_be_bytes(raw))
    }

    /// Reads a little-endian `u64` at `offset` without consuming it.
    #[must_use]
    pub fn peek_u64_le(&self, offset: usize) -> Option<u64> {
        let mut raw = [0u8; 8];
        self.try_copyout(offset, &mut raw)
            .then(|| u64::from_le_bytes(raw))
    }

    /// Copies `dest.len()` bytes starting at `offset` into `dest` without
    /// consuming them.
    ///
    /// # Panics
    ///
    /// Panics if the requested range extends past the end of the buffer.
    pub fn copyout(&self, offset: usize, dest: &mut [u8]) {
        assert!(
            self.try_copyout(offset, dest),
            "copyout range extends past end of buffer"
        );
    }

    /// Returns `dest.len()` bytes starting at `offset` as a shared slab
    /// without consuming them.
    ///
    /// When the range falls inside a single slab the result shares that
    /// slab's storage; otherwise the bytes are gathered into a fresh slab.
    ///
    /// # Panics
    ///
    /// Panics if the requested range extends past the end of the buffer.
    #[must_use]
    pub fn extract(&self, offset: usize, len: usize) -> Bytes {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.length),
            "extract range extends past end of buffer"
        );
        let mut remaining = offset;
        for chunk in self.chunks() {
            if remaining < chunk.len() {
                if remaining + len <= chunk.len() {
                    return Bytes::copy_from_slice(&chunk[remaining..remaining + len]);
                }
                break;
            }
            remaining -= chunk.len();
        }
        let mut gathered = vec![0u8; len];
        self.copyout(offset, &mut gathered);
        Bytes::from(gathered)
    }

    /// Discards `count` bytes from the front.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the buffer length.
    pub fn skip(&mut self, count: usize) {
        assert!(count <= self.length, "skip count exceeds buffer length");
        self.flush_tail();
        let mut remaining = count;
        while remaining > 0 {
            let front_len = match self.segments.front() {
                Some(front) => front.len(),
                None => break,
            };
            if front_len <= remaining {
                self.segments.pop_front();
                remaining -= front_len;
            } else {
                if let Some(front) = self.segments.front_mut() {
                    let _ = front.split_to(remaining);
                }
                remaining = 0;
            }
        }
        self.length -= count;
    }

    /// Discards `offset` bytes, then moves the following `count` bytes onto
    /// the back of `dest`.
    ///
    /// Whole slabs move by reference; at most one slab is split.
    ///
    /// # Panics
    ///
    /// Panics if `offset + count` exceeds the buffer length.
    pub fn moveout(&mut self, dest: &mut Buffer, offset: usize, count: usize) {
        assert!(
            offset
                .checked_add(count)
                .is_some_and(|end| end <= self.length),
            "moveout range extends past end of buffer"
        );
        self.skip(offset);
        self.flush_tail();
        let mut remaining = count;
        while remaining > 0 {
            let front_len = match self.segments.front() {
                Some(front) => front.len(),
                None => break,
            };
            if front_len <= remaining {
                if let Some(front) = self.segments.pop_front() {
                    remaining -= front.len();
                    dest.append_shared(front);
                }
            } else {
                if let Some(front) = self.segments.front_mut() {
                    dest.append_shared(front.split_to(remaining));
                }
                remaining = 0;
            }
        }
        self.length -= count;
    }

    /// Removes and returns the front slab, if any.
    ///
    /// This is the bulk companion of [`moveout`](Self::moveout): scanners
    /// that want to walk the rope slab-by-slab while retaining shared
    /// ownership pop each slab, read it, and append it elsewhere.
    pub fn pop_chunk(&mut self) -> Option<Bytes> {
        self.flush_tail();
        let front = self.segments.pop_front()?;
        self.length -= front.len();
        Some(front)
    }

    /// Returns the length of the longest front run of bytes satisfying
    /// `predicate`.
    #[must_use]
    pub fn prefix_length<P: Fn(u8) -> bool>(&self, predicate: P) -> usize {
        let mut run = 0;
        for chunk in self.chunks() {
            for &byte in chunk {
                if !predicate(byte) {
                    return run;
                }
                run += 1;
            }
        }
        run
    }

    /// Rewrites the buffer so every byte matching `special` is replaced by
    /// `escape_byte` followed by the byte's complement.
    ///
    /// The complement keeps flagged values out of the escaped stream
    /// entirely; the inverse transform is a single XOR on the byte following
    /// each `escape_byte`. Slabs containing no flagged bytes are retained by
    /// reference.
    pub fn escape<P: Fn(u8) -> bool>(&mut self, escape_byte: u8, special: P) {
        self.flush_tail();
        let mut escaped: VecDeque<Bytes> = VecDeque::with_capacity(self.segments.len());
        let mut length = 0;
        for segment in self.segments.drain(..) {
            if !segment.iter().any(|&byte| special(byte)) {
                length += segment.len();
                escaped.push_back(segment);
                continue;
            }
            let mut rewritten = BytesMut::with_capacity(segment.len() * 2);
            for &byte in segment.iter() {
                if special(byte) {
                    rewritten.put_u8(escape_byte);
                    rewritten.put_u8(byte ^ 0xff);
                } else {
                    rewritten.put_u8(byte);
                }
            }
            length += rewritten.len();
            escaped.push_back(rewritten.freeze());
        }
        self.segments = escaped;
        self.length = length;
    }

    /// Iterates the readable bytes as contiguous chunks, front to back.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        let tail: &[u8] = &self.tail;
        self.segments
            .iter()
            .map(Bytes::as_ref)
            .chain((!tail.is_empty()).then_some(tail))
    }

    /// Copies the entire contents into a contiguous vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut flat = Vec::with_capacity(self.length);
        for chunk in self.chunks() {
            flat.extend_from_slice(chunk);
        }
        flat
    }

    fn try_copyout(&self, offset: usize, dest: &mut [u8]) -> bool {
        let Some(end) = offset.checked_add(dest.len()) else {
            return false;
        };
        if end > self.length {
            return false;
        }
        let mut skip = offset;
        let mut filled = 0;
        for chunk in self.chunks() {
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            let available = &chunk[skip..];
            skip = 0;
            let take = available.len().min(dest.len() - filled);
            dest[filled..filled + take].copy_from_slice(&available[..take]);
            filled += take;
            if filled == dest.len() {
                return true;
            }
        }
        filled == dest.len()
    }

    fn flush_tail(&mut self) {
        if !self.tail.is_empty() {
            self.segments.push_back(self.tail.split().freeze());
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("length", &self.length)
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.to_vec() == other.to_vec()
    }
}

impl Eq for Buffer {}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buffer = Buffer::new();
        buffer.append_shared(Bytes::copy_from_slice(bytes));
        buffer
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        let mut buffer = Buffer::new();
        buffer.append_shared(Bytes::from(bytes));
        buffer
    }
}

impl From<Bytes> for Buffer {
    fn from(bytes: Bytes) -> Self {
        let mut buffer = Buffer::new();
        buffer.append_shared(bytes);
        buffer
    }
}
