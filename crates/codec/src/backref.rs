use std::collections::HashMap;

use crate::Segment;

/// Number of slots in the back-reference window.
pub const WINDOW_COUNT: usize = 256;

/// Ring of the most recently declared hashes, addressable by one-byte token.
///
/// The window is a plain 256-slot array with a monotonically advancing wrap
/// cursor, not an LRU: a slot's token is its array index, and declaring a
/// hash always overwrites the cursor slot regardless of how recently the
/// evicted entry was used. Encoder and decoder each keep one window per
/// direction and apply [`declare`](Self::declare) on exactly the same
/// events, in the same order, so their rings stay bit-identical and a bare
/// token emitted by one side always resolves on the other.
#[derive(Debug)]
pub struct BackrefWindow {
    slots: Vec<Option<(u64, Segment)>>,
    tokens: HashMap<u64, u8>,
    cursor: usize,
}

impl Default for BackrefWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl BackrefWindow {
    /// Creates an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; WINDOW_COUNT],
            tokens: HashMap::new(),
            cursor: 0,
        }
    }

    /// Installs `(hash, segment)` in the cursor slot and advances the
    /// cursor.
    ///
    /// The evicted entry's reverse mapping is dropped only if it still
    /// pointed at the overwritten slot; a hash that was since re-declared
    /// elsewhere keeps its newer token.
    pub fn declare(&mut self, hash: u64, segment: Segment) {
        let slot = self.cursor;
        let token = slot as u8;
        if let Some((evicted, _)) = self.slots[slot].take() {
            if self.tokens.get(&evicted) == Some(&token) {
                self.tokens.remove(&evicted);
            }
        }
        self.slots[slot] = Some((hash, segment));
        self.tokens.insert(hash, token);
        self.cursor = (self.cursor + 1) % WINDOW_COUNT;
    }

    /// Returns the token for `hash` if it still occupies a live slot.
    #[must_use]
    pub fn present(&self, hash: u64) -> Option<u8> {
        self.tokens.get(&hash).copied()
    }

    /// Resolves a token back to its segment.
    #[must_use]
    pub fn dereference(&self, token: u8) -> Option<&Segment> {
        self.slots[usize::from(token)]
            .as_ref()
            .map(|(_, segment)| segment)
    }
}
