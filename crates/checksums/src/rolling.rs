/// Number of bytes covered by the rolling window.
///
/// This is also the segment size interned by the codec cache; the two must
/// agree because cache keys are window hashes.
pub const WINDOW_LENGTH: usize = 64;

/// Odd multiplier for the degree-63 polynomial accumulator.
const MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// `MULTIPLIER` raised to `WINDOW_LENGTH`, used to cancel the byte leaving
/// the window in a single multiply-subtract.
const MULTIPLIER_POW_WINDOW: u64 = pow(MULTIPLIER, WINDOW_LENGTH);

const fn pow(base: u64, exponent: usize) -> u64 {
    let mut accumulator = 1u64;
    let mut remaining = exponent;
    while remaining > 0 {
        accumulator = accumulator.wrapping_mul(base);
        remaining -= 1;
    }
    accumulator
}

/// Polynomial rolling hash over a fixed 64-byte window.
///
/// Bytes are folded into a wrapping polynomial accumulator as they arrive;
/// once [`WINDOW_LENGTH`] bytes have been absorbed, each further
/// [`roll`](Self::roll) evicts the oldest byte and admits the new one in
/// constant time. The accumulator depends only on the bytes currently in the
/// window, never on earlier history, so a rolled window and a freshly fed
/// window hash identically.
///
/// [`value`](Self::value) passes the accumulator through a 64-bit finalizer
/// so that similar windows produce well-spread cache keys.
#[derive(Clone, Debug)]
pub struct RollingHash {
    window: [u8; WINDOW_LENGTH],
    cursor: usize,
    filled: usize,
    accumulator: u64,
}

impl Default for RollingHash {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingHash {
    /// Creates an empty window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window: [0u8; WINDOW_LENGTH],
            cursor: 0,
            filled: 0,
            accumulator: 0,
        }
    }

    /// Resets the window to its initial empty state.
    pub fn reset(&mut self) {
        self.window = [0u8; WINDOW_LENGTH];
        self.cursor = 0;
        self.filled = 0;
        self.accumulator = 0;
    }

    /// Returns the number of bytes currently contributing to the hash.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.filled
    }

    /// Returns `true` if no bytes have been absorbed yet.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Returns `true` once a full window of bytes has been absorbed.
    #[inline]
    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.filled == WINDOW_LENGTH
    }

    /// Slides the window forward by one byte.
    ///
    /// While the window is still filling this only absorbs the byte; once
    /// primed it additionally cancels the contribution of the byte falling
    /// off the back. Either way the update is O(1).
    #[inline]
    pub fn roll(&mut self, byte: u8) {
        if self.filled == WINDOW_LENGTH {
            let outgoing = u64::from(self.window[self.cursor]);
            self.accumulator = self
                .accumulator
                .wrapping_mul(MULTIPLIER)
                .wrapping_add(u64::from(byte))
                .wrapping_sub(outgoing.wrapping_mul(MULTIPLIER_POW_WINDOW));
        } else {
            self.accumulator = self
                .accumulator
                .wrapping_mul(MULTIPLIER)
                .wrapping_add(u64::from(byte));
            self.filled += 1;
        }
        self.window[self.cursor] = byte;
        self.cursor = (self.cursor + 1) % WINDOW_LENGTH;
    }

    /// Returns the finalized hash of the bytes currently in the window.
    ///
    /// Callers that need the canonical segment hash must only consult this
    /// once [`is_primed`](Self::is_primed) reports a full window; a partial
    /// window hashes its partial contents.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u64 {
        finalize(self.accumulator)
    }

    /// Hashes `data` in one shot, as if each byte had been rolled in turn.
    ///
    /// For a slice of exactly [`WINDOW_LENGTH`] bytes this produces the same
    /// value a primed window over those bytes reports, which makes it the
    /// verification form used when a declared segment arrives off the wire.
    #[must_use]
    pub fn digest(data: &[u8]) -> u64 {
        let mut hash = RollingHash::new();
        for &byte in data {
            hash.roll(byte);
        }
        hash.value()
    }
}

/// 64-bit avalanche finalizer (splitmix64 style).
#[inline]
const fn finalize(mut state: u64) -> u64 {
    state ^= state >> 30;
    state = state.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    state ^= state >> 27;
    state = state.wrapping_mul(0x94d0_49bb_1331_11eb);
    state ^= state >> 31;
    state
}
