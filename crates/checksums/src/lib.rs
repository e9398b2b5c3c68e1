#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Windowed rolling hash for content-addressed segment matching.
//!
//! The crate exposes a single primitive, [`RollingHash`], that hashes a
//! fixed 64-byte window and slides it forward one byte at a time in O(1).
//! Both stream endpoints compute the same function, so the value doubles as
//! the content address under which segments are interned and taught to the
//! peer. The hash is for deduplication only and offers no cryptographic
//! strength.

mod rolling;

pub use rolling::{RollingHash, WINDOW_LENGTH};
