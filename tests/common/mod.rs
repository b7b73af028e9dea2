//! Shared helpers for integration tests.
//!
//! The archive writer is the one the unit tests use.

#![allow(dead_code)]

#[path = "../../src/zip/test_support.rs"]
mod test_support;

pub use test_support::{ArchiveBuilder, TestEntry, reference_crc};

pub const LOCAL_HEADER_SIZE: usize = 30;

/// Deterministic text-like payload with enough repetition to exercise
/// dynamic Huffman blocks and long back-references.
pub fn sample_text(len: usize) -> Vec<u8> {
    const WORDS: [&str; 12] = [
        "archive ", "central ", "directory ", "deflate ", "huffman ", "window ", "entry ",
        "header ", "local ", "offset ", "record ", "stream\n",
    ];
    let mut out = Vec::with_capacity(len);
    let mut state: u32 = 0x2545_F491;
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        out.extend_from_slice(WORDS[(state % WORDS.len() as u32) as usize].as_bytes());
    }
    out.truncate(len);
    out
}

/// Deterministic high-entropy payload that compresses poorly.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state ^= state << 7;
            state ^= state >> 9;
            (state >> 24) as u8
        })
        .collect()
}
