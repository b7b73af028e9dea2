//! Raw DEFLATE decoder (RFC 1951).
//!
//! Decodes the three block types (stored, fixed Huffman, dynamic Huffman)
//! into a single output buffer. Back-references are resolved against the
//! output produced so far, so the whole output doubles as the 32 KiB window.
//!
//! Huffman decoding walks the canonical code one bit at a time using the
//! per-length symbol counts. It is not the fastest approach, but the tables
//! are tiny and the decoder never indexes outside of them.

use thiserror::Error;

/// Size of the DEFLATE sliding window.
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Upper bound on DEFLATE expansion (258-byte match from a 2-bit code).
const MAX_EXPANSION: usize = 1032;

/// Ceiling on the up-front output allocation. Larger outputs grow on demand.
const MAX_PREALLOCATION: usize = 4 * 1024 * 1024;

const MAX_BITS: usize = 15;
const MAX_LITLEN_CODES: usize = 286;
const MAX_DIST_CODES: usize = 30;
const FIXED_LITLEN_CODES: usize = 288;
const END_OF_BLOCK: u16 = 256;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order in which code length code lengths are transmitted.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Decoder failures. All of them mean the compressed stream is corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InflateError {
    #[error("compressed stream ended unexpectedly")]
    UnexpectedEof,
    #[error("invalid deflate block type")]
    InvalidBlockType,
    #[error("stored block length does not match its complement")]
    StoredLengthMismatch,
    #[error("too many length or distance codes")]
    TooManyCodes,
    #[error("over-subscribed Huffman code lengths")]
    OverSubscribed,
    #[error("invalid code length repeat")]
    InvalidRepeat,
    #[error("missing end-of-block code")]
    MissingEndOfBlock,
    #[error("invalid Huffman code")]
    InvalidCode,
    #[error("invalid length or distance symbol")]
    InvalidSymbol,
    #[error("back-reference distance exceeds output")]
    DistanceTooFar,
    #[error("decompressed data exceeds declared size")]
    OutputOverflow,
}

impl InflateError {
    /// Static description, used when the error is folded into a corruption reason.
    pub fn reason(&self) -> &'static str {
        match self {
            InflateError::UnexpectedEof => "compressed stream ended unexpectedly",
            InflateError::InvalidBlockType => "invalid deflate block type",
            InflateError::StoredLengthMismatch => "stored block length does not match its complement",
            InflateError::TooManyCodes => "too many length or distance codes",
            InflateError::OverSubscribed => "over-subscribed Huffman code lengths",
            InflateError::InvalidRepeat => "invalid code length repeat",
            InflateError::MissingEndOfBlock => "missing end-of-block code",
            InflateError::InvalidCode => "invalid Huffman code",
            InflateError::InvalidSymbol => "invalid length or distance symbol",
            InflateError::DistanceTooFar => "back-reference distance exceeds output",
            InflateError::OutputOverflow => "decompressed data exceeds declared size",
        }
    }
}

type Result<T> = std::result::Result<T, InflateError>;

/// Decompress a raw DEFLATE stream.
///
/// `expected_len` is the declared uncompressed size. It sizes the initial
/// allocation and bounds the output: decoding fails once the output would
/// grow past `expected_len` plus one window. The caller is responsible for
/// checking the final length against its own expectation.
pub fn inflate(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let limit = expected_len.saturating_add(WINDOW_SIZE);
    let mut inflater = Inflater {
        bits: BitReader::new(input),
        out: Vec::with_capacity(capacity_hint(input.len(), expected_len)),
        limit,
    };
    inflater.run()?;
    Ok(inflater.out)
}

/// Initial output capacity. The declared size comes from the archive and is
/// not trusted beyond what the input could expand to.
fn capacity_hint(input_len: usize, expected_len: usize) -> usize {
    expected_len
        .min(input_len.saturating_mul(MAX_EXPANSION))
        .min(MAX_PREALLOCATION)
}

/// LSB-first bit reader over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bit_count: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn need(&mut self, n: u32) -> Result<()> {
        while self.bit_count < n {
            let byte = *self.data.get(self.pos).ok_or(InflateError::UnexpectedEof)?;
            self.bit_buf |= (byte as u64) << self.bit_count;
            self.pos += 1;
            self.bit_count += 8;
        }
        Ok(())
    }

    /// Read `n` bits (at most 16), least significant first.
    fn bits(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        self.need(n)?;
        let value = (self.bit_buf & ((1u64 << n) - 1)) as u32;
        self.bit_buf >>= n;
        self.bit_count -= n;
        Ok(value)
    }

    /// Drop buffered bits up to the next byte boundary and hand the whole
    /// bytes still sitting in the bit buffer back to the input.
    fn align_to_byte(&mut self) {
        let whole_bytes = (self.bit_count / 8) as usize;
        self.pos -= whole_bytes;
        self.bit_buf = 0;
        self.bit_count = 0;
    }

    /// Take `len` bytes from a byte-aligned position.
    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(InflateError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(InflateError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }
}

/// Canonical Huffman code in count/symbol form.
struct Huffman {
    counts: [u16; MAX_BITS + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    /// Build a decoder from per-symbol code lengths (0 = unused).
    ///
    /// Incomplete codes are accepted; reading an unassigned code fails at
    /// decode time instead.
    fn new(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_BITS + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left <<= 1;
            left -= count as i32;
            if left < 0 {
                return Err(InflateError::OverSubscribed);
            }
        }

        let mut offsets = [0u16; MAX_BITS + 2];
        for len in 1..=MAX_BITS {
            offsets[len + 1] = offsets[len] + counts[len];
        }

        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[len as usize];
                symbols[*slot as usize] = symbol as u16;
                *slot += 1;
            }
        }

        Ok(Self { counts, symbols })
    }

    fn decode(&self, bits: &mut BitReader<'_>) -> Result<u16> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_BITS {
            code |= bits.bits(1)? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(InflateError::InvalidCode)
    }
}

struct Inflater<'a> {
    bits: BitReader<'a>,
    out: Vec<u8>,
    limit: usize,
}

impl Inflater<'_> {
    fn run(&mut self) -> Result<()> {
        loop {
            let is_final = self.bits.bits(1)? == 1;
            match self.bits.bits(2)? {
                0 => self.stored_block()?,
                1 => {
                    let (litlen, dist) = fixed_tables()?;
                    self.codes(&litlen, &dist)?;
                }
                2 => {
                    let (litlen, dist) = self.dynamic_tables()?;
                    self.codes(&litlen, &dist)?;
                }
                _ => return Err(InflateError::InvalidBlockType),
            }
            if is_final {
                return Ok(());
            }
        }
    }

    fn reserve(&self, n: usize) -> Result<()> {
        if self.out.len().saturating_add(n) > self.limit {
            return Err(InflateError::OutputOverflow);
        }
        Ok(())
    }

    fn stored_block(&mut self) -> Result<()> {
        self.bits.align_to_byte();
        let header = self.bits.take_bytes(4)?;
        let len = u16::from_le_bytes([header[0], header[1]]);
        let nlen = u16::from_le_bytes([header[2], header[3]]);
        if len != !nlen {
            return Err(InflateError::StoredLengthMismatch);
        }
        self.reserve(len as usize)?;
        let bytes = self.bits.take_bytes(len as usize)?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    fn dynamic_tables(&mut self) -> Result<(Huffman, Huffman)> {
        let nlen = self.bits.bits(5)? as usize + 257;
        let ndist = self.bits.bits(5)? as usize + 1;
        let ncode = self.bits.bits(4)? as usize + 4;
        if nlen > MAX_LITLEN_CODES || ndist > MAX_DIST_CODES {
            return Err(InflateError::TooManyCodes);
        }

        let mut code_lengths = [0u8; 19];
        for &slot in &CODE_LENGTH_ORDER[..ncode] {
            code_lengths[slot] = self.bits.bits(3)? as u8;
        }
        let lencode = Huffman::new(&code_lengths)?;

        let mut lengths = [0u8; MAX_LITLEN_CODES + MAX_DIST_CODES];
        let total = nlen + ndist;
        let mut index = 0;
        while index < total {
            let symbol = lencode.decode(&mut self.bits)?;
            if symbol < 16 {
                lengths[index] = symbol as u8;
                index += 1;
                continue;
            }
            let (value, repeat) = match symbol {
                16 => {
                    if index == 0 {
                        return Err(InflateError::InvalidRepeat);
                    }
                    (lengths[index - 1], 3 + self.bits.bits(2)? as usize)
                }
                17 => (0, 3 + self.bits.bits(3)? as usize),
                _ => (0, 11 + self.bits.bits(7)? as usize),
            };
            if index + repeat > total {
                return Err(InflateError::InvalidRepeat);
            }
            lengths[index..index + repeat].fill(value);
            index += repeat;
        }

        if lengths[END_OF_BLOCK as usize] == 0 {
            return Err(InflateError::MissingEndOfBlock);
        }

        let litlen = Huffman::new(&lengths[..nlen])?;
        let dist = Huffman::new(&lengths[nlen..total])?;
        Ok((litlen, dist))
    }

    fn codes(&mut self, litlen: &Huffman, dist: &Huffman) -> Result<()> {
        loop {
            let symbol = litlen.decode(&mut self.bits)?;
            if symbol < END_OF_BLOCK {
                self.reserve(1)?;
                self.out.push(symbol as u8);
                continue;
            }
            if symbol == END_OF_BLOCK {
                return Ok(());
            }

            let length_index = (symbol - 257) as usize;
            if length_index >= LENGTH_BASE.len() {
                return Err(InflateError::InvalidSymbol);
            }
            let length = LENGTH_BASE[length_index] as usize
                + self.bits.bits(LENGTH_EXTRA[length_index] as u32)? as usize;

            let dist_index = dist.decode(&mut self.bits)? as usize;
            if dist_index >= DIST_BASE.len() {
                return Err(InflateError::InvalidSymbol);
            }
            let distance = DIST_BASE[dist_index] as usize
                + self.bits.bits(DIST_EXTRA[dist_index] as u32)? as usize;
            if distance > self.out.len() {
                return Err(InflateError::DistanceTooFar);
            }

            self.reserve(length)?;
            let start = self.out.len() - distance;
            // Source and destination may overlap, so copy byte by byte.
            for i in 0..length {
                let byte = self.out[start + i];
                self.out.push(byte);
            }
        }
    }
}

fn fixed_tables() -> Result<(Huffman, Huffman)> {
    let mut lengths = [0u8; FIXED_LITLEN_CODES];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    let litlen = Huffman::new(&lengths)?;
    let dist = Huffman::new(&[5u8; MAX_DIST_CODES])?;
    Ok((litlen, dist))
}
