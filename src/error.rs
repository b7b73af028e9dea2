//! Error types for archive reading.
//!
//! Every failure is a value. Parsing problems surface from [`Archive::open`]
//! as [`OpenError`], lookups as [`IndexError`] and per-entry problems as
//! [`ExtractError`]. A failed extraction never invalidates the archive.
//!
//! [`Archive::open`]: crate::Archive::open

use thiserror::Error;

use crate::zip::inflate::InflateError;

/// Reason a buffer was rejected as a ZIP archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Corrupt(pub &'static str);

impl From<std::io::Error> for Corrupt {
    // Cursor reads over an in-memory slice only fail by running out of bytes.
    fn from(_: std::io::Error) -> Self {
        Corrupt("truncated record")
    }
}

impl From<InflateError> for Corrupt {
    fn from(err: InflateError) -> Self {
        Corrupt(err.reason())
    }
}

/// The archive handle is not open (never opened, or already closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("archive is not open")]
pub struct UseAfterClose;

/// Errors returned by [`Archive::open`](crate::Archive::open).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    /// The supplied buffer holds no bytes.
    #[error("empty buffer")]
    EmptyBuffer,

    /// The buffer is not a readable ZIP archive.
    #[error("corrupt archive: {0}")]
    CorruptArchive(#[from] Corrupt),
}

/// Errors returned by positional lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Index is not below the entry count.
    #[error("entry index {index} out of range (archive has {count} entries)")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error(transparent)]
    UseAfterClose(#[from] UseAfterClose),
}

/// Errors returned by [`Archive::extract`](crate::Archive::extract).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Local header or compressed data is malformed.
    #[error("corrupt archive: {0}")]
    CorruptArchive(#[from] Corrupt),

    /// The entry uses a compression method other than stored or deflate.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// The entry's data range reaches past the end of the buffer.
    #[error("entry data at offset {offset} ({len} bytes) exceeds buffer of {buffer_len} bytes")]
    IoBoundsViolation {
        offset: u64,
        len: u64,
        buffer_len: u64,
    },

    /// The entry is encrypted; decryption is not supported.
    #[error("entry is encrypted")]
    Encrypted,

    /// CRC verification was requested and the content does not match.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("entry index {index} out of range (archive has {count} entries)")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error(transparent)]
    UseAfterClose(#[from] UseAfterClose),
}

impl From<IndexError> for ExtractError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::IndexOutOfRange { index, count } => {
                ExtractError::IndexOutOfRange { index, count }
            }
            IndexError::UseAfterClose(e) => ExtractError::UseAfterClose(e),
        }
    }
}

impl From<InflateError> for ExtractError {
    fn from(err: InflateError) -> Self {
        ExtractError::CorruptArchive(err.into())
    }
}
