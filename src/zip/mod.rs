//! ZIP archive parsing and extraction.
//!
//! This module reads ZIP archives held entirely in memory, supporting both
//! the standard format and ZIP64 extensions for large archives.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`inflate`]: DEFLATE decoder for compressed entries
//! - [`crc32`]: CRC-32 checksum used to verify entry contents
//! - [`archive`]: High-level [`Archive`] API for end users
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Opening an archive reads the EOCD first (from the end of the buffer),
//! then the Central Directory. Entry data is only touched on extraction,
//! so opening costs time proportional to the directory, not the archive.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method
//! - Entries written with a trailing data descriptor
//!
//! ## Limitations
//!
//! - Read-only: no writing or appending
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

pub mod archive;
pub mod crc32;
pub mod inflate;
pub mod parser;
pub mod structures;

#[cfg(test)]
mod test_support;

pub use archive::{Archive, ReadOptions};
pub use parser::{CentralDirectory, ZipParser};
pub use structures::*;
