//! # bufzip
//!
//! A ZIP archive reader for archives held in memory, with a from-scratch
//! DEFLATE decoder and CRC-32, plus an `unzip`-style command-line tool.
//!
//! The library copies the caller's buffer when an archive is opened, indexes
//! the central directory, and decodes individual entries on request. Entries
//! are addressed by position; [`Archive::by_name`] is a convenience lookup.
//!
//! ## Features
//!
//! - Random-access enumeration of central directory entries
//! - STORED and DEFLATE entries, decoded without third-party codecs
//! - ZIP64 archives and entries with trailing data descriptors
//! - CRC-32 reported for every entry, verified on request via [`ReadOptions`]
//! - Typed errors for every failure; no input makes the reader panic
//!
//! ## Example
//!
//! ```no_run
//! use bufzip::{Archive, ReadOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("archive.zip")?;
//!     let archive = Archive::open_with(bytes, ReadOptions::new().with_verify_crc(true))?;
//!
//!     for index in 0..archive.entry_count()? {
//!         let entry = archive.extract(index)?;
//!         match entry.content {
//!             Some(content) => println!("{}: {} bytes", entry.name, content.len()),
//!             None => println!("{}: no content", entry.name),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Corrupt, ExtractError, IndexError, OpenError, UseAfterClose};
pub use io::{ArchiveSource, HttpSource, LocalFileSource};
pub use zip::crc32::crc32;
pub use zip::{Archive, CompressionMethod, EntryDescriptor, ExtractedEntry, ReadOptions};
