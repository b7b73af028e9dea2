use crate::error::{Corrupt, ExtractError, IndexError, OpenError, UseAfterClose};

use super::crc32::crc32;
use super::inflate::inflate;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, EntryDescriptor, ExtractedEntry};

/// General purpose flag bit 0: the entry is encrypted.
const FLAG_ENCRYPTED: u16 = 1;

/// Options controlling how entries are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Verify each extracted entry against its stored CRC-32.
    ///
    /// Off by default: the checksum is reported in [`ExtractedEntry::crc32`]
    /// and left to the caller.
    pub verify_crc: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verify_crc(mut self, verify_crc: bool) -> Self {
        self.verify_crc = verify_crc;
        self
    }
}

/// Buffer and index of an open archive.
struct OpenArchive {
    data: Vec<u8>,
    entries: Vec<EntryDescriptor>,
    comment: String,
}

enum State {
    Unopened,
    Open(OpenArchive),
    Closed,
}

/// A read-only ZIP archive held in memory.
///
/// [`Archive::open`] copies the caller's buffer and indexes the central
/// directory; entry contents are decoded only when [`extract`](Self::extract)
/// is called. The archive is `Send + Sync`: lookups and extraction take
/// `&self` and may run from several threads at once, while
/// [`close`](Self::close) needs `&mut self` and therefore exclusive access.
///
/// A default-constructed handle is unopened. Any operation on an unopened or
/// closed handle fails with [`UseAfterClose`].
///
/// ## Example
///
/// ```no_run
/// use bufzip::Archive;
///
/// # fn main() -> anyhow::Result<()> {
/// let bytes = std::fs::read("archive.zip")?;
/// let archive = Archive::open(bytes)?;
/// for index in 0..archive.entry_count()? {
///     let entry = archive.extract(index)?;
///     println!("{} ({} bytes)", entry.name, entry.size);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Archive {
    state: State,
    options: ReadOptions,
}

impl Default for Archive {
    fn default() -> Self {
        Self {
            state: State::Unopened,
            options: ReadOptions::default(),
        }
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Unopened => "unopened",
            State::Open(_) => "open",
            State::Closed => "closed",
        };
        f.debug_struct("Archive")
            .field("state", &state)
            .field("options", &self.options)
            .finish()
    }
}

impl Archive {
    /// Open an archive from a byte buffer with default options.
    pub fn open(buffer: impl Into<Vec<u8>>) -> Result<Self, OpenError> {
        Self::open_with(buffer, ReadOptions::default())
    }

    /// Open an archive from a byte buffer.
    ///
    /// Either the whole central directory parses and the archive is
    /// returned, or nothing is.
    pub fn open_with(buffer: impl Into<Vec<u8>>, options: ReadOptions) -> Result<Self, OpenError> {
        let data = buffer.into();
        if data.is_empty() {
            return Err(OpenError::EmptyBuffer);
        }

        let directory = ZipParser::new(&data).read_central_directory()?;
        log::debug!(
            "opened archive of {} bytes with {} entries",
            data.len(),
            directory.entries.len()
        );

        Ok(Self {
            state: State::Open(OpenArchive {
                data,
                entries: directory.entries,
                comment: directory.comment,
            }),
            options,
        })
    }

    fn inner(&self) -> Result<&OpenArchive, UseAfterClose> {
        match &self.state {
            State::Open(archive) => Ok(archive),
            State::Unopened | State::Closed => Err(UseAfterClose),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Number of entries in the central directory.
    pub fn entry_count(&self) -> Result<u64, UseAfterClose> {
        Ok(self.inner()?.entries.len() as u64)
    }

    /// All entries, in central directory order.
    pub fn entries(&self) -> Result<&[EntryDescriptor], UseAfterClose> {
        Ok(&self.inner()?.entries)
    }

    /// Descriptor of the entry at `index`.
    pub fn entry_at(&self, index: u64) -> Result<EntryDescriptor, IndexError> {
        self.inner()?.entry(index).cloned()
    }

    /// Index of the first entry named `name`.
    ///
    /// Duplicate names are all kept in the index; the first match wins.
    pub fn by_name(&self, name: &str) -> Result<Option<u64>, UseAfterClose> {
        Ok(self
            .inner()?
            .entries
            .iter()
            .position(|entry| entry.name == name)
            .map(|index| index as u64))
    }

    /// Archive comment from the end of central directory record.
    pub fn comment(&self) -> Result<&str, UseAfterClose> {
        Ok(&self.inner()?.comment)
    }

    /// Size of the archive buffer in bytes.
    pub fn buffer_len(&self) -> Result<u64, UseAfterClose> {
        Ok(self.inner()?.data.len() as u64)
    }

    /// Extract the entry at `index`.
    ///
    /// Directories and zero-size entries come back with `content: None`.
    /// Failures are scoped to this entry; the archive stays usable.
    pub fn extract(&self, index: u64) -> Result<ExtractedEntry, ExtractError> {
        let archive = self.inner()?;
        let entry = archive.entry(index)?;

        let content = if entry.is_directory || entry.uncompressed_size == 0 {
            None
        } else {
            Some(archive.read_content(entry, self.options)?)
        };

        Ok(ExtractedEntry {
            name: entry.name.clone(),
            is_directory: entry.is_directory,
            size: entry.uncompressed_size,
            crc32: entry.crc32,
            content,
        })
    }

    /// Release the buffer and index. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let State::Open(archive) = &self.state {
            log::debug!("closing archive with {} entries", archive.entries.len());
            self.state = State::Closed;
        }
    }
}

impl OpenArchive {
    fn entry(&self, index: u64) -> Result<&EntryDescriptor, IndexError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(IndexError::IndexOutOfRange {
                index,
                count: self.entries.len() as u64,
            })
    }

    fn read_content(
        &self,
        entry: &EntryDescriptor,
        options: ReadOptions,
    ) -> Result<Vec<u8>, ExtractError> {
        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(ExtractError::Encrypted);
        }

        let header = ZipParser::new(&self.data).read_local_header(entry.local_header_offset)?;

        if String::from_utf8_lossy(&header.file_name) != entry.name {
            return Err(Corrupt("local header name does not match central directory").into());
        }
        if header.has_sizes()
            && (header.compressed_size as u64 != entry.compressed_size
                || header.uncompressed_size as u64 != entry.uncompressed_size)
        {
            return Err(Corrupt("local header sizes do not match central directory").into());
        }

        let buffer_len = self.data.len() as u64;
        let start = header.data_offset;
        let end = start
            .checked_add(entry.compressed_size)
            .filter(|&end| end <= buffer_len)
            .ok_or(ExtractError::IoBoundsViolation {
                offset: start,
                len: entry.compressed_size,
                buffer_len,
            })?;
        let raw = &self.data[start as usize..end as usize];

        let expected = usize::try_from(entry.uncompressed_size)
            .map_err(|_| Corrupt("entry too large for this platform"))?;

        let content = match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(Corrupt("stored entry sizes differ").into());
                }
                raw.to_vec()
            }
            CompressionMethod::Deflated => inflate(raw, expected)?,
            CompressionMethod::Unsupported(method) => {
                return Err(ExtractError::UnsupportedCompression(method));
            }
        };

        if content.len() != expected {
            return Err(Corrupt("decompressed size does not match central directory").into());
        }

        if options.verify_crc {
            let actual = crc32(&content);
            if actual != entry.crc32 {
                return Err(ExtractError::ChecksumMismatch {
                    expected: entry.crc32,
                    actual,
                });
            }
        }

        log::debug!(
            "extracted {} ({} -> {} bytes, {:?})",
            entry.name,
            entry.compressed_size,
            content.len(),
            entry.compression_method
        );

        Ok(content)
    }
}
