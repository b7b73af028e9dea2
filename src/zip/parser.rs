//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures from an
//! in-memory buffer. Every read is bounds-checked against the buffer, so a
//! damaged archive yields a [`Corrupt`] reason instead of a panic.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the buffer's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::Corrupt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: usize = 65535;

/// MS-DOS directory bit in the low byte of the external attributes.
const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Parsed central directory.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    /// Entries in central directory order.
    pub entries: Vec<EntryDescriptor>,
    /// Archive comment from the EOCD record.
    pub comment: String,
}

/// Where the central directory lives, after resolving ZIP64 indirection.
#[derive(Debug, Clone, Copy)]
struct DirectoryLocation {
    cd_offset: u64,
    cd_size: u64,
    total_entries: u64,
}

/// Low-level ZIP parser over a borrowed buffer.
///
/// Typically used through [`Archive`](super::Archive) rather than directly.
pub struct ZipParser<'a> {
    data: &'a [u8],
}

impl<'a> ZipParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset in the buffer. Tries the
    /// comment-less layout first, then scans backwards over the last
    /// `22 + 65535` bytes. A candidate whose comment length runs exactly to
    /// the end of the buffer wins; otherwise the last candidate whose
    /// comment fits inside the buffer is used.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64), Corrupt> {
        let size = self.data.len();
        if size < EndOfCentralDirectory::SIZE {
            return Err(Corrupt("buffer too small to hold an end of central directory record"));
        }

        let last = size - EndOfCentralDirectory::SIZE;
        if &self.data[last..last + 4] == EndOfCentralDirectory::SIGNATURE
            && &self.data[last + 20..last + 22] == b"\x00\x00"
        {
            let eocd = EndOfCentralDirectory::from_bytes(&self.data[last..])?;
            return Ok((eocd, last as u64));
        }

        let search_start = size.saturating_sub(MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE);
        let mut fallback = None;

        for i in (search_start..=last).rev() {
            if &self.data[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let comment_len = u16::from_le_bytes([self.data[i + 20], self.data[i + 21]]) as usize;
            let remaining = size - i - EndOfCentralDirectory::SIZE;
            if comment_len == remaining {
                let eocd = EndOfCentralDirectory::from_bytes(&self.data[i..])?;
                return Ok((eocd, i as u64));
            }
            if comment_len < remaining && fallback.is_none() {
                fallback = Some(i);
            }
        }

        match fallback {
            Some(i) => {
                log::warn!(
                    "end of central directory at offset {} is followed by {} unexpected bytes",
                    i,
                    size - i - EndOfCentralDirectory::SIZE
                );
                let eocd = EndOfCentralDirectory::from_bytes(&self.data[i..])?;
                Ok((eocd, i as u64))
            }
            None => Err(Corrupt("end of central directory record not found")),
        }
    }

    /// Read the ZIP64 End of Central Directory record, if the archive has one.
    ///
    /// The locator sits immediately before the regular EOCD. `None` means the
    /// sentinel values in the regular EOCD are genuine values.
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Option<Zip64EOCD>, Corrupt> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            return Ok(None);
        };
        let locator_bytes = self.slice(locator_offset, Zip64EOCDLocator::SIZE as u64)?;
        if &locator_bytes[0..4] != Zip64EOCDLocator::SIGNATURE {
            return Ok(None);
        }

        let locator = Zip64EOCDLocator::from_bytes(locator_bytes)?;
        if locator.disk_with_eocd64 != 0 || locator.total_disks > 1 {
            return Err(Corrupt("multi-volume archives are not supported"));
        }
        if locator.eocd64_offset >= locator_offset {
            return Err(Corrupt("ZIP64 end of central directory offset out of bounds"));
        }

        let eocd64_bytes = self
            .slice(locator.eocd64_offset, Zip64EOCD::MIN_SIZE as u64)
            .map_err(|_| Corrupt("ZIP64 end of central directory offset out of bounds"))?;
        Zip64EOCD::from_bytes(eocd64_bytes).map(Some)
    }

    /// Parse the whole central directory.
    pub fn read_central_directory(&self) -> Result<CentralDirectory, Corrupt> {
        let (eocd, eocd_offset) = self.find_eocd()?;
        log::debug!(
            "found end of central directory at offset {} ({} entries)",
            eocd_offset,
            eocd.total_entries
        );

        let location = self.locate_directory(&eocd, eocd_offset)?;

        let cd_end = location
            .cd_offset
            .checked_add(location.cd_size)
            .filter(|&end| end <= eocd_offset)
            .ok_or(Corrupt("central directory extends past its end record"))?;
        let cd_data = self.slice(location.cd_offset, cd_end - location.cd_offset)?;

        // A forged entry count must not turn into a huge allocation.
        let capacity = location
            .total_entries
            .min((cd_data.len() / CDFH_MIN_SIZE) as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(cd_data);

        for _ in 0..location.total_entries {
            if cursor.position() as usize + CDFH_MIN_SIZE > cd_data.len() {
                return Err(Corrupt("central directory ends before all entries were read"));
            }
            let entry = self.parse_cdfh(&mut cursor)?;
            entries.push(entry);
        }

        let comment = self.archive_comment(&eocd, eocd_offset);

        log::debug!(
            "parsed {} central directory entries (offset {}, {} bytes)",
            entries.len(),
            location.cd_offset,
            location.cd_size
        );

        Ok(CentralDirectory { entries, comment })
    }

    fn locate_directory(
        &self,
        eocd: &EndOfCentralDirectory,
        eocd_offset: u64,
    ) -> Result<DirectoryLocation, Corrupt> {
        if eocd.is_zip64() {
            if let Some(eocd64) = self.read_zip64_eocd(eocd_offset)? {
                if eocd64.disk_number != 0 || eocd64.disk_with_cd != 0 {
                    return Err(Corrupt("multi-volume archives are not supported"));
                }
                return Ok(DirectoryLocation {
                    cd_offset: eocd64.cd_offset,
                    cd_size: eocd64.cd_size,
                    total_entries: eocd64.total_entries,
                });
            }
        }

        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 || eocd.disk_entries != eocd.total_entries
        {
            return Err(Corrupt("multi-volume archives are not supported"));
        }

        Ok(DirectoryLocation {
            cd_offset: eocd.cd_offset as u64,
            cd_size: eocd.cd_size as u64,
            total_entries: eocd.total_entries as u64,
        })
    }

    fn archive_comment(&self, eocd: &EndOfCentralDirectory, eocd_offset: u64) -> String {
        let start = eocd_offset as usize + EndOfCentralDirectory::SIZE;
        let end = start + eocd.comment_len as usize;
        if end > self.data.len() {
            log::warn!(
                "archive comment truncated: {} bytes declared, {} present",
                eocd.comment_len,
                self.data.len() - start
            );
        }
        let end = end.min(self.data.len());
        String::from_utf8_lossy(&self.data[start..end]).into_owned()
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// The cursor is left positioned at the next header.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<EntryDescriptor, Corrupt> {
        // Read and verify the signature (PK\x01\x02)
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(Corrupt("invalid central directory file header signature"));
        }

        // Read fixed-size header fields
        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as usize;
        let file_comment_length = cursor.read_u16::<LittleEndian>()? as usize;
        let disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let file_name_bytes = take(cursor, file_name_length)?;
        let extra = take(cursor, extra_field_length)?;
        let comment_bytes = take(cursor, file_comment_length)?;

        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let name = String::from_utf8_lossy(file_name_bytes).into_owned();
        if name.is_empty() {
            return Err(Corrupt("central directory entry has an empty name"));
        }

        // Directory entries end with '/' or carry the DOS directory attribute
        let is_directory = name.ends_with('/') || external_attrs & DOS_DIRECTORY_ATTRIBUTE != 0;

        if extra_field_length > 0 {
            let zip64 = Zip64Sizes {
                uncompressed_size: &mut uncompressed_size,
                compressed_size: &mut compressed_size,
                lfh_offset: &mut lfh_offset,
            };
            apply_zip64_extra(extra, zip64)?;
        }

        if disk_number_start != 0 && disk_number_start != ZIP64_SENTINEL_U16 {
            return Err(Corrupt("multi-volume archives are not supported"));
        }

        let lfh_end = lfh_offset.checked_add(LFH_SIZE as u64);
        if lfh_end.is_none_or(|end| end > self.data.len() as u64) {
            return Err(Corrupt("local header offset out of bounds"));
        }

        Ok(EntryDescriptor {
            name,
            is_directory,
            uncompressed_size,
            compressed_size,
            crc32,
            compression_method: CompressionMethod::from_u16(compression_method),
            local_header_offset: lfh_offset,
            flags,
            last_mod_time,
            last_mod_date,
            comment: String::from_utf8_lossy(comment_bytes).into_owned(),
        })
    }

    /// Read the Local File Header at `offset`.
    ///
    /// The returned header records where the entry's data begins: right
    /// after the fixed 30 bytes, the file name and the extra field.
    pub fn read_local_header(&self, offset: u64) -> Result<LocalFileHeader, Corrupt> {
        let fixed = self
            .slice(offset, LFH_SIZE as u64)
            .map_err(|_| Corrupt("local header offset out of bounds"))?;

        // Verify LFH signature (PK\x03\x04)
        if &fixed[0..4] != LFH_SIGNATURE {
            return Err(Corrupt("invalid local file header signature"));
        }

        let mut cursor = Cursor::new(&fixed[4..]);
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;

        let name_offset = offset + LFH_SIZE as u64;
        let file_name = self
            .slice(name_offset, file_name_length as u64)
            .map_err(|_| Corrupt("local header name out of bounds"))?
            .to_vec();

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset = name_offset + file_name_length as u64 + extra_field_length as u64;

        Ok(LocalFileHeader {
            version_needed,
            flags,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field_length,
            data_offset,
        })
    }

    /// Bounds-checked view of `len` bytes at `offset`.
    fn slice(&self, offset: u64, len: u64) -> Result<&'a [u8], Corrupt> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len() as u64)
            .ok_or(Corrupt("record extends past the end of the buffer"))?;
        Ok(&self.data[offset as usize..end as usize])
    }
}

/// Take the next `len` bytes from the cursor without copying.
fn take<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], Corrupt> {
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or(Corrupt("central directory entry truncated"))?;
    cursor.set_position((start + len) as u64);
    Ok(bytes)
}

/// 32-bit header fields that a ZIP64 extra field may replace.
struct Zip64Sizes<'s> {
    uncompressed_size: &'s mut u64,
    compressed_size: &'s mut u64,
    lfh_offset: &'s mut u64,
}

/// Walk the extra field and apply the ZIP64 extended information record.
///
/// Values are present only for header fields set to `0xFFFFFFFF`, in the
/// fixed order uncompressed size, compressed size, local header offset.
fn apply_zip64_extra(extra: &[u8], sizes: Zip64Sizes<'_>) -> Result<(), Corrupt> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let header_id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let field_size = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        // Trailing padding or a malformed record: nothing more to learn.
        let Some(field) = extra.get(pos + 4..pos + 4 + field_size) else {
            break;
        };
        pos += 4 + field_size;

        if header_id != ZIP64_EXTRA_ID {
            continue;
        }

        let mut cursor = Cursor::new(field);
        for value in [sizes.uncompressed_size, sizes.compressed_size, sizes.lfh_offset] {
            if *value == ZIP64_SENTINEL_U32 as u64 {
                *value = cursor
                    .read_u64::<LittleEndian>()
                    .map_err(|_| Corrupt("ZIP64 extra field truncated"))?;
            }
        }
        return Ok(());
    }
    Ok(())
}
