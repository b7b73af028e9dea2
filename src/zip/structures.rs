use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::Corrupt;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            _ => CompressionMethod::Unsupported(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Unsupported(v) => *v,
        }
    }

    /// Short label used in listings.
    pub fn label(&self) -> &'static str {
        match self {
            CompressionMethod::Stored => "Stored",
            CompressionMethod::Deflated => "Defl:N",
            CompressionMethod::Unsupported(_) => "Unk:??",
        }
    }
}

/// General purpose flag bit 3: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Marker for 32-bit fields whose real value lives in a ZIP64 record.
pub const ZIP64_SENTINEL_U32: u32 = 0xFFFF_FFFF;
pub const ZIP64_SENTINEL_U16: u16 = 0xFFFF;

/// ZIP64 extended information extra field id.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self, Corrupt> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Corrupt("invalid end of central directory record"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == ZIP64_SENTINEL_U16
            || self.total_entries == ZIP64_SENTINEL_U16
            || self.cd_size == ZIP64_SENTINEL_U32
            || self.cd_offset == ZIP64_SENTINEL_U32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self, Corrupt> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Corrupt("invalid ZIP64 end of central directory locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self, Corrupt> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Corrupt("invalid ZIP64 end of central directory record"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Fixed part of a Local File Header plus its file name.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field_length: u16,
    /// Absolute offset of the first data byte.
    pub data_offset: u64,
}

impl LocalFileHeader {
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Whether the header carries real 32-bit sizes worth cross-checking.
    pub fn has_sizes(&self) -> bool {
        !self.has_data_descriptor()
            && self.compressed_size != ZIP64_SENTINEL_U32
            && self.uncompressed_size != ZIP64_SENTINEL_U32
    }
}

/// Metadata for one central directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub name: String,
    pub is_directory: bool,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub compression_method: CompressionMethod,
    pub local_header_offset: u64,
    pub flags: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub comment: String,
}

impl EntryDescriptor {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// Result of extracting one entry.
///
/// `content` is `None` for directories and zero-size entries, so an empty
/// file and "nothing to read" stay distinguishable from a zero-length buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub crc32: u32,
    pub content: Option<Vec<u8>>,
}
