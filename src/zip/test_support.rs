//! Hand-assembled archives for tests.
//!
//! Also compiled into the integration tests through `tests/common`, so it
//! only depends on `flate2` and the standard library. CRCs and DEFLATE data
//! come from `flate2`, independently of the reader under test.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

pub fn reference_crc(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

pub fn deflate(data: &[u8], level: Compression) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), level);
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory finish")
}

pub struct TestEntry {
    pub name: String,
    pub local_name: Option<String>,
    pub method: u16,
    pub data: Vec<u8>,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub extra: Vec<u8>,
    pub flags: u16,
    pub external_attrs: u32,
}

impl TestEntry {
    pub fn stored(name: &str, content: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            local_name: None,
            method: 0,
            data: content.to_vec(),
            uncompressed_size: content.len() as u32,
            crc32: reference_crc(content),
            extra: Vec::new(),
            flags: 0,
            external_attrs: 0,
        }
    }

    /// Entry with a ready-made raw DEFLATE stream.
    pub fn deflated(name: &str, compressed: &[u8], plain: &[u8]) -> Self {
        Self {
            method: 8,
            data: compressed.to_vec(),
            uncompressed_size: plain.len() as u32,
            crc32: reference_crc(plain),
            ..Self::stored(name, b"")
        }
    }

    /// Entry compressed with `flate2` at `level`.
    pub fn compressed(name: &str, plain: &[u8], level: Compression) -> Self {
        Self::deflated(name, &deflate(plain, level), plain)
    }
}

#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<TestEntry>,
    comment: Vec<u8>,
    zip64: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: TestEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn stored(self, name: &str, content: &[u8]) -> Self {
        self.entry(TestEntry::stored(name, content))
    }

    pub fn stored_with_extra(self, name: &str, content: &[u8], extra: &[u8]) -> Self {
        self.entry(TestEntry {
            extra: extra.to_vec(),
            ..TestEntry::stored(name, content)
        })
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(TestEntry::stored(name, b""))
    }

    pub fn deflated(self, name: &str, compressed: &[u8], plain: &[u8]) -> Self {
        self.entry(TestEntry::deflated(name, compressed, plain))
    }

    pub fn compressed(self, name: &str, plain: &[u8], level: Compression) -> Self {
        self.entry(TestEntry::compressed(name, plain, level))
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            offsets.push(out.len() as u32);
            let local_name = entry.local_name.as_deref().unwrap_or(&entry.name);
            let descriptor = entry.flags & FLAG_DATA_DESCRIPTOR != 0;
            let (crc, csize, usize_) = if descriptor {
                (0, 0, 0)
            } else {
                (entry.crc32, entry.data.len() as u32, entry.uncompressed_size)
            };

            out.extend_from_slice(b"PK\x03\x04");
            put_u16(&mut out, 20);
            put_u16(&mut out, entry.flags);
            put_u16(&mut out, entry.method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0x21);
            put_u32(&mut out, crc);
            put_u32(&mut out, csize);
            put_u32(&mut out, usize_);
            put_u16(&mut out, local_name.len() as u16);
            put_u16(&mut out, entry.extra.len() as u16);
            out.extend_from_slice(local_name.as_bytes());
            out.extend_from_slice(&entry.extra);
            out.extend_from_slice(&entry.data);

            if descriptor {
                out.extend_from_slice(b"PK\x07\x08");
                put_u32(&mut out, entry.crc32);
                put_u32(&mut out, entry.data.len() as u32);
                put_u32(&mut out, entry.uncompressed_size);
            }
        }

        let cd_offset = out.len() as u32;
        for (entry, offset) in self.entries.iter().zip(&offsets) {
            out.extend_from_slice(b"PK\x01\x02");
            put_u16(&mut out, 20);
            put_u16(&mut out, 20);
            put_u16(&mut out, entry.flags);
            put_u16(&mut out, entry.method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0x21);
            put_u32(&mut out, entry.crc32);
            put_u32(&mut out, entry.data.len() as u32);
            put_u32(&mut out, entry.uncompressed_size);
            put_u16(&mut out, entry.name.len() as u16);
            put_u16(&mut out, entry.extra.len() as u16);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u32(&mut out, entry.external_attrs);
            put_u32(&mut out, *offset);
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.extra);
        }
        let cd_size = out.len() as u32 - cd_offset;
        let count = self.entries.len() as u16;

        if self.zip64 {
            let eocd64_offset = out.len() as u64;
            out.extend_from_slice(b"PK\x06\x06");
            put_u64(&mut out, 44);
            put_u16(&mut out, 45);
            put_u16(&mut out, 45);
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
            put_u64(&mut out, count as u64);
            put_u64(&mut out, count as u64);
            put_u64(&mut out, cd_size as u64);
            put_u64(&mut out, cd_offset as u64);

            out.extend_from_slice(b"PK\x06\x07");
            put_u32(&mut out, 0);
            put_u64(&mut out, eocd64_offset);
            put_u32(&mut out, 1);
        }

        out.extend_from_slice(b"PK\x05\x06");
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        if self.zip64 {
            put_u16(&mut out, 0xFFFF);
            put_u16(&mut out, 0xFFFF);
            put_u32(&mut out, 0xFFFF_FFFF);
            put_u32(&mut out, 0xFFFF_FFFF);
        } else {
            put_u16(&mut out, count);
            put_u16(&mut out, count);
            put_u32(&mut out, cd_size);
            put_u32(&mut out, cd_offset);
        }
        put_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}
