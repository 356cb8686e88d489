//! On-disk structures of the QQWry database format
//!
//! All integers are little-endian. The file has three regions:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Header (8 bytes)                         │
//! │   index_start: u32   index_end: u32      │
//! ├──────────────────────────────────────────┤
//! │ Detail region (variable)                 │
//! │   end_ip: u32, country field, area field │
//! │   NUL-terminated GBK strings, redirects  │
//! ├──────────────────────────────────────────┤
//! │ Index region [index_start, index_end]    │
//! │   7-byte entries: ip: u32, offset: u24   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! `index_end` is the offset of the *last* entry, not one past it, so the
//! region spans `index_end - index_start + 7` bytes.
//!
//! # Safety
//!
//! Every accessor here takes a byte offset supplied by the (untrusted) file
//! and checks it against the buffer length before reading. Nothing in this
//! module indexes a slice without checking first.

use crate::error::{QqwryError, Result};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of the file header in bytes
pub const HEADER_LEN: usize = 8;

/// Size of one index entry in bytes
pub const INDEX_ENTRY_LEN: usize = 7;

/// Size of a redirect pointer in bytes
pub const POINTER_LEN: usize = 3;

/// Largest value a 24-bit record pointer can hold
pub const MAX_POINTER: u32 = 0x00FF_FFFF;

/// Mode byte: field is absent
pub const MODE_EMPTY: u8 = 0x00;

/// Mode byte: country and area both live at the pointed-to location
pub const REDIRECT_MODE_1: u8 = 0x01;

/// Mode byte: only this string lives at the pointed-to location
pub const REDIRECT_MODE_2: u8 = 0x02;

/// File header (8 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RawHeader {
    /// Offset of the first index entry
    pub index_start: U32,
    /// Offset of the last index entry
    pub index_end: U32,
}

/// One index entry as stored on disk (7 bytes, unaligned)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RawIndexEntry {
    /// First address of the range
    pub ip: U32,
    /// 24-bit little-endian offset of the detail record
    pub record_offset: [u8; 3],
}

/// Decoded index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry {
    /// First address of the range (host order)
    pub ip: u32,
    /// Offset of the detail record (24 bits)
    pub record_offset: u32,
}

impl From<RawIndexEntry> for IndexEntry {
    fn from(raw: RawIndexEntry) -> Self {
        IndexEntry {
            ip: raw.ip.get(),
            record_offset: u24_from_le(raw.record_offset),
        }
    }
}

impl IndexEntry {
    /// Leading octet of the entry's address, which selects its bucket
    #[inline]
    pub fn octet(&self) -> u8 {
        (self.ip >> 24) as u8
    }

    /// On-disk representation
    pub fn to_raw(self) -> RawIndexEntry {
        RawIndexEntry {
            ip: U32::new(self.ip),
            record_offset: u24_to_le(self.record_offset),
        }
    }
}

/// Assemble a 24-bit little-endian value
#[inline]
pub fn u24_from_le(bytes: [u8; 3]) -> u32 {
    u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
}

/// Split the low 24 bits of `value` into little-endian bytes
#[inline]
pub fn u24_to_le(value: u32) -> [u8; 3] {
    let b = value.to_le_bytes();
    [b[0], b[1], b[2]]
}

/// Bounds-checked sub-slice `[offset, offset + len)`
#[inline]
pub fn slice_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .map(|end| &buf[offset..end])
        .ok_or(QqwryError::OutOfRange {
            offset,
            len,
            buffer_len: buf.len(),
        })
}

/// Read one byte at `offset`
#[inline]
pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(slice_at(buf, offset, 1)?[0])
}

/// Read a 24-bit little-endian pointer at `offset`
#[inline]
pub fn read_u24_le(buf: &[u8], offset: usize) -> Result<u32> {
    let b = slice_at(buf, offset, POINTER_LEN)?;
    Ok(u24_from_le([b[0], b[1], b[2]]))
}

/// Read a 32-bit little-endian integer at `offset`
#[inline]
pub fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32> {
    let b = slice_at(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse the file header
pub fn read_header(buf: &[u8]) -> Result<RawHeader> {
    let (header, _) = RawHeader::read_from_prefix(buf).map_err(|_| {
        QqwryError::Format(format!(
            "header not present: file is {} bytes, need at least {}",
            buf.len(),
            HEADER_LEN
        ))
    })?;
    Ok(header)
}

/// Read the index entry stored at byte `offset`
#[inline]
pub fn read_index_entry(buf: &[u8], offset: usize) -> Result<IndexEntry> {
    let bytes = slice_at(buf, offset, INDEX_ENTRY_LEN)?;
    let raw = RawIndexEntry::read_from_bytes(bytes).map_err(|_| QqwryError::OutOfRange {
        offset,
        len: INDEX_ENTRY_LEN,
        buffer_len: buf.len(),
    })?;
    Ok(raw.into())
}
