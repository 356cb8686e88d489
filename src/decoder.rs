//! Detail record decoding
//!
//! A detail record starts with the 4-byte end address of its range,
//! followed by a country field and an area field. Each field opens with a
//! mode byte:
//!
//! ```text
//! 0x00        field absent
//! 0x01 ptr24  redirect-1: country *and* area live at ptr
//! 0x02 ptr24  redirect-2: only this string lives at ptr
//! other       the field is an inline NUL-terminated string
//! ```
//!
//! Country resolution follows at most two hops (redirect-1 then
//! redirect-2), area resolution at most one. Every hop consumes a fixed
//! pointer field, so decoding always terminates.
//!
//! Where the area field sits after a redirect-1 → redirect-2 country chain
//! is selected by [`AreaAnchor`].
//!
//! Offsets are threaded through the decode steps as plain values; the
//! decoder holds no position state and may be shared freely.

use crate::error::{QqwryError, Result};
use crate::format::{self, MODE_EMPTY, POINTER_LEN, REDIRECT_MODE_1, REDIRECT_MODE_2};
use memchr::memchr;
use serde::Serialize;

/// Default cap on bytes scanned for a string terminator
pub const DEFAULT_MAX_STRING_LEN: usize = 500;

/// Raw (still legacy-encoded) country and area bytes of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct LocationRecord {
    /// Country bytes, without the terminator
    pub country: Vec<u8>,
    /// Area bytes, without the terminator
    pub area: Vec<u8>,
}

/// Field encoding selected by a mode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No data for this field
    Empty,
    /// Pointer to a location holding both country and area
    Redirect1,
    /// Pointer to a single string
    Redirect2,
    /// Inline string starting at the mode byte itself
    Direct,
}

impl Mode {
    /// Classify a mode byte
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            MODE_EMPTY => Mode::Empty,
            REDIRECT_MODE_1 => Mode::Redirect1,
            REDIRECT_MODE_2 => Mode::Redirect2,
            _ => Mode::Direct,
        }
    }
}

/// Area position after a redirect-1 whose target is itself a redirect-2
///
/// ```text
/// p:  01 p2 p2 p2 | ...        Record: area field at p + 4
/// p2: 02 x  x  x  | area ...   Target: area field at p2 + 4
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AreaAnchor {
    /// Area follows the record's own redirect-1 pointer
    #[default]
    Record,
    /// Area follows the redirect-2 pointer at the redirect-1 target, the
    /// layout written by the tooling that publishes qqwry.dat
    Target,
}

impl std::str::FromStr for AreaAnchor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "record" => Ok(AreaAnchor::Record),
            "target" => Ok(AreaAnchor::Target),
            _ => Err(format!("unknown area anchor '{}': expected record or target", s)),
        }
    }
}

/// Decodes detail records out of a database buffer
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder<'a> {
    buf: &'a [u8],
    max_string_len: usize,
    area_anchor: AreaAnchor,
}

impl<'a> RecordDecoder<'a> {
    /// Create a decoder with the default string window
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_string_len(buf, DEFAULT_MAX_STRING_LEN)
    }

    /// Create a decoder with an explicit string window
    pub fn with_max_string_len(buf: &'a [u8], max_string_len: usize) -> Self {
        Self {
            buf,
            max_string_len: max_string_len.max(1),
            area_anchor: AreaAnchor::default(),
        }
    }

    /// Select where chained redirects place the area field
    pub fn with_area_anchor(mut self, anchor: AreaAnchor) -> Self {
        self.area_anchor = anchor;
        self
    }

    /// Decode the record at `record_offset` into owned country/area bytes
    pub fn decode(&self, record_offset: u32) -> Result<LocationRecord> {
        let (country, area) = self.decode_borrowed(record_offset)?;
        Ok(LocationRecord {
            country: country.to_vec(),
            area: area.to_vec(),
        })
    }

    /// Decode the record at `record_offset`, borrowing from the buffer
    pub fn decode_borrowed(&self, record_offset: u32) -> Result<(&'a [u8], &'a [u8])> {
        // Skip the end address
        let p = record_offset as usize + 4;
        let (country, area_offset) = self.country_at(p)?;
        let area = self.area_at(area_offset)?;
        Ok((country, area))
    }

    /// Last address covered by the record's range
    pub fn range_end(&self, record_offset: u32) -> Result<u32> {
        format::read_u32_le(self.buf, record_offset as usize)
    }

    /// Resolve the country field at `p`.
    ///
    /// Returns the country bytes and the offset where the area field starts.
    fn country_at(&self, p: usize) -> Result<(&'a [u8], usize)> {
        match self.mode_at(p)? {
            Mode::Empty => Ok((&[][..], p)),
            Mode::Redirect1 => {
                let p2 = self.pointer_at(p + 1)?;
                match self.mode_at(p2)? {
                    Mode::Redirect2 => {
                        let p3 = self.pointer_at(p2 + 1)?;
                        let area_offset = match self.area_anchor {
                            AreaAnchor::Record => p + 1 + POINTER_LEN,
                            AreaAnchor::Target => p2 + 1 + POINTER_LEN,
                        };
                        Ok((self.string_at(p3)?, area_offset))
                    }
                    _ => {
                        let country = self.string_at(p2)?;
                        Ok((country, p2 + country.len() + 1))
                    }
                }
            }
            Mode::Redirect2 => {
                let p3 = self.pointer_at(p + 1)?;
                Ok((self.string_at(p3)?, p + 1 + POINTER_LEN))
            }
            Mode::Direct => {
                let country = self.string_at(p)?;
                Ok((country, p + country.len() + 1))
            }
        }
    }

    /// Resolve the area field at `q`
    fn area_at(&self, q: usize) -> Result<&'a [u8]> {
        match self.mode_at(q)? {
            Mode::Redirect1 | Mode::Redirect2 => {
                let target = self.pointer_at(q + 1)?;
                self.string_at(target)
            }
            Mode::Empty => Ok(&[][..]),
            Mode::Direct => self.string_at(q),
        }
    }

    #[inline]
    fn mode_at(&self, offset: usize) -> Result<Mode> {
        format::read_u8(self.buf, offset).map(Mode::from_byte)
    }

    #[inline]
    fn pointer_at(&self, offset: usize) -> Result<usize> {
        format::read_u24_le(self.buf, offset).map(|p| p as usize)
    }

    /// NUL-terminated string at `offset`, terminator excluded
    fn string_at(&self, offset: usize) -> Result<&'a [u8]> {
        if offset >= self.buf.len() {
            return Err(QqwryError::OutOfRange {
                offset,
                len: 1,
                buffer_len: self.buf.len(),
            });
        }
        let window = self.max_string_len.min(self.buf.len() - offset);
        let haystack = &self.buf[offset..offset + window];
        match memchr(0, haystack) {
            Some(len) => Ok(&haystack[..len]),
            None => Err(QqwryError::StringTooLong { offset, window }),
        }
    }
}
