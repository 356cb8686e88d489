//! QQWry database builder
//!
//! Writes a well-formed database from a list of address ranges. Strings are
//! encoded with a [`TextCodec`] (GBK by default) and deduplicated the way
//! published files are:
//!
//! - a string written once is referenced afterwards with a redirect-2
//!   pointer
//! - a repeated (country, area) pair is referenced with a single
//!   redirect-1 pointer to the first record's country field, provided that
//!   field holds the country inline
//!
//! Redirect-1 never targets a redirect-2 field, so written files decode the
//! same under either [`AreaAnchor`](crate::decoder::AreaAnchor).
//!
//! # Example
//!
//! ```
//! use qqwry::{Database, QqwryBuilder};
//!
//! let mut builder = QqwryBuilder::new();
//! builder.add_range("1.0.1.0", "1.0.3.255", "福建省", "电信")?;
//! builder.add_range("1.0.8.0", "1.0.15.255", "广东省", "电信")?;
//!
//! let db = Database::from_bytes(builder.build()?)?;
//! let location = db.lookup("1.0.9.1")?.unwrap();
//! assert_eq!(location.country, "广东省");
//! # Ok::<(), qqwry::QqwryError>(())
//! ```

use crate::codec::{EncodingCodec, TextCodec};
use crate::database::parse_ipv4;
use crate::decoder::DEFAULT_MAX_STRING_LEN;
use crate::error::{QqwryError, Result};
use crate::format::{
    u24_to_le, IndexEntry, RawHeader, HEADER_LEN, INDEX_ENTRY_LEN, MAX_POINTER, MODE_EMPTY,
    REDIRECT_MODE_1, REDIRECT_MODE_2,
};
use log::debug;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::IntoBytes;

/// One address range with its location strings, already encoded
#[derive(Debug, Clone)]
struct RangeEntry {
    start: u32,
    end: u32,
    country: Vec<u8>,
    area: Vec<u8>,
}

/// Builder for QQWry database files
pub struct QqwryBuilder {
    ranges: Vec<RangeEntry>,
    codec: Box<dyn TextCodec>,
}

impl Default for QqwryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QqwryBuilder {
    /// Create a builder that encodes strings as GBK
    pub fn new() -> Self {
        Self {
            ranges: Vec::new(),
            codec: Box::new(EncodingCodec::default()),
        }
    }

    /// Encode strings with a different codec
    pub fn with_codec(mut self, codec: impl TextCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Number of ranges added so far
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether no ranges have been added
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Add a range given as dotted-quad strings (both ends inclusive)
    pub fn add_range(&mut self, start: &str, end: &str, country: &str, area: &str) -> Result<()> {
        let start = parse_ipv4(start)?;
        let end = parse_ipv4(end)?;
        self.add_range_ip(start, end, country, area)
    }

    /// Add a range given as parsed addresses (both ends inclusive)
    pub fn add_range_ip(
        &mut self,
        start: Ipv4Addr,
        end: Ipv4Addr,
        country: &str,
        area: &str,
    ) -> Result<()> {
        if start > end {
            return Err(QqwryError::Build(format!(
                "range start {} is after range end {}",
                start, end
            )));
        }
        let country = self.encode_field(country)?;
        let area = self.encode_field(area)?;
        self.ranges.push(RangeEntry {
            start: u32::from(start),
            end: u32::from(end),
            country,
            area,
        });
        Ok(())
    }

    fn encode_field(&self, text: &str) -> Result<Vec<u8>> {
        let bytes = self.codec.encode(text).ok_or_else(|| {
            QqwryError::Build(format!(
                "{:?} cannot be represented in {}",
                text,
                self.codec.name()
            ))
        })?;
        if bytes.contains(&0) {
            return Err(QqwryError::Build(format!("{:?} contains a NUL byte", text)));
        }
        // The terminator must fall inside the reader's default scan window
        if bytes.len() >= DEFAULT_MAX_STRING_LEN {
            return Err(QqwryError::Build(format!(
                "{:?} encodes to {} bytes, limit is {}",
                text,
                bytes.len(),
                DEFAULT_MAX_STRING_LEN - 1
            )));
        }
        if matches!(bytes.first(), Some(&REDIRECT_MODE_1) | Some(&REDIRECT_MODE_2)) {
            return Err(QqwryError::Build(format!(
                "{:?} starts with a byte reserved for redirect modes",
                text
            )));
        }
        Ok(bytes.into_owned())
    }

    /// Serialize the database
    ///
    /// # Errors
    ///
    /// Fails if no ranges were added, if ranges overlap, or if the detail
    /// region outgrows the 24-bit pointer range.
    pub fn build(mut self) -> Result<Vec<u8>> {
        if self.ranges.is_empty() {
            return Err(QqwryError::Build("no ranges to write".to_string()));
        }

        self.ranges.sort_by_key(|r| r.start);
        for pair in self.ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(QqwryError::Build(format!(
                    "range starting at {} overlaps range {}-{}",
                    Ipv4Addr::from(pair[1].start),
                    Ipv4Addr::from(pair[0].start),
                    Ipv4Addr::from(pair[0].end)
                )));
            }
        }

        let mut writer = DetailWriter::new();
        let mut index = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            let record_offset = writer.write_record(range)?;
            index.push(IndexEntry {
                ip: range.start,
                record_offset,
            });
        }

        let mut buf = writer.buf;
        let index_start = u32::try_from(buf.len())
            .map_err(|_| QqwryError::Build("detail region exceeds 4 GiB".to_string()))?;
        let index_end = (index.len() - 1)
            .checked_mul(INDEX_ENTRY_LEN)
            .and_then(|span| u32::try_from(span).ok())
            .and_then(|span| index_start.checked_add(span))
            .ok_or_else(|| QqwryError::Build("index region exceeds 4 GiB".to_string()))?;

        buf.reserve(index.len() * INDEX_ENTRY_LEN);
        for entry in &index {
            buf.extend_from_slice(entry.to_raw().as_bytes());
        }

        let header = RawHeader {
            index_start: U32::new(index_start),
            index_end: U32::new(index_end),
        };
        buf[..HEADER_LEN].copy_from_slice(header.as_bytes());

        debug!(
            "built database: {} ranges, {} bytes, {} pooled strings",
            index.len(),
            buf.len(),
            writer.strings.len()
        );
        Ok(buf)
    }
}

/// Appends detail records while tracking what has already been written
struct DetailWriter {
    buf: Vec<u8>,
    /// String bytes -> offset of a NUL-terminated copy
    strings: HashMap<Vec<u8>, u32>,
    /// (country, area) -> offset of an inline country string followed by its area field
    pairs: HashMap<(Vec<u8>, Vec<u8>), u32>,
}

impl DetailWriter {
    fn new() -> Self {
        // Header placeholder, then a shared empty string for empty countries
        let mut buf = vec![0u8; HEADER_LEN];
        buf.push(0);
        let mut strings = HashMap::new();
        strings.insert(Vec::new(), HEADER_LEN as u32);
        Self {
            buf,
            strings,
            pairs: HashMap::new(),
        }
    }

    fn offset(&self) -> Result<u32> {
        u32::try_from(self.buf.len())
            .ok()
            .filter(|&off| off <= MAX_POINTER)
            .ok_or_else(|| {
                QqwryError::Build(format!(
                    "detail region exceeds the 24-bit pointer range ({} bytes)",
                    self.buf.len()
                ))
            })
    }

    fn write_pointer(&mut self, mode: u8, target: u32) {
        self.buf.push(mode);
        self.buf.extend_from_slice(&u24_to_le(target));
    }

    fn write_record(&mut self, range: &RangeEntry) -> Result<u32> {
        let record_offset = self.offset()?;
        self.buf.extend_from_slice(&range.end.to_le_bytes());

        let key = (range.country.clone(), range.area.clone());
        if let Some(&shared) = self.pairs.get(&key) {
            self.write_pointer(REDIRECT_MODE_1, shared);
            return Ok(record_offset);
        }

        if let Some(&existing) = self.strings.get(&range.country) {
            self.write_pointer(REDIRECT_MODE_2, existing);
        } else {
            let field_offset = self.offset()?;
            self.write_inline(&range.country)?;
            self.pairs.insert(key, field_offset);
        }
        self.write_area(&range.area)?;
        Ok(record_offset)
    }

    fn write_area(&mut self, area: &[u8]) -> Result<()> {
        if area.is_empty() {
            self.buf.push(MODE_EMPTY);
        } else if let Some(&existing) = self.strings.get(area) {
            self.write_pointer(REDIRECT_MODE_2, existing);
        } else {
            self.write_inline(area)?;
        }
        Ok(())
    }

    fn write_inline(&mut self, text: &[u8]) -> Result<()> {
        let offset = self.offset()?;
        self.buf.extend_from_slice(text);
        self.buf.push(0);
        self.strings.insert(text.to_vec(), offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::decoder::{AreaAnchor, RecordDecoder};
    use crate::format::read_u8;
    use crate::validation::{validate_bytes, ValidationLevel};

    #[test]
    fn test_empty_builder_fails() {
        assert!(matches!(
            QqwryBuilder::new().build(),
            Err(QqwryError::Build(_))
        ));
    }

    #[test]
    fn test_single_range_layout() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("8.8.8.0", "8.8.8.255", "US", "Google").unwrap();
        let buf = builder.build().unwrap();

        // header, empty string, record (4 + "US\0" + "Google\0"), one entry
        assert_eq!(buf.len(), 8 + 1 + 4 + 3 + 7 + 7);
        let index_start = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let index_end = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        assert_eq!(index_start, index_end);
        assert_eq!(index_start as usize, buf.len() - 7);
    }

    #[test]
    fn test_repeated_pair_uses_redirect1() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("1.0.0.0", "1.0.0.255", "中国", "电信").unwrap();
        builder.add_range("1.0.1.0", "1.0.1.255", "中国", "电信").unwrap();
        let db = Database::from_bytes(builder.build().unwrap()).unwrap();

        let second = db.entry(1).unwrap();
        assert_eq!(
            read_u8(db.as_bytes(), second.record_offset as usize + 4).unwrap(),
            REDIRECT_MODE_1
        );
        let loc = db.lookup("1.0.1.1").unwrap().unwrap();
        assert_eq!((loc.country.as_str(), loc.area.as_str()), ("中国", "电信"));
    }

    #[test]
    fn test_repeated_country_uses_redirect2() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("1.0.0.0", "1.0.0.255", "中国", "电信").unwrap();
        builder.add_range("1.0.1.0", "1.0.1.255", "中国", "联通").unwrap();
        let buf = builder.build().unwrap();
        let db = Database::from_bytes(buf).unwrap();

        let second = db.entry(1).unwrap();
        assert_eq!(
            read_u8(db.as_bytes(), second.record_offset as usize + 4).unwrap(),
            REDIRECT_MODE_2
        );
        let loc = db.lookup("1.0.1.200").unwrap().unwrap();
        assert_eq!((loc.country.as_str(), loc.area.as_str()), ("中国", "联通"));
    }

    #[test]
    fn test_no_redirect1_into_pooled_country() {
        // The (中国, 联通) pair first appears with a pooled country, so its
        // repeat is written with redirect-2 fields instead of a chain
        let mut builder = QqwryBuilder::new();
        builder.add_range("1.0.0.0", "1.0.0.255", "中国", "电信").unwrap();
        builder.add_range("1.0.1.0", "1.0.1.255", "中国", "联通").unwrap();
        builder.add_range("1.0.2.0", "1.0.2.255", "中国", "联通").unwrap();
        let buf = builder.build().unwrap();
        let db = Database::from_bytes(buf.clone()).unwrap();

        let third = db.entry(2).unwrap();
        assert_eq!(
            read_u8(db.as_bytes(), third.record_offset as usize + 4).unwrap(),
            REDIRECT_MODE_2
        );

        let target = Database::from_bytes_builder(buf)
            .area_anchor(AreaAnchor::Target)
            .open()
            .unwrap();
        for addr in ["1.0.0.1", "1.0.1.9", "1.0.2.9"] {
            assert_eq!(db.lookup(addr).unwrap(), target.lookup(addr).unwrap());
        }
        let loc = db.lookup("1.0.2.9").unwrap().unwrap();
        assert_eq!((loc.country.as_str(), loc.area.as_str()), ("中国", "联通"));
    }

    #[test]
    fn test_string_length_limit() {
        let longest = "A".repeat(DEFAULT_MAX_STRING_LEN - 1);
        let mut builder = QqwryBuilder::new();
        builder.add_range("1.0.0.0", "1.0.0.255", &longest, "").unwrap();
        let buf = builder.build().unwrap();
        assert!(validate_bytes(&buf, ValidationLevel::Strict).is_valid());
        let db = Database::from_bytes(buf).unwrap();
        assert_eq!(db.lookup("1.0.0.1").unwrap().unwrap().country, longest);

        let mut builder = QqwryBuilder::new();
        assert!(matches!(
            builder.add_range("1.0.0.0", "1.0.0.255", &"A".repeat(DEFAULT_MAX_STRING_LEN), ""),
            Err(QqwryError::Build(_))
        ));
        // GBK doubles the byte count of CJK text
        assert!(matches!(
            builder.add_range("2.0.0.0", "2.0.0.255", "", &"中".repeat(250)),
            Err(QqwryError::Build(_))
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_empty_strings() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("1.0.0.0", "1.0.0.255", "", "Area only").unwrap();
        builder.add_range("1.0.1.0", "1.0.1.255", "Country only", "").unwrap();
        let buf = builder.build().unwrap();
        let decoder = RecordDecoder::new(&buf);
        let db = Database::from_bytes(buf.clone()).unwrap();

        let first = decoder.decode(db.entry(0).unwrap().record_offset).unwrap();
        assert!(first.country.is_empty());
        assert_eq!(first.area, b"Area only");
        let second = decoder.decode(db.entry(1).unwrap().record_offset).unwrap();
        assert_eq!(second.country, b"Country only");
        assert!(second.area.is_empty());
    }

    #[test]
    fn test_ranges_sorted_on_build() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("9.0.0.0", "9.255.255.255", "B", "").unwrap();
        builder.add_range("4.0.0.0", "4.255.255.255", "A", "").unwrap();
        let db = Database::from_bytes(builder.build().unwrap()).unwrap();
        assert_eq!(db.entry(0).unwrap().ip, 0x0400_0000);
        assert_eq!(db.lookup("4.4.4.4").unwrap().unwrap().country, "A");
    }

    #[test]
    fn test_overlap_rejected() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("1.0.0.0", "1.0.1.0", "A", "").unwrap();
        builder.add_range("1.0.1.0", "1.0.2.0", "B", "").unwrap();
        assert!(matches!(builder.build(), Err(QqwryError::Build(_))));
    }

    #[test]
    fn test_invalid_inputs() {
        let mut builder = QqwryBuilder::new();
        assert!(matches!(
            builder.add_range("1.0.0.9", "1.0.0.1", "A", ""),
            Err(QqwryError::Build(_))
        ));
        assert!(matches!(
            builder.add_range("1.0.0.0", "1.0.0.1", "A\0B", ""),
            Err(QqwryError::Build(_))
        ));
        assert!(matches!(
            builder.add_range("1.0.0.0", "1.0.0.1", "\u{1}A", ""),
            Err(QqwryError::Build(_))
        ));
        assert!(matches!(
            builder.add_range("1.0.0.0", "1.0.0.1", "🙂", ""),
            Err(QqwryError::Build(_))
        ));
        assert!(matches!(
            builder.add_range("bogus", "1.0.0.1", "A", ""),
            Err(QqwryError::InvalidAddress(_))
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_utf8_codec() {
        let mut builder = QqwryBuilder::new().with_codec(EncodingCodec::utf8());
        builder.add_range("5.0.0.0", "5.0.0.255", "Émile", "🙂").unwrap();
        let buf = builder.build().unwrap();
        let db = Database::from_bytes_builder(buf)
            .codec(EncodingCodec::utf8())
            .open()
            .unwrap();
        let loc = db.lookup("5.0.0.1").unwrap().unwrap();
        assert_eq!(loc.country, "Émile");
        assert_eq!(loc.area, "🙂");
    }
}
