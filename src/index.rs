//! Index construction
//!
//! Validates the file header and decodes the index region into a dense
//! `Vec<IndexEntry>`, then groups the entries by leading octet into a
//! 256-slot bucket table so a lookup only binary-searches the run of
//! entries that can possibly contain the target address.

use crate::error::{QqwryError, Result};
use crate::format::{self, IndexEntry, INDEX_ENTRY_LEN};
use log::debug;

/// Contiguous run of index positions sharing one leading octet.
///
/// Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// First index position with this leading octet
    pub start: usize,
    /// Last index position with this leading octet
    pub end: usize,
}

impl Bucket {
    /// Number of entries in the bucket
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Buckets are never empty; empty octets have no bucket at all
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Decoded index region plus the per-octet bucket table
#[derive(Debug, Clone)]
pub struct Index {
    index_start: u32,
    index_end: u32,
    entries: Vec<IndexEntry>,
    /// `None` marks an octet with no entries
    buckets: [Option<Bucket>; 256],
}

impl Index {
    /// Build the index from a complete database buffer
    ///
    /// # Errors
    ///
    /// - [`QqwryError::Format`] if the header is missing, `index_end < index_start`,
    ///   or the index span is not a multiple of 7 bytes.
    /// - [`QqwryError::OutOfRange`] if any entry extends past the buffer.
    pub fn build(buf: &[u8]) -> Result<Self> {
        let header = format::read_header(buf)?;
        let index_start = header.index_start.get();
        let index_end = header.index_end.get();

        if index_end < index_start {
            return Err(QqwryError::Format(format!(
                "index end {} precedes index start {}",
                index_end, index_start
            )));
        }

        let span = (index_end - index_start) as usize;
        if span % INDEX_ENTRY_LEN != 0 {
            return Err(QqwryError::Format(format!(
                "index span {} is not a multiple of {}",
                span, INDEX_ENTRY_LEN
            )));
        }

        let entry_count = span / INDEX_ENTRY_LEN + 1;

        // Check the whole region once so a truncated file fails before allocating
        let region = format::slice_at(buf, index_start as usize, span + INDEX_ENTRY_LEN)?;

        let mut entries = Vec::with_capacity(entry_count);
        for (i, chunk) in region.chunks_exact(INDEX_ENTRY_LEN).enumerate() {
            let entry = format::read_index_entry(chunk, 0).map_err(|_| QqwryError::OutOfRange {
                offset: index_start as usize + i * INDEX_ENTRY_LEN,
                len: INDEX_ENTRY_LEN,
                buffer_len: buf.len(),
            })?;
            entries.push(entry);
        }

        let buckets = group_by_octet(&entries);

        debug!(
            "built index: {} entries in [{}, {}], {} populated octets",
            entries.len(),
            index_start,
            index_end,
            buckets.iter().filter(|b| b.is_some()).count()
        );

        Ok(Self {
            index_start,
            index_end,
            entries,
            buckets,
        })
    }

    /// Offset of the first index entry
    pub fn index_start(&self) -> u32 {
        self.index_start
    }

    /// Offset of the last index entry
    pub fn index_end(&self) -> u32 {
        self.index_end
    }

    /// All entries in file order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// An index always holds at least one entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `position`
    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    /// Bucket for a leading octet, `None` if no entry starts with it
    pub fn bucket(&self, octet: u8) -> Option<Bucket> {
        self.buckets[octet as usize]
    }
}

/// Single pass over the entries collecting runs of equal leading octets.
///
/// If an octet appears in more than one run (a malformed file), the last
/// run wins. The validator reports such files.
fn group_by_octet(entries: &[IndexEntry]) -> [Option<Bucket>; 256] {
    let mut buckets = [None; 256];
    let mut i = 0;
    while i < entries.len() {
        let octet = entries[i].octet();
        let mut j = i + 1;
        while j < entries.len() && entries[j].octet() == octet {
            j += 1;
        }
        buckets[octet as usize] = Some(Bucket { start: i, end: j - 1 });
        i = j;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        let start = 8u32;
        let end = start + (entries.len() as u32 - 1) * 7;
        buf.extend_from_slice(&start.to_le_bytes());
        buf.extend_from_slice(&end.to_le_bytes());
        for &(ip, off) in entries {
            buf.extend_from_slice(&ip.to_le_bytes());
            buf.extend_from_slice(&format::u24_to_le(off));
        }
        buf
    }

    #[test]
    fn test_entry_count() {
        let buf = layout(&[(0x0100_0000, 1), (0x0100_0100, 2), (0x0200_0000, 3)]);
        let index = Index::build(&buf).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.index_start(), 8);
        assert_eq!(index.index_end(), 22);
        assert_eq!(index.get(2).unwrap().record_offset, 3);
    }

    #[test]
    fn test_buckets_partition_entries() {
        let buf = layout(&[
            (0x0100_0000, 0),
            (0x0100_0100, 0),
            (0x0100_0200, 0),
            (0x0300_0000, 0),
            (0xFF00_0000, 0),
            (0xFFFF_FF00, 0),
        ]);
        let index = Index::build(&buf).unwrap();
        assert_eq!(index.bucket(1), Some(Bucket { start: 0, end: 2 }));
        assert_eq!(index.bucket(3), Some(Bucket { start: 3, end: 3 }));
        assert_eq!(index.bucket(255), Some(Bucket { start: 4, end: 5 }));
        assert_eq!(index.bucket(0), None);
        assert_eq!(index.bucket(2), None);

        let covered: usize = (0..=255u8).filter_map(|o| index.bucket(o)).map(|b| b.len()).sum();
        assert_eq!(covered, index.len());
    }

    #[test]
    fn test_header_missing() {
        assert!(matches!(Index::build(&[0u8; 4]), Err(QqwryError::Format(_))));
    }

    #[test]
    fn test_end_before_start() {
        let mut buf = vec![0u8; 32];
        buf[0..4].copy_from_slice(&20u32.to_le_bytes());
        buf[4..8].copy_from_slice(&13u32.to_le_bytes());
        assert!(matches!(Index::build(&buf), Err(QqwryError::Format(_))));
    }

    #[test]
    fn test_misaligned_span() {
        let mut buf = vec![0u8; 32];
        buf[0..4].copy_from_slice(&8u32.to_le_bytes());
        buf[4..8].copy_from_slice(&16u32.to_le_bytes());
        assert!(matches!(Index::build(&buf), Err(QqwryError::Format(_))));
    }

    #[test]
    fn test_truncated_index() {
        let mut buf = layout(&[(0x0100_0000, 0), (0x0200_0000, 0)]);
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            Index::build(&buf),
            Err(QqwryError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_index_start_past_end_of_file() {
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        buf[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Index::build(&buf),
            Err(QqwryError::OutOfRange { .. })
        ));
    }
}
