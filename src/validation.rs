//! Database validation for untrusted QQWry files
//!
//! Loading a database only checks what a lookup needs: the header and the
//! bounds of the index region. Records are decoded lazily, so a damaged
//! detail region goes unnoticed until the wrong address is queried. This
//! module walks the whole file up front:
//!
//! - header and index region bounds
//! - index entries strictly ascending, each leading octet in one run
//! - record offsets inside the detail region
//! - every record decodable, with its end address not before its start
//! - the 24-bit pointer limit
//!
//! Records are decoded in parallel with rayon.
//!
//! # Usage
//!
//! ```rust,no_run
//! use qqwry::validation::{validate_database, ValidationLevel};
//! use std::path::Path;
//!
//! let report = validate_database(Path::new("qqwry.dat"), ValidationLevel::Strict)?;
//!
//! if report.is_valid() {
//!     println!("✓ Database is safe to use");
//! } else {
//!     for error in &report.errors {
//!         println!("  - {}", error);
//!     }
//! }
//! # Ok::<(), qqwry::QqwryError>(())
//! ```

use crate::decoder::{AreaAnchor, RecordDecoder, DEFAULT_MAX_STRING_LEN};
use crate::error::{QqwryError, Result};
use crate::format::{IndexEntry, HEADER_LEN, INDEX_ENTRY_LEN, MAX_POINTER};
use crate::index::Index;
use rayon::prelude::*;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;

/// Cap on how many problems of one kind are listed individually
const MAX_REPORTED: usize = 10;

/// Validation strictness level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// Header, index region and entry ordering only
    Standard,
    /// Also decode every detail record (default)
    #[default]
    Strict,
}

/// Validation report with detailed findings
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Critical errors that make the database unusable
    pub errors: Vec<String>,
    /// Warnings about potential issues (non-fatal)
    pub warnings: Vec<String>,
    /// Informational messages about database properties
    pub info: Vec<String>,
    /// Database statistics
    pub stats: DatabaseStats,
}

/// Database statistics gathered during validation
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    /// File size in bytes
    pub file_size: usize,
    /// Number of index entries
    pub entry_count: usize,
    /// Offset of the first index entry
    pub index_start: u32,
    /// Offset of the last index entry
    pub index_end: u32,
    /// Leading octets with at least one entry
    pub populated_octets: usize,
    /// Records that decoded cleanly (strict level only)
    pub records_decoded: usize,
    /// Records that failed to decode (strict level only)
    pub records_failed: usize,
    /// Records whose country field is empty
    pub empty_countries: usize,
}

impl ValidationReport {
    fn new() -> Self {
        Self::default()
    }

    /// Check if database passed all validations (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.info.push(msg.into());
    }

    /// Record a batch of problems, listing the first few and counting the rest
    fn errors_capped(&mut self, what: &str, problems: Vec<String>) {
        let total = problems.len();
        for problem in problems.into_iter().take(MAX_REPORTED) {
            self.error(problem);
        }
        if total > MAX_REPORTED {
            self.error(format!("... and {} more {}", total - MAX_REPORTED, what));
        }
    }
}

impl DatabaseStats {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Entries: {}, Octets: {}, Records: {} ok / {} failed, Size: {} KB",
            self.entry_count,
            self.populated_octets,
            self.records_decoded,
            self.records_failed,
            self.file_size / 1024
        )
    }
}

/// Validate a database file
///
/// The file is read into memory in full. I/O failures are returned as
/// errors; everything wrong with the contents lands in the report.
///
/// # Example
///
/// ```rust,no_run
/// use qqwry::validation::{validate_database, ValidationLevel};
/// use std::path::Path;
///
/// let report = validate_database(Path::new("qqwry.dat"), ValidationLevel::Standard)?;
/// if !report.is_valid() {
///     eprintln!("Validation failed with {} errors", report.errors.len());
/// }
/// # Ok::<(), qqwry::QqwryError>(())
/// ```
pub fn validate_database(path: &Path, level: ValidationLevel) -> Result<ValidationReport> {
    validate_database_with_anchor(path, level, AreaAnchor::default())
}

/// Validate a database file whose chained records place the area field per `anchor`
pub fn validate_database_with_anchor(
    path: &Path,
    level: ValidationLevel,
    anchor: AreaAnchor,
) -> Result<ValidationReport> {
    let buffer = std::fs::read(path)
        .map_err(|e| QqwryError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(validate_bytes_with_anchor(&buffer, level, anchor))
}

/// Validate an in-memory database
pub fn validate_bytes(buffer: &[u8], level: ValidationLevel) -> ValidationReport {
    validate_bytes_with_anchor(buffer, level, AreaAnchor::default())
}

/// Validate an in-memory database, decoding chained records per `anchor`
pub fn validate_bytes_with_anchor(
    buffer: &[u8],
    level: ValidationLevel,
    anchor: AreaAnchor,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.stats.file_size = buffer.len();
    report.info(format!(
        "File size: {} bytes ({} KB)",
        buffer.len(),
        buffer.len() / 1024
    ));

    let index = match Index::build(buffer) {
        Ok(index) => index,
        Err(e) => {
            report.error(format!("Index not loadable: {}", e));
            return report;
        }
    };

    report.stats.entry_count = index.len();
    report.stats.index_start = index.index_start();
    report.stats.index_end = index.index_end();
    report.stats.populated_octets = (0..=255u8).filter(|&o| index.bucket(o).is_some()).count();
    report.info(format!(
        "Index: {} entries at [{}, {}], {} populated octets",
        index.len(),
        index.index_start(),
        index.index_end(),
        report.stats.populated_octets
    ));

    check_region_layout(buffer, &index, &mut report);
    check_ordering(index.entries(), &mut report);
    check_record_offsets(&index, &mut report);

    if level == ValidationLevel::Strict {
        check_records(buffer, &index, anchor, &mut report);
    }

    report
}

fn check_region_layout(buffer: &[u8], index: &Index, report: &mut ValidationReport) {
    if (index.index_start() as usize) < HEADER_LEN {
        report.error(format!(
            "Index region starts at {}, inside the {}-byte header",
            index.index_start(),
            HEADER_LEN
        ));
    }

    let index_stop = index.index_end() as usize + INDEX_ENTRY_LEN;
    if index_stop < buffer.len() {
        report.warning(format!(
            "{} trailing bytes after the index region",
            buffer.len() - index_stop
        ));
    }

    if index.index_start() > MAX_POINTER + 1 {
        report.warning(format!(
            "Detail region spans {} bytes; records past offset {} cannot be addressed by 24-bit pointers",
            index.index_start(),
            MAX_POINTER
        ));
    }
}

fn check_ordering(entries: &[IndexEntry], report: &mut ValidationReport) {
    let unordered: Vec<String> = entries
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1].ip <= pair[0].ip)
        .map(|(i, pair)| {
            format!(
                "Entry {} ({}) does not follow entry {} ({})",
                i + 1,
                Ipv4Addr::from(pair[1].ip),
                i,
                Ipv4Addr::from(pair[0].ip)
            )
        })
        .collect();
    report.errors_capped("ordering violations", unordered);

    // An octet split into several runs leaves all but the last unreachable
    let mut seen = [false; 256];
    let mut split = Vec::new();
    let mut previous = None;
    for entry in entries {
        let octet = entry.octet();
        if previous != Some(octet) {
            if seen[octet as usize] {
                split.push(format!("Leading octet {} appears in more than one run", octet));
            }
            seen[octet as usize] = true;
            previous = Some(octet);
        }
    }
    report.errors_capped("split octets", split);
}

fn check_record_offsets(index: &Index, report: &mut ValidationReport) {
    let detail_end = index.index_start() as usize;
    let misplaced: Vec<String> = index
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            let offset = e.record_offset as usize;
            offset < HEADER_LEN || offset + 4 > detail_end
        })
        .map(|(i, e)| {
            format!(
                "Entry {} points at offset {}, outside the detail region [{}, {})",
                i, e.record_offset, HEADER_LEN, detail_end
            )
        })
        .collect();
    report.errors_capped("misplaced record offsets", misplaced);
}

/// Per-record outcome of the parallel decode pass
enum RecordCheck {
    Ok { empty_country: bool },
    Failed(String),
    Inverted(String),
}

fn check_records(buffer: &[u8], index: &Index, anchor: AreaAnchor, report: &mut ValidationReport) {
    let decoder =
        RecordDecoder::with_max_string_len(buffer, DEFAULT_MAX_STRING_LEN).with_area_anchor(anchor);
    let entries = index.entries();

    let results: Vec<RecordCheck> = entries
        .par_iter()
        .enumerate()
        .map(|(i, entry)| {
            let end = match decoder.range_end(entry.record_offset) {
                Ok(end) => end,
                Err(e) => return RecordCheck::Failed(format!("Entry {}: {}", i, e)),
            };
            if end < entry.ip {
                return RecordCheck::Inverted(format!(
                    "Entry {}: range end {} precedes start {}",
                    i,
                    Ipv4Addr::from(end),
                    Ipv4Addr::from(entry.ip)
                ));
            }
            match decoder.decode_borrowed(entry.record_offset) {
                Ok((country, _)) => RecordCheck::Ok {
                    empty_country: country.is_empty(),
                },
                Err(e) => RecordCheck::Failed(format!("Entry {}: {}", i, e)),
            }
        })
        .collect();

    let mut failed = Vec::new();
    let mut inverted = Vec::new();
    for result in results {
        match result {
            RecordCheck::Ok { empty_country } => {
                report.stats.records_decoded += 1;
                if empty_country {
                    report.stats.empty_countries += 1;
                }
            }
            RecordCheck::Failed(msg) => failed.push(msg),
            RecordCheck::Inverted(msg) => inverted.push(msg),
        }
    }
    report.stats.records_failed = failed.len();
    report.errors_capped("undecodable records", failed);
    report.errors_capped("inverted ranges", inverted);

    // Overlap with the next range is tolerated by lookups, so only warn
    let overlapping = entries
        .windows(2)
        .filter(|pair| {
            decoder
                .range_end(pair[0].record_offset)
                .is_ok_and(|end| end >= pair[1].ip)
        })
        .count();
    if overlapping > 0 {
        report.warning(format!(
            "{} ranges extend into the following entry",
            overlapping
        ));
    }

    report.info(format!(
        "Decoded {} of {} records",
        report.stats.records_decoded,
        entries.len()
    ));
}
