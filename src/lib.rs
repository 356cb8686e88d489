//! qqwry - Reader for the QQWry IPv4 geolocation database
//!
//! QQWry ("纯真 IP 库") maps IPv4 ranges to a country and an area string.
//! This crate loads a database file (memory-mapped or from bytes), answers
//! point lookups, validates untrusted files, and can build new files.
//!
//! # Quick Start
//!
//! ```rust
//! use qqwry::{Database, QqwryBuilder};
//!
//! // Build a small database
//! let mut builder = QqwryBuilder::new();
//! builder.add_range("1.0.1.0", "1.0.3.255", "福建省", "电信")?;
//! builder.add_range("8.8.8.0", "8.8.8.255", "美国", "Google DNS")?;
//! let bytes = builder.build()?;
//!
//! // Query it
//! let db = Database::from_bytes(bytes)?;
//! if let Some(location) = db.lookup("8.8.8.8")? {
//!     println!("{} {}", location.country, location.area);
//! }
//! # Ok::<(), qqwry::QqwryError>(())
//! ```
//!
//! Opening a published file with a bounded cache:
//!
//! ```rust,no_run
//! use qqwry::Database;
//!
//! let db = Database::from("qqwry.dat").cache_capacity(50_000).open()?;
//! let location = db.lookup("114.114.114.114")?;
//! # Ok::<(), qqwry::QqwryError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Header: index_start, index_end      │
//! ├──────────────────────────────────────┤
//! │  Detail records (GBK strings,        │
//! │  redirect pointers)                  │
//! ├──────────────────────────────────────┤
//! │  Index: 7-byte (ip, offset) entries  │
//! └──────────────────────────────────────┘
//!          ↓ Index::build (once)
//! ┌──────────────────────────────────────┐
//! │  256 octet buckets → binary search   │
//! │  → RecordDecoder → TextCodec         │
//! └──────────────────────────────────────┘
//! ```
//!
//! A loaded [`Database`] is immutable and `Send + Sync`; share it behind an
//! `Arc` to serve lookups from many threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Database file builder
pub mod builder;
/// Resolution cache keyed by index position
pub mod cache;
pub mod codec;
/// Database handle and lookup API
pub mod database;
pub mod decoder;
/// Error types
pub mod error;
pub mod format;
pub mod index;
pub mod resolver;
pub mod validation;

// Re-exports for Rust consumers

pub use crate::builder::QqwryBuilder;
pub use crate::cache::{CacheMode, CacheStats};
pub use crate::codec::{EncodingCodec, TextCodec};
pub use crate::database::{parse_ipv4, Database, DatabaseOpener, Location};
pub use crate::decoder::{AreaAnchor, LocationRecord, RecordDecoder, DEFAULT_MAX_STRING_LEN};
pub use crate::error::{QqwryError, Result};
pub use crate::format::IndexEntry;
pub use crate::validation::{
    validate_bytes, validate_bytes_with_anchor, validate_database, validate_database_with_anchor,
    ValidationLevel, ValidationReport,
};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load a database from an in-memory buffer with default options
///
/// Shorthand for [`Database::from_bytes`]. Fails with
/// [`QqwryError::Format`] when the header or index region is malformed.
pub fn load(bytes: Vec<u8>) -> Result<Database> {
    Database::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports_compose() {
        let mut builder = QqwryBuilder::new();
        builder.add_range("10.0.0.0", "10.255.255.255", "局域网", "").unwrap();
        let bytes = builder.build().unwrap();
        assert!(validate_bytes(&bytes, ValidationLevel::Strict).is_valid());

        let db = load(bytes).unwrap();
        let location = db.lookup("10.1.2.3").unwrap().unwrap();
        assert_eq!(location.country, "局域网");
        assert_eq!(location.area, "");
    }

    #[test]
    fn test_load_rejects_short_buffer() {
        assert!(matches!(load(vec![0; 7]), Err(QqwryError::Format(_))));
    }
}
