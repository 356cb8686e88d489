//! Database handle and lookup API
//!
//! A [`Database`] owns the raw file bytes (either a heap buffer or a
//! read-only memory map) together with the index built from them. It is
//! immutable after construction, `Send + Sync`, and may be shared between
//! any number of threads; the only interior mutability is the optional
//! [`ResolutionCache`], whose writes are idempotent.
//!
//! ```text
//!  bytes ──► Index::build ──► Database ──► locate ──► RecordDecoder ──► TextCodec
//!                                             │              ▲
//!                                             └─► ResolutionCache
//! ```

use crate::cache::{CacheMode, CacheStats, ResolutionCache};
use crate::codec::{EncodingCodec, TextCodec};
use crate::decoder::{AreaAnchor, LocationRecord, RecordDecoder, DEFAULT_MAX_STRING_LEN};
use crate::error::{QqwryError, Result};
use crate::format::{IndexEntry, INDEX_ENTRY_LEN, MAX_POINTER};
use crate::index::{Bucket, Index};
use crate::resolver;
use log::{debug, trace, warn};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// Decoded lookup result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Country (or broad region) name
    pub country: String,
    /// Area, ISP or finer-grained description
    pub area: String,
    /// Position of the matching index entry
    pub index: usize,
    /// First address of the matching entry's range
    pub range_start: Ipv4Addr,
}

/// Storage for database data - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// Where an opener gets its bytes from
enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Fluent configuration for opening a database
///
/// # Examples
///
/// ```no_run
/// use qqwry::Database;
///
/// let db = Database::from("qqwry.dat")
///     .cache_capacity(10_000)
///     .max_string_len(256)
///     .open()?;
/// # Ok::<(), qqwry::QqwryError>(())
/// ```
pub struct DatabaseOpener {
    source: Source,
    cache: CacheMode,
    max_string_len: usize,
    area_anchor: AreaAnchor,
    use_mmap: bool,
    codec: Box<dyn TextCodec>,
}

impl DatabaseOpener {
    fn new(source: Source) -> Self {
        Self {
            source,
            cache: CacheMode::default(),
            max_string_len: DEFAULT_MAX_STRING_LEN,
            area_anchor: AreaAnchor::default(),
            use_mmap: true,
            codec: Box::new(EncodingCodec::default()),
        }
    }

    /// Use a bounded LRU cache holding at most `capacity` records (0 disables caching)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = if capacity == 0 {
            CacheMode::Disabled
        } else {
            CacheMode::Lru(capacity)
        };
        self
    }

    /// Cache every resolved entry in its own slot (the default)
    pub fn slot_cache(mut self) -> Self {
        self.cache = CacheMode::Slots;
        self
    }

    /// Decode on every lookup
    pub fn no_cache(mut self) -> Self {
        self.cache = CacheMode::Disabled;
        self
    }

    /// Set the cache strategy directly
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache = mode;
        self
    }

    /// Maximum number of bytes scanned for a string terminator
    pub fn max_string_len(mut self, len: usize) -> Self {
        self.max_string_len = len.max(1);
        self
    }

    /// Where chained redirects place the area field
    pub fn area_anchor(mut self, anchor: AreaAnchor) -> Self {
        self.area_anchor = anchor;
        self
    }

    /// Memory-map the file instead of reading it (path sources only, default on)
    pub fn use_mmap(mut self, enabled: bool) -> Self {
        self.use_mmap = enabled;
        self
    }

    /// Codec used to turn record bytes into strings (GBK by default)
    pub fn codec(mut self, codec: impl TextCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Load the bytes and build the index
    pub fn open(self) -> Result<Database> {
        let DatabaseOpener {
            source,
            cache,
            max_string_len,
            area_anchor,
            use_mmap,
            codec,
        } = self;
        let storage = match source {
            Source::Bytes(bytes) => DatabaseStorage::Owned(bytes),
            Source::Path(path) => read_storage(&path, use_mmap)?,
        };
        Database::from_storage(storage, cache, max_string_len, area_anchor, codec)
    }
}

fn read_storage(path: &Path, use_mmap: bool) -> Result<DatabaseStorage> {
    if use_mmap {
        let file = File::open(path)
            .map_err(|e| QqwryError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        // SAFETY: the map is read-only and every access is bounds-checked
        // against the length captured at map time.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| QqwryError::Io(format!("Failed to mmap {}: {}", path.display(), e)))?;
        Ok(DatabaseStorage::Mmap(mmap))
    } else {
        let bytes = std::fs::read(path)
            .map_err(|e| QqwryError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(DatabaseStorage::Owned(bytes))
    }
}

/// Loaded QQWry database
///
/// # Examples
///
/// ```no_run
/// use qqwry::Database;
///
/// let db = Database::open("qqwry.dat")?;
/// if let Some(location) = db.lookup("1.2.3.4")? {
///     println!("{} {}", location.country, location.area);
/// }
/// # Ok::<(), qqwry::QqwryError>(())
/// ```
pub struct Database {
    data: DatabaseStorage,
    index: Index,
    cache: ResolutionCache,
    max_string_len: usize,
    area_anchor: AreaAnchor,
    codec: Box<dyn TextCodec>,
}

impl Database {
    /// Open a database file with default settings (mmap, slot cache, GBK)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from(path).open()
    }

    /// Start configuring a database read from `path`
    pub fn from<P: AsRef<Path>>(path: P) -> DatabaseOpener {
        DatabaseOpener::new(Source::Path(path.as_ref().to_path_buf()))
    }

    /// Create a database from raw bytes with default settings
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_builder(data).open()
    }

    /// Start configuring a database over raw bytes
    pub fn from_bytes_builder(data: Vec<u8>) -> DatabaseOpener {
        DatabaseOpener::new(Source::Bytes(data))
    }

    fn from_storage(
        storage: DatabaseStorage,
        cache_mode: CacheMode,
        max_string_len: usize,
        area_anchor: AreaAnchor,
        codec: Box<dyn TextCodec>,
    ) -> Result<Self> {
        let data = storage.as_slice();
        let index = Index::build(data)?;

        if index.index_start() > MAX_POINTER + 1 {
            warn!(
                "detail region spans {} bytes, past the 24-bit record pointer range; \
                 records beyond 16 MiB are unreachable",
                index.index_start()
            );
        }

        let cache = ResolutionCache::new(cache_mode, index.len());
        debug!(
            "loaded database: {} bytes, {} entries, cache {:?}, codec {}",
            data.len(),
            index.len(),
            cache_mode,
            codec.name()
        );

        Ok(Self {
            data: storage,
            index,
            cache,
            max_string_len,
            area_anchor,
            codec,
        })
    }

    /// Look up an address given in dotted-quad form
    ///
    /// Returns `Ok(None)` when no index entry shares the address's leading octet.
    ///
    /// # Errors
    ///
    /// - [`QqwryError::InvalidAddress`] if `addr` is not an IPv4 address.
    ///   The buffer is not touched in that case.
    /// - [`QqwryError::OutOfRange`] / [`QqwryError::StringTooLong`] if the
    ///   matching record is damaged.
    pub fn lookup(&self, addr: &str) -> Result<Option<Location>> {
        self.lookup_ip(parse_ipv4(addr)?)
    }

    /// Look up an already-parsed address
    pub fn lookup_ip(&self, addr: Ipv4Addr) -> Result<Option<Location>> {
        let Some(position) = self.locate(addr) else {
            return Ok(None);
        };
        let record = self.resolve(position)?;
        Ok(Some(Location {
            country: self.codec.decode(&record.country).into_owned(),
            area: self.codec.decode(&record.area).into_owned(),
            index: position,
            range_start: Ipv4Addr::from(self.index.entries()[position].ip),
        }))
    }

    /// Look up an address and return the undecoded record bytes
    pub fn lookup_raw(&self, addr: &str) -> Result<Option<LocationRecord>> {
        self.lookup_ip_raw(parse_ipv4(addr)?)
    }

    /// Look up an already-parsed address and return the undecoded record bytes
    pub fn lookup_ip_raw(&self, addr: Ipv4Addr) -> Result<Option<LocationRecord>> {
        match self.locate(addr) {
            Some(position) => self.resolve(position).map(Some),
            None => Ok(None),
        }
    }

    /// Index position owning `addr`, if its leading octet is populated
    pub fn locate(&self, addr: Ipv4Addr) -> Option<usize> {
        let position = resolver::locate(&self.index, u32::from(addr));
        trace!("locate {} -> {:?}", addr, position);
        position
    }

    /// Decoded record for an index position, through the cache
    pub fn resolve(&self, position: usize) -> Result<LocationRecord> {
        let entry = self.entry(position).ok_or_else(|| self.missing_entry(position))?;
        self.cache
            .get_or_compute(position, || self.decode_record(entry.record_offset))
    }

    /// Decode the record at `record_offset`, bypassing the cache
    pub fn decode_record(&self, record_offset: u32) -> Result<LocationRecord> {
        self.decoder().decode(record_offset)
    }

    /// First and last address of the range owned by the entry at `position`
    ///
    /// The last address comes from the record's leading 4-byte field.
    pub fn entry_range(&self, position: usize) -> Result<(Ipv4Addr, Ipv4Addr)> {
        let entry = self.entry(position).ok_or_else(|| self.missing_entry(position))?;
        let end = self.decoder().range_end(entry.record_offset)?;
        Ok((Ipv4Addr::from(entry.ip), Ipv4Addr::from(end)))
    }

    /// Error for a position past the last entry, located at the byte
    /// offset that entry would occupy in the index region
    fn missing_entry(&self, position: usize) -> QqwryError {
        QqwryError::OutOfRange {
            offset: (self.index.index_start() as usize)
                .saturating_add(position.saturating_mul(INDEX_ENTRY_LEN)),
            len: INDEX_ENTRY_LEN,
            buffer_len: self.len(),
        }
    }

    /// Decoder over this database's bytes
    pub fn decoder(&self) -> RecordDecoder<'_> {
        RecordDecoder::with_max_string_len(self.data.as_slice(), self.max_string_len)
            .with_area_anchor(self.area_anchor)
    }

    /// Decode raw record bytes with the configured codec
    pub fn decode_text<'a>(&self, bytes: &'a [u8]) -> std::borrow::Cow<'a, str> {
        self.codec.decode(bytes)
    }

    /// Index entry at `position`
    pub fn entry(&self, position: usize) -> Option<IndexEntry> {
        self.index.get(position).copied()
    }

    /// All index entries in ascending order
    pub fn entries(&self) -> &[IndexEntry] {
        self.index.entries()
    }

    /// Number of index entries
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Offset of the first index entry
    pub fn index_start(&self) -> u32 {
        self.index.index_start()
    }

    /// Offset of the last index entry
    pub fn index_end(&self) -> u32 {
        self.index.index_end()
    }

    /// Bucket of a leading octet
    pub fn bucket(&self, octet: u8) -> Option<Bucket> {
        self.index.bucket(octet)
    }

    /// Raw database bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Size of the database in bytes
    pub fn len(&self) -> usize {
        self.data.as_slice().len()
    }

    /// A loaded database always has at least a header
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the bytes are memory-mapped rather than owned
    pub fn is_mmap(&self) -> bool {
        matches!(self.data, DatabaseStorage::Mmap(_))
    }

    /// Whether the detail region extends past what a 24-bit pointer can address
    pub fn exceeds_pointer_range(&self) -> bool {
        self.index.index_start() > MAX_POINTER + 1
    }

    /// String scan window in bytes
    pub fn max_string_len(&self) -> usize {
        self.max_string_len
    }

    /// Configured area anchor for chained redirects
    pub fn area_anchor(&self) -> AreaAnchor {
        self.area_anchor
    }

    /// Name of the configured text encoding
    pub fn encoding_name(&self) -> &'static str {
        self.codec.name()
    }

    /// Cache hit/miss counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop all cached records
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("len", &self.len())
            .field("entries", &self.entry_count())
            .field("mmap", &self.is_mmap())
            .field("cache", &self.cache)
            .field("encoding", &self.encoding_name())
            .finish()
    }
}

/// Parse a dotted-quad IPv4 address.
///
/// IPv4-mapped IPv6 forms (`::ffff:1.2.3.4`) are accepted and unwrapped;
/// any other IPv6 address is rejected.
pub fn parse_ipv4(input: &str) -> Result<Ipv4Addr> {
    match input.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(addr)) => addr
            .to_ipv4_mapped()
            .ok_or_else(|| QqwryError::InvalidAddress(input.to_string())),
        Err(_) => Err(QqwryError::InvalidAddress(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::QqwryBuilder;

    fn sample() -> Vec<u8> {
        let mut builder = QqwryBuilder::new();
        builder
            .add_range("1.0.0.0", "1.0.0.255", "澳大利亚", "CZ88.NET")
            .unwrap();
        builder
            .add_range("1.0.1.0", "1.0.3.255", "福建省", "电信")
            .unwrap();
        builder
            .add_range("3.0.0.0", "3.255.255.255", "美国", "亚马逊云")
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_decodes_gbk() {
        let db = Database::from_bytes(sample()).unwrap();
        let loc = db.lookup("1.0.2.7").unwrap().unwrap();
        assert_eq!(loc.country, "福建省");
        assert_eq!(loc.area, "电信");
        assert_eq!(loc.index, 1);
        assert_eq!(loc.range_start, Ipv4Addr::new(1, 0, 1, 0));
    }

    #[test]
    fn test_lookup_empty_octet() {
        let db = Database::from_bytes(sample()).unwrap();
        assert_eq!(db.lookup("2.1.1.1").unwrap(), None);
    }

    #[test]
    fn test_invalid_address() {
        let db = Database::from_bytes(sample()).unwrap();
        assert!(matches!(
            db.lookup("999.1.1.1"),
            Err(QqwryError::InvalidAddress(_))
        ));
        assert!(matches!(db.lookup("2001:db8::1"), Err(QqwryError::InvalidAddress(_))));
        assert!(matches!(db.lookup(""), Err(QqwryError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_ipv4_mapped() {
        assert_eq!(
            parse_ipv4("::ffff:1.2.3.4").unwrap(),
            Ipv4Addr::new(1, 2, 3, 4)
        );
        assert_eq!(parse_ipv4(" 8.8.8.8 ").unwrap(), Ipv4Addr::new(8, 8, 8, 8));
    }

    #[test]
    fn test_entry_range() {
        let db = Database::from_bytes(sample()).unwrap();
        assert_eq!(
            db.entry_range(2).unwrap(),
            (Ipv4Addr::new(3, 0, 0, 0), Ipv4Addr::new(3, 255, 255, 255))
        );
        assert!(db.entry_range(3).is_err());
    }

    #[test]
    fn test_missing_position_reports_index_offset() {
        let db = Database::from_bytes(sample()).unwrap();
        let expected = QqwryError::OutOfRange {
            offset: db.index_start() as usize + 3 * INDEX_ENTRY_LEN,
            len: INDEX_ENTRY_LEN,
            buffer_len: db.len(),
        };
        assert_eq!(db.entry_range(3).unwrap_err(), expected);
        assert_eq!(db.resolve(3).unwrap_err(), expected);
    }

    #[test]
    fn test_lookup_raw() {
        let db = Database::from_bytes(sample()).unwrap();
        let raw = db.lookup_raw("3.3.3.3").unwrap().unwrap();
        assert_eq!(db.decode_text(&raw.country), "美国");
        assert_eq!(db.decode_text(&raw.area), "亚马逊云");
    }

    #[test]
    fn test_cache_modes_agree() {
        let bytes = sample();
        let slots = Database::from_bytes_builder(bytes.clone()).slot_cache().open().unwrap();
        let lru = Database::from_bytes_builder(bytes.clone()).cache_capacity(1).open().unwrap();
        let none = Database::from_bytes_builder(bytes).no_cache().open().unwrap();
        for addr in ["1.0.0.1", "1.0.3.3", "3.1.1.1", "1.0.0.9"] {
            let a = slots.lookup(addr).unwrap();
            assert_eq!(a, lru.lookup(addr).unwrap());
            assert_eq!(a, none.lookup(addr).unwrap());
        }
        assert_eq!(slots.cache_stats().hits, 1);
        assert_eq!(none.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_format_error_is_eager() {
        assert!(matches!(
            Database::from_bytes(vec![1, 2, 3]),
            Err(QqwryError::Format(_))
        ));
    }

    #[test]
    fn test_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();
    }

    #[test]
    fn test_open_file_with_and_without_mmap() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&sample()).unwrap();
        file.flush().unwrap();

        let mapped = Database::open(file.path()).unwrap();
        assert!(mapped.is_mmap());
        let read = Database::from(file.path()).use_mmap(false).open().unwrap();
        assert!(!read.is_mmap());
        assert_eq!(
            mapped.lookup("1.0.0.1").unwrap(),
            read.lookup("1.0.0.1").unwrap()
        );
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            Database::open("/nonexistent/qqwry.dat"),
            Err(QqwryError::Io(_))
        ));
    }
}
