/// Error types for the qqwry library
use std::fmt;

/// Result type alias for qqwry operations
pub type Result<T> = std::result::Result<T, QqwryError>;

/// Main error type for database loading, lookups and building
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QqwryError {
    /// Header missing or invalid, or index region misaligned.
    ///
    /// Raised eagerly at load time; no partial database is produced.
    Format(String),

    /// A read would extend past the end of the buffer
    OutOfRange {
        /// Offset the read started at
        offset: usize,
        /// Number of bytes requested
        len: usize,
        /// Total buffer length
        buffer_len: usize,
    },

    /// No NUL terminator inside the string scan window
    StringTooLong {
        /// Offset the string starts at
        offset: usize,
        /// Number of bytes scanned
        window: usize,
    },

    /// Input is not a well-formed IPv4 address
    InvalidAddress(String),

    /// I/O errors from the byte source
    Io(String),

    /// Invalid builder input
    Build(String),
}

impl QqwryError {
    /// Whether this error describes damage inside the database file
    /// (as opposed to bad caller input or an I/O failure).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            QqwryError::Format(_) | QqwryError::OutOfRange { .. } | QqwryError::StringTooLong { .. }
        )
    }
}

impl fmt::Display for QqwryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QqwryError::Format(msg) => write!(f, "Format error: {}", msg),
            QqwryError::OutOfRange {
                offset,
                len,
                buffer_len,
            } => write!(
                f,
                "Out of range: read of {} bytes at offset {} exceeds buffer length {}",
                len, offset, buffer_len
            ),
            QqwryError::StringTooLong { offset, window } => write!(
                f,
                "String too long: no terminator within {} bytes of offset {}",
                window, offset
            ),
            QqwryError::InvalidAddress(input) => write!(f, "Invalid IPv4 address: {}", input),
            QqwryError::Io(msg) => write!(f, "I/O error: {}", msg),
            QqwryError::Build(msg) => write!(f, "Build error: {}", msg),
        }
    }
}

impl std::error::Error for QqwryError {}

impl From<std::io::Error> for QqwryError {
    fn from(err: std::io::Error) -> Self {
        QqwryError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_out_of_range() {
        let err = QqwryError::OutOfRange {
            offset: 40,
            len: 3,
            buffer_len: 41,
        };
        assert_eq!(
            err.to_string(),
            "Out of range: read of 3 bytes at offset 40 exceeds buffer length 41"
        );
    }

    #[test]
    fn test_corruption_classification() {
        assert!(QqwryError::Format("short".into()).is_corruption());
        assert!(QqwryError::StringTooLong {
            offset: 0,
            window: 500
        }
        .is_corruption());
        assert!(!QqwryError::InvalidAddress("999.1.1.1".into()).is_corruption());
        assert!(!QqwryError::Io("denied".into()).is_corruption());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: QqwryError = io.into();
        assert!(matches!(err, QqwryError::Io(msg) if msg.contains("missing")));
    }
}
