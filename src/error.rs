//! Error types for logsieve operations
//!
//! This module defines the error types used throughout logsieve, providing
//! clear error messages and proper error chaining support. An unsupported
//! query is *not* an error: the term extractor reports it as data so the
//! pruning pipeline can fall back to admitting every candidate.

use thiserror::Error;

/// Main error type for all logsieve operations
#[derive(Debug, Error)]
pub enum SieveError {
    /// IO operations failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A magic number or format version did not match what the reader expects
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// A read ran past the end of the available bytes, or an encoded offset
    /// points outside the containing file
    #[error("truncated data: {0}")]
    Truncated(String),

    /// Caller-supplied input failed validation (manifest lines, archive ids,
    /// filter sizes)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Binary fuse construction exhausted its seed attempts
    #[error("filter construction failed after {attempts} attempts; key set may contain duplicates")]
    ConstructionFailed { attempts: u32 },

    /// Configuration validation failed
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

/// Result type alias for logsieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SieveError::CorruptHeader("bad magic".to_string());
        assert_eq!(err.to_string(), "corrupt header: bad magic");

        let err = SieveError::ConstructionFailed { attempts: 500 };
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SieveError = io_err.into();
        assert!(matches!(err, SieveError::Io(_)));
    }
}
