//! Error types for series validation and blob decoding in picotherm-types.

use thiserror::Error;

/// Errors that can occur when building, decoding, or combining sensor series.
///
/// This error type is storage-agnostic and does not include I/O failures
/// (those belong in picotherm-store).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Generic invalid data.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The blob does not start with the series magic bytes.
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic.
        expected: [u8; 4],
        /// Magic found in the blob (zero-padded when the blob is shorter).
        actual: [u8; 4],
    },

    /// The blob carries a column count other than the three measurement fields.
    #[error("Invalid shape: expected {expected} columns, got {actual}")]
    InvalidShape {
        /// Expected column count.
        expected: u8,
        /// Column count found in the blob.
        actual: u8,
    },

    /// Not enough (or too many) bytes for the declared contents.
    #[error("Invalid length: requires {expected} bytes, got {actual}")]
    InvalidLength {
        /// Bytes required by the header.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Timestamps are not strictly ascending.
    #[error("Timestamps not strictly ascending at index {index}: {previous} then {timestamp}")]
    NotAscending {
        /// Index of the offending measurement.
        index: usize,
        /// Timestamp of the preceding measurement.
        previous: i64,
        /// Timestamp of the offending measurement.
        timestamp: i64,
    },

    /// Appending would overlap existing data.
    #[error("Overlapping append: existing data ends at {last}, new data starts at {first}")]
    Overlap {
        /// Last timestamp already present.
        last: i64,
        /// First timestamp of the data being appended.
        first: i64,
    },

    /// A date or timestamp falls outside the supported calendar range.
    #[error("Out of range: {0}")]
    OutOfRange(String),
}

impl From<time::error::ComponentRange> for ParseError {
    fn from(e: time::error::ComponentRange) -> Self {
        ParseError::OutOfRange(e.to_string())
    }
}

/// Result type alias using picotherm-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
