//! Error types for picotherm-store.

use std::path::PathBuf;

use picotherm_types::ParseError;

/// Result type for picotherm-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in picotherm-store.
///
/// A missing blob is not an error: [`ColdStore::get`](crate::ColdStore::get)
/// returns `Ok(None)` for it. Every variant here is a real failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Object store failure other than "not found".
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Failed to create a storage directory.
    #[error("Failed to create storage directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The hot store was written by a newer version of picotherm.
    #[error("Hot store schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// Device not found in the hot store.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A blob exists but does not decode to a valid series.
    #[error("Corrupt blob {key}: {source}")]
    Corrupt { key: String, source: ParseError },

    /// A series could not be encoded for writing.
    #[error("Cannot encode blob {key}: {source}")]
    Encode { key: String, source: ParseError },

    /// A stored timestamp is outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The store refused the request (used by the mock stores).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error while writing an export.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error reports a blob that exists but is unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt { .. })
    }
}
