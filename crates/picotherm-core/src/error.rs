//! Error types for picotherm-core.
//!
//! # Absence versus failure
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Blob missing for an open period (contains today, or in the future) | empty data, no error |
//! | Blob missing for a closed period during a query | [`Error::DataUnavailable`] |
//! | Blob present but undecodable during a query | [`Error::DataUnavailable`] (logged) |
//! | Blob present but undecodable during a reconstruction rollup | skipped (logged) |
//! | Month blob missing during [`rollup_year`](crate::RollupEngine::rollup_year) | [`Error::MissingPeriod`] |
//! | Any other storage failure | [`Error::Store`] |
//!
//! A rejected append is not an error: it is reported as
//! [`AppendOutcome::Stale`](crate::AppendOutcome::Stale).

use thiserror::Error;

use picotherm_types::{ParseError, Period};

/// Errors returned by the rollup engine and the range query.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Storage failure (I/O, database, or a corrupt blob where one is fatal).
    #[error(transparent)]
    Store(#[from] picotherm_store::Error),

    /// Calendar arithmetic or series validation failed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A closed period needed to answer a query has no usable blob.
    #[error("Data unavailable for {0}")]
    DataUnavailable(Period),

    /// A period required for a reconstruction rollup is absent.
    #[error("Missing {0}")]
    MissingPeriod(Period),

    /// The requested range is empty or inverted.
    #[error("Invalid range: start {start_ms} is not before end {end_ms}")]
    InvalidRange {
        /// Requested start (Unix ms).
        start_ms: i64,
        /// Requested end (Unix ms).
        end_ms: i64,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// The period named by a [`DataUnavailable`](Error::DataUnavailable) or
    /// [`MissingPeriod`](Error::MissingPeriod) error.
    pub fn period(&self) -> Option<&Period> {
        match self {
            Error::DataUnavailable(p) | Error::MissingPeriod(p) => Some(p),
            _ => None,
        }
    }
}

/// Result type alias using picotherm-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
