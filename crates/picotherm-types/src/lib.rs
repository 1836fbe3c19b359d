//! Platform-agnostic types for picotherm sensor history.
//!
//! This crate provides the data model shared by the storage collaborators
//! (picotherm-store) and the rollup/query engine (picotherm-core).
//!
//! # Features
//!
//! - [`Measurement`] and the strictly ascending [`Series`]
//! - Calendar-aligned [`Period`] keys at [`Granularity`] day, month, or year
//! - The binary blob [`codec`] used for persisted series
//! - Error types for validation and decoding
//!
//! # Example
//!
//! ```
//! use picotherm_types::{codec, Measurement, Period, Series};
//! use time::macros::date;
//!
//! let series = Series::new(vec![Measurement::new(1_709_251_200_000, 21.5, 40.0)])?;
//! let period = Period::month("picotherm/1", date!(2024 - 03 - 01));
//!
//! assert_eq!(period.key(), "picotherm/1/2024/03/data.pts");
//! assert_eq!(codec::decode(&codec::encode(&series)?)?, series);
//! # Ok::<(), picotherm_types::ParseError>(())
//! ```

pub mod codec;
pub mod error;
pub mod period;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use period::{
    BLOB_FILE_NAME, Granularity, Period, date_of_ms, date_start_ms, datetime_ms, next_day,
    next_month, next_year,
};
pub use types::{MEASUREMENT_FIELDS, Measurement, Series, TimeWindow};
