//! Hot and cold persistence for picotherm sensor history.
//!
//! Two narrow traits separate storage from the rollup and query logic:
//!
//! - [`HotStore`]: recent readings not yet rolled up, queryable by range.
//!   [`SqliteHotStore`] keeps them in SQLite.
//! - [`ColdStore`]: one encoded blob per [`Period`](picotherm_types::Period).
//!   [`ObjectColdStore`] keeps them in any `object_store` backend (local
//!   filesystem or in memory).
//!
//! A missing blob is `Ok(None)`, never an error; a blob that fails to decode
//! is [`Error::Corrupt`].
//!
//! # Example
//!
//! ```
//! use picotherm_store::{ColdStore, ObjectColdStore};
//! use picotherm_types::{Measurement, Period, Series};
//! use time::macros::date;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cold = ObjectColdStore::in_memory();
//! let period = Period::day("pt-1", date!(2024 - 03 - 07));
//!
//! assert!(cold.get(&period).await?.is_none());
//!
//! let series = Series::new(vec![Measurement::new(1_709_769_600_000, 21.0, 40.0)])?;
//! cold.put(&period, &series).await?;
//! assert_eq!(cold.get(&period).await?, Some(series));
//! # Ok(())
//! # }
//! ```

mod cold;
mod error;
pub mod export;
mod mock;
mod models;
mod schema;
mod sqlite;
mod traits;

pub use cold::ObjectColdStore;
pub use error::{Error, Result};
pub use export::ExportFormat;
pub use mock::{MockColdStore, MockHotStore};
pub use models::StoredDevice;
pub use sqlite::SqliteHotStore;
pub use traits::{ColdStore, HotStore};

fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("picotherm")
}

/// Default hot store database path following platform conventions.
///
/// - Linux: `~/.local/share/picotherm/hot.db`
/// - macOS: `~/Library/Application Support/picotherm/hot.db`
/// - Windows: `C:\Users\<user>\AppData\Local\picotherm\hot.db`
pub fn default_hot_path() -> std::path::PathBuf {
    data_dir().join("hot.db")
}

/// Default cold store root directory, next to the hot store.
pub fn default_cold_path() -> std::path::PathBuf {
    data_dir().join("cold")
}
