//! Storage traits shared by the rollup engine and the range query.
//!
//! Both traits are object-safe so callers hold them as `Arc<dyn HotStore>`
//! and `Arc<dyn ColdStore>`, swapping SQLite/object-store backends for the
//! mocks in tests.

use async_trait::async_trait;

use picotherm_types::{Measurement, Period, Series};

use crate::error::Result;

/// Store of recent readings that have not been rolled up yet.
#[async_trait]
pub trait HotStore: Send + Sync {
    /// Readings for `device` with `start_ms <= timestamp < end_ms`, ascending.
    async fn query(&self, device: &str, start_ms: i64, end_ms: i64) -> Result<Series>;

    /// The newest reading of `device`, if it has any.
    async fn latest(&self, device: &str) -> Result<Option<Measurement>>;

    /// Identifiers of every device the store holds readings for.
    async fn devices(&self) -> Result<Vec<String>>;
}

/// Key-value blob store holding one series per [`Period`].
///
/// The key of a period is [`Period::key`]. Writes overwrite; the last writer
/// wins.
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// Fetch the blob for `period`.
    ///
    /// Returns `Ok(None)` if no blob has been written for the period, and
    /// [`Error::Corrupt`](crate::Error::Corrupt) if one exists but cannot be
    /// decoded.
    async fn get(&self, period: &Period) -> Result<Option<Series>>;

    /// Write (or overwrite) the blob for `period`.
    async fn put(&self, period: &Period, series: &Series) -> Result<()>;
}
