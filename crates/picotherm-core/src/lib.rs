//! Rollups and tiered range queries for picotherm sensor history.
//!
//! Readings live in two places: a [`HotStore`](picotherm_store::HotStore)
//! holding recent raw data, and a [`ColdStore`](picotherm_store::ColdStore)
//! holding one blob per device and day, month, or year.
//!
//! - [`RollupEngine`] moves closed days from the hot store into Day blobs and
//!   folds them incrementally into Month and Year blobs, with a monotonic
//!   append guard that makes re-runs harmless.
//! - [`RangeQuery`] answers arbitrary `[start, end)` windows by fetching the
//!   cheapest mix of blobs (see [`planner`]), patching in today's live data,
//!   and trimming to the exact window.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use picotherm_core::{FixedClock, PlannerConfig, RangeQuery, RollupEngine};
//! use picotherm_store::{MockColdStore, MockHotStore};
//! use picotherm_types::{Measurement, date_start_ms};
//! use time::macros::date;
//!
//! # #[tokio::main]
//! # async fn main() -> picotherm_core::Result<()> {
//! let day = date!(2024 - 03 - 07);
//! let hot = Arc::new(MockHotStore::new());
//! let cold = Arc::new(MockColdStore::new());
//! hot.insert(
//!     "pt-1",
//!     (0..24).map(|h| Measurement::new(date_start_ms(day) + h * 3_600_000, 20.0, 45.0)).collect(),
//! )
//! .await;
//!
//! let engine = RollupEngine::new(hot.clone(), cold.clone());
//! engine.rollup_day("pt-1", day).await?;
//!
//! let query = RangeQuery::new(
//!     hot,
//!     cold,
//!     Arc::new(FixedClock::at_noon(date!(2024 - 03 - 08))),
//!     PlannerConfig::default(),
//! );
//! let morning = query
//!     .get_range("pt-1", date_start_ms(day), date_start_ms(day) + 12 * 3_600_000)
//!     .await?;
//! assert_eq!(morning.len(), 12);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod merge;
pub mod planner;
pub mod query;
pub mod rollup;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use planner::{FetchStep, PlannerConfig, RangePlan, plan_range};
pub use query::RangeQuery;
pub use rollup::{
    AppendOutcome, AppendReport, DayReport, MonthAppend, MonthReport, RollupEngine, YearReport,
};

// Re-export the data types so downstream crates need only one import.
pub use picotherm_types::{Granularity, Measurement, Period, Series, TimeWindow};
