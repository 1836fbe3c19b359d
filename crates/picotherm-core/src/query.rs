//! Range queries across the hot store and the day/month/year blobs.

use std::sync::Arc;

use futures::future::try_join_all;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use picotherm_store::{ColdStore, HotStore};
use picotherm_types::{Granularity, Period, Series, datetime_ms};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::merge;
use crate::planner::{FetchStep, PlannerConfig, RangePlan, plan_range};

/// Answers `[start, end)` queries for one device at a time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use picotherm_core::{FixedClock, PlannerConfig, RangeQuery};
/// use picotherm_store::{MockColdStore, MockHotStore};
/// use picotherm_types::{Measurement, date_start_ms};
/// use time::macros::date;
///
/// # #[tokio::main]
/// # async fn main() -> picotherm_core::Result<()> {
/// let today = date!(2024 - 03 - 07);
/// let hot = Arc::new(MockHotStore::new());
/// hot.insert("pt-1", vec![Measurement::new(date_start_ms(today) + 60_000, 21.0, 40.0)]).await;
///
/// let query = RangeQuery::new(
///     hot,
///     Arc::new(MockColdStore::new()),
///     Arc::new(FixedClock::at_noon(today)),
///     PlannerConfig::default(),
/// );
/// let series = query
///     .get_range("pt-1", date_start_ms(today), date_start_ms(today) + 3_600_000)
///     .await?;
/// assert_eq!(series.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RangeQuery {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    clock: Arc<dyn Clock>,
    config: PlannerConfig,
}

impl std::fmt::Debug for RangeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeQuery")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RangeQuery {
    /// Create a range query over the given stores.
    pub fn new(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdStore>,
        clock: Arc<dyn Clock>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            hot,
            cold,
            clock,
            config,
        }
    }

    fn plan(&self, start_ms: i64, end_ms: i64, today: Date) -> Result<RangePlan> {
        if start_ms >= end_ms {
            return Err(Error::InvalidRange { start_ms, end_ms });
        }
        Ok(plan_range(start_ms, end_ms, today, &self.config)?)
    }

    /// Measurements of `device` with `start_ms <= timestamp < end_ms`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRange`] if `start_ms >= end_ms`
    /// - [`Error::DataUnavailable`] if a closed period in the window has no
    ///   blob, or its blob cannot be decoded
    /// - [`Error::Store`] on any other storage failure
    pub async fn get_range(&self, device: &str, start_ms: i64, end_ms: i64) -> Result<Series> {
        // One reading of the clock: planning and absence checks must agree
        // on which day is still open.
        let today = self.clock.today();
        let plan = self.plan(start_ms, end_ms, today)?;
        debug!(
            "Range {} {} planned as {} fetches ({} year, {} month, {} day blobs)",
            device,
            plan.window,
            plan.steps.len(),
            plan.blob_count(Granularity::Year),
            plan.blob_count(Granularity::Month),
            plan.blob_count(Granularity::Day)
        );

        let fragments =
            try_join_all(plan.steps.iter().map(|step| self.fetch(device, step, today))).await?;

        let merged = merge::concat(fragments);
        if merged.dropped > 0 {
            warn!(
                "Dropped {} overlapping points at fragment seams for {} {}",
                merged.dropped, device, plan.window
            );
        }

        Ok(merged.series.window(plan.window))
    }

    /// [`get_range`](Self::get_range) with `OffsetDateTime` bounds.
    pub async fn get_range_between(
        &self,
        device: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Series> {
        self.get_range(device, datetime_ms(start), datetime_ms(end))
            .await
    }

    async fn fetch(&self, device: &str, step: &FetchStep, today: Date) -> Result<Series> {
        match *step {
            FetchStep::Live { window } => {
                debug!("Live read {} {}", device, window);
                Ok(self
                    .hot
                    .query(device, window.start_ms, window.end_ms)
                    .await?)
            }
            FetchStep::Blob { granularity, start } => {
                let period = Period::new(device, granularity, start);
                self.fetch_blob(period, today).await
            }
        }
    }

    async fn fetch_blob(&self, period: Period, today: Date) -> Result<Series> {
        match self.cold.get(&period).await {
            Ok(Some(series)) => Ok(series),
            Ok(None) if period.is_closed(today) => Err(Error::DataUnavailable(period)),
            Ok(None) => {
                debug!("{} not written yet", period);
                Ok(Series::empty())
            }
            Err(e) if e.is_corrupt() => {
                warn!("Unusable blob for {}: {}", period, e);
                Err(Error::DataUnavailable(period))
            }
            Err(e) => Err(e.into()),
        }
    }
}
