//! Day, month, and year rollups.
//!
//! The incremental path runs once per closed day:
//!
//! ```text
//! hot store --rollup_day--> Day blob
//!                  \--append_to_month--> Month blob --append_to_year--> Year blob
//! ```
//!
//! Appends are guarded: data is only appended if it starts strictly after
//! the last timestamp already in the blob, so re-running a day is harmless
//! and reported as [`AppendOutcome::Stale`].
//!
//! The reconstruction path ([`RollupEngine::rollup_month`],
//! [`RollupEngine::rollup_year`]) recomputes a blob wholesale from the
//! finer blobs below it, for backfill and repair.

use std::ops::RangeInclusive;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use time::{Date, Month};
use tracing::{debug, info, warn};

use picotherm_store::{ColdStore, HotStore};
use picotherm_types::{Granularity, Period, Series};

use crate::error::{Error, Result};
use crate::merge;

/// What an append did to its target blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppendOutcome {
    /// Nothing to append to an existing blob; the blob was not touched.
    Empty,
    /// The blob did not exist and was created from the data, which may be
    /// empty.
    Created {
        /// Points written.
        points: usize,
    },
    /// The data was appended after the existing points.
    Appended {
        /// Points appended.
        points: usize,
        /// Points in the blob afterwards.
        total: usize,
    },
    /// The data does not start after the blob's last point; nothing written.
    Stale {
        /// Last timestamp already in the blob.
        stored_last: i64,
        /// First timestamp of the rejected data.
        data_first: i64,
    },
}

impl AppendOutcome {
    /// Returns `true` if the blob was written.
    pub fn wrote(&self) -> bool {
        matches!(self, AppendOutcome::Created { .. } | AppendOutcome::Appended { .. })
    }
}

/// Result of one guarded append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendReport {
    /// Blob key appended to.
    pub key: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: AppendOutcome,
}

/// Result of [`RollupEngine::append_to_month`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthAppend {
    /// The append to the Month blob.
    pub month: AppendReport,
    /// The follow-on append to the Year blob, if the month was written.
    pub year: Option<AppendReport>,
}

/// Result of [`RollupEngine::rollup_day`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayReport {
    /// Day blob key written.
    pub key: String,
    /// Points in the day.
    pub points: usize,
    /// The append to the Month blob.
    pub month: AppendReport,
    /// The append to the Year blob, if the month was written.
    pub year: Option<AppendReport>,
}

/// Result of [`RollupEngine::rollup_month`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthReport {
    /// Month blob key.
    pub key: String,
    /// Day blobs that contributed data.
    pub days_used: usize,
    /// Day blobs present but holding no readings.
    pub days_empty: usize,
    /// Day blobs that were absent.
    pub days_missing: usize,
    /// Keys of day blobs that could not be decoded.
    pub days_corrupt: Vec<String>,
    /// Points in the reconstructed month.
    pub points: usize,
    /// Whether the Month blob was overwritten.
    pub written: bool,
    /// The follow-on append to the Year blob, if the month was written.
    pub year: Option<AppendReport>,
}

/// Result of [`RollupEngine::rollup_year`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearReport {
    /// Year blob key written.
    pub key: String,
    /// Month blobs that contributed data.
    pub months_used: usize,
    /// Keys of month blobs that could not be decoded.
    pub months_corrupt: Vec<String>,
    /// Points in the reconstructed year.
    pub points: usize,
}

/// Builds day, month, and year blobs for one device at a time.
///
/// Devices are independent: nothing here is shared between calls except the
/// stores, so callers may run devices concurrently.
#[derive(Clone)]
pub struct RollupEngine {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
}

impl std::fmt::Debug for RollupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollupEngine").finish_non_exhaustive()
    }
}

/// Outcome of fetching one constituent blob for a reconstruction.
enum Part {
    Data(Series),
    Empty,
    Missing(Period),
    Corrupt(String),
}

impl RollupEngine {
    /// Create an engine over the given stores.
    pub fn new(hot: Arc<dyn HotStore>, cold: Arc<dyn ColdStore>) -> Self {
        Self { hot, cold }
    }

    /// Snapshot `day` from the hot store into its Day blob, then fold it into
    /// the month (and from there the year).
    ///
    /// The Day blob is overwritten unconditionally, even with an empty
    /// series.
    pub async fn rollup_day(&self, device: &str, day: Date) -> Result<DayReport> {
        let period = Period::day(device, day);
        let window = period.window()?;

        let data = self
            .hot
            .query(device, window.start_ms, window.end_ms)
            .await?
            .window(window);
        self.cold.put(&period, &data).await?;
        info!("Wrote {} ({} points)", period, data.len());

        let appended = self.append_to_month(device, day, &data).await?;
        Ok(DayReport {
            key: period.key(),
            points: data.len(),
            month: appended.month,
            year: appended.year,
        })
    }

    /// Append one day's data to the Month blob containing `day`.
    ///
    /// When the month is created or appended to, the same data is then
    /// appended to the Year blob.
    pub async fn append_to_month(&self, device: &str, day: Date, day_data: &Series) -> Result<MonthAppend> {
        let period = Period::month(device, day);
        let outcome = self.append(&period, day_data).await?;

        let year = if outcome.wrote() {
            Some(self.append_to_year(device, day, day_data).await?)
        } else {
            None
        };

        Ok(MonthAppend {
            month: AppendReport {
                key: period.key(),
                outcome,
            },
            year,
        })
    }

    /// Append data from `month` to the Year blob containing it.
    pub async fn append_to_year(&self, device: &str, month: Date, month_data: &Series) -> Result<AppendReport> {
        let period = Period::year(device, month);
        let outcome = self.append(&period, month_data).await?;
        Ok(AppendReport {
            key: period.key(),
            outcome,
        })
    }

    /// Rebuild the Month blob starting at `month_start` from the Day blobs
    /// of `days` (days of the month; days the month does not have are
    /// ignored), then append the result to the year.
    ///
    /// Absent Day blobs are skipped, and so are blobs that cannot be decoded
    /// (logged). If no day contributes data, an empty Month blob is written
    /// only when at least one Day blob exists and the month holds no data
    /// yet; otherwise the Month blob is left untouched.
    pub async fn rollup_month(
        &self,
        device: &str,
        month_start: Date,
        days: RangeInclusive<u8>,
    ) -> Result<MonthReport> {
        let period = Period::month(device, month_start);
        let periods: Vec<Period> = days
            .filter_map(|d| period.start.replace_day(d).ok())
            .map(|d| Period::day(device, d))
            .collect();

        let mut report = MonthReport {
            key: period.key(),
            days_used: 0,
            days_empty: 0,
            days_missing: 0,
            days_corrupt: Vec::new(),
            points: 0,
            written: false,
            year: None,
        };

        let mut parts = Vec::new();
        for part in self.fetch_parts(periods).await? {
            match part {
                Part::Data(series) => {
                    report.days_used += 1;
                    parts.push(series);
                }
                Part::Empty => report.days_empty += 1,
                Part::Missing(_) => report.days_missing += 1,
                Part::Corrupt(key) => report.days_corrupt.push(key),
            }
        }

        let merged = concat_logged(parts, &period);
        if merged.is_empty() && !self.accepts_empty(&period, report.days_empty).await? {
            info!("No day data for {}; month blob left as is", period);
            return Ok(report);
        }

        self.cold.put(&period, &merged).await?;
        info!(
            "Rebuilt {} from {} days ({} points, {} empty days)",
            period,
            report.days_used,
            merged.len(),
            report.days_empty
        );
        report.points = merged.len();
        report.written = true;
        report.year = Some(self.append_to_year(device, period.start, &merged).await?);
        Ok(report)
    }

    /// [`rollup_month`](Self::rollup_month) over every day of the month.
    pub async fn rollup_full_month(&self, device: &str, month: Date) -> Result<MonthReport> {
        self.rollup_month(device, Granularity::Month.align(month), 1..=31)
            .await
    }

    /// Rebuild the Year blob containing `year_start` from its 12 Month blobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPeriod`] naming the first absent month; the
    /// Year blob is not written in that case.
    pub async fn rollup_year(&self, device: &str, year_start: Date) -> Result<YearReport> {
        let period = Period::year(device, year_start);
        let periods: Vec<Period> = (1..=12u8)
            .filter_map(|m| Month::try_from(m).ok())
            .filter_map(|m| period.start.replace_month(m).ok())
            .map(|d| Period::month(device, d))
            .collect();

        let mut report = YearReport {
            key: period.key(),
            months_used: 0,
            months_corrupt: Vec::new(),
            points: 0,
        };

        let mut parts = Vec::new();
        for part in self.fetch_parts(periods).await? {
            match part {
                Part::Data(series) => {
                    report.months_used += 1;
                    parts.push(series);
                }
                Part::Empty => {}
                Part::Missing(missing) => {
                    warn!("Cannot rebuild {}: {} is missing", period, missing);
                    return Err(Error::MissingPeriod(missing));
                }
                Part::Corrupt(key) => report.months_corrupt.push(key),
            }
        }

        let merged = concat_logged(parts, &period);
        self.cold.put(&period, &merged).await?;
        info!(
            "Rebuilt {} from {} months ({} points)",
            period,
            report.months_used,
            merged.len()
        );
        report.points = merged.len();
        Ok(report)
    }

    /// Whether a reconstruction that found only empty Day blobs should write
    /// an empty Month blob: some day was rolled up and the month has no data
    /// to lose. An undecodable Month blob is replaced.
    async fn accepts_empty(&self, period: &Period, days_empty: usize) -> Result<bool> {
        if days_empty == 0 {
            return Ok(false);
        }
        match self.cold.get(period).await {
            Ok(existing) => Ok(existing.is_none_or(|s| s.is_empty())),
            Err(e) if e.is_corrupt() => {
                warn!("Replacing unusable blob for {}: {}", period, e);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Guarded append of `data` to the blob of `period`.
    ///
    /// An absent blob is always created, even from an empty series, so a
    /// closed period that saw no readings still has a blob.
    async fn append(&self, period: &Period, data: &Series) -> Result<AppendOutcome> {
        let Some(mut stored) = self.cold.get(period).await? else {
            self.cold.put(period, data).await?;
            info!("Created {} ({} points)", period, data.len());
            return Ok(AppendOutcome::Created { points: data.len() });
        };

        if data.is_empty() {
            debug!("Nothing to append to {}", period);
            return Ok(AppendOutcome::Empty);
        }

        if let (Some(stored_last), Some(data_first)) = (stored.last_timestamp(), data.first_timestamp())
            && data_first <= stored_last
        {
            warn!(
                "Stale append to {}: stored data ends at {}, new data starts at {}",
                period, stored_last, data_first
            );
            return Ok(AppendOutcome::Stale {
                stored_last,
                data_first,
            });
        }

        stored.try_append(data.clone())?;
        self.cold.put(period, &stored).await?;
        info!(
            "Appended {} points to {} ({} total)",
            data.len(),
            period,
            stored.len()
        );
        Ok(AppendOutcome::Appended {
            points: data.len(),
            total: stored.len(),
        })
    }

    /// Fetch constituent blobs concurrently, classifying each in order.
    ///
    /// Absent and undecodable blobs are not errors here; any other storage
    /// failure is.
    async fn fetch_parts(&self, periods: Vec<Period>) -> Result<Vec<Part>> {
        let results = join_all(periods.iter().map(|p| self.cold.get(p))).await;

        let mut parts = Vec::with_capacity(periods.len());
        for (period, result) in periods.into_iter().zip(results) {
            let part = match result {
                Ok(Some(series)) if series.is_empty() => {
                    debug!("{} is empty", period);
                    Part::Empty
                }
                Ok(Some(series)) => Part::Data(series),
                Ok(None) => {
                    debug!("{} absent", period);
                    Part::Missing(period)
                }
                Err(e) if e.is_corrupt() => {
                    warn!("Skipping unusable blob for {}: {}", period, e);
                    Part::Corrupt(period.key())
                }
                Err(e) => return Err(e.into()),
            };
            parts.push(part);
        }
        Ok(parts)
    }
}

fn concat_logged(parts: Vec<Series>, period: &Period) -> Series {
    let merged = merge::concat(parts);
    if merged.dropped > 0 {
        warn!(
            "Dropped {} overlapping points while rebuilding {}",
            merged.dropped, period
        );
    }
    merged.series
}
