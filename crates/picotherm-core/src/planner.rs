//! Decomposition of a time window into tier fetches.
//!
//! [`plan_range`] is pure: it only needs the window, the current UTC day, and
//! the thresholds. The resulting [`RangePlan`] lists blob and live fetches in
//! chronological order; executing it and trimming the concatenation to
//! [`RangePlan::window`] yields exactly the requested data.
//!
//! The window is decomposed largest tier first:
//!
//! - **Years.** Full middle years come from their Year blob; the partial
//!   first and last years are resolved month by month.
//! - **Months.** Touching more than `max_month_count` months fetches the
//!   whole Year blob instead. Otherwise full middle months come from their
//!   Month blob and the partial ends are resolved day by day.
//! - **Days.** Touching more than `max_day_count` days fetches the whole
//!   Month blob; otherwise each Day blob is fetched. Today never has a Day
//!   blob: the part of the window inside today is read live from the hot
//!   store.
//!
//! A period that is still open (ends after the start of today) is never
//! fetched as a single blob when a finer tier can serve it.

use serde::{Deserialize, Serialize};
use time::Date;

use picotherm_types::{
    Granularity, ParseResult, TimeWindow, date_of_ms, date_start_ms, next_day, next_month,
    next_year,
};

use crate::error::{Error, Result};

/// Thresholds above which one coarse blob is preferred over many fine ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Days touched within one month above which the Month blob is fetched.
    pub max_day_count: u32,
    /// Months touched within one year above which the Year blob is fetched.
    pub max_month_count: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_day_count: 5,
            max_month_count: 5,
        }
    }
}

impl PlannerConfig {
    /// Check that both thresholds are positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_day_count == 0 {
            return Err(Error::InvalidConfig("max_day_count must be positive".into()));
        }
        if self.max_month_count == 0 {
            return Err(Error::InvalidConfig("max_month_count must be positive".into()));
        }
        Ok(())
    }
}

/// One fetch in a [`RangePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    /// Read the blob of the period of `granularity` starting on `start`.
    Blob {
        /// Blob granularity.
        granularity: Granularity,
        /// Aligned first day of the period.
        start: Date,
    },
    /// Read `window` from the hot store.
    Live {
        /// Window to read.
        window: TimeWindow,
    },
}

/// An ordered list of fetches plus the window to trim their concatenation to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    /// The exact requested window.
    pub window: TimeWindow,
    /// Fetches in chronological order.
    pub steps: Vec<FetchStep>,
}

impl RangePlan {
    /// Number of blob fetches of the given granularity.
    pub fn blob_count(&self, granularity: Granularity) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, FetchStep::Blob { granularity: g, .. } if *g == granularity))
            .count()
    }
}

/// Plan the fetches needed to answer `[start_ms, end_ms)` on `today`.
///
/// An empty window yields a plan with no steps.
pub fn plan_range(
    start_ms: i64,
    end_ms: i64,
    today: Date,
    config: &PlannerConfig,
) -> ParseResult<RangePlan> {
    let window = TimeWindow::new(start_ms, end_ms);
    let mut planner = Planner {
        today,
        config,
        steps: Vec::new(),
    };

    if !window.is_empty() {
        let first = date_of_ms(window.start_ms)?;
        let last = date_of_ms(window.last_ms())?;
        if first == today && last == today {
            planner.steps.push(FetchStep::Live { window });
        } else {
            planner.years(window)?;
        }
    }

    Ok(RangePlan {
        window,
        steps: planner.steps,
    })
}

struct Planner<'a> {
    today: Date,
    config: &'a PlannerConfig,
    steps: Vec<FetchStep>,
}

impl Planner<'_> {
    fn blob(&mut self, granularity: Granularity, start: Date) {
        self.steps.push(FetchStep::Blob {
            granularity,
            start: granularity.align(start),
        });
    }

    /// A period ending at `end` is closed once today has started.
    fn is_closed(&self, end: Date) -> bool {
        end <= self.today
    }

    fn years(&mut self, w: TimeWindow) -> ParseResult<()> {
        let first = date_of_ms(w.start_ms)?;
        let last = date_of_ms(w.last_ms())?;
        if first.year() == last.year() {
            return self.months(w);
        }

        let mut year = next_year(first)?;
        self.months(TimeWindow::new(w.start_ms, date_start_ms(year)))?;

        while year.year() < last.year() {
            let next = next_year(year)?;
            if self.is_closed(next) {
                self.blob(Granularity::Year, year);
            } else {
                self.months(TimeWindow::new(date_start_ms(year), date_start_ms(next)))?;
            }
            year = next;
        }

        self.months(TimeWindow::new(date_start_ms(year), w.end_ms))
    }

    fn months(&mut self, w: TimeWindow) -> ParseResult<()> {
        let first = Granularity::Month.align(date_of_ms(w.start_ms)?);
        let last = Granularity::Month.align(date_of_ms(w.last_ms())?);
        if first == last {
            return self.days(w);
        }

        let touched = u32::from(u8::from(last.month())) - u32::from(u8::from(first.month())) + 1;
        if touched > self.config.max_month_count {
            self.blob(Granularity::Year, first);
            // The Year blob only holds days already rolled up; the open month
            // is patched in from finer tiers.
            let open = Granularity::Month.align(self.today);
            if first <= open && open <= last {
                let open_window =
                    TimeWindow::new(date_start_ms(open), date_start_ms(next_month(open)?));
                self.days(w.intersect(&open_window))?;
            }
            return Ok(());
        }

        let mut month = next_month(first)?;
        self.days(TimeWindow::new(w.start_ms, date_start_ms(month)))?;

        while month < last {
            let next = next_month(month)?;
            if self.is_closed(next) {
                self.blob(Granularity::Month, month);
            } else {
                self.days(TimeWindow::new(date_start_ms(month), date_start_ms(next)))?;
            }
            month = next;
        }

        self.days(TimeWindow::new(date_start_ms(last), w.end_ms))
    }

    fn days(&mut self, w: TimeWindow) -> ParseResult<()> {
        if w.is_empty() {
            return Ok(());
        }
        let first = date_of_ms(w.start_ms)?;
        let last = date_of_ms(w.last_ms())?;

        let touched = (last - first).whole_days() + 1;
        if touched > i64::from(self.config.max_day_count) {
            self.blob(Granularity::Month, first);
        } else {
            let mut day = first;
            while day <= last && day < self.today {
                self.blob(Granularity::Day, day);
                day = next_day(day)?;
            }
        }

        let today = TimeWindow::new(
            date_start_ms(self.today),
            date_start_ms(next_day(self.today)?),
        );
        let live = w.intersect(&today);
        if !live.is_empty() {
            self.steps.push(FetchStep::Live { window: live });
        }
        Ok(())
    }
}
