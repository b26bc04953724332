//! # Time-Series Comparator
//!
//! Period bucketing of one or two tables plus correlation and ratio between
//! their per-period series.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Serialize, Serializer};
use statrs::statistics::Statistics;

use crate::aggregate::ratio;
use crate::error::InsufficientData;
use crate::ordered::Counts;
use crossdata_domain::Table;

/// Weekday names, Monday first.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

// =============================================================================
// PERIODS
// =============================================================================

/// Truncation unit for period bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PeriodUnit {
    Hour,
    Day,
    #[default]
    Month,
    Year,
}

/// A truncated point in time. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    start: NaiveDateTime,
    unit: PeriodUnit,
}

impl Period {
    /// Period of `unit` containing `at`.
    #[must_use]
    pub fn of(at: NaiveDateTime, unit: PeriodUnit) -> Self {
        let date = at.date();
        let start = match unit {
            PeriodUnit::Hour => date.and_hms_opt(at.hour(), 0, 0),
            PeriodUnit::Day => date.and_hms_opt(0, 0, 0),
            PeriodUnit::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            PeriodUnit::Year => {
                NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
        }
        .unwrap_or(at);
        Self { start, unit }
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDateTime {
        self.start
    }

    #[must_use]
    pub const fn unit(&self) -> PeriodUnit {
        self.unit
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.unit {
            PeriodUnit::Hour => "%Y-%m-%d %H:00",
            PeriodUnit::Day => "%Y-%m-%d",
            PeriodUnit::Month => "%Y-%m",
            PeriodUnit::Year => "%Y",
        };
        write!(f, "{}", self.start.format(pattern))
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Count and optional amount sum per period, chronologically.
fn bucket(table: &Table, date_col: &str, amount_col: Option<&str>, unit: PeriodUnit) -> Option<BTreeMap<Period, (usize, f64)>> {
    table.require(date_col).ok()?;
    let mut buckets: BTreeMap<Period, (usize, f64)> = BTreeMap::new();
    for row in table.rows() {
        let Some(at) = row.get(date_col).as_datetime() else {
            continue;
        };
        let entry = buckets.entry(Period::of(at, unit)).or_default();
        entry.0 += 1;
        if let Some(amount) = amount_col.and_then(|c| row.get(c).as_f64()) {
            entry.1 += amount;
        }
    }
    Some(buckets)
}

// =============================================================================
// COMPARISON
// =============================================================================

/// Options for [`compare_series`].
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub unit: PeriodUnit,
    /// Most recent periods kept, chronologically.
    pub window: usize,
    pub amount_column_a: Option<String>,
    pub amount_column_b: Option<String>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            unit: PeriodUnit::Month,
            window: 12,
            amount_column_a: None,
            amount_column_b: None,
        }
    }
}

impl CompareOptions {
    /// Monthly, 12-period window, summing the same amount column on both sides.
    #[must_use]
    pub fn monthly_with_amount(column: &str) -> Self {
        Self {
            amount_column_a: Some(column.to_string()),
            amount_column_b: Some(column.to_string()),
            ..Self::default()
        }
    }
}

/// One aligned period of two series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub period: Period,
    pub count_a: usize,
    pub count_b: usize,
    /// `None` when side A has no amount column.
    pub amount_a: Option<f64>,
    pub amount_b: Option<f64>,
    /// `count_a / count_b`, 0 when `count_b` is 0.
    pub count_ratio: f64,
}

/// Output of [`compare_series`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub periods: Vec<PeriodComparison>,
    pub count_correlation: Option<f64>,
    pub amount_correlation: Option<f64>,
}

/// Bucket both tables by period, zero-fill the union of periods and
/// correlate the most recent `window` of them.
///
/// `None` when either date column is absent.
#[must_use]
pub fn compare_series(
    table_a: &Table,
    date_col_a: &str,
    table_b: &Table,
    date_col_b: &str,
    options: &CompareOptions,
) -> Option<ComparisonReport> {
    let amount_a = options
        .amount_column_a
        .as_deref()
        .filter(|c| table_a.has_column(c));
    let amount_b = options
        .amount_column_b
        .as_deref()
        .filter(|c| table_b.has_column(c));

    let series_a = bucket(table_a, date_col_a, amount_a, options.unit)?;
    let series_b = bucket(table_b, date_col_b, amount_b, options.unit)?;

    let all: BTreeSet<Period> = series_a.keys().chain(series_b.keys()).copied().collect();
    let skip = all.len().saturating_sub(options.window);

    let periods: Vec<PeriodComparison> = all
        .into_iter()
        .skip(skip)
        .map(|period| {
            let (count_a, sum_a) = series_a.get(&period).copied().unwrap_or_default();
            let (count_b, sum_b) = series_b.get(&period).copied().unwrap_or_default();
            #[allow(clippy::cast_precision_loss)]
            let count_ratio = ratio(count_a as f64, count_b as f64).value;
            PeriodComparison {
                period,
                count_a,
                count_b,
                amount_a: amount_a.map(|_| sum_a),
                amount_b: amount_b.map(|_| sum_b),
                count_ratio,
            }
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let counts_a: Vec<f64> = periods.iter().map(|p| p.count_a as f64).collect();
    #[allow(clippy::cast_precision_loss)]
    let counts_b: Vec<f64> = periods.iter().map(|p| p.count_b as f64).collect();
    let count_correlation = pearson(&counts_a, &counts_b).ok();

    let amount_correlation = if amount_a.is_some() && amount_b.is_some() {
        let xs: Vec<f64> = periods.iter().filter_map(|p| p.amount_a).collect();
        let ys: Vec<f64> = periods.iter().filter_map(|p| p.amount_b).collect();
        pearson(&xs, &ys).ok()
    } else {
        None
    };

    Some(ComparisonReport {
        periods,
        count_correlation,
        amount_correlation,
    })
}

/// Pearson correlation of two aligned series. Symmetric in its arguments.
///
/// # Errors
///
/// [`InsufficientData`] below two points or when either series is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64, InsufficientData> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Err(InsufficientData::TooFewPeriods(n));
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let sx = xs.std_dev();
    let sy = ys.std_dev();
    if sx == 0.0 || sy == 0.0 || !sx.is_finite() || !sy.is_finite() {
        return Err(InsufficientData::ZeroVariance);
    }
    let r = xs.covariance(ys) / (sx * sy);
    Ok(r.clamp(-1.0, 1.0))
}

// =============================================================================
// SINGLE-TABLE BREAKDOWNS
// =============================================================================

/// Row counts per weekday, all seven days Monday first.
#[must_use]
pub fn weekday_counts(table: &Table, date_col: &str) -> Option<Counts> {
    let mut counts = Counts::with_zeroes(WEEKDAYS);
    for at in table.datetimes(date_col)?.into_iter().flatten() {
        counts.increment(weekday_name(at.weekday()));
    }
    Some(counts)
}

/// Day with the most rows; `None` when nothing was counted.
#[must_use]
pub fn busiest(counts: &Counts) -> Option<&str> {
    counts.max_entry().filter(|(_, c)| *c > 0).map(|(d, _)| d)
}

/// Day with the fewest rows among days that saw any activity.
#[must_use]
pub fn quietest(counts: &Counts) -> Option<&str> {
    let mut best: Option<(&str, usize)> = None;
    for (day, &count) in counts.iter() {
        if count > 0 && best.is_none_or(|(_, b)| count < b) {
            best = Some((day, count));
        }
    }
    best.map(|(day, _)| day)
}

/// Row counts per hour of day; only hours that occur.
#[must_use]
pub fn hour_counts(table: &Table, date_col: &str) -> Option<BTreeMap<u32, usize>> {
    let mut counts = BTreeMap::new();
    for at in table.datetimes(date_col)?.into_iter().flatten() {
        *counts.entry(at.hour()).or_insert(0) += 1;
    }
    Some(counts)
}

/// Row counts per month of year (1-12); only months that occur.
#[must_use]
pub fn month_of_year_counts(table: &Table, date_col: &str) -> Option<BTreeMap<u32, usize>> {
    let mut counts = BTreeMap::new();
    for at in table.datetimes(date_col)?.into_iter().flatten() {
        *counts.entry(at.month()).or_insert(0) += 1;
    }
    Some(counts)
}

/// Chronological per-period counts of a single table, last `window` periods.
#[must_use]
pub fn period_counts(table: &Table, date_col: &str, unit: PeriodUnit, window: Option<usize>) -> Option<Counts> {
    let buckets = bucket(table, date_col, None, unit)?;
    let counts: Counts = buckets
        .into_iter()
        .map(|(period, (count, _))| (period.to_string(), count))
        .collect();
    Some(match window {
        Some(n) => counts.tail(n),
        None => counts,
    })
}

#[must_use]
pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}
