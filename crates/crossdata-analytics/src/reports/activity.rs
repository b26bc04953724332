//! Activity patterns over the transaction audit log: hourly load, weekday
//! workload, per-service volume and the daily trend.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Timelike};
use serde::Serialize;

use super::{AnalyticsEngine, DataSources, ReportOutcome};
use crate::aggregate::{aggregate, describe, nunique, ratio, round2, top_n, value_counts, AggFn, AggregateSpec};
use crate::error::{AnalyticsError, Result};
use crate::insights::{derive_activity_recommendations, ActivityMetrics, ActivityRecommendation};
use crate::ordered::{Counts, Record};
use crate::timeseries::{busiest, hour_counts, period_counts, quietest, weekday_counts, PeriodUnit};
use crossdata_domain::{SourceDomain, Table, Value};

const TOP_SERVICES: usize = 10;
const SERVICE_DISTRIBUTION: usize = 15;

// =============================================================================
// REPORT TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePeak {
    pub most_active_service: String,
    pub activity_count: usize,
    pub total_activity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPatterns {
    pub total_activity_by_hour: BTreeMap<u32, usize>,
    pub peak_activity_hour: Option<u32>,
    pub lowest_activity_hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_services_by_hour: Option<BTreeMap<u32, ServicePeak>>,
    /// Hour to per-service counts, every service present in every hour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_activity_matrix: Option<BTreeMap<u32, Counts>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakHours {
    pub hours: Vec<u32>,
    /// Mean plus sample standard deviation of the hourly counts; `None`
    /// below two active hours.
    pub threshold: Option<f64>,
    pub peak_hours_activity: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workload {
    pub workload_by_day: Counts,
    pub busiest_day: Option<String>,
    pub quietest_day: Option<String>,
    pub peak_hours: PeakHours,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEfficiency {
    pub top_services_by_volume: Vec<Record>,
    pub most_consistent_services: Vec<Record>,
    pub service_distribution: Counts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    fn of(average_change: f64) -> Self {
        if average_change > 0.0 {
            Self::Increasing
        } else if average_change < 0.0 {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    pub daily_activity: Counts,
    pub average_daily_change: f64,
    pub trend_direction: TrendDirection,
    pub most_active_date: Option<String>,
    pub least_active_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub total_transactions_analyzed: usize,
    pub analysis_period_hours: u32,
    pub unique_services: usize,
    pub transactions_per_hour: f64,
    pub peak_activity_multiplier: Option<f64>,
    pub activity_consistency_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityPatterns {
    pub summary_metrics: ActivitySummary,
    pub hourly_patterns: HourlyPatterns,
    pub workload_analysis: Workload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_efficiency: Option<ServiceEfficiency>,
    /// Present when the window spans more than one day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_trends: Option<DailyTrend>,
    pub recommendations: Vec<ActivityRecommendation>,
    pub data_sources: DataSources,
}

// =============================================================================
// REPORT
// =============================================================================

impl AnalyticsEngine<'_> {
    /// Audit activity within `hours` before `as_of`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a zero or out-of-range window; source failures for
    /// `transaction_audit`.
    #[tracing::instrument(skip(self))]
    pub async fn activity_patterns(&self, hours: u32) -> Result<ReportOutcome<ActivityPatterns>> {
        if hours == 0 {
            return Err(AnalyticsError::InvalidParameter(
                "hours_lookback must be at least 1".to_string(),
            ));
        }
        let since = Duration::try_hours(i64::from(hours))
            .and_then(|window| self.as_of.checked_sub_signed(window))
            .ok_or_else(|| {
                AnalyticsError::InvalidParameter(format!(
                    "hours_lookback {hours} reaches past the supported date range"
                ))
            })?;

        let audit = self.load(SourceDomain::Cassandra, "transaction_audit").await?;
        if !audit.has_column("timestamp") {
            return Ok(ReportOutcome::unavailable(
                "timestamp column not found in transaction_audit data",
            ));
        }

        let recent = audit.filter(|row| row.get("timestamp").as_datetime().is_some_and(|at| at >= since));
        if recent.is_empty() {
            return Ok(ReportOutcome::unavailable(format!(
                "No data found in the last {hours} hours"
            )));
        }

        let hourly = hour_counts(&recent, "timestamp").unwrap_or_default();
        #[allow(clippy::cast_precision_loss)]
        let hourly_values: Vec<f64> = hourly.values().map(|&c| c as f64).collect();
        let hourly_stats = describe(&hourly_values);

        let hourly_patterns = hourly_patterns(&recent, hourly.clone());
        let workload_analysis = workload(&recent, &hourly, hourly_stats.and_then(|s| s.std.map(|std| s.mean + std)));
        let service_efficiency = service_efficiency(&recent);
        let temporal_trends = daily_trend(&recent);

        let consistency = hourly_stats.and_then(|s| {
            let spread = ratio(s.std?, s.mean).get()?;
            Some(round2(100.0 - spread * 100.0))
        });
        let multiplier = hourly_stats.and_then(|s| ratio(s.max, s.mean).get()).map(round2);

        #[allow(clippy::cast_precision_loss)]
        let summary_metrics = ActivitySummary {
            total_transactions_analyzed: recent.len(),
            analysis_period_hours: hours,
            unique_services: nunique(&recent, "servicio").unwrap_or(0),
            transactions_per_hour: round2(recent.len() as f64 / f64::from(hours)),
            peak_activity_multiplier: multiplier,
            activity_consistency_score: consistency,
        };

        let recommendations = derive_activity_recommendations(&ActivityMetrics {
            peak_hours: workload_analysis.peak_hours.hours.clone(),
            consistency_score: consistency,
            busiest_day: workload_analysis.busiest_day.clone(),
            peak_multiplier: multiplier,
        });

        tracing::info!(
            transactions = recent.len(),
            hours,
            recommendations = recommendations.len(),
            "Activity patterns computed"
        );

        Ok(ReportOutcome::Ready(ActivityPatterns {
            summary_metrics,
            hourly_patterns,
            workload_analysis,
            service_efficiency,
            temporal_trends,
            recommendations,
            data_sources: DataSources::new()
                .tables(SourceDomain::Cassandra, &["transaction_audit"])
                .analysis_period(format!("{hours} hours"))
                .analysis_type("activity_patterns"),
        }))
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

fn hourly_patterns(recent: &Table, hourly: BTreeMap<u32, usize>) -> HourlyPatterns {
    let peak_activity_hour = first_by(&hourly, |a, b| a > b);
    let lowest_activity_hour = first_by(&hourly, |a, b| a < b);

    let service_activity_matrix = service_matrix(recent);
    let peak_services_by_hour = service_activity_matrix.as_ref().map(|matrix| {
        matrix
            .iter()
            .filter_map(|(&hour, services)| {
                let (service, count) = services.max_entry().filter(|_| services.total() > 0)?;
                Some((
                    hour,
                    ServicePeak {
                        most_active_service: service.to_string(),
                        activity_count: count,
                        total_activity: services.total(),
                    },
                ))
            })
            .collect()
    });

    HourlyPatterns {
        total_activity_by_hour: hourly,
        peak_activity_hour,
        lowest_activity_hour,
        peak_services_by_hour,
        service_activity_matrix,
    }
}

/// First hour whose count beats every earlier one under `better`.
fn first_by(hourly: &BTreeMap<u32, usize>, better: impl Fn(usize, usize) -> bool) -> Option<u32> {
    let mut best: Option<(u32, usize)> = None;
    for (&hour, &count) in hourly {
        if best.is_none_or(|(_, b)| better(count, b)) {
            best = Some((hour, count));
        }
    }
    best.map(|(hour, _)| hour)
}

/// Hour by service counts, zero-filled over the services seen in the window.
fn service_matrix(recent: &Table) -> Option<BTreeMap<u32, Counts>> {
    let services: BTreeSet<String> = recent
        .column("servicio")?
        .filter(|v| !v.is_null())
        .map(Value::to_string)
        .collect();

    let mut matrix: BTreeMap<u32, Counts> = BTreeMap::new();
    for row in recent.rows() {
        let (Some(at), service) = (row.get("timestamp").as_datetime(), row.get("servicio")) else {
            continue;
        };
        if service.is_null() {
            continue;
        }
        matrix
            .entry(at.hour())
            .or_insert_with(|| Counts::with_zeroes(services.iter().map(String::as_str)))
            .increment(&service.to_string());
    }
    Some(matrix)
}

fn workload(recent: &Table, hourly: &BTreeMap<u32, usize>, threshold: Option<f64>) -> Workload {
    let by_day = weekday_counts(recent, "timestamp").unwrap_or_default();

    #[allow(clippy::cast_precision_loss)]
    let peak_hours_activity: BTreeMap<u32, usize> = threshold
        .map(|t| {
            hourly
                .iter()
                .filter(|&(_, &count)| count as f64 > t)
                .map(|(&h, &c)| (h, c))
                .collect()
        })
        .unwrap_or_default();

    Workload {
        busiest_day: busiest(&by_day).map(str::to_string),
        quietest_day: quietest(&by_day).map(str::to_string),
        workload_by_day: by_day,
        peak_hours: PeakHours {
            hours: peak_hours_activity.keys().copied().collect(),
            threshold: threshold.map(round2),
            peak_hours_activity,
        },
    }
}

fn service_efficiency(recent: &Table) -> Option<ServiceEfficiency> {
    let service_distribution = value_counts(recent, "servicio")?.head(SERVICE_DISTRIBUTION);

    let stats: Vec<Record> = aggregate(
        recent,
        &["servicio"],
        &AggregateSpec::many("timestamp", &[AggFn::Count, AggFn::Nunique]),
    )
    .records()
    .into_iter()
    .map(|mut record| {
        let per_day = ratio(
            record.number("timestamp_count").unwrap_or(0.0),
            record.number("timestamp_nunique").unwrap_or(0.0),
        );
        record.insert(
            "transactions_per_day",
            per_day.get().map_or(Value::Null, |v| Value::from(round2(v))),
        );
        record
    })
    .collect();

    let ranked = |metric: &str| -> Vec<Record> {
        top_n(&stats, metric, TOP_SERVICES)
            .iter()
            .map(|r| r.select(&["servicio", metric]))
            .collect()
    };

    Some(ServiceEfficiency {
        top_services_by_volume: ranked("timestamp_count"),
        most_consistent_services: ranked("transactions_per_day"),
        service_distribution,
    })
}

fn daily_trend(recent: &Table) -> Option<DailyTrend> {
    let daily = period_counts(recent, "timestamp", PeriodUnit::Day, None)?;
    if daily.len() < 2 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let changes: Vec<f64> = daily
        .values()
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| *w[1] as f64 - *w[0] as f64)
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let average_daily_change = round2(changes.iter().sum::<f64>() / changes.len() as f64);

    Some(DailyTrend {
        trend_direction: TrendDirection::of(average_daily_change),
        average_daily_change,
        most_active_date: daily.max_entry().map(|(d, _)| d.to_string()),
        least_active_date: daily.min_entry().map(|(d, _)| d.to_string()),
        daily_activity: daily,
    })
}
