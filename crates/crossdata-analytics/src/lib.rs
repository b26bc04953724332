//! # Crossdata Analytics
//!
//! Cross-source analytics over the insurance tables exported by the mysql,
//! postgresql and cassandra systems.
//!
//! ## Stages
//!
//! - Numeric binning into labelled ranges
//! - Key joins across sources with per-call suffixes
//! - Grouped aggregation with flattened metric names
//! - Period bucketing and series correlation
//! - Completeness and referential integrity checks
//! - Threshold insights and capacity recommendations
//!
//! [`AnalyticsEngine`] assembles the stages into fixed report shapes over an
//! injected [`crossdata_storage::DatasetSource`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod binning;
pub mod error;
pub mod insights;
pub mod join;
pub mod ordered;
pub mod quality;
pub mod reports;
pub mod timeseries;

pub use aggregate::{AggFn, AggregateSpec, Aggregation, Ratio, aggregate};
pub use binning::{BinDistribution, Bins};
pub use error::{AnalyticsError, InsufficientData, Result};
pub use insights::{ActivityRecommendation, Insight, InsightMetrics, derive_insights};
pub use join::{ChainOutcome, JoinChain, JoinKind, JoinUnavailable, Suffixes, join};
pub use ordered::{Counts, OrderedMap, Record};
pub use quality::{IntegrityReport, QualityReport, assess_table, check_integrity};
pub use reports::{AnalyticsEngine, DataSources, ReportOutcome};
pub use timeseries::{CompareOptions, ComparisonReport, Period, PeriodUnit, compare_series};
