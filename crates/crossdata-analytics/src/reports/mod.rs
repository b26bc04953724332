//! # Report Assembler
//!
//! Fixed report shapes built from the analytics stages. An
//! [`AnalyticsEngine`] is constructed per request around an injected
//! [`DatasetSource`]; each report loads its tables, runs them through the
//! stages and returns one serializable result.
//!
//! Source failures are the only errors. A missing join key or required
//! column yields [`ReportOutcome::Unavailable`]; a missing optional column
//! only empties the section that needs it.

mod activity;
mod agents;
mod audit;
mod bucket;
mod claims;
mod customers;
mod identity;
mod join;
mod payments;
mod products;
mod quality;

pub use activity::{
    ActivityPatterns, ActivitySummary, DailyTrend, HourlyPatterns, PeakHours, ServiceEfficiency,
    ServicePeak, TrendDirection, Workload,
};
pub use agents::{AgentCodeAnalysis, AgentPerformance, AgentRoster, AgentSummary, TopAgents};
pub use audit::{AuditTemporal, OperationMix, ServiceUsage, TransactionAudit};
pub use bucket::BucketSummary;
pub use claims::{
    AmountRangeAnalysis, ClaimsAmountStatistics, ClaimsAnalysis, ClaimsDataQuality, ClaimsFinancials,
    ClaimsPaymentsCorrelation, ClaimsPoliciesSummary, ClaimsTemporal, ClaimsTypeAnalysis,
    ClaimsVsPolicies, Correlations, GeneralStatistics, JoinedClaimsPolicies, MonthlyComparison,
    MonthlyComparisonRow, SeparateClaimsPolicies, SeparateClaimsSummary, SeparateClaimsTotals,
    TemporalComparison, WeekdayAnalysis,
};
pub use customers::{
    CustomerPolicyProfile, CustomerValue, Demographics, GrowthRate, ProfileSummary, UserGrowth,
};
pub use identity::{
    AgeStatistics, BeneficiariesPerClient, BeneficiaryAges, BeneficiaryRelationships, ClientCompleteness,
    ClientDemographics, CommonNames, UserDataQuality, UserStatistics,
};
pub use join::{CrossSourceJoin, JoinRequest};
pub use payments::{
    CustomerPayments, MethodAnalysis, PaymentsAmountStatistics, PaymentsAnalysis, PaymentsCompleteness,
    PaymentsTemporal,
};
pub use products::{
    CodePatterns, FormatDistribution, PremiumStatistics, ProductAnalysis, ProductCodeAnalysis,
    ProductCompleteness, ProductProfitability, ProfitabilitySummary, TextAnalysis,
};
pub use quality::{DataQualityReport, QualitySummary, RelationshipIntegrity};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crossdata_domain::{SourceDomain, Table};
use crossdata_storage::DatasetSource;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of a report that loaded its tables successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportOutcome<T> {
    Ready(T),
    /// A required join key or column is absent. Serializes as `{"error": ...}`.
    Unavailable { error: String },
}

impl<T> ReportOutcome<T> {
    pub fn unavailable(error: impl Into<String>) -> Self {
        let error = error.into();
        tracing::warn!(%error, "Report unavailable");
        Self::Unavailable { error }
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(report) => Some(report),
            Self::Unavailable { .. } => None,
        }
    }

    #[must_use]
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(report) => Some(report),
            Self::Unavailable { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Unavailable { error } => Some(error),
        }
    }
}

// =============================================================================
// PROVENANCE
// =============================================================================

/// Which domains, tables and join keys a report was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSources {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mysql_tables: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub postgresql_tables: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cassandra_tables: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub join_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_approach: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_period: Option<String>,
}

impl DataSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tables` under `domain`.
    #[must_use]
    pub fn tables(mut self, domain: SourceDomain, tables: &[&str]) -> Self {
        let list = match domain {
            SourceDomain::Mysql => &mut self.mysql_tables,
            SourceDomain::Postgresql => &mut self.postgresql_tables,
            SourceDomain::Cassandra => &mut self.cassandra_tables,
        };
        list.extend(tables.iter().map(|t| (*t).to_string()));
        self
    }

    #[must_use]
    pub fn join_key(mut self, key: impl Into<String>) -> Self {
        self.join_keys.push(key.into());
        self
    }

    #[must_use]
    pub fn join_approach(mut self, approach: impl Into<String>) -> Self {
        self.join_approach = Some(approach.into());
        self
    }

    #[must_use]
    pub fn analysis_type(mut self, kind: impl Into<String>) -> Self {
        self.analysis_type = Some(kind.into());
        self
    }

    #[must_use]
    pub fn analysis_period(mut self, period: impl Into<String>) -> Self {
        self.analysis_period = Some(period.into());
        self
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Per-request report assembler.
///
/// `as_of` stands in for the wall clock in every age and recency window.
#[derive(Clone, Copy)]
pub struct AnalyticsEngine<'a> {
    source: &'a dyn DatasetSource,
    as_of: NaiveDateTime,
}

impl<'a> AnalyticsEngine<'a> {
    #[must_use]
    pub fn new(source: &'a dyn DatasetSource, as_of: NaiveDateTime) -> Self {
        Self { source, as_of }
    }

    #[must_use]
    pub const fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    #[must_use]
    pub fn source(&self) -> &'a dyn DatasetSource {
        self.source
    }

    /// Load one table, logging the failure before it propagates.
    async fn load(&self, domain: SourceDomain, table: &str) -> Result<Table> {
        match self.source.load(domain, table).await {
            Ok(loaded) => {
                tracing::debug!(%domain, table, rows = loaded.len(), "Table ready");
                Ok(loaded)
            }
            Err(e) => {
                tracing::error!(%domain, table, error = %e, "Table load failed");
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for AnalyticsEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsEngine")
            .field("as_of", &self.as_of)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// Sum of the numeric cells in `column`; 0 when the column is absent.
fn column_sum(table: &Table, column: &str) -> f64 {
    table
        .numeric(column)
        .map_or(0.0, |values| values.into_iter().flatten().sum())
}

/// Non-null cells in `column`; 0 when the column is absent.
fn present_count(table: &Table, column: &str) -> usize {
    table
        .null_count(column)
        .map_or(0, |nulls| table.len() - nulls)
}

/// Non-null cells of `column` as text; `None` when the column is absent.
fn text_cells(table: &Table, column: &str) -> Option<Vec<String>> {
    Some(
        table
            .column(column)?
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
            .collect(),
    )
}

/// Whole years between `born` and `as_of`, counted as 365-day years.
fn age_in_years(born: NaiveDateTime, as_of: NaiveDateTime) -> i64 {
    (as_of - born).num_days().div_euclid(365)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small cross-source dataset shared by the report tests.

    use chrono::{NaiveDate, NaiveDateTime};
    use crossdata_domain::{SourceDomain, Table, Value};
    use crossdata_storage::InMemorySource;

    pub fn as_of() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    pub fn at(y: i32, m: u32, d: u32, h: u32) -> Value {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
            .into()
    }

    pub fn users() -> Table {
        Table::from_rows(
            ["id", "first_name", "state", "created_at"],
            vec![
                vec![1.into(), "Ana".into(), "Lima".into(), at(2024, 5, 3, 9)],
                vec![2.into(), "Luis".into(), "Cusco".into(), at(2024, 6, 10, 9)],
                vec![3.into(), "Rosa".into(), "Lima".into(), at(2024, 6, 12, 9)],
                vec![4.into(), "Juan".into(), "Piura".into(), at(2022, 1, 5, 9)],
            ],
        )
    }

    pub fn clients() -> Table {
        Table::from_rows(
            ["id", "user_id", "birth_date"],
            vec![
                vec![10.into(), 1.into(), at(1990, 1, 1, 0)],
                vec![11.into(), 2.into(), at(1960, 1, 1, 0)],
                vec![12.into(), 3.into(), at(2001, 1, 1, 0)],
            ],
        )
    }

    pub fn agents() -> Table {
        Table::from_rows(
            ["code", "first_name", "last_name", "is_active"],
            vec![
                vec!["AG1".into(), "Eva".into(), "Diaz".into(), true.into()],
                vec!["AG2".into(), "Raul".into(), "Soto".into(), true.into()],
                vec!["AG3".into(), "Ines".into(), "Vega".into(), false.into()],
            ],
        )
    }

    pub fn beneficiaries() -> Table {
        Table::from_rows(
            ["id", "client_id", "relationship"],
            vec![
                vec![1.into(), 1.into(), "child".into()],
                vec![2.into(), 9.into(), "spouse".into()],
            ],
        )
    }

    pub fn products() -> Table {
        Table::from_rows(
            ["code", "name", "base_premium"],
            vec![
                vec!["P1".into(), "Auto".into(), 100.0.into()],
                vec!["P2".into(), "Life".into(), 200.0.into()],
            ],
        )
    }

    pub fn policies() -> Table {
        Table::from_rows(
            [
                "id",
                "policy_number",
                "customer_id",
                "agent_id",
                "product_id",
                "premium",
                "sum_insured",
                "created_at",
            ],
            vec![
                vec![100.into(), "POL-1".into(), 1.into(), "AG1".into(), "P1".into(), 150.0.into(), 10_000.0.into(), at(2024, 4, 2, 10)],
                vec![101.into(), "POL-2".into(), 1.into(), "AG1".into(), "P2".into(), 250.0.into(), 20_000.0.into(), at(2024, 5, 2, 10)],
                vec![102.into(), "POL-3".into(), 2.into(), "AG2".into(), "P1".into(), 100.0.into(), 5_000.0.into(), at(2024, 6, 2, 10)],
            ],
        )
    }

    pub fn claims() -> Table {
        Table::from_rows(
            ["id", "policy_id", "estado", "monto", "fecha_reclamo", "tipo_reclamo"],
            vec![
                vec![1.into(), 100.into(), "open".into(), 500.0.into(), at(2024, 4, 15, 10)],
                vec![2.into(), 100.into(), "closed".into(), 1500.0.into(), at(2024, 5, 20, 11)],
                vec![3.into(), 102.into(), "open".into(), 12_000.0.into(), at(2024, 6, 25, 12)],
            ]
            .into_iter()
            .map(|mut row| {
                row.push("collision".into());
                row
            })
            .collect(),
        )
    }

    pub fn payments() -> Table {
        Table::from_rows(
            ["id", "customer_id", "monto", "fecha_pago", "metodo_pago"],
            vec![
                vec![1.into(), 1.into(), 200.0.into(), at(2024, 4, 3, 9), "card".into()],
                vec![2.into(), 1.into(), 200.0.into(), at(2024, 5, 3, 9), "card".into()],
                vec![3.into(), 2.into(), 800.0.into(), at(2024, 5, 4, 9), "transfer".into()],
                vec![4.into(), 3.into(), 1800.0.into(), at(2024, 6, 5, 9), "card".into()],
            ],
        )
    }

    pub fn audit() -> Table {
        let rows = [
            (6, 28, 9, "auth"),
            (6, 28, 9, "auth"),
            (6, 28, 9, "billing"),
            (6, 28, 10, "auth"),
            (6, 29, 9, "auth"),
            (6, 29, 14, "billing"),
            (6, 30, 9, "auth"),
            (6, 30, 9, "auth"),
            (6, 30, 9, "auth"),
            (6, 30, 16, "billing"),
            (5, 1, 9, "auth"),
        ];
        Table::from_rows(
            ["timestamp", "servicio", "operacion"],
            rows.iter()
                .map(|&(m, d, h, service)| vec![at(2024, m, d, h), service.into(), "read".into()])
                .collect(),
        )
    }

    pub fn source() -> InMemorySource {
        InMemorySource::new()
            .with_table(SourceDomain::Mysql, "users", users())
            .with_table(SourceDomain::Mysql, "clients", clients())
            .with_table(SourceDomain::Mysql, "agents", agents())
            .with_table(SourceDomain::Mysql, "beneficiaries", beneficiaries())
            .with_table(SourceDomain::Postgresql, "products", products())
            .with_table(SourceDomain::Postgresql, "policies", policies())
            .with_table(SourceDomain::Cassandra, "reclamos", claims())
            .with_table(SourceDomain::Cassandra, "pagos", payments())
            .with_table(SourceDomain::Cassandra, "transaction_audit", audit())
    }
}
