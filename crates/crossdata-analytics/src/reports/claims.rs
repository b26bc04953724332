//! Claims reports: claims against policies, the standalone claims profile and
//! the claims / payments correlation.

use std::collections::HashSet;

use chrono::Duration;
use serde::Serialize;

use super::{column_sum, present_count, AnalyticsEngine, DataSources, ReportOutcome};
use crate::aggregate::{aggregate, describe, numbers, percentage, ratio, round2, round3, value_counts, AggFn, AggregateSpec, Aggregation};
use crate::binning::{BinDistribution, Bins};
use crate::error::Result;
use crate::insights::{derive_insights, InsightMetrics};
use crate::join::{column_of, join, JoinKind, Suffixes};
use crate::ordered::{Counts, OrderedMap};
use crate::timeseries::{busiest, compare_series, period_counts, weekday_counts, CompareOptions, PeriodUnit};
use crossdata_domain::{KeyValue, SourceDomain, Table};

const MONTHS_SHOWN: usize = 12;
const RECENT_DAYS: i64 = 30;
const TOP_TYPES: usize = 10;

// =============================================================================
// CLAIMS VS POLICIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsPoliciesSummary {
    pub total_policies: usize,
    pub policies_with_claims: usize,
    pub claim_rate_percentage: f64,
    pub claim_rate_defined: bool,
    pub total_claims: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsFinancials {
    pub total_claims_amount: f64,
    pub total_premiums: f64,
    pub loss_ratio: f64,
    pub loss_ratio_defined: bool,
    pub avg_claim_amount: Option<f64>,
}

/// Claims linked to policies by `policy_id` or `policy_number`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedClaimsPolicies {
    pub summary: ClaimsPoliciesSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_analysis: Option<Aggregation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financial_analysis: Option<ClaimsFinancials>,
    pub data_sources: DataSources,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparateClaimsSummary {
    pub total_policies: usize,
    pub total_claims: usize,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemporalComparison {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_policies: Option<Counts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_claims: Option<Counts>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeparateClaimsTotals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims_by_status: Option<Counts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_claims_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_claim_amount: Option<f64>,
}

/// Side-by-side view when claims carry no policy reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparateClaimsPolicies {
    pub summary: SeparateClaimsSummary,
    pub temporal_comparison: TemporalComparison,
    pub claims_analysis: SeparateClaimsTotals,
    pub data_sources: DataSources,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClaimsVsPolicies {
    Joined(JoinedClaimsPolicies),
    Separate(SeparateClaimsPolicies),
}

/// How claims reference policies.
#[derive(Debug, Clone, Copy)]
struct PolicyLink {
    policy_key: &'static str,
    /// The policy key as named after the product join (`_policy` on collision).
    catalogued_keys: [&'static str; 2],
    claim_key: &'static str,
}

impl PolicyLink {
    /// Detected on the raw policies export, before any join renames its columns.
    fn detect(policies: &Table, claims: &Table) -> Option<Self> {
        if !policies.has_column("id") {
            return None;
        }
        if claims.has_column("policy_id") {
            Some(Self {
                policy_key: "id",
                catalogued_keys: ["id", "id_policy"],
                claim_key: "policy_id",
            })
        } else if claims.has_column("policy_number") && policies.has_column("policy_number") {
            Some(Self {
                policy_key: "policy_number",
                catalogued_keys: ["policy_number", "policy_number_policy"],
                claim_key: "policy_number",
            })
        } else {
            None
        }
    }

    fn catalogued_key(self, catalogued: &Table) -> Option<&'static str> {
        column_of(catalogued, &self.catalogued_keys)
    }

    /// Policies referenced by at least one claim.
    fn policies_with_claims(self, policies: &Table, claims: &Table) -> usize {
        let claimed: HashSet<KeyValue> = claims
            .column(self.claim_key)
            .map(|values| values.filter_map(|v| v.key()).collect())
            .unwrap_or_default();
        policies
            .column(self.policy_key)
            .map_or(0, |values| {
                values
                    .filter_map(|v| v.key())
                    .collect::<HashSet<_>>()
                    .intersection(&claimed)
                    .count()
            })
    }
}

impl AnalyticsEngine<'_> {
    /// Claim incidence and loss ratio per policy and product, or a separate
    /// side-by-side analysis when claims cannot be linked to policies.
    ///
    /// # Errors
    ///
    /// Propagates source failures for `policies`, `reclamos` or `products`.
    #[tracing::instrument(skip(self))]
    pub async fn claims_vs_policies(&self) -> Result<ReportOutcome<ClaimsVsPolicies>> {
        let (policies, claims, products) = tokio::try_join!(
            self.load(SourceDomain::Postgresql, "policies"),
            self.load(SourceDomain::Cassandra, "reclamos"),
            self.load(SourceDomain::Postgresql, "products"),
        )?;

        let catalogued = join(&policies, "product_id", &products, "code", JoinKind::Left, Suffixes::POLICY_PRODUCT)
            .unwrap_or_else(|reason| {
                tracing::debug!(%reason, "Policies analysed without product details");
                policies.clone()
            });

        let linked = PolicyLink::detect(&policies, &claims).and_then(|link| {
            let policy_key = link.catalogued_key(&catalogued)?;
            join(&catalogued, policy_key, &claims, link.claim_key, JoinKind::Left, Suffixes::POLICY_CLAIM)
                .ok()
                .map(|joined| (link, joined))
        });

        let Some((link, joined)) = linked else {
            tracing::warn!("No policy reference in claims, falling back to separate analysis");
            return Ok(ReportOutcome::Ready(ClaimsVsPolicies::Separate(separate_analysis(
                &catalogued,
                &claims,
            ))));
        };

        let total_policies = policies.len();
        let policies_with_claims = link.policies_with_claims(&policies, &claims);
        #[allow(clippy::cast_precision_loss)]
        let claim_rate = percentage(policies_with_claims as f64, total_policies as f64);

        tracing::info!(total_policies, policies_with_claims, "Claims linked to policies");

        Ok(ReportOutcome::Ready(ClaimsVsPolicies::Joined(JoinedClaimsPolicies {
            summary: ClaimsPoliciesSummary {
                total_policies,
                policies_with_claims,
                claim_rate_percentage: claim_rate.value,
                claim_rate_defined: claim_rate.defined,
                total_claims: claims.len(),
            },
            product_analysis: product_claims(&joined),
            financial_analysis: financials(&joined),
            data_sources: DataSources::new()
                .tables(SourceDomain::Postgresql, &["policies", "products"])
                .tables(SourceDomain::Cassandra, &["reclamos"])
                .join_approach("policy_id or policy_number matching"),
        })))
    }
}

fn product_claims(joined: &Table) -> Option<Aggregation> {
    let product = column_of(joined, &["name_product", "name"])?;
    let status = column_of(joined, &["estado", "estado_claim"])?;
    let policy_number = column_of(joined, &["policy_number_policy", "policy_number"]).unwrap_or("policy_number");
    let amount = column_of(joined, &["monto", "monto_claim"]).unwrap_or("monto");

    let mut specs = vec![
        AggregateSpec::new(policy_number, AggFn::Count),
        AggregateSpec::new(status, AggFn::Count),
    ];
    specs.extend(AggregateSpec::many(amount, &[AggFn::Sum, AggFn::Mean, AggFn::Count]));
    Some(aggregate(joined, &[product], &specs).rounded())
}

fn financials(joined: &Table) -> Option<ClaimsFinancials> {
    let amount = column_of(joined, &["monto", "monto_claim"])?;
    let premium = column_of(joined, &["premium", "premium_policy"])?;

    let total_claims_amount = column_sum(joined, amount);
    let total_premiums = column_sum(joined, premium);
    let loss = percentage(total_claims_amount, total_premiums);

    Some(ClaimsFinancials {
        total_claims_amount: round2(total_claims_amount),
        total_premiums: round2(total_premiums),
        loss_ratio: loss.value,
        loss_ratio_defined: loss.defined,
        avg_claim_amount: numbers(joined, amount)
            .and_then(|v| describe(&v))
            .map(|s| round2(s.mean)),
    })
}

fn separate_analysis(policies: &Table, claims: &Table) -> SeparateClaimsPolicies {
    let amounts = numbers(claims, "monto");
    SeparateClaimsPolicies {
        summary: SeparateClaimsSummary {
            total_policies: policies.len(),
            total_claims: claims.len(),
            note: "Analysis performed separately - no direct JOIN possible".to_string(),
        },
        temporal_comparison: TemporalComparison {
            monthly_policies: period_counts(policies, "created_at", PeriodUnit::Month, Some(MONTHS_SHOWN)),
            monthly_claims: period_counts(claims, "fecha_reclamo", PeriodUnit::Month, Some(MONTHS_SHOWN)),
        },
        claims_analysis: SeparateClaimsTotals {
            claims_by_status: value_counts(claims, "estado"),
            total_claims_amount: amounts.as_ref().map(|v| round2(v.iter().sum())),
            avg_claim_amount: amounts.as_deref().and_then(describe).map(|s| round2(s.mean)),
        },
        data_sources: DataSources::new()
            .tables(SourceDomain::Postgresql, &["policies"])
            .tables(SourceDomain::Cassandra, &["reclamos"])
            .join_approach("separate analysis"),
    }
}

// =============================================================================
// CLAIMS ANALYSIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsAmountStatistics {
    pub total_claimed_amount: f64,
    pub average_claim_amount: f64,
    pub median_claim_amount: f64,
    pub max_claim_amount: f64,
    pub min_claim_amount: f64,
    pub std_claim_amount: Option<f64>,
    pub amount_distribution: BinDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsTemporal {
    pub monthly_claims: Counts,
    pub recent_claims: usize,
    pub claims_by_day_of_week: Counts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsTypeAnalysis {
    pub most_common_types: Counts,
    pub total_claim_types: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClaimsDataQuality {
    pub claims_with_amount: usize,
    pub claims_with_date: usize,
    pub claims_with_status: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsAnalysis {
    pub total_claims: usize,
    pub status_distribution: Counts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_statistics: Option<ClaimsAmountStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_analysis: Option<ClaimsTemporal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_analysis: Option<ClaimsTypeAnalysis>,
    pub data_quality: ClaimsDataQuality,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Status, amount, timing and type profile of the claims table.
    ///
    /// # Errors
    ///
    /// Propagates source failures for `reclamos`.
    #[tracing::instrument(skip(self))]
    pub async fn claims_analysis(&self) -> Result<ClaimsAnalysis> {
        let claims = self.load(SourceDomain::Cassandra, "reclamos").await?;

        let amount_statistics = numbers(&claims, "monto").and_then(|amounts| {
            let stats = describe(&amounts)?.rounded();
            Some(ClaimsAmountStatistics {
                total_claimed_amount: stats.sum,
                average_claim_amount: stats.mean,
                median_claim_amount: stats.median,
                max_claim_amount: stats.max,
                min_claim_amount: stats.min,
                std_claim_amount: stats.std,
                amount_distribution: Bins::claim_amount().distribution(amounts.into_iter().map(Some)),
            })
        });

        let recent_since = self.as_of - Duration::days(RECENT_DAYS);
        let temporal_analysis = claims.datetimes("fecha_reclamo").map(|dates| ClaimsTemporal {
            monthly_claims: period_counts(&claims, "fecha_reclamo", PeriodUnit::Month, Some(MONTHS_SHOWN))
                .unwrap_or_default(),
            recent_claims: dates.iter().flatten().filter(|at| **at >= recent_since).count(),
            claims_by_day_of_week: weekday_counts(&claims, "fecha_reclamo").unwrap_or_default(),
        });

        let type_analysis = value_counts(&claims, "tipo_reclamo").map(|types| ClaimsTypeAnalysis {
            total_claim_types: types.len(),
            most_common_types: types.head(TOP_TYPES),
        });

        Ok(ClaimsAnalysis {
            total_claims: claims.len(),
            status_distribution: value_counts(&claims, "estado").unwrap_or_default(),
            amount_statistics,
            temporal_analysis,
            type_analysis,
            data_quality: ClaimsDataQuality {
                claims_with_amount: present_count(&claims, "monto"),
                claims_with_date: present_count(&claims, "fecha_reclamo"),
                claims_with_status: present_count(&claims, "estado"),
            },
            data_sources: DataSources::new().tables(SourceDomain::Cassandra, &["reclamos"]),
        })
    }
}

// =============================================================================
// CLAIMS / PAYMENTS CORRELATION
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Correlations {
    pub count_correlation: Option<f64>,
    pub amount_correlation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyComparisonRow {
    pub claims_count: usize,
    pub payments_count: usize,
    pub claims_amount: f64,
    pub payment_amount: f64,
    pub claims_to_payments_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyComparison {
    pub correlations: Correlations,
    pub monthly_data: OrderedMap<MonthlyComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayAnalysis {
    pub claims_by_weekday: Counts,
    pub payments_by_weekday: Counts,
    pub highest_claims_day: Option<String>,
    pub highest_payments_day: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountRangeAnalysis {
    pub claims_by_amount_range: Counts,
    pub payments_by_amount_range: Counts,
    pub dominant_claims_range: Option<String>,
    pub dominant_payments_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralStatistics {
    pub total_claims: usize,
    pub total_payments: usize,
    pub claims_to_payments_ratio: f64,
    pub claims_to_payments_ratio_defined: bool,
    pub avg_claim_amount: f64,
    pub avg_payment_amount: f64,
    pub total_claims_amount: f64,
    pub total_payments_amount: f64,
    /// Present only when payments carry a positive total amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsPaymentsCorrelation {
    pub general_statistics: GeneralStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_comparison: Option<MonthlyComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday_analysis: Option<WeekdayAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_range_analysis: Option<AmountRangeAnalysis>,
    pub insights: Vec<String>,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Monthly, weekday and amount-range comparison of claims and payments,
    /// with threshold insights.
    ///
    /// # Errors
    ///
    /// Propagates source failures for `reclamos` or `pagos`.
    #[tracing::instrument(skip(self))]
    pub async fn claims_payments_correlation(&self) -> Result<ClaimsPaymentsCorrelation> {
        let (claims, payments) = tokio::try_join!(
            self.load(SourceDomain::Cassandra, "reclamos"),
            self.load(SourceDomain::Cassandra, "pagos"),
        )?;

        let monthly_comparison = compare_series(
            &claims,
            "fecha_reclamo",
            &payments,
            "fecha_pago",
            &CompareOptions::monthly_with_amount("monto"),
        )
        .map(|report| MonthlyComparison {
            correlations: Correlations {
                count_correlation: report.count_correlation.map(round3),
                amount_correlation: report.amount_correlation.map(round3),
            },
            monthly_data: report
                .periods
                .iter()
                .map(|p| {
                    (
                        p.period.to_string(),
                        MonthlyComparisonRow {
                            claims_count: p.count_a,
                            payments_count: p.count_b,
                            claims_amount: round2(p.amount_a.unwrap_or(0.0)),
                            payment_amount: round2(p.amount_b.unwrap_or(0.0)),
                            claims_to_payments_ratio: round2(p.count_ratio),
                        },
                    )
                })
                .collect(),
        });

        let weekday_analysis = weekday_counts(&claims, "fecha_reclamo")
            .zip(weekday_counts(&payments, "fecha_pago"))
            .map(|(by_claims, by_payments)| WeekdayAnalysis {
                highest_claims_day: busiest(&by_claims).map(str::to_string),
                highest_payments_day: busiest(&by_payments).map(str::to_string),
                claims_by_weekday: by_claims,
                payments_by_weekday: by_payments,
            });

        let bins = Bins::claim_amount();
        let amount_range_analysis = claims
            .numeric("monto")
            .zip(payments.numeric("monto"))
            .map(|(claim_amounts, payment_amounts)| {
                let by_claims = bins.distribution(claim_amounts);
                let by_payments = bins.distribution(payment_amounts);
                AmountRangeAnalysis {
                    dominant_claims_range: by_claims.dominant().map(str::to_string),
                    dominant_payments_range: by_payments.dominant().map(str::to_string),
                    claims_by_amount_range: by_claims.counts,
                    payments_by_amount_range: by_payments.counts,
                }
            });

        let general_statistics = general_statistics(&claims, &payments);
        let insights = derive_insights(&InsightMetrics {
            loss_ratio: general_statistics.loss_ratio,
            claims_to_payments_ratio: general_statistics
                .claims_to_payments_ratio_defined
                .then_some(general_statistics.claims_to_payments_ratio),
            count_correlation: monthly_comparison
                .as_ref()
                .and_then(|m| m.correlations.count_correlation),
        });

        tracing::info!(
            claims = claims.len(),
            payments = payments.len(),
            insights = insights.len(),
            "Claims / payments correlation computed"
        );

        Ok(ClaimsPaymentsCorrelation {
            general_statistics,
            monthly_comparison,
            weekday_analysis,
            amount_range_analysis,
            insights,
            data_sources: DataSources::new()
                .tables(SourceDomain::Cassandra, &["reclamos", "pagos"])
                .analysis_type("correlation_analysis"),
        })
    }
}

fn general_statistics(claims: &Table, payments: &Table) -> GeneralStatistics {
    let mean_of = |table: &Table| {
        numbers(table, "monto")
            .and_then(|v| describe(&v))
            .map_or(0.0, |s| round2(s.mean))
    };

    #[allow(clippy::cast_precision_loss)]
    let frequency = ratio(claims.len() as f64, payments.len() as f64);
    let total_claims_amount = round2(column_sum(claims, "monto"));
    let total_payments_amount = round2(column_sum(payments, "monto"));

    GeneralStatistics {
        total_claims: claims.len(),
        total_payments: payments.len(),
        claims_to_payments_ratio: round2(frequency.value),
        claims_to_payments_ratio_defined: frequency.defined,
        avg_claim_amount: mean_of(claims),
        avg_payment_amount: mean_of(payments),
        total_claims_amount,
        total_payments_amount,
        loss_ratio: (total_payments_amount > 0.0)
            .then(|| percentage(total_claims_amount, total_payments_amount).value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures;
    use crossdata_domain::Value;
    use crossdata_storage::InMemorySource;

    #[tokio::test]
    async fn test_claims_vs_policies_joined() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let outcome = engine.claims_vs_policies().await.unwrap().into_ready().unwrap();
        let ClaimsVsPolicies::Joined(report) = outcome else {
            panic!("expected joined analysis");
        };

        assert_eq!(report.summary.total_policies, 3);
        assert_eq!(report.summary.policies_with_claims, 2);
        assert_eq!(report.summary.claim_rate_percentage, 66.67);
        assert_eq!(report.summary.total_claims, 3);

        let financials = report.financial_analysis.unwrap();
        assert_eq!(financials.total_claims_amount, 14_000.0);
        assert_eq!(financials.total_premiums, 650.0);
        assert_eq!(financials.avg_claim_amount, Some(4666.67));
        assert!(financials.loss_ratio_defined);

        let products = report.product_analysis.unwrap();
        let auto = products.get("Auto").unwrap();
        assert_eq!(auto.metric("estado_count"), Some(&Value::Int(3)));
        assert_eq!(products.get("Life").unwrap().metric("estado_count"), Some(&Value::Int(0)));
    }

    #[tokio::test]
    async fn test_claims_linked_when_products_carry_id() {
        let products = Table::from_rows(
            ["id", "code", "name"],
            vec![
                vec![1.into(), "P1".into(), "Auto".into()],
                vec![2.into(), "P2".into(), "Life".into()],
            ],
        );
        let source = InMemorySource::new()
            .with_table(SourceDomain::Postgresql, "policies", fixtures::policies())
            .with_table(SourceDomain::Postgresql, "products", products)
            .with_table(SourceDomain::Cassandra, "reclamos", fixtures::claims());
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let outcome = engine.claims_vs_policies().await.unwrap().into_ready().unwrap();
        let ClaimsVsPolicies::Joined(report) = outcome else {
            panic!("expected joined analysis");
        };
        assert_eq!(report.summary.total_policies, 3);
        assert_eq!(report.summary.policies_with_claims, 2);
        let products = report.product_analysis.unwrap();
        assert_eq!(products.get("Auto").unwrap().metric("estado_count"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_claims_vs_policies_separate_fallback() {
        let claims = Table::from_rows(
            ["estado", "monto", "fecha_reclamo"],
            vec![
                vec!["open".into(), 100.0.into(), fixtures::at(2024, 5, 1, 0)],
                vec!["open".into(), 300.0.into(), fixtures::at(2024, 6, 1, 0)],
            ],
        );
        let source = InMemorySource::new()
            .with_table(SourceDomain::Postgresql, "policies", fixtures::policies())
            .with_table(SourceDomain::Postgresql, "products", fixtures::products())
            .with_table(SourceDomain::Cassandra, "reclamos", claims);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let outcome = engine.claims_vs_policies().await.unwrap().into_ready().unwrap();
        let ClaimsVsPolicies::Separate(report) = outcome else {
            panic!("expected separate analysis");
        };
        assert_eq!(report.summary.total_claims, 2);
        assert_eq!(report.data_sources.join_approach.as_deref(), Some("separate analysis"));
        assert_eq!(report.claims_analysis.total_claims_amount, Some(400.0));
        assert_eq!(report.claims_analysis.avg_claim_amount, Some(200.0));
        let monthly = report.temporal_comparison.monthly_claims.unwrap();
        assert_eq!(monthly.count("2024-05"), 1);
        assert_eq!(report.temporal_comparison.monthly_policies.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_claims_analysis() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.claims_analysis().await.unwrap();

        assert_eq!(report.total_claims, 3);
        assert_eq!(report.status_distribution.keys().collect::<Vec<_>>(), vec!["open", "closed"]);

        let amounts = report.amount_statistics.unwrap();
        assert_eq!(amounts.total_claimed_amount, 14_000.0);
        assert_eq!(amounts.median_claim_amount, 1500.0);
        assert_eq!(amounts.amount_distribution.counts.count("< 1K"), 1);
        assert_eq!(amounts.amount_distribution.counts.count("10K-50K"), 1);

        let temporal = report.temporal_analysis.unwrap();
        assert_eq!(temporal.recent_claims, 1);
        assert_eq!(temporal.claims_by_day_of_week.count("Monday"), 2);

        let types = report.type_analysis.unwrap();
        assert_eq!(types.total_claim_types, 1);
        assert_eq!(report.data_quality.claims_with_status, 3);
    }

    #[tokio::test]
    async fn test_claims_analysis_without_optional_columns() {
        let claims = Table::from_rows(["id"], vec![vec![1.into()], vec![2.into()]]);
        let source = InMemorySource::new().with_table(SourceDomain::Cassandra, "reclamos", claims);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let report = engine.claims_analysis().await.unwrap();
        assert_eq!(report.total_claims, 2);
        assert!(report.status_distribution.is_empty());
        assert!(report.amount_statistics.is_none());
        assert!(report.temporal_analysis.is_none());
        assert_eq!(report.data_quality.claims_with_amount, 0);
    }

    #[tokio::test]
    async fn test_claims_payments_correlation() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.claims_payments_correlation().await.unwrap();

        let general = &report.general_statistics;
        assert_eq!(general.total_claims, 3);
        assert_eq!(general.total_payments, 4);
        assert_eq!(general.claims_to_payments_ratio, 0.75);
        assert_eq!(general.total_payments_amount, 3000.0);
        assert_eq!(general.loss_ratio, Some(466.67));

        let monthly = report.monthly_comparison.unwrap();
        assert_eq!(monthly.monthly_data.len(), 3);
        assert_eq!(monthly.monthly_data.get("2024-05").unwrap().payments_count, 2);
        assert_eq!(monthly.correlations.count_correlation, None);
        assert!(monthly.correlations.amount_correlation.is_some());

        let weekdays = report.weekday_analysis.unwrap();
        assert_eq!(weekdays.highest_claims_day.as_deref(), Some("Monday"));

        let ranges = report.amount_range_analysis.unwrap();
        assert_eq!(ranges.dominant_claims_range.as_deref(), Some("< 1K"));
        assert_eq!(ranges.payments_by_amount_range.count("< 1K"), 3);

        assert_eq!(report.insights.len(), 2);
        assert!(report.insights[0].starts_with("High loss ratio"));
        assert!(report.insights[1].starts_with("High claim frequency"));
    }

    #[tokio::test]
    async fn test_correlation_without_payments_skips_frequency_rule() {
        let payments = Table::new(["monto", "fecha_pago"]);
        let source = InMemorySource::new()
            .with_table(SourceDomain::Cassandra, "reclamos", fixtures::claims())
            .with_table(SourceDomain::Cassandra, "pagos", payments);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let report = engine.claims_payments_correlation().await.unwrap();
        assert!(!report.general_statistics.claims_to_payments_ratio_defined);
        assert_eq!(report.general_statistics.loss_ratio, None);
        assert!(report.insights.is_empty());
    }
}
