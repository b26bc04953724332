//! Customer reports: the users / clients / policies profile and user growth
//! per state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use serde::Serialize;

use super::{age_in_years, column_sum, AnalyticsEngine, DataSources, ReportOutcome};
use crate::aggregate::{aggregate, describe, nunique, percentage, quantile, ratio, round2, value_counts, AggFn, AggregateSpec, Aggregation};
use crate::binning::{label_rows, Bins};
use crate::error::{AnalyticsError, Result};
use crate::join::{column_of, ChainOutcome, JoinChain, JoinKind, Suffixes};
use crate::ordered::{Counts, OrderedMap};
use crate::timeseries::{period_counts, Period, PeriodUnit};
use crossdata_domain::{SourceDomain, Table, Value};

const TOP_CUSTOMERS: usize = 10;
const TOP_STATES: usize = 10;

// =============================================================================
// CUSTOMER / POLICY PROFILE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub total_customers: usize,
    pub customers_with_policies: usize,
    pub penetration_rate: f64,
    pub penetration_rate_defined: bool,
    pub total_policies: usize,
    pub total_premium_volume: f64,
    pub avg_policies_per_customer: f64,
    pub avg_policies_per_customer_defined: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Demographics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_state: Option<Aggregation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_age_group: Option<Aggregation>,
}

/// Premium-based customer segmentation at the 40th and 80th percentiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerValue {
    pub high_value_customers: usize,
    pub medium_value_customers: usize,
    pub low_value_customers: usize,
    pub avg_customer_value: f64,
    pub top_10_customers: OrderedMap<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerPolicyProfile {
    pub summary: ProfileSummary,
    pub demographic_analysis: Demographics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_value_analysis: Option<CustomerValue>,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Users joined to clients (inner) and then to policies (left).
    ///
    /// # Errors
    ///
    /// Propagates source failures for `users`, `clients` or `policies`.
    #[tracing::instrument(skip(self))]
    pub async fn customer_policy_profile(&self) -> Result<ReportOutcome<CustomerPolicyProfile>> {
        let (users, clients, policies) = tokio::try_join!(
            self.load(SourceDomain::Mysql, "users"),
            self.load(SourceDomain::Mysql, "clients"),
            self.load(SourceDomain::Postgresql, "policies"),
        )?;

        let chain = JoinChain::start(users)
            .then(&clients, "id", "user_id", JoinKind::Inner, Suffixes::USER_CLIENT)
            .then(&policies, "user_id", "customer_id", JoinKind::Left, Suffixes::KEEP_LEFT_POLICY)
            .finish();

        let (profile, row_counts) = match chain {
            ChainOutcome::Complete { table, row_counts } => (table, row_counts),
            ChainOutcome::Broken { hop: 0, .. } => {
                return Ok(ReportOutcome::unavailable(
                    "Cannot join users and clients - missing key columns",
                ));
            }
            ChainOutcome::Broken { .. } => {
                return Ok(ReportOutcome::unavailable(
                    "Cannot join clients with policies - missing customer_id",
                ));
            }
        };

        let total_customers = row_counts.get(1).copied().unwrap_or_default();
        let with_policy = profile.filter(|row| !row.get("policy_number").is_null());
        let customers_with_policies = nunique(&with_policy, "user_id").unwrap_or(0);
        let total_policies = with_policy.len();

        #[allow(clippy::cast_precision_loss)]
        let penetration = percentage(customers_with_policies as f64, total_customers as f64);
        #[allow(clippy::cast_precision_loss)]
        let per_customer = ratio(total_policies as f64, customers_with_policies as f64);

        let summary = ProfileSummary {
            total_customers,
            customers_with_policies,
            penetration_rate: penetration.value,
            penetration_rate_defined: penetration.defined,
            total_policies,
            total_premium_volume: round2(column_sum(&profile, "premium")),
            avg_policies_per_customer: round2(per_customer.value),
            avg_policies_per_customer_defined: per_customer.defined,
        };

        let demographic_analysis = Demographics {
            by_state: column_of(&profile, &["state", "state_user", "state_client"])
                .map(|state| by_state(&profile, state)),
            by_age_group: column_of(&profile, &["birth_date", "birth_date_client", "birth_date_user"])
                .and_then(|birth| self.by_age_group(&profile, birth)),
        };

        let customer_value_analysis = if profile.has_column("premium") {
            customer_value(&profile)
        } else {
            tracing::debug!("No premium column, customer value analysis skipped");
            None
        };

        tracing::info!(total_customers, customers_with_policies, total_policies, "Customer profile built");

        Ok(ReportOutcome::Ready(CustomerPolicyProfile {
            summary,
            demographic_analysis,
            customer_value_analysis,
            data_sources: DataSources::new()
                .tables(SourceDomain::Mysql, &["users", "clients"])
                .tables(SourceDomain::Postgresql, &["policies"])
                .join_key("user_id -> customer_id"),
        }))
    }

    /// Policy metrics per age group, in age-group order.
    fn by_age_group(&self, profile: &Table, birth_column: &str) -> Option<Aggregation> {
        let ages: Vec<Value> = profile
            .rows()
            .map(|row| {
                row.get(birth_column)
                    .as_datetime()
                    .map_or(Value::Null, |born| Value::from(age_in_years(born, self.as_of)))
            })
            .collect();

        let bins = Bins::age();
        let labelled = label_rows(&profile.with_column("age", ages), "age", &bins, "age_group").ok()?;

        let mut specs = AggregateSpec::many("policy_number", &[AggFn::Count, AggFn::Nunique]);
        specs.extend(AggregateSpec::many("premium", &[AggFn::Sum, AggFn::Mean]));
        specs.push(AggregateSpec::new("age", AggFn::Mean));

        let mut groups = aggregate(&labelled, &["age_group"], &specs).rounded();
        groups.sort_by_key(|g| bins.position(&g.key.render()).unwrap_or(usize::MAX));
        Some(groups)
    }
}

fn by_state(profile: &Table, state: &str) -> Aggregation {
    let mut specs = AggregateSpec::many("policy_number", &[AggFn::Count, AggFn::Nunique]);
    specs.extend(AggregateSpec::many("premium", &[AggFn::Sum, AggFn::Mean]));
    specs.extend(AggregateSpec::many("sum_insured", &[AggFn::Sum, AggFn::Mean]));
    aggregate(profile, &[state], &specs).rounded()
}

fn customer_value(profile: &Table) -> Option<CustomerValue> {
    let per_customer = aggregate(profile, &["user_id"], &[AggregateSpec::new("premium", AggFn::Sum)]);
    let totals: Vec<(String, f64)> = per_customer
        .groups()
        .iter()
        .map(|g| (g.key.render(), g.number("premium_sum").unwrap_or(0.0)))
        .collect();

    let values: Vec<f64> = totals.iter().map(|(_, v)| *v).collect();
    let low_cut = quantile(&values, 0.4)?;
    let high_cut = quantile(&values, 0.8)?;
    let summary = describe(&values)?;

    let top_10_customers = totals
        .into_iter()
        .map(|(customer, total)| (customer, round2(total)))
        .collect::<OrderedMap<f64>>()
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .head(TOP_CUSTOMERS);

    Some(CustomerValue {
        high_value_customers: values.iter().filter(|v| **v > high_cut).count(),
        medium_value_customers: values.iter().filter(|v| **v > low_cut && **v <= high_cut).count(),
        low_value_customers: values.iter().filter(|v| **v <= low_cut).count(),
        avg_customer_value: round2(summary.mean),
        top_10_customers,
    })
}

// =============================================================================
// USER GROWTH BY STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRate {
    pub current_month: usize,
    pub previous_month: usize,
    pub change_percent: f64,
    pub change_percent_defined: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserGrowth {
    pub period_analyzed: String,
    pub total_new_users: usize,
    pub top_growing_states: Counts,
    pub monthly_growth: Counts,
    /// `{month: {state: new users}}`, zero-filled across states.
    pub growth_by_state_and_month: OrderedMap<BTreeMap<String, usize>>,
    pub growth_rate: GrowthRate,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// New users per state over the last `months` (30-day) months.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when `months` is zero or reaches past the calendar;
    /// source failures for `users`.
    #[tracing::instrument(skip(self))]
    pub async fn user_growth_by_state(&self, months: u32) -> Result<ReportOutcome<UserGrowth>> {
        if months == 0 {
            return Err(AnalyticsError::InvalidParameter(
                "months must be at least 1".to_string(),
            ));
        }
        let cutoff = Duration::try_days(30 * i64::from(months))
            .and_then(|window| self.as_of.checked_sub_signed(window))
            .ok_or_else(|| {
                AnalyticsError::InvalidParameter(format!(
                    "months {months} reaches past the supported date range"
                ))
            })?;

        let users = self.load(SourceDomain::Mysql, "users").await?;
        if !users.has_column("created_at") || !users.has_column("state") {
            return Ok(ReportOutcome::unavailable(
                "Missing required columns: created_at or state",
            ));
        }

        let recent = users.filter(|row| {
            row.get("created_at")
                .as_datetime()
                .is_some_and(|created| created >= cutoff)
        });

        let monthly_growth = period_counts(&recent, "created_at", PeriodUnit::Month, None).unwrap_or_default();
        let top_growing_states = value_counts(&recent, "state")
            .unwrap_or_default()
            .head(TOP_STATES);

        let counts: Vec<usize> = monthly_growth.values().copied().collect();
        let current_month = counts.last().copied().unwrap_or(0);
        let previous_month = counts.len().checked_sub(2).map_or(0, |i| counts[i]);
        #[allow(clippy::cast_precision_loss)]
        let change = percentage(current_month as f64 - previous_month as f64, previous_month as f64);

        tracing::info!(months, new_users = recent.len(), "User growth computed");

        Ok(ReportOutcome::Ready(UserGrowth {
            period_analyzed: format!("Last {months} months"),
            total_new_users: recent.len(),
            top_growing_states,
            monthly_growth,
            growth_by_state_and_month: state_month_matrix(&recent),
            growth_rate: GrowthRate {
                current_month,
                previous_month,
                change_percent: change.value,
                change_percent_defined: change.defined,
            },
            data_sources: DataSources::new().tables(SourceDomain::Mysql, &["users"]),
        }))
    }
}

fn state_month_matrix(recent: &Table) -> OrderedMap<BTreeMap<String, usize>> {
    let cells: Vec<(Period, String)> = recent
        .rows()
        .filter_map(|row| {
            let created = row.get("created_at").as_datetime()?;
            let state = row.get("state");
            (!state.is_null()).then(|| (Period::of(created, PeriodUnit::Month), state.to_string()))
        })
        .collect();

    let states: BTreeSet<&str> = cells.iter().map(|(_, s)| s.as_str()).collect();
    let mut matrix: BTreeMap<Period, BTreeMap<String, usize>> = BTreeMap::new();
    for (period, state) in &cells {
        let row = matrix
            .entry(*period)
            .or_insert_with(|| states.iter().map(|s| ((*s).to_string(), 0)).collect());
        *row.entry(state.clone()).or_insert(0) += 1;
    }

    matrix
        .into_iter()
        .map(|(period, row)| (period.to_string(), row))
        .collect()
}
