//! # Request Handlers
//!
//! Thin adapters from HTTP requests to [`AnalyticsEngine`] reports. Each
//! handler builds an engine over the shared source, runs one report and
//! serializes it unchanged.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use crossdata_analytics::reports::{
    ActivityPatterns, AgentPerformance, AgentRoster, BeneficiaryRelationships, BucketSummary,
    ClaimsAnalysis, ClaimsPaymentsCorrelation, ClaimsVsPolicies, ClientDemographics, CrossSourceJoin,
    CustomerPolicyProfile, DataQualityReport, JoinRequest, PaymentsAnalysis, ProductAnalysis,
    ProductProfitability, TransactionAudit, UserGrowth, UserStatistics,
};
use crossdata_analytics::{JoinKind, ReportOutcome};
use crossdata_domain::{SourceDomain, TableRef};
use crossdata_storage::{availability, describe_table, TableInfo};

const DEFAULT_GROWTH_MONTHS: u32 = 12;
const DEFAULT_ACTIVITY_HOURS: u32 = 168;
const MAX_GROWTH_MONTHS: u32 = 1_200;
const MAX_ACTIVITY_HOURS: u32 = 87_600;

/// `value` when it is at most `max`, otherwise a 400.
fn bounded(name: &str, value: u32, max: u32) -> ApiResult<u32> {
    if value > max {
        return Err(ApiError::InvalidInput(format!("{name} must be at most {max}, got {value}")));
    }
    Ok(value)
}

// =============================================================================
// SOURCES
// =============================================================================

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Catalogued tables per domain.
pub async fn list_sources(State(state): State<AppState>) -> Json<BTreeMap<SourceDomain, Vec<String>>> {
    let listing = state
        .source
        .catalog()
        .listing()
        .into_iter()
        .map(|(domain, tables)| (domain, tables.into_iter().map(String::from).collect()))
        .collect();
    Json(listing)
}

/// Whether each catalogued table can currently be loaded.
pub async fn source_availability(
    State(state): State<AppState>,
) -> Json<BTreeMap<SourceDomain, BTreeMap<String, bool>>> {
    Json(availability(state.source.as_ref()).await)
}

/// Shape of one table.
pub async fn table_info(
    State(state): State<AppState>,
    Path((domain, table)): Path<(String, String)>,
) -> ApiResult<Json<TableInfo>> {
    let domain: SourceDomain = domain.parse()?;
    let loaded = state.source.load(domain, &table).await?;
    tracing::info!(%domain, table = %table, rows = loaded.len(), "Table described");
    Ok(Json(describe_table(&loaded)))
}

/// Stored objects grouped by domain prefix.
pub async fn bucket_summary(State(state): State<AppState>) -> ApiResult<Json<BucketSummary>> {
    Ok(Json(state.engine().bucket_summary().await?))
}

// =============================================================================
// SINGLE-TABLE REPORTS
// =============================================================================

pub async fn user_statistics(State(state): State<AppState>) -> ApiResult<Json<UserStatistics>> {
    Ok(Json(state.engine().user_statistics().await?))
}

pub async fn client_demographics(State(state): State<AppState>) -> ApiResult<Json<ClientDemographics>> {
    Ok(Json(state.engine().client_demographics().await?))
}

pub async fn agent_roster(State(state): State<AppState>) -> ApiResult<Json<AgentRoster>> {
    Ok(Json(state.engine().agent_roster().await?))
}

pub async fn beneficiary_relationships(
    State(state): State<AppState>,
) -> ApiResult<Json<BeneficiaryRelationships>> {
    Ok(Json(state.engine().beneficiary_relationships().await?))
}

pub async fn product_analysis(State(state): State<AppState>) -> ApiResult<Json<ProductAnalysis>> {
    Ok(Json(state.engine().product_analysis().await?))
}

pub async fn transaction_audit(State(state): State<AppState>) -> ApiResult<Json<TransactionAudit>> {
    Ok(Json(state.engine().transaction_audit().await?))
}

// =============================================================================
// CROSS-SOURCE REPORTS
// =============================================================================

pub async fn customer_policy_profile(
    State(state): State<AppState>,
) -> ApiResult<Json<ReportOutcome<CustomerPolicyProfile>>> {
    Ok(Json(state.engine().customer_policy_profile().await?))
}

pub async fn agent_performance(
    State(state): State<AppState>,
) -> ApiResult<Json<ReportOutcome<AgentPerformance>>> {
    Ok(Json(state.engine().agent_performance().await?))
}

pub async fn claims_vs_policies(
    State(state): State<AppState>,
) -> ApiResult<Json<ReportOutcome<ClaimsVsPolicies>>> {
    Ok(Json(state.engine().claims_vs_policies().await?))
}

pub async fn claims_payments_correlation(
    State(state): State<AppState>,
) -> ApiResult<Json<ClaimsPaymentsCorrelation>> {
    Ok(Json(state.engine().claims_payments_correlation().await?))
}

pub async fn data_quality(State(state): State<AppState>) -> ApiResult<Json<DataQualityReport>> {
    Ok(Json(state.engine().data_quality_report().await?))
}

/// The data quality report rendered as Markdown.
pub async fn data_quality_markdown(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = state.engine().data_quality_report().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        report.to_markdown(),
    ))
}

pub async fn claims_analysis(State(state): State<AppState>) -> ApiResult<Json<ClaimsAnalysis>> {
    Ok(Json(state.engine().claims_analysis().await?))
}

pub async fn payments_analysis(State(state): State<AppState>) -> ApiResult<Json<PaymentsAnalysis>> {
    Ok(Json(state.engine().payments_analysis().await?))
}

pub async fn product_profitability(
    State(state): State<AppState>,
) -> ApiResult<Json<ReportOutcome<ProductProfitability>>> {
    Ok(Json(state.engine().product_profitability().await?))
}

#[derive(Debug, Deserialize)]
pub struct GrowthParams {
    pub months: Option<u32>,
}

pub async fn user_growth(
    State(state): State<AppState>,
    Query(params): Query<GrowthParams>,
) -> ApiResult<Json<ReportOutcome<UserGrowth>>> {
    let months = bounded("months", params.months.unwrap_or(DEFAULT_GROWTH_MONTHS), MAX_GROWTH_MONTHS)?;
    Ok(Json(state.engine().user_growth_by_state(months).await?))
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    pub hours: Option<u32>,
}

pub async fn activity_patterns(
    State(state): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> ApiResult<Json<ReportOutcome<ActivityPatterns>>> {
    let hours = bounded("hours", params.hours.unwrap_or(DEFAULT_ACTIVITY_HOURS), MAX_ACTIVITY_HOURS)?;
    Ok(Json(state.engine().activity_patterns(hours).await?))
}

// =============================================================================
// JOIN
// =============================================================================

/// Query string of `/join`. Tables are given as `<domain>.<table>`.
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    pub left: String,
    pub left_key: String,
    pub right: String,
    pub right_key: String,
    pub kind: Option<String>,
}

impl JoinParams {
    fn into_request(self) -> ApiResult<JoinRequest> {
        let kind = match self.kind.as_deref() {
            None => JoinKind::Inner,
            Some(kind) => kind.parse()?,
        };
        if self.left_key.is_empty() || self.right_key.is_empty() {
            return Err(ApiError::InvalidInput("join keys must not be empty".to_string()));
        }
        Ok(JoinRequest {
            left: self.left.parse::<TableRef>()?,
            left_key: self.left_key,
            right: self.right.parse::<TableRef>()?,
            right_key: self.right_key,
            kind,
        })
    }
}

pub async fn cross_source_join(
    State(state): State<AppState>,
    Query(params): Query<JoinParams>,
) -> ApiResult<Json<ReportOutcome<CrossSourceJoin>>> {
    let request = params.into_request()?;
    Ok(Json(state.engine().cross_source_join(request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(left: &str, kind: Option<&str>) -> JoinParams {
        JoinParams {
            left: left.to_string(),
            left_key: "id".to_string(),
            right: "cassandra.reclamos".to_string(),
            right_key: "policy_id".to_string(),
            kind: kind.map(String::from),
        }
    }

    #[test]
    fn test_join_params_default_to_inner() {
        let request = params("postgresql.policies", None).into_request().unwrap();
        assert_eq!(request.kind, JoinKind::Inner);
        assert_eq!(request.left, TableRef::new(SourceDomain::Postgresql, "policies"));
        assert_eq!(request.right.domain, SourceDomain::Cassandra);
    }

    #[test]
    fn test_join_params_reject_bad_input() {
        assert!(matches!(
            params("policies", None).into_request(),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            params("postgresql.policies", Some("outer")).into_request(),
            Err(ApiError::Analytics(_))
        ));
    }

    #[test]
    fn test_window_parameters_are_bounded() {
        assert_eq!(bounded("months", 12, MAX_GROWTH_MONTHS).unwrap(), 12);
        assert_eq!(bounded("hours", MAX_ACTIVITY_HOURS, MAX_ACTIVITY_HOURS).unwrap(), MAX_ACTIVITY_HOURS);
        let err = bounded("hours", u32::MAX, MAX_ACTIVITY_HOURS).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert!(err.to_string().contains("hours must be at most 87600"));
    }
}
