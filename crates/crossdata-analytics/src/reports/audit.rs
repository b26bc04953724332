//! Transaction audit trail: service usage, hourly load and operation mix.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AnalyticsEngine, DataSources};
use crate::aggregate::{nunique, value_counts};
use crate::error::Result;
use crate::ordered::Counts;
use crate::timeseries::hour_counts;
use crossdata_domain::SourceDomain;

const TOP_SERVICES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceUsage {
    pub top_services: Counts,
    pub total_services: usize,
    pub service_usage_distribution: Counts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditTemporal {
    pub hourly_distribution: BTreeMap<u32, usize>,
    /// Earliest hour among those with the most entries.
    pub peak_hour: Option<u32>,
    /// Earliest hour among those with the fewest entries.
    pub lowest_activity_hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMix {
    pub operation_types: Counts,
    pub most_common_operation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionAudit {
    pub total_transactions: usize,
    pub service_analysis: Option<ServiceUsage>,
    pub temporal_analysis: Option<AuditTemporal>,
    pub operation_analysis: Option<OperationMix>,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Whole-history profile of `transaction_audit`.
    ///
    /// # Errors
    ///
    /// Propagates the source failure for `transaction_audit`.
    #[tracing::instrument(skip(self))]
    pub async fn transaction_audit(&self) -> Result<TransactionAudit> {
        let audit = self.load(SourceDomain::Cassandra, "transaction_audit").await?;

        let service_analysis = value_counts(&audit, "servicio").map(|services| ServiceUsage {
            top_services: services.clone().head(TOP_SERVICES),
            total_services: nunique(&audit, "servicio").unwrap_or(0),
            service_usage_distribution: services,
        });

        let temporal_analysis = hour_counts(&audit, "timestamp").map(|hourly| AuditTemporal {
            peak_hour: extreme_hour(&hourly, |count, best| count > best),
            lowest_activity_hour: extreme_hour(&hourly, |count, best| count < best),
            hourly_distribution: hourly,
        });

        let operation_analysis = value_counts(&audit, "operacion").map(|operations| {
            let most_common_operation = operations.keys().next().map(str::to_string);
            OperationMix {
                most_common_operation,
                operation_types: operations,
            }
        });

        tracing::info!(transactions = audit.len(), "Transaction audit computed");

        Ok(TransactionAudit {
            total_transactions: audit.len(),
            service_analysis,
            temporal_analysis,
            operation_analysis,
            data_sources: DataSources::new()
                .tables(SourceDomain::Cassandra, &["transaction_audit"])
                .analysis_type("audit_trail"),
        })
    }
}

/// First hour (ascending) whose count beats every earlier one under `better`.
fn extreme_hour(hourly: &BTreeMap<u32, usize>, better: impl Fn(usize, usize) -> bool) -> Option<u32> {
    hourly
        .iter()
        .fold(None, |best: Option<(u32, usize)>, (&hour, &count)| match best {
            Some((_, top)) if !better(count, top) => best,
            _ => Some((hour, count)),
        })
        .map(|(hour, _)| hour)
}
