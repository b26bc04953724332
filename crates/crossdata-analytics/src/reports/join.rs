//! Ad-hoc join of any two catalogued tables.

use serde::Serialize;

use super::{AnalyticsEngine, DataSources, ReportOutcome};
use crate::error::Result;
use crate::join::{join, JoinKind, Suffixes};
use crossdata_domain::TableRef;
use crossdata_storage::{describe_table, TableInfo};

/// Tables and keys of an ad-hoc join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinRequest {
    pub left: TableRef,
    pub left_key: String,
    pub right: TableRef,
    pub right_key: String,
    pub kind: JoinKind,
}

/// Shape of the joined table next to its inputs.
#[derive(Debug, Clone, Serialize)]
pub struct CrossSourceJoin {
    pub request: JoinRequest,
    pub left_rows: usize,
    pub right_rows: usize,
    pub result: TableInfo,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Join two tables, possibly from different sources, and describe the
    /// result. Colliding names get `_left` / `_right`.
    ///
    /// # Errors
    ///
    /// Propagates source failures for either table.
    #[tracing::instrument(skip(self), fields(left = %request.left, right = %request.right))]
    pub async fn cross_source_join(&self, request: JoinRequest) -> Result<ReportOutcome<CrossSourceJoin>> {
        let (left, right) = tokio::try_join!(
            self.load(request.left.domain, &request.left.table),
            self.load(request.right.domain, &request.right.table),
        )?;

        let joined = match join(&left, &request.left_key, &right, &request.right_key, request.kind, Suffixes::LEFT_RIGHT) {
            Ok(joined) => joined,
            Err(reason) => return Ok(ReportOutcome::unavailable(reason.to_string())),
        };

        tracing::info!(
            left_rows = left.len(),
            right_rows = right.len(),
            joined_rows = joined.len(),
            kind = %request.kind,
            "Cross-source join complete"
        );

        let data_sources = DataSources::new()
            .tables(request.left.domain, &[request.left.table.as_str()])
            .tables(request.right.domain, &[request.right.table.as_str()])
            .join_key(format!(
                "{}.{} -> {}.{}",
                request.left, request.left_key, request.right, request.right_key
            ))
            .join_approach(format!("{} join", request.kind));

        Ok(ReportOutcome::Ready(CrossSourceJoin {
            left_rows: left.len(),
            right_rows: right.len(),
            result: describe_table(&joined),
            request,
            data_sources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures;
    use crossdata_domain::SourceDomain;

    fn request(left_key: &str, kind: JoinKind) -> JoinRequest {
        JoinRequest {
            left: TableRef::new(SourceDomain::Postgresql, "policies"),
            left_key: left_key.to_string(),
            right: TableRef::new(SourceDomain::Cassandra, "reclamos"),
            right_key: "policy_id".to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_policies_with_claims() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let left = engine
            .cross_source_join(request("id", JoinKind::Left))
            .await
            .unwrap()
            .into_ready()
            .unwrap();
        assert_eq!(left.left_rows, 3);
        assert_eq!(left.right_rows, 3);
        assert_eq!(left.result.rows, 4);
        assert!(left.result.column_names.contains(&"id_left".to_string()));
        assert!(left.result.column_names.contains(&"id_right".to_string()));
        assert_eq!(left.result.null_counts["estado"], 1);
        assert_eq!(
            left.data_sources.join_keys,
            vec!["postgresql.policies.id -> cassandra.reclamos.policy_id".to_string()]
        );
        assert_eq!(left.data_sources.join_approach.as_deref(), Some("left join"));

        let inner = engine
            .cross_source_join(request("id", JoinKind::Inner))
            .await
            .unwrap()
            .into_ready()
            .unwrap();
        assert_eq!(inner.result.rows, 3);
        assert_eq!(inner.result.null_counts["estado"], 0);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let outcome = engine
            .cross_source_join(request("policy_uuid", JoinKind::Inner))
            .await
            .unwrap();
        assert_eq!(
            outcome.error(),
            Some("cannot join on policy_uuid -> policy_id: key column missing on left side")
        );
    }
}
