//! Data quality report over the identity tables, with a Markdown rendering.

use serde::Serialize;

use super::{AnalyticsEngine, DataSources};
use crate::aggregate::round2;
use crate::error::Result;
use crate::ordered::OrderedMap;
use crate::quality::{assess_table, check_integrity, recommendations, IntegrityReport, QualityRecommendation, QualityReport};
use crossdata_domain::SourceDomain;

const TABLES: [&str; 4] = ["users", "clients", "agents", "beneficiaries"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub total_records: usize,
    pub overall_completeness_score: f64,
    pub timestamp: String,
}

/// Foreign keys checked across the identity tables. A side is absent when
/// either key column is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RelationshipIntegrity {
    /// `clients.user_id -> users.id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients_users: Option<IntegrityReport>,
    /// `beneficiaries.client_id -> clients.user_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiaries_clients: Option<IntegrityReport>,
}

impl RelationshipIntegrity {
    fn checked(&self) -> impl Iterator<Item = (&'static str, &IntegrityReport)> + '_ {
        [
            ("clients_users", self.clients_users.as_ref()),
            ("beneficiaries_clients", self.beneficiaries_clients.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, report)| report.map(|r| (name, r)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub summary: QualitySummary,
    pub table_quality: OrderedMap<QualityReport>,
    pub referential_integrity: RelationshipIntegrity,
    pub recommendations: Vec<QualityRecommendation>,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Completeness, duplication and referential integrity of the mysql
    /// identity tables.
    ///
    /// # Errors
    ///
    /// Propagates source failures for any of the four tables.
    #[tracing::instrument(skip(self))]
    pub async fn data_quality_report(&self) -> Result<DataQualityReport> {
        let (users, clients, agents, beneficiaries) = tokio::try_join!(
            self.load(SourceDomain::Mysql, "users"),
            self.load(SourceDomain::Mysql, "clients"),
            self.load(SourceDomain::Mysql, "agents"),
            self.load(SourceDomain::Mysql, "beneficiaries"),
        )?;
        let tables = [&users, &clients, &agents, &beneficiaries];

        let table_quality: OrderedMap<QualityReport> = TABLES
            .iter()
            .zip(tables)
            .map(|(name, table)| (*name, assess_table(table)))
            .collect();

        let referential_integrity = RelationshipIntegrity {
            clients_users: check_integrity(&clients, "user_id", &users, "id"),
            beneficiaries_clients: check_integrity(&beneficiaries, "client_id", &clients, "user_id"),
        };

        let scores: Vec<f64> = table_quality.values().map(|q| q.completeness_score).collect();
        #[allow(clippy::cast_precision_loss)]
        let overall = scores.iter().sum::<f64>() / scores.len() as f64;

        let findings = {
            let tables: Vec<(&str, &QualityReport)> = table_quality.iter().collect();
            let relationships: Vec<(&str, &IntegrityReport)> = referential_integrity.checked().collect();
            recommendations(tables, relationships)
        };

        let summary = QualitySummary {
            total_records: tables.iter().map(|t| t.len()).sum(),
            overall_completeness_score: round2(overall),
            timestamp: self.as_of.format("%Y-%m-%dT%H:%M:%S").to_string(),
        };

        tracing::info!(
            total_records = summary.total_records,
            completeness = summary.overall_completeness_score,
            findings = findings.len(),
            "Data quality report computed"
        );

        Ok(DataQualityReport {
            summary,
            table_quality,
            referential_integrity,
            recommendations: findings,
            data_sources: DataSources::new()
                .tables(SourceDomain::Mysql, &TABLES)
                .join_key("clients.user_id -> users.id")
                .join_key("beneficiaries.client_id -> clients.user_id"),
        })
    }
}

impl DataQualityReport {
    /// Render as a Markdown document.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# Data Quality Report\n\n");
        md.push_str(&format!("**Generated:** {}\n\n", self.summary.timestamp));

        md.push_str("## Summary\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Total Records | {} |\n", self.summary.total_records));
        md.push_str(&format!(
            "| Overall Completeness | {:.1}% |\n",
            self.summary.overall_completeness_score
        ));
        md.push('\n');

        if !self.table_quality.is_empty() {
            md.push_str("## Table Quality\n\n");
            md.push_str("| Table | Rows | Columns | Completeness | Duplicates |\n");
            md.push_str("|-------|------|---------|--------------|------------|\n");
            for (table, quality) in self.table_quality.iter() {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.1}% | {} ({:.1}%) |\n",
                    table,
                    quality.row_count,
                    quality.column_count,
                    quality.completeness_score,
                    quality.duplicate_rows,
                    quality.duplicate_percentage
                ));
            }
            md.push('\n');
        }

        let relationships: Vec<_> = self.referential_integrity.checked().collect();
        if !relationships.is_empty() {
            md.push_str("## Referential Integrity\n\n");
            md.push_str("| Relationship | Valid | Total | Integrity | Orphans |\n");
            md.push_str("|--------------|-------|-------|-----------|---------|\n");
            for (name, integrity) in relationships {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.1}% | {} |\n",
                    name,
                    integrity.valid_count,
                    integrity.total_count,
                    integrity.integrity_percentage,
                    integrity.orphan_count
                ));
            }
            md.push('\n');
        }

        md.push_str("## Recommendations\n\n");
        for recommendation in &self.recommendations {
            md.push_str(&format!("- {recommendation}\n"));
        }

        md
    }
}
