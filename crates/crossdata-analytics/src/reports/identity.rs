//! Single-table profiles of the identity system: users, clients and
//! beneficiaries. Every column is optional; an absent one empties its section.

use std::collections::HashSet;

use chrono::Duration;
use serde::Serialize;

use super::{age_in_years, present_count, AnalyticsEngine, DataSources};
use crate::aggregate::{aggregate, describe, round1, round2, value_counts, AggFn, AggregateSpec};
use crate::binning::{BinDistribution, Bins};
use crate::error::Result;
use crate::ordered::{Counts, OrderedMap};
use crate::timeseries::{period_counts, PeriodUnit};
use crossdata_domain::{KeyValue, SourceDomain, Table, Value};

const TOP_ENTRIES: usize = 10;
const RECENT_DAYS: i64 = 30;
const REGISTRATION_MONTHS: usize = 12;

// =============================================================================
// USERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserDataQuality {
    pub missing_emails: usize,
    pub missing_phones: usize,
    pub duplicate_emails: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatistics {
    pub total_users: usize,
    pub users_by_role: Counts,
    pub users_by_state: Counts,
    pub recent_registrations: usize,
    pub top_cities: Counts,
    pub monthly_registrations: Counts,
    pub data_quality: UserDataQuality,
    pub data_sources: DataSources,
}

// =============================================================================
// CLIENTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeStatistics {
    pub average_age: f64,
    pub median_age: f64,
    pub min_age: f64,
    pub max_age: f64,
    pub age_distribution: BinDistribution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommonNames {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_names: Option<Counts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_names: Option<Counts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientCompleteness {
    pub has_birth_date: usize,
    pub has_first_name: usize,
    pub has_last_name: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientDemographics {
    pub total_clients: usize,
    pub document_types: Counts,
    pub age_statistics: Option<AgeStatistics>,
    pub common_names: CommonNames,
    pub data_completeness: ClientCompleteness,
    pub data_sources: DataSources,
}

// =============================================================================
// BENEFICIARIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeneficiariesPerClient {
    pub avg_beneficiaries_per_client: f64,
    pub max_beneficiaries_per_client: usize,
    pub clients_with_multiple_beneficiaries: usize,
    /// `beneficiary count -> clients holding that many`.
    pub distribution: Counts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeneficiaryAges {
    pub average_age: f64,
    /// Mean age per relationship, alphabetically.
    pub age_by_relationship: OrderedMap<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeneficiaryRelationships {
    pub total_beneficiaries: usize,
    pub relationship_distribution: Counts,
    pub beneficiaries_per_client: Option<BeneficiariesPerClient>,
    pub age_analysis: Option<BeneficiaryAges>,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Roles, locations, recent sign-ups and contact completeness of `users`.
    ///
    /// # Errors
    ///
    /// Propagates the source failure for `users`.
    #[tracing::instrument(skip(self))]
    pub async fn user_statistics(&self) -> Result<UserStatistics> {
        let users = self.load(SourceDomain::Mysql, "users").await?;

        let recent_registrations = self
            .as_of
            .checked_sub_signed(Duration::days(RECENT_DAYS))
            .and_then(|cutoff| {
                let created = users.datetimes("created_at")?;
                Some(created.into_iter().flatten().filter(|at| *at >= cutoff).count())
            })
            .unwrap_or(0);

        let data_quality = UserDataQuality {
            missing_emails: users.null_count("email").unwrap_or(0),
            missing_phones: users.null_count("phone").unwrap_or(0),
            duplicate_emails: duplicate_count(&users, "email"),
        };

        tracing::info!(users = users.len(), recent_registrations, "User statistics computed");

        Ok(UserStatistics {
            total_users: users.len(),
            users_by_role: value_counts(&users, "role").unwrap_or_default(),
            users_by_state: top_counts(&users, "state"),
            recent_registrations,
            top_cities: top_counts(&users, "city"),
            monthly_registrations: period_counts(
                &users,
                "created_at",
                PeriodUnit::Month,
                Some(REGISTRATION_MONTHS),
            )
            .unwrap_or_default(),
            data_quality,
            data_sources: DataSources::new()
                .tables(SourceDomain::Mysql, &["users"])
                .analysis_period(format!("Last {RECENT_DAYS} days")),
        })
    }

    /// Document types, ages and common names of `clients`.
    ///
    /// # Errors
    ///
    /// Propagates the source failure for `clients`.
    #[tracing::instrument(skip(self))]
    pub async fn client_demographics(&self) -> Result<ClientDemographics> {
        let clients = self.load(SourceDomain::Mysql, "clients").await?;

        let age_statistics = self.ages(&clients).and_then(|ages| {
            let summary = describe(&ages)?;
            Some(AgeStatistics {
                average_age: round1(summary.mean),
                median_age: summary.median,
                min_age: summary.min,
                max_age: summary.max,
                age_distribution: Bins::age().distribution(ages.into_iter().map(Some)),
            })
        });

        let common_names = CommonNames {
            first_names: clients.has_column("first_name").then(|| top_counts(&clients, "first_name")),
            last_names: clients.has_column("last_name").then(|| top_counts(&clients, "last_name")),
        };

        tracing::info!(clients = clients.len(), "Client demographics computed");

        Ok(ClientDemographics {
            total_clients: clients.len(),
            document_types: value_counts(&clients, "document_type").unwrap_or_default(),
            age_statistics,
            common_names,
            data_completeness: ClientCompleteness {
                has_birth_date: present_count(&clients, "birth_date"),
                has_first_name: present_count(&clients, "first_name"),
                has_last_name: present_count(&clients, "last_name"),
            },
            data_sources: DataSources::new().tables(SourceDomain::Mysql, &["clients"]),
        })
    }

    /// Relationship mix, per-client counts and ages of `beneficiaries`.
    ///
    /// # Errors
    ///
    /// Propagates the source failure for `beneficiaries`.
    #[tracing::instrument(skip(self))]
    pub async fn beneficiary_relationships(&self) -> Result<BeneficiaryRelationships> {
        let beneficiaries = self.load(SourceDomain::Mysql, "beneficiaries").await?;

        let beneficiaries_per_client = value_counts(&beneficiaries, "client_id")
            .filter(|per_client| !per_client.is_empty())
            .map(|per_client| per_client_summary(&per_client));

        let age_analysis = self.beneficiary_ages(&beneficiaries);

        tracing::info!(beneficiaries = beneficiaries.len(), "Beneficiary relationships computed");

        Ok(BeneficiaryRelationships {
            total_beneficiaries: beneficiaries.len(),
            relationship_distribution: value_counts(&beneficiaries, "relationship").unwrap_or_default(),
            beneficiaries_per_client,
            age_analysis,
            data_sources: DataSources::new().tables(SourceDomain::Mysql, &["beneficiaries"]),
        })
    }

    /// Ages of the rows with a parseable `birth_date`; `None` without the column.
    #[allow(clippy::cast_precision_loss)]
    fn ages(&self, table: &Table) -> Option<Vec<f64>> {
        let born = table.datetimes("birth_date")?;
        Some(
            born.into_iter()
                .flatten()
                .map(|at| age_in_years(at, self.as_of) as f64)
                .collect(),
        )
    }

    fn beneficiary_ages(&self, beneficiaries: &Table) -> Option<BeneficiaryAges> {
        let born = beneficiaries.datetimes("birth_date")?;
        let ages: Vec<Value> = born
            .into_iter()
            .map(|at| at.map_or(Value::Null, |at| Value::from(age_in_years(at, self.as_of))))
            .collect();
        let numeric: Vec<f64> = ages.iter().filter_map(Value::as_f64).collect();
        let summary = describe(&numeric)?;

        let with_age = beneficiaries.with_column("age", ages);
        let age_by_relationship: OrderedMap<f64> = aggregate(
            &with_age,
            &["relationship"],
            &[AggregateSpec::new("age", AggFn::Mean)],
        )
        .groups()
        .iter()
        .filter_map(|group| Some((group.key.render(), round1(group.number("age_mean")?))))
        .collect::<OrderedMap<f64>>()
        .sorted_by(|a, b| a.0.cmp(&b.0));

        Some(BeneficiaryAges {
            average_age: round1(summary.mean),
            age_by_relationship,
        })
    }
}

/// Top value counts of an optional column.
fn top_counts(table: &Table, column: &str) -> Counts {
    value_counts(table, column).unwrap_or_default().head(TOP_ENTRIES)
}

/// Non-null cells repeating an earlier value of the same column.
fn duplicate_count(table: &Table, column: &str) -> usize {
    let Some(cells) = table.column(column) else {
        return 0;
    };
    let mut seen: HashSet<KeyValue> = HashSet::new();
    cells
        .filter_map(Value::key)
        .filter(|key| !seen.insert(key.clone()))
        .count()
}

fn per_client_summary(per_client: &Counts) -> BeneficiariesPerClient {
    let mut distribution = Counts::new();
    for count in per_client.values() {
        distribution.increment(&count.to_string());
    }
    #[allow(clippy::cast_precision_loss)]
    let average = per_client.total() as f64 / per_client.len() as f64;

    BeneficiariesPerClient {
        avg_beneficiaries_per_client: round2(average),
        max_beneficiaries_per_client: per_client.values().copied().max().unwrap_or(0),
        clients_with_multiple_beneficiaries: per_client.values().filter(|c| **c > 1).count(),
        distribution: distribution.by_count_desc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures::{self, at};
    use crossdata_storage::InMemorySource;

    fn users() -> Table {
        Table::from_rows(
            ["id", "role", "state", "city", "email", "phone", "created_at"],
            vec![
                vec![1.into(), "admin".into(), "Lima".into(), "Miraflores".into(), "a@x.pe".into(), "1".into(), at(2024, 6, 20, 9)],
                vec![2.into(), "client".into(), "Lima".into(), "Surco".into(), "b@x.pe".into(), Value::Null, at(2024, 6, 1, 13)],
                vec![3.into(), "client".into(), "Cusco".into(), "Cusco".into(), "a@x.pe".into(), "3".into(), at(2024, 5, 31, 9)],
                vec![4.into(), "client".into(), "Lima".into(), "Surco".into(), Value::Null, "4".into(), at(2023, 12, 2, 9)],
            ],
        )
    }

    #[tokio::test]
    async fn test_user_statistics() {
        let source = InMemorySource::new().with_table(SourceDomain::Mysql, "users", users());
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.user_statistics().await.unwrap();

        assert_eq!(report.total_users, 4);
        assert_eq!(report.users_by_role.count("client"), 3);
        assert_eq!(report.users_by_state.keys().next(), Some("Lima"));
        assert_eq!(report.top_cities.count("Surco"), 2);
        assert_eq!(report.recent_registrations, 2);
        assert_eq!(
            report.monthly_registrations.keys().collect::<Vec<_>>(),
            vec!["2023-12", "2024-05", "2024-06"]
        );
        assert_eq!(report.monthly_registrations.count("2024-06"), 2);
        assert_eq!(
            report.data_quality,
            UserDataQuality {
                missing_emails: 1,
                missing_phones: 1,
                duplicate_emails: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_user_statistics_with_sparse_columns() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.user_statistics().await.unwrap();

        assert_eq!(report.total_users, 4);
        assert!(report.users_by_role.is_empty());
        assert!(report.top_cities.is_empty());
        assert_eq!(report.recent_registrations, 2);
        assert_eq!(report.data_quality.missing_emails, 0);
        assert_eq!(report.data_quality.duplicate_emails, 0);
    }

    #[tokio::test]
    async fn test_client_demographics() {
        let clients = fixtures::clients()
            .with_column("document_type", vec!["DNI".into(), "DNI".into(), "CE".into()])
            .with_column("first_name", vec!["Ana".into(), "Ana".into(), Value::Null]);
        let source = InMemorySource::new().with_table(SourceDomain::Mysql, "clients", clients);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.client_demographics().await.unwrap();

        assert_eq!(report.total_clients, 3);
        assert_eq!(report.document_types.count("DNI"), 2);

        let ages = report.age_statistics.unwrap();
        assert_eq!(ages.average_age, 40.3);
        assert_eq!(ages.median_age, 34.0);
        assert_eq!(ages.min_age, 23.0);
        assert_eq!(ages.max_age, 64.0);
        assert_eq!(ages.age_distribution.counts.count("<25"), 1);
        assert_eq!(ages.age_distribution.counts.count("25-34"), 1);
        assert_eq!(ages.age_distribution.counts.count("55-64"), 1);

        assert_eq!(report.common_names.first_names.unwrap().count("Ana"), 2);
        assert!(report.common_names.last_names.is_none());
        assert_eq!(
            report.data_completeness,
            ClientCompleteness {
                has_birth_date: 3,
                has_first_name: 2,
                has_last_name: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_client_demographics_without_birth_dates() {
        let clients = Table::from_rows(["id"], vec![vec![1.into()]]);
        let source = InMemorySource::new().with_table(SourceDomain::Mysql, "clients", clients);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.client_demographics().await.unwrap();

        assert!(report.age_statistics.is_none());
        assert_eq!(report.common_names, CommonNames::default());
    }

    #[tokio::test]
    async fn test_beneficiary_relationships() {
        let beneficiaries = Table::from_rows(
            ["id", "client_id", "relationship", "birth_date"],
            vec![
                vec![1.into(), 10.into(), "child".into(), at(2014, 1, 1, 0)],
                vec![2.into(), 10.into(), "spouse".into(), at(1990, 1, 1, 0)],
                vec![3.into(), 11.into(), "child".into(), at(2018, 1, 1, 0)],
                vec![4.into(), 12.into(), "parent".into(), at(1950, 1, 1, 0)],
            ],
        );
        let source = InMemorySource::new().with_table(SourceDomain::Mysql, "beneficiaries", beneficiaries);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.beneficiary_relationships().await.unwrap();

        assert_eq!(report.total_beneficiaries, 4);
        assert_eq!(report.relationship_distribution.count("child"), 2);

        let per_client = report.beneficiaries_per_client.unwrap();
        assert_eq!(per_client.avg_beneficiaries_per_client, 1.33);
        assert_eq!(per_client.max_beneficiaries_per_client, 2);
        assert_eq!(per_client.clients_with_multiple_beneficiaries, 1);
        assert_eq!(per_client.distribution.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(per_client.distribution.count("1"), 2);

        let ages = report.age_analysis.unwrap();
        assert_eq!(ages.average_age, 31.0);
        assert_eq!(
            ages.age_by_relationship.iter().collect::<Vec<_>>(),
            vec![("child", &8.0), ("parent", &74.0), ("spouse", &34.0)]
        );
    }

    #[tokio::test]
    async fn test_beneficiaries_without_optional_columns() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.beneficiary_relationships().await.unwrap();

        assert_eq!(report.total_beneficiaries, 2);
        assert!(report.age_analysis.is_none());
        let per_client = report.beneficiaries_per_client.unwrap();
        assert_eq!(per_client.clients_with_multiple_beneficiaries, 0);
    }
}
