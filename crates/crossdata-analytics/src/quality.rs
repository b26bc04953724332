//! # Data Quality & Referential Integrity
//!
//! Per-table completeness and duplication scoring, plus existence checks on
//! foreign keys that no source enforces.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::aggregate::{percentage, round2};
use crate::ordered::{Counts, OrderedMap};
use crossdata_domain::{ColumnKind, KeyValue, Table};

/// Completeness below this flags the table.
pub const MIN_COMPLETENESS: f64 = 90.0;
/// Duplicate percentage above this flags the table.
pub const MAX_DUPLICATE_PERCENTAGE: f64 = 1.0;
/// Integrity below this flags the relationship.
pub const MIN_INTEGRITY: f64 = 95.0;

// =============================================================================
// TABLE QUALITY
// =============================================================================

/// Quality scores of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub row_count: usize,
    pub column_count: usize,
    pub null_counts: Counts,
    pub null_percentages: OrderedMap<f64>,
    pub duplicate_rows: usize,
    pub duplicate_percentage: f64,
    /// Mean column completeness in percent; 0 when `no_data`.
    pub completeness_score: f64,
    /// Set when the table has no rows.
    pub no_data: bool,
    pub kind_distribution: BTreeMap<ColumnKind, usize>,
}

/// Score completeness and duplication of `table`.
#[must_use]
pub fn assess_table(table: &Table) -> QualityReport {
    let rows = table.len();
    let mut null_counts = Counts::new();
    let mut null_percentages = OrderedMap::new();
    let mut kind_distribution = BTreeMap::new();

    #[allow(clippy::cast_precision_loss)]
    let rows_f = rows as f64;

    for name in table.columns() {
        let nulls = table.null_count(name).unwrap_or(0);
        null_counts.insert(name.as_str(), nulls);
        #[allow(clippy::cast_precision_loss)]
        null_percentages.insert(name.as_str(), percentage(nulls as f64, rows_f).value);
        if let Some(spec) = table.column_spec(name) {
            *kind_distribution.entry(spec.kind).or_insert(0) += 1;
        }
    }

    let mut seen = HashSet::new();
    let duplicate_rows = table.rows().filter(|row| !seen.insert(row.fingerprint())).count();

    let completeness_score = if rows == 0 {
        0.0
    } else if null_counts.is_empty() {
        100.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let mean = null_counts
            .values()
            .map(|&nulls| (rows - nulls) as f64 / rows_f)
            .sum::<f64>()
            / null_counts.len() as f64;
        round2(mean * 100.0)
    };

    #[allow(clippy::cast_precision_loss)]
    let duplicate_percentage = percentage(duplicate_rows as f64, rows_f).value;

    QualityReport {
        row_count: rows,
        column_count: table.column_count(),
        null_counts,
        null_percentages,
        duplicate_rows,
        duplicate_percentage,
        completeness_score,
        no_data: rows == 0,
        kind_distribution,
    }
}

// =============================================================================
// REFERENTIAL INTEGRITY
// =============================================================================

/// Outcome of a foreign-key existence check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub valid_count: usize,
    pub total_count: usize,
    pub integrity_percentage: f64,
    pub orphan_count: usize,
}

/// Check that every `child.child_key` value exists in `parent.parent_key`.
///
/// Null child keys count as orphans. `None` when either key column is absent.
#[must_use]
pub fn check_integrity(child: &Table, child_key: &str, parent: &Table, parent_key: &str) -> Option<IntegrityReport> {
    let parent_keys: HashSet<KeyValue> = parent.column(parent_key)?.filter_map(|v| v.key()).collect();
    let child_values = child.column(child_key)?;

    let total_count = child.len();
    let valid_count = child_values
        .filter(|v| v.key().is_some_and(|k| parent_keys.contains(&k)))
        .count();

    #[allow(clippy::cast_precision_loss)]
    let integrity_percentage = percentage(valid_count as f64, total_count as f64).value;

    Some(IntegrityReport {
        valid_count,
        total_count,
        integrity_percentage,
        orphan_count: total_count - valid_count,
    })
}

// =============================================================================
// RECOMMENDATIONS
// =============================================================================

/// Finding produced by [`recommendations`].
#[derive(Debug, Clone, PartialEq)]
pub enum QualityRecommendation {
    ImproveCompleteness { table: String, score: f64 },
    RemoveDuplicates { table: String, rows: usize },
    FixOrphans { relationship: String },
    Acceptable,
}

impl fmt::Display for QualityRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImproveCompleteness { table, score } => {
                write!(f, "Improve data completeness in table {table} ({score:.1}%)")
            }
            Self::RemoveDuplicates { table, rows } => {
                write!(f, "Review and remove duplicates in table {table} ({rows} records)")
            }
            Self::FixOrphans { relationship } => {
                write!(f, "Fix orphaned references in relationship {relationship}")
            }
            Self::Acceptable => f.write_str("Data quality is in good overall condition"),
        }
    }
}

impl Serialize for QualityRecommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fixed-threshold recommendations. Tables first (completeness, then
/// duplicates), then relationships; `Acceptable` alone when nothing fires.
#[must_use]
pub fn recommendations<'t, 'r>(
    tables: impl IntoIterator<Item = (&'t str, &'t QualityReport)>,
    relationships: impl IntoIterator<Item = (&'r str, &'r IntegrityReport)>,
) -> Vec<QualityRecommendation> {
    let mut found = Vec::new();

    for (table, report) in tables {
        if report.completeness_score < MIN_COMPLETENESS {
            found.push(QualityRecommendation::ImproveCompleteness {
                table: table.to_string(),
                score: report.completeness_score,
            });
        }
        if report.duplicate_percentage > MAX_DUPLICATE_PERCENTAGE {
            found.push(QualityRecommendation::RemoveDuplicates {
                table: table.to_string(),
                rows: report.duplicate_rows,
            });
        }
    }

    for (relationship, integrity) in relationships {
        if integrity.integrity_percentage < MIN_INTEGRITY {
            found.push(QualityRecommendation::FixOrphans {
                relationship: relationship.to_string(),
            });
        }
    }

    if found.is_empty() {
        found.push(QualityRecommendation::Acceptable);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossdata_domain::Value;
    use fake::Fake;
    use fake::faker::internet::en::SafeEmail;
    use fake::faker::name::en::FirstName;

    fn users(n: usize) -> Table {
        Table::from_rows(
            ["id", "first_name", "email"],
            (1..=n)
                .map(|i| {
                    vec![
                        i.into(),
                        FirstName().fake::<String>().into(),
                        SafeEmail().fake::<String>().into(),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_complete_table_scores_100() {
        let report = assess_table(&users(20));
        assert_eq!(report.row_count, 20);
        assert_eq!(report.completeness_score, 100.0);
        assert_eq!(report.null_counts.count("email"), 0);
        assert!(!report.no_data);
        assert_eq!(report.kind_distribution.get(&ColumnKind::Identifier), Some(&1));
    }

    #[test]
    fn test_nulls_and_duplicates() {
        let table = Table::from_rows(
            ["id", "phone"],
            vec![
                vec![1.into(), Value::Null],
                vec![2.into(), "555".into()],
                vec![1.into(), Value::Null],
                vec![3.into(), Value::Null],
            ],
        );
        let report = assess_table(&table);
        assert_eq!(report.null_counts.count("phone"), 3);
        assert_eq!(report.null_percentages.get("phone"), Some(&75.0));
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.duplicate_percentage, 25.0);
        assert_eq!(report.completeness_score, 62.5);
    }

    #[test]
    fn test_empty_table_has_no_data_flag() {
        let report = assess_table(&Table::new(["id"]));
        assert!(report.no_data);
        assert_eq!(report.completeness_score, 0.0);
        assert_eq!(report.duplicate_percentage, 0.0);

        let no_columns = Table::from_rows(Vec::<String>::new(), vec![vec![], vec![]]);
        assert_eq!(assess_table(&no_columns).completeness_score, 100.0);
    }

    #[test]
    fn test_subset_child_has_full_integrity() {
        let parent = users(10);
        let child = Table::from_rows(
            ["user_id"],
            (1..=10).step_by(3).map(|i: usize| vec![i.into()]).collect(),
        );
        let report = check_integrity(&child, "user_id", &parent, "id").unwrap();
        assert_eq!(report.integrity_percentage, 100.0);
        assert_eq!(report.orphan_count, 0);
        assert_eq!(report.valid_count, 4);
    }

    #[test]
    fn test_disjoint_child_has_zero_integrity() {
        let parent = users(5);
        let child = Table::from_rows(
            ["user_id"],
            vec![vec![100.into()], vec![Value::Null], vec![200.into()]],
        );
        let report = check_integrity(&child, "user_id", &parent, "id").unwrap();
        assert_eq!(report.integrity_percentage, 0.0);
        assert_eq!(report.orphan_count, 3);

        let empty = check_integrity(&Table::new(["user_id"]), "user_id", &parent, "id").unwrap();
        assert_eq!(empty.integrity_percentage, 0.0);
        assert!(check_integrity(&child, "client_id", &parent, "id").is_none());
    }

    #[test]
    fn test_recommendation_rules() {
        let clean = assess_table(&users(5));
        let sparse = QualityReport {
            completeness_score: 80.0,
            duplicate_percentage: 2.5,
            duplicate_rows: 3,
            ..clean.clone()
        };
        let weak = IntegrityReport {
            valid_count: 90,
            total_count: 100,
            integrity_percentage: 90.0,
            orphan_count: 10,
        };
        let strong = IntegrityReport {
            integrity_percentage: 95.0,
            ..weak
        };

        let found = recommendations([("users", &clean), ("clients", &sparse)], [("clients_users", &weak), ("ok", &strong)]);
        assert_eq!(
            found,
            vec![
                QualityRecommendation::ImproveCompleteness {
                    table: "clients".to_string(),
                    score: 80.0
                },
                QualityRecommendation::RemoveDuplicates {
                    table: "clients".to_string(),
                    rows: 3
                },
                QualityRecommendation::FixOrphans {
                    relationship: "clients_users".to_string()
                },
            ]
        );

        let none = recommendations([("users", &clean)], Vec::<(&str, &IntegrityReport)>::new());
        assert_eq!(none, vec![QualityRecommendation::Acceptable]);
        assert_eq!(none[0].to_string(), "Data quality is in good overall condition");
    }

    #[test]
    fn test_recommendations_release_borrowed_reports() {
        let mut reports: crate::ordered::OrderedMap<QualityReport> = crate::ordered::OrderedMap::new();
        reports.insert("users", assess_table(&users(3)));

        let found = {
            let tables: Vec<(&str, &QualityReport)> = reports.iter().collect();
            recommendations(tables, Vec::<(&str, &IntegrityReport)>::new())
        };
        let owned = reports;

        assert_eq!(found, vec![QualityRecommendation::Acceptable]);
        assert_eq!(owned.len(), 1);
    }
}
