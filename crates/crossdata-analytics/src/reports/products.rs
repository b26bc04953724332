//! Product catalogue profile and product profitability from policies sold
//! against the catalogue.

use serde::Serialize;

use super::{present_count, text_cells, AnalyticsEngine, DataSources, ReportOutcome};
use crate::aggregate::{aggregate, describe, nunique, numbers, ratio, round1, round2, top_n, value_counts, AggFn, AggregateSpec};
use crate::binning::{BinDistribution, Bins};
use crate::error::Result;
use crate::join::{column_of, join, JoinKind, Suffixes};
use crate::ordered::{Counts, Record};
use crossdata_domain::{SourceDomain, Table, Value};

const TOP_PRODUCTS: usize = 10;
const MATRIX_ROWS: usize = 20;
const TOP_PREFIXES: usize = 5;
const PREFIX_LEN: usize = 3;
const TOP_WORDS: usize = 10;

/// Connectors left out of name word counts.
const STOP_WORDS: &[&str] = &[
    "de", "la", "el", "en", "y", "a", "que", "es", "se", "no", "te", "lo", "le", "da", "su", "por",
    "son", "con", "para", "al", "del", "los", "las", "un", "una",
];

// =============================================================================
// CATALOGUE PROFILE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PremiumStatistics {
    pub average_premium: f64,
    pub median_premium: f64,
    pub min_premium: f64,
    pub max_premium: f64,
    pub std_premium: Option<f64>,
    pub premium_distribution: BinDistribution,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormatDistribution {
    pub numeric_only: usize,
    pub alpha_only: usize,
    pub mixed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodePatterns {
    pub common_prefixes: Counts,
    pub length_distribution: Counts,
    pub format_distribution: FormatDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCodeAnalysis {
    pub unique_codes: usize,
    pub avg_code_length: f64,
    pub code_patterns: CodePatterns,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_name_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_words_in_names: Option<Counts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_description_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products_with_description: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductCompleteness {
    pub products_with_premium: usize,
    pub products_with_description: usize,
    pub products_with_type: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductAnalysis {
    pub total_products: usize,
    pub product_types: Counts,
    pub premium_statistics: Option<PremiumStatistics>,
    pub code_analysis: Option<ProductCodeAnalysis>,
    pub text_analysis: TextAnalysis,
    pub data_completeness: ProductCompleteness,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Single-table profile of the product catalogue: types, base premium
    /// spread, code formats and name vocabulary.
    ///
    /// # Errors
    ///
    /// Propagates the source failure for `products`.
    #[tracing::instrument(skip(self))]
    pub async fn product_analysis(&self) -> Result<ProductAnalysis> {
        let products = self.load(SourceDomain::Postgresql, "products").await?;

        let premium_statistics = premium_statistics(&products);
        let code_analysis = text_cells(&products, "code").map(|codes| code_analysis(&products, &codes));
        let text_analysis = text_analysis(&products);

        tracing::info!(products = products.len(), "Product analysis computed");

        Ok(ProductAnalysis {
            total_products: products.len(),
            product_types: value_counts(&products, "product_type").unwrap_or_default(),
            premium_statistics,
            code_analysis,
            text_analysis,
            data_completeness: ProductCompleteness {
                products_with_premium: present_count(&products, "base_premium"),
                products_with_description: present_count(&products, "description"),
                products_with_type: present_count(&products, "product_type"),
            },
            data_sources: DataSources::new()
                .tables(SourceDomain::Postgresql, &["products"])
                .analysis_type("product_catalogue"),
        })
    }
}

fn premium_statistics(products: &Table) -> Option<PremiumStatistics> {
    let premiums = numbers(products, "base_premium")?;
    let summary = describe(&premiums)?.rounded();
    Some(PremiumStatistics {
        average_premium: summary.mean,
        median_premium: summary.median,
        min_premium: summary.min,
        max_premium: summary.max,
        std_premium: summary.std,
        premium_distribution: Bins::base_premium().distribution(premiums.into_iter().map(Some)),
    })
}

#[allow(clippy::cast_precision_loss)]
fn mean_length(texts: &[String]) -> f64 {
    if texts.is_empty() {
        return 0.0;
    }
    let total: usize = texts.iter().map(|t| t.chars().count()).sum();
    round1(total as f64 / texts.len() as f64)
}

fn code_analysis(products: &Table, codes: &[String]) -> ProductCodeAnalysis {
    let mut prefixes = Counts::new();
    let mut lengths = Counts::new();
    let mut formats = FormatDistribution::default();
    for code in codes {
        prefixes.increment(&code.chars().take(PREFIX_LEN).collect::<String>());
        lengths.increment(&code.chars().count().to_string());
        if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
            formats.numeric_only += 1;
        } else if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphabetic()) {
            formats.alpha_only += 1;
        } else {
            formats.mixed += 1;
        }
    }

    ProductCodeAnalysis {
        unique_codes: nunique(products, "code").unwrap_or(0),
        avg_code_length: mean_length(codes),
        code_patterns: CodePatterns {
            common_prefixes: prefixes.by_count_desc().head(TOP_PREFIXES),
            length_distribution: lengths.by_count_desc(),
            format_distribution: formats,
        },
    }
}

fn text_analysis(products: &Table) -> TextAnalysis {
    let mut analysis = TextAnalysis::default();
    if let Some(names) = text_cells(products, "name") {
        analysis.avg_name_length = Some(mean_length(&names));
        analysis.common_words_in_names = Some(common_words(&names, TOP_WORDS));
    }
    if let Some(descriptions) = text_cells(products, "description").filter(|d| !d.is_empty()) {
        analysis.avg_description_length = Some(mean_length(&descriptions));
        analysis.products_with_description = Some(descriptions.len());
    }
    analysis
}

/// Most frequent lowercase words across `texts`, connectors excluded.
fn common_words(texts: &[String], top: usize) -> Counts {
    let mut words = Counts::new();
    for text in texts {
        for word in text.to_lowercase().split_whitespace() {
            if !STOP_WORDS.contains(&word) {
                words.increment(word);
            }
        }
    }
    words.by_count_desc().head(top)
}

// =============================================================================
// PROFITABILITY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitabilitySummary {
    pub total_products_with_policies: usize,
    pub total_policies_analyzed: usize,
    pub total_premium_volume: f64,
    pub average_policies_per_product: f64,
    pub average_premium_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductProfitability {
    pub summary: ProfitabilitySummary,
    pub top_products_by_volume: Vec<Record>,
    pub top_products_by_premium: Vec<Record>,
    pub top_products_by_efficiency: Vec<Record>,
    pub product_performance_matrix: Vec<Record>,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// Per-product volume, premium and exposure over policies that reference
    /// a catalogued product.
    ///
    /// # Errors
    ///
    /// Propagates source failures for `products` or `policies`.
    #[tracing::instrument(skip(self))]
    pub async fn product_profitability(&self) -> Result<ReportOutcome<ProductProfitability>> {
        let (products, policies) = tokio::try_join!(
            self.load(SourceDomain::Postgresql, "products"),
            self.load(SourceDomain::Postgresql, "policies"),
        )?;

        let sold = match join(&policies, "product_id", &products, "code", JoinKind::Inner, Suffixes::DEFAULT) {
            Ok(sold) => sold,
            Err(reason) => {
                tracing::debug!(%reason, "Product profitability skipped");
                return Ok(ReportOutcome::unavailable(
                    "Required columns not found for product profitability analysis",
                ));
            }
        };

        let product_name = format!("name{}", Suffixes::DEFAULT.right);
        let name = column_of(&sold, &["name", &product_name]).unwrap_or("name");
        let mut specs = vec![AggregateSpec::new("policy_number", AggFn::Count)];
        specs.extend(AggregateSpec::many("premium", &[AggFn::Sum, AggFn::Mean]));
        specs.extend(AggregateSpec::many("sum_insured", &[AggFn::Sum, AggFn::Mean]));
        specs.push(AggregateSpec::new("base_premium", AggFn::First));

        let records: Vec<Record> = aggregate(&sold, &["product_id", name], &specs)
            .rounded()
            .records()
            .into_iter()
            .map(with_profitability)
            .collect();

        let top = |metric: &str, fields: [&str; 2]| -> Vec<Record> {
            top_n(&records, metric, TOP_PRODUCTS)
                .iter()
                .map(|r| r.select(&["product_id", name, fields[0], fields[1]]))
                .collect()
        };
        let top_products_by_volume = top("policy_number_count", ["policy_number_count", "premium_sum"]);
        let top_products_by_premium = top("premium_sum", ["premium_sum", "policy_number_count"]);
        let top_products_by_efficiency = top("premium_efficiency", ["premium_efficiency", "premium_mean"]);

        let summary = summarize(&records);
        tracing::info!(
            products = summary.total_products_with_policies,
            policies = summary.total_policies_analyzed,
            "Product profitability computed"
        );

        Ok(ReportOutcome::Ready(ProductProfitability {
            summary,
            top_products_by_volume,
            top_products_by_premium,
            top_products_by_efficiency,
            product_performance_matrix: records.into_iter().take(MATRIX_ROWS).collect(),
            data_sources: DataSources::new()
                .tables(SourceDomain::Postgresql, &["products", "policies"])
                .join_key("policy.product_id -> product.code"),
        }))
    }
}

/// Append efficiency, exposure and premium-to-exposure to one product record.
fn with_profitability(mut record: Record) -> Record {
    let metric = |r: &Record, name: &str| r.number(name).unwrap_or(0.0);

    let efficiency = ratio(metric(&record, "premium_mean"), metric(&record, "base_premium_first"));
    let exposure = metric(&record, "sum_insured_sum");
    let to_exposure = ratio(metric(&record, "premium_sum"), exposure);

    record.insert("premium_efficiency", Value::from(round2(efficiency.value)));
    record.insert("premium_efficiency_defined", Value::from(efficiency.defined));
    record.insert("total_exposure", Value::from(exposure));
    record.insert("premium_to_exposure_ratio", Value::from(round2(to_exposure.value * 100.0)));
    record.insert("premium_to_exposure_ratio_defined", Value::from(to_exposure.defined));
    record
}

fn summarize(records: &[Record]) -> ProfitabilitySummary {
    let column = |name: &str| -> Vec<f64> { records.iter().filter_map(|r| r.number(name)).collect() };
    let mean = |values: &[f64]| {
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        if values.is_empty() { 0.0 } else { round2(values.iter().sum::<f64>() / n) }
    };

    let counts = column("policy_number_count");
    let defined = Value::from(true);
    let defined_efficiencies: Vec<f64> = records
        .iter()
        .filter(|r| r.get("premium_efficiency_defined") == Some(&defined))
        .filter_map(|r| r.number("premium_efficiency"))
        .collect();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_policies_analyzed = counts.iter().sum::<f64>() as usize;

    ProfitabilitySummary {
        total_products_with_policies: records.len(),
        total_policies_analyzed,
        total_premium_volume: round2(column("premium_sum").iter().sum()),
        average_policies_per_product: mean(&counts),
        average_premium_efficiency: mean(&defined_efficiencies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures;
    use crossdata_domain::Table;
    use crossdata_storage::InMemorySource;

    #[tokio::test]
    async fn test_product_profitability() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.product_profitability().await.unwrap().into_ready().unwrap();

        assert_eq!(report.summary.total_products_with_policies, 2);
        assert_eq!(report.summary.total_policies_analyzed, 3);
        assert_eq!(report.summary.total_premium_volume, 500.0);
        assert_eq!(report.summary.average_policies_per_product, 1.5);
        assert_eq!(report.summary.average_premium_efficiency, 1.25);

        let auto = &report.top_products_by_volume[0];
        assert_eq!(auto.get("name"), Some(&Value::from("Auto")));
        assert_eq!(auto.number("premium_sum"), Some(250.0));

        let matrix_auto = &report.product_performance_matrix[0];
        assert_eq!(matrix_auto.number("total_exposure"), Some(15_000.0));
        assert_eq!(matrix_auto.number("premium_to_exposure_ratio"), Some(1.67));
        assert_eq!(matrix_auto.number("premium_efficiency"), Some(1.25));
    }

    #[tokio::test]
    async fn test_zero_base_premium_flags_efficiency_undefined() {
        let products = Table::from_rows(
            ["code", "name", "base_premium"],
            vec![vec!["P1".into(), "Auto".into(), 0.0.into()]],
        );
        let source = InMemorySource::new()
            .with_table(SourceDomain::Postgresql, "products", products)
            .with_table(SourceDomain::Postgresql, "policies", fixtures::policies());
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let report = engine.product_profitability().await.unwrap().into_ready().unwrap();
        let auto = &report.product_performance_matrix[0];
        assert_eq!(auto.number("premium_efficiency"), Some(0.0));
        assert_eq!(auto.get("premium_efficiency_defined"), Some(&Value::from(false)));
        assert_eq!(auto.get("premium_to_exposure_ratio_defined"), Some(&Value::from(true)));
        assert_eq!(report.summary.average_premium_efficiency, 0.0);
    }

    #[tokio::test]
    async fn test_product_name_found_when_policies_carry_name() {
        let names = vec!["Plan A".into(), "Plan B".into(), "Plan C".into()];
        let policies = fixtures::policies().with_column("name", names);
        let source = InMemorySource::new()
            .with_table(SourceDomain::Postgresql, "products", fixtures::products())
            .with_table(SourceDomain::Postgresql, "policies", policies);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let report = engine.product_profitability().await.unwrap().into_ready().unwrap();
        let auto = &report.top_products_by_volume[0];
        assert_eq!(auto.get("name_y"), Some(&Value::from("Auto")));
        assert_eq!(auto.number("policy_number_count"), Some(2.0));
        assert_eq!(report.summary.total_products_with_policies, 2);
    }

    #[tokio::test]
    async fn test_missing_product_key() {
        let products = Table::from_rows(["sku"], vec![vec!["P1".into()]]);
        let source = InMemorySource::new()
            .with_table(SourceDomain::Postgresql, "products", products)
            .with_table(SourceDomain::Postgresql, "policies", fixtures::policies());
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let outcome = engine.product_profitability().await.unwrap();
        assert_eq!(
            outcome.error(),
            Some("Required columns not found for product profitability analysis")
        );
    }

    fn catalogue() -> Table {
        Table::from_rows(
            ["code", "name", "description", "product_type", "base_premium"],
            vec![
                vec!["AUT".into(), "Seguro de Auto".into(), "Cobertura total".into(), "vehicle".into(), 80.0.into()],
                vec!["AUT2".into(), "Seguro Auto Plus".into(), Value::Null, "vehicle".into(), 450.0.into()],
                vec!["123".into(), "Vida y Salud".into(), "Familia".into(), "life".into(), 1_200.0.into()],
                vec!["LIFE".into(), "Seguro de Vida".into(), Value::Null, Value::Null, Value::Null],
            ],
        )
    }

    #[tokio::test]
    async fn test_product_analysis() {
        let source = InMemorySource::new().with_table(SourceDomain::Postgresql, "products", catalogue());
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.product_analysis().await.unwrap();

        assert_eq!(report.total_products, 4);
        assert_eq!(report.product_types.count("vehicle"), 2);
        assert_eq!(report.product_types.count("life"), 1);

        let premiums = report.premium_statistics.unwrap();
        assert_eq!(premiums.average_premium, 576.67);
        assert_eq!(premiums.median_premium, 450.0);
        assert_eq!(premiums.min_premium, 80.0);
        assert_eq!(premiums.max_premium, 1_200.0);
        assert_eq!(premiums.premium_distribution.counts.count("< 100"), 1);
        assert_eq!(premiums.premium_distribution.counts.count("100-499"), 1);
        assert_eq!(premiums.premium_distribution.counts.count("1000-4999"), 1);
        assert_eq!(premiums.premium_distribution.counts.count("5000+"), 0);

        let codes = report.code_analysis.unwrap();
        assert_eq!(codes.unique_codes, 4);
        assert_eq!(codes.avg_code_length, 3.5);
        assert_eq!(codes.code_patterns.common_prefixes.count("AUT"), 2);
        assert_eq!(codes.code_patterns.length_distribution.count("3"), 2);
        assert_eq!(
            codes.code_patterns.format_distribution,
            FormatDistribution { numeric_only: 1, alpha_only: 2, mixed: 1 }
        );

        let words = report.text_analysis.common_words_in_names.unwrap();
        assert_eq!(words.keys().next(), Some("seguro"));
        assert_eq!(words.count("seguro"), 3);
        assert_eq!(words.count("auto"), 2);
        assert!(!words.contains_key("de"));
        assert!(!words.contains_key("y"));
        assert_eq!(report.text_analysis.products_with_description, Some(2));

        assert_eq!(report.data_completeness.products_with_premium, 3);
        assert_eq!(report.data_completeness.products_with_description, 2);
        assert_eq!(report.data_completeness.products_with_type, 3);
    }

    #[tokio::test]
    async fn test_product_analysis_without_optional_columns() {
        let products = Table::from_rows(["sku"], vec![vec!["X".into()]]);
        let source = InMemorySource::new().with_table(SourceDomain::Postgresql, "products", products);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.product_analysis().await.unwrap();

        assert_eq!(report.total_products, 1);
        assert!(report.product_types.is_empty());
        assert!(report.premium_statistics.is_none());
        assert!(report.code_analysis.is_none());
        assert_eq!(report.text_analysis, TextAnalysis::default());
        assert_eq!(report.data_completeness.products_with_premium, 0);
    }
}
