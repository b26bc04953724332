//! Payments profile: amounts, methods, timing and per-customer frequency.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{present_count, AnalyticsEngine, DataSources};
use crate::aggregate::{aggregate, describe, numbers, quantile, round2, value_counts, AggFn, AggregateSpec};
use crate::error::Result;
use crate::ordered::{Counts, OrderedMap};
use crate::timeseries::{month_of_year_counts, period_counts, weekday_counts, PeriodUnit};
use crossdata_domain::{SourceDomain, Table};

const PERCENTILES: [u32; 7] = [0, 25, 50, 75, 90, 95, 100];
const MONTHS_SHOWN: usize = 12;
const TOP_CUSTOMERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentsAmountStatistics {
    pub total_payment_amount: f64,
    pub average_payment: f64,
    pub median_payment: f64,
    pub max_payment: f64,
    pub min_payment: f64,
    /// `p0` .. `p100`, linear interpolation.
    pub percentiles: OrderedMap<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodAnalysis {
    pub payment_methods: Counts,
    pub most_popular_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_amount_by_method: Option<OrderedMap<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentsTemporal {
    pub monthly_payments: Counts,
    /// Month of year (1-12) to payment count.
    pub seasonal_distribution: BTreeMap<u32, usize>,
    pub payments_by_day: Counts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerPayments {
    pub total_customers: usize,
    pub avg_payments_per_customer: f64,
    pub max_payments_per_customer: usize,
    pub customers_with_single_payment: usize,
    pub customers_with_multiple_payments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_customers_by_amount: Option<OrderedMap<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentsCompleteness {
    pub payments_with_amount: usize,
    pub payments_with_date: usize,
    pub payments_with_method: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentsAnalysis {
    pub total_payments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_statistics: Option<PaymentsAmountStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_analysis: Option<MethodAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_analysis: Option<PaymentsTemporal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_analysis: Option<CustomerPayments>,
    pub data_completeness: PaymentsCompleteness,
    pub data_sources: DataSources,
}

impl AnalyticsEngine<'_> {
    /// # Errors
    ///
    /// Propagates source failures for `pagos`.
    #[tracing::instrument(skip(self))]
    pub async fn payments_analysis(&self) -> Result<PaymentsAnalysis> {
        let payments = self.load(SourceDomain::Cassandra, "pagos").await?;

        let report = PaymentsAnalysis {
            total_payments: payments.len(),
            amount_statistics: amount_statistics(&payments),
            payment_method_analysis: method_analysis(&payments),
            temporal_analysis: temporal(&payments),
            customer_analysis: customer_frequency(&payments),
            data_completeness: PaymentsCompleteness {
                payments_with_amount: present_count(&payments, "monto"),
                payments_with_date: present_count(&payments, "fecha_pago"),
                payments_with_method: present_count(&payments, "metodo_pago"),
            },
            data_sources: DataSources::new().tables(SourceDomain::Cassandra, &["pagos"]),
        };

        tracing::info!(total_payments = report.total_payments, "Payments analysis computed");
        Ok(report)
    }
}

fn amount_statistics(payments: &Table) -> Option<PaymentsAmountStatistics> {
    let amounts = numbers(payments, "monto")?;
    let stats = describe(&amounts)?.rounded();
    let percentiles = PERCENTILES
        .iter()
        .filter_map(|&p| {
            quantile(&amounts, f64::from(p) / 100.0).map(|v| (format!("p{p}"), round2(v)))
        })
        .collect();

    Some(PaymentsAmountStatistics {
        total_payment_amount: stats.sum,
        average_payment: stats.mean,
        median_payment: stats.median,
        max_payment: stats.max,
        min_payment: stats.min,
        percentiles,
    })
}

fn method_analysis(payments: &Table) -> Option<MethodAnalysis> {
    let methods = value_counts(payments, "metodo_pago")?;
    let avg_amount_by_method = payments.has_column("monto").then(|| {
        aggregate(payments, &["metodo_pago"], &[AggregateSpec::new("monto", AggFn::Mean)])
            .rounded()
            .groups()
            .iter()
            .filter_map(|g| g.number("monto_mean").map(|mean| (g.key.render(), mean)))
            .collect()
    });

    let most_popular_method = methods.keys().next().map(str::to_string);
    Some(MethodAnalysis {
        most_popular_method,
        payment_methods: methods,
        avg_amount_by_method,
    })
}

fn temporal(payments: &Table) -> Option<PaymentsTemporal> {
    Some(PaymentsTemporal {
        monthly_payments: period_counts(payments, "fecha_pago", PeriodUnit::Month, Some(MONTHS_SHOWN))?,
        seasonal_distribution: month_of_year_counts(payments, "fecha_pago")?,
        payments_by_day: weekday_counts(payments, "fecha_pago")?,
    })
}

fn customer_frequency(payments: &Table) -> Option<CustomerPayments> {
    let per_customer = value_counts(payments, "customer_id")?;
    let frequencies: Vec<usize> = per_customer.values().copied().collect();

    #[allow(clippy::cast_precision_loss)]
    let avg = if frequencies.is_empty() {
        0.0
    } else {
        frequencies.iter().sum::<usize>() as f64 / frequencies.len() as f64
    };

    let top_customers_by_amount = payments.has_column("monto").then(|| {
        let totals: OrderedMap<f64> = aggregate(payments, &["customer_id"], &[AggregateSpec::new("monto", AggFn::Sum)])
            .groups()
            .iter()
            .filter_map(|g| g.number("monto_sum").map(|sum| (g.key.render(), round2(sum))))
            .collect();
        totals
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .head(TOP_CUSTOMERS)
    });

    Some(CustomerPayments {
        total_customers: per_customer.len(),
        avg_payments_per_customer: round2(avg),
        max_payments_per_customer: frequencies.iter().copied().max().unwrap_or(0),
        customers_with_single_payment: frequencies.iter().filter(|&&n| n == 1).count(),
        customers_with_multiple_payments: frequencies.iter().filter(|&&n| n > 1).count(),
        top_customers_by_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures;
    use crossdata_storage::InMemorySource;

    #[tokio::test]
    async fn test_payments_analysis() {
        let source = fixtures::source();
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());
        let report = engine.payments_analysis().await.unwrap();

        assert_eq!(report.total_payments, 4);

        let amounts = report.amount_statistics.unwrap();
        assert_eq!(amounts.total_payment_amount, 3000.0);
        assert_eq!(amounts.median_payment, 500.0);
        assert_eq!(amounts.percentiles.get("p0"), Some(&200.0));
        assert_eq!(amounts.percentiles.get("p75"), Some(&1050.0));
        assert_eq!(amounts.percentiles.get("p90"), Some(&1500.0));
        assert_eq!(amounts.percentiles.get("p100"), Some(&1800.0));

        let methods = report.payment_method_analysis.unwrap();
        assert_eq!(methods.most_popular_method.as_deref(), Some("card"));
        let averages = methods.avg_amount_by_method.unwrap();
        assert_eq!(averages.get("card"), Some(&733.33));
        assert_eq!(averages.get("transfer"), Some(&800.0));

        let temporal = report.temporal_analysis.unwrap();
        assert_eq!(temporal.monthly_payments.count("2024-05"), 2);
        assert_eq!(temporal.seasonal_distribution.get(&5), Some(&2));
        assert_eq!(temporal.payments_by_day.count("Wednesday"), 2);

        let customers = report.customer_analysis.unwrap();
        assert_eq!(customers.total_customers, 3);
        assert_eq!(customers.avg_payments_per_customer, 1.33);
        assert_eq!(customers.max_payments_per_customer, 2);
        assert_eq!(customers.customers_with_single_payment, 2);
        assert_eq!(customers.customers_with_multiple_payments, 1);
        let top = customers.top_customers_by_amount.unwrap();
        assert_eq!(top.keys().collect::<Vec<_>>(), vec!["3", "2", "1"]);
        assert_eq!(top.get("1"), Some(&400.0));

        assert_eq!(report.data_completeness.payments_with_method, 4);
    }

    #[tokio::test]
    async fn test_payments_analysis_amounts_only() {
        let payments = Table::from_rows(["monto"], vec![vec![10.0.into()], vec![30.0.into()]]);
        let source = InMemorySource::new().with_table(SourceDomain::Cassandra, "pagos", payments);
        let engine = AnalyticsEngine::new(&source, fixtures::as_of());

        let report = engine.payments_analysis().await.unwrap();
        assert_eq!(report.amount_statistics.unwrap().average_payment, 20.0);
        assert!(report.payment_method_analysis.is_none());
        assert!(report.temporal_analysis.is_none());
        assert!(report.customer_analysis.is_none());
        assert_eq!(report.data_completeness.payments_with_date, 0);
    }
}
