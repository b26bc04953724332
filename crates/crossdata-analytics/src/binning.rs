//! Numeric binning into ordered, labelled ranges.
//!
//! A bin covers `(lower, upper]`. The first bin also takes everything at or
//! below its upper edge (including values under the lowest edge) and the last
//! bin is unbounded above regardless of its declared edge.

use serde::Serialize;

use crate::error::{AnalyticsError, Result};
use crate::ordered::Counts;
use crossdata_domain::{MissingColumn, Table, Value};

const AMOUNT_EDGES: [f64; 6] = [0.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0, f64::INFINITY];
const AMOUNT_LABELS: [&str; 5] = ["< 1K", "1K-5K", "5K-10K", "10K-50K", "50K+"];

const AGE_EDGES: [f64; 7] = [0.0, 25.0, 35.0, 45.0, 55.0, 65.0, f64::INFINITY];
const AGE_LABELS: [&str; 6] = ["<25", "25-34", "35-44", "45-54", "55-64", "65+"];

const PREMIUM_EDGES: [f64; 6] = [0.0, 100.0, 500.0, 1_000.0, 5_000.0, f64::INFINITY];
const PREMIUM_LABELS: [&str; 5] = ["< 100", "100-499", "500-999", "1000-4999", "5000+"];

/// Ordered bin definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    edges: Vec<f64>,
    labels: Vec<String>,
}

impl Bins {
    /// Build bins from `labels.len() + 1` strictly ascending edges.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the edge count does not match the labels or
    /// the edges are not strictly ascending.
    pub fn new<L: Into<String>>(edges: Vec<f64>, labels: impl IntoIterator<Item = L>) -> Result<Self> {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() || edges.len() != labels.len() + 1 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "{} edges cannot delimit {} bins",
                edges.len(),
                labels.len()
            )));
        }
        if edges.iter().any(|e| e.is_nan()) || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnalyticsError::InvalidParameter(
                "bin edges must be strictly ascending".to_string(),
            ));
        }
        Ok(Self { edges, labels })
    }

    fn predefined(edges: &[f64], labels: &[&str]) -> Self {
        Self {
            edges: edges.to_vec(),
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    /// Claim and payment amount ranges.
    #[must_use]
    pub fn claim_amount() -> Self {
        Self::predefined(&AMOUNT_EDGES, &AMOUNT_LABELS)
    }

    /// Age groups in whole years.
    #[must_use]
    pub fn age() -> Self {
        Self::predefined(&AGE_EDGES, &AGE_LABELS)
    }

    /// Product base premium ranges.
    #[must_use]
    pub fn base_premium() -> Self {
        Self::predefined(&PREMIUM_EDGES, &PREMIUM_LABELS)
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Position of `label` in definition order.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Bin index for a value; `None` for null or NaN.
    #[must_use]
    pub fn assign(&self, value: Option<f64>) -> Option<usize> {
        let v = value.filter(|v| !v.is_nan())?;
        let last = self.labels.len() - 1;
        Some(
            self.edges[1..=last]
                .iter()
                .position(|upper| v <= *upper)
                .unwrap_or(last),
        )
    }

    /// Label for a value; `None` for null or NaN.
    #[must_use]
    pub fn label(&self, value: Option<f64>) -> Option<&str> {
        self.assign(value).map(|i| self.labels[i].as_str())
    }

    /// Per-label counts in definition order plus the unbinned count.
    pub fn distribution(&self, values: impl IntoIterator<Item = Option<f64>>) -> BinDistribution {
        let mut counts = Counts::with_zeroes(self.labels.iter().map(String::as_str));
        let mut unbinned = 0;
        for value in values {
            match self.label(value) {
                Some(label) => counts.increment(label),
                None => unbinned += 1,
            }
        }
        BinDistribution { counts, unbinned }
    }
}

/// Output of [`Bins::distribution`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinDistribution {
    pub counts: Counts,
    pub unbinned: usize,
}

impl BinDistribution {
    /// Label holding the most values; `None` when nothing was binned.
    #[must_use]
    pub fn dominant(&self) -> Option<&str> {
        self.counts
            .max_entry()
            .filter(|(_, count)| *count > 0)
            .map(|(label, _)| label)
    }

    /// Binned plus unbinned values.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.total() + self.unbinned
    }
}

/// Derived table with a `target` column holding each row's bin label.
///
/// # Errors
///
/// [`MissingColumn`] when `column` is absent.
pub fn label_rows(table: &Table, column: &str, bins: &Bins, target: &str) -> std::result::Result<Table, MissingColumn> {
    table.require(column)?;
    let labels = table
        .rows()
        .map(|row| {
            bins.label(row.get(column).as_f64())
                .map_or(Value::Null, Value::from)
        })
        .collect();
    Ok(table.with_column(target, labels))
}
