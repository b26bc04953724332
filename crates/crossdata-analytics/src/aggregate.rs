//! # Grouped Aggregation Engine
//!
//! Group-by with several aggregate functions at once. Output metrics are
//! flattened to `column_function` names by [`AggregateSpec::output_name`],
//! the only place that naming rule lives.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Serialize, Serializer};
use statrs::statistics::{Data, Median, Statistics};

use crate::ordered::{Counts, OrderedMap, Record};
use crossdata_domain::{KeyValue, Table, Value};

// =============================================================================
// SPECS
// =============================================================================

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFn {
    Count,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Std,
    Nunique,
    First,
}

impl AggFn {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
            Self::Nunique => "nunique",
            Self::First => "first",
        }
    }

    /// Apply to one group's cells.
    fn apply(self, values: &[&Value]) -> Value {
        let present = || values.iter().copied().filter(|v| !v.is_null());
        let numbers = || -> Vec<f64> { values.iter().filter_map(|v| v.as_f64()).collect() };

        match self {
            Self::Count => present().count().into(),
            Self::Nunique => present()
                .filter_map(Value::key)
                .collect::<HashSet<_>>()
                .len()
                .into(),
            Self::First => present().next().cloned().unwrap_or_default(),
            Self::Sum => {
                if present().all(|v| matches!(v, Value::Int(_))) {
                    let ints = present().filter_map(|v| match v {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    });
                    ints.fold(0_i64, i64::saturating_add).into()
                } else {
                    numbers().iter().sum::<f64>().into()
                }
            }
            Self::Mean => describe(&numbers()).map_or(Value::Null, |s| s.mean.into()),
            Self::Median => describe(&numbers()).map_or(Value::Null, |s| s.median.into()),
            Self::Min => extreme(values, Ordering::Less),
            Self::Max => extreme(values, Ordering::Greater),
            Self::Std => describe(&numbers()).and_then(|s| s.std).into(),
        }
    }
}

/// Smallest (`Less`) or largest (`Greater`) present cell.
///
/// Numeric cells win when any are present. Otherwise cells compare within
/// their own kind (dates, text, flags); a group mixing kinds has no extreme.
fn extreme(values: &[&Value], want: Ordering) -> Value {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    if let Some(summary) = describe(&numbers) {
        return Value::from(if want == Ordering::Less { summary.min } else { summary.max });
    }

    let mut best: Option<&Value> = None;
    for value in values.iter().copied().filter(|v| !v.is_null()) {
        best = match best {
            None => Some(value),
            Some(current) => match compare_cells(value, current) {
                Some(order) if order == want => Some(value),
                Some(_) => Some(current),
                None => return Value::Null,
            },
        };
    }
    best.cloned().unwrap_or_default()
}

fn compare_cells(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl fmt::Display for AggFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(source column, function)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    pub column: String,
    pub function: AggFn,
}

impl AggregateSpec {
    pub fn new(column: impl Into<String>, function: AggFn) -> Self {
        Self {
            column: column.into(),
            function,
        }
    }

    /// One spec per function over the same column.
    #[must_use]
    pub fn many(column: &str, functions: &[AggFn]) -> Vec<Self> {
        functions.iter().map(|f| Self::new(column, *f)).collect()
    }

    /// Flattened metric name, e.g. `premium_sum`.
    #[must_use]
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.column, self.function)
    }
}

// =============================================================================
// GROUPS
// =============================================================================

/// Key tuple of one group, in grouping-column order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    pub const DELIMITER: &'static str = " | ";

    /// Stable string form: values joined with [`GroupKey::DELIMITER`].
    #[must_use]
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(Self::DELIMITER)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One group and its flattened metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: GroupKey,
    pub row_count: usize,
    pub metrics: OrderedMap<Value>,
}

impl Group {
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&Value> {
        self.metrics.get(name)
    }

    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.metric(name).and_then(Value::as_f64)
    }
}

/// Ordered result of [`aggregate`]. Empty means "insufficient data".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    key_columns: Vec<String>,
    groups: Vec<Group>,
}

impl Aggregation {
    #[must_use]
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group by its rendered key.
    #[must_use]
    pub fn get(&self, rendered: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.key.render() == rendered)
    }

    /// Copy with every float metric rounded to two decimals.
    #[must_use]
    pub fn rounded(mut self) -> Self {
        for group in &mut self.groups {
            group.metrics = std::mem::take(&mut group.metrics).map_values(|v| match v {
                Value::Float(f) => Value::Float(round2(f)),
                other => other,
            });
        }
        self
    }

    /// Stable reorder of the groups.
    pub fn sort_by_key<K: Ord>(&mut self, mut f: impl FnMut(&Group) -> K) {
        self.groups.sort_by_key(|g| f(g));
    }

    /// Flattened records: key columns, then metrics.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.groups
            .iter()
            .map(|group| {
                let mut record: Record = self
                    .key_columns
                    .iter()
                    .cloned()
                    .zip(group.key.0.iter().cloned())
                    .collect();
                for (name, value) in group.metrics.iter() {
                    record.insert(name, value.clone());
                }
                record
            })
            .collect()
    }

    /// Sum of a numeric metric across groups.
    #[must_use]
    pub fn total(&self, metric: &str) -> f64 {
        self.groups.iter().filter_map(|g| g.number(metric)).sum()
    }
}

impl Serialize for Aggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.groups.iter().map(|g| (g.key.render(), &g.metrics)))
    }
}

/// Group `table` by `group_keys` and compute every spec per group.
///
/// Returns an empty aggregation when a grouping column is absent. Specs over
/// absent columns are skipped; rows with a null key are dropped; groups keep
/// the order in which their key first appears.
#[must_use]
pub fn aggregate(table: &Table, group_keys: &[&str], specs: &[AggregateSpec]) -> Aggregation {
    let Some(key_indices) = group_keys
        .iter()
        .map(|k| table.column_index(k))
        .collect::<Option<Vec<_>>>()
    else {
        tracing::debug!(?group_keys, "Grouping column missing, aggregation skipped");
        return Aggregation::default();
    };

    let specs: Vec<(&AggregateSpec, usize)> = specs
        .iter()
        .filter_map(|s| table.column_index(&s.column).map(|i| (s, i)))
        .collect();

    let mut order: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    let mut lookup: HashMap<Vec<KeyValue>, usize> = HashMap::new();

    for row in table.rows() {
        let values = row.values();
        let Some(hash_key) = key_indices
            .iter()
            .map(|&i| values[i].key())
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };

        let slot = *lookup.entry(hash_key).or_insert_with(|| {
            let key = GroupKey(key_indices.iter().map(|&i| values[i].clone()).collect());
            order.push((key, Vec::new()));
            order.len() - 1
        });
        order[slot].1.push(row.index());
    }

    let groups = order
        .into_iter()
        .map(|(key, rows)| {
            let metrics = specs
                .iter()
                .map(|(spec, col)| {
                    let cells: Vec<&Value> = rows
                        .iter()
                        .filter_map(|&r| table.row(r))
                        .map(|row| &row.values()[*col])
                        .collect();
                    (spec.output_name(), spec.function.apply(&cells))
                })
                .collect();
            Group {
                key,
                row_count: rows.len(),
                metrics,
            }
        })
        .collect();

    Aggregation {
        key_columns: group_keys.iter().map(|k| (*k).to_string()).collect(),
        groups,
    }
}

// =============================================================================
// RATIOS & RANKING
// =============================================================================

/// Guarded ratio: `0` with `defined = false` when the denominator is zero or
/// either side is not finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ratio {
    pub value: f64,
    pub defined: bool,
}

impl Ratio {
    pub const UNDEFINED: Self = Self {
        value: 0.0,
        defined: false,
    };

    /// `Some(value)` when defined.
    #[must_use]
    pub const fn get(&self) -> Option<f64> {
        if self.defined { Some(self.value) } else { None }
    }
}

#[must_use]
pub fn ratio(numerator: f64, denominator: f64) -> Ratio {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return Ratio::UNDEFINED;
    }
    Ratio {
        value: numerator / denominator,
        defined: true,
    }
}

/// `numerator / denominator * 100`, rounded to two decimals.
#[must_use]
pub fn percentage(numerator: f64, denominator: f64) -> Ratio {
    let r = ratio(numerator, denominator);
    Ratio {
        value: round2(r.value * 100.0),
        ..r
    }
}

/// First `n` records by `metric` descending. Ties keep input order; records
/// without the metric sort last.
#[must_use]
pub fn top_n(records: &[Record], metric: &str, n: usize) -> Vec<Record> {
    let mut ranked: Vec<&Record> = records.iter().collect();
    ranked.sort_by(|a, b| match (a.number(metric), b.number(metric)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked.into_iter().take(n).cloned().collect()
}

// =============================================================================
// SINGLE-COLUMN HELPERS
// =============================================================================

/// Non-null value frequencies, most frequent first; ties by first appearance.
#[must_use]
pub fn value_counts(table: &Table, column: &str) -> Option<Counts> {
    let mut counts = Counts::new();
    for value in table.column(column)? {
        if !value.is_null() {
            counts.increment(&value.to_string());
        }
    }
    Some(counts.by_count_desc())
}

/// Distinct non-null values in a column.
#[must_use]
pub fn nunique(table: &Table, column: &str) -> Option<usize> {
    let distinct: HashSet<KeyValue> = table.column(column)?.filter_map(Value::key).collect();
    Some(distinct.len())
}

/// Non-null numeric cells of a column.
#[must_use]
pub fn numbers(table: &Table, column: &str) -> Option<Vec<f64>> {
    table
        .numeric(column)
        .map(|values| values.into_iter().flatten().collect())
}

/// Quantile with linear interpolation between closest ranks.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lower, upper, fraction) = {
        let pos = q * (sorted.len() - 1) as f64;
        let lower = pos.floor() as usize;
        (lower, pos.ceil() as usize, pos - pos.floor())
    };
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Summary statistics of a numeric sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; `None` below two values.
    pub std: Option<f64>,
}

impl NumericSummary {
    /// Copy rounded to two decimals.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            count: self.count,
            sum: round2(self.sum),
            mean: round2(self.mean),
            median: round2(self.median),
            min: round2(self.min),
            max: round2(self.max),
            std: self.std.map(round2),
        }
    }
}

/// `None` for an empty sample.
#[must_use]
pub fn describe(values: &[f64]) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    let std = (values.len() > 1).then(|| values.std_dev());
    Some(NumericSummary {
        count: values.len(),
        sum: values.iter().sum(),
        mean: values.mean(),
        median: Data::new(values.to_vec()).median(),
        min: values.min(),
        max: values.max(),
        std,
    })
}

/// Round half away from zero to one decimal.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round half away from zero to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round half away from zero to three decimals.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policies() -> Table {
        Table::from_rows(
            ["state", "policy_number", "premium"],
            vec![
                vec!["CA".into(), "P-1".into(), 100.0.into()],
                vec!["TX".into(), "P-2".into(), 40.0.into()],
                vec!["CA".into(), "P-3".into(), 300.0.into()],
                vec!["CA".into(), Value::Null, Value::Null],
                vec![Value::Null, "P-4".into(), 10.0.into()],
            ],
        )
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let specs = [
            AggregateSpec::many("policy_number", &[AggFn::Count, AggFn::Nunique]),
            AggregateSpec::many("premium", &[AggFn::Sum, AggFn::Mean]),
        ]
        .concat();
        let agg = aggregate(&policies(), &["state"], &specs);

        assert_eq!(agg.len(), 2);
        let ca = &agg.groups()[0];
        assert_eq!(ca.key.render(), "CA");
        assert_eq!(ca.row_count, 3);
        assert_eq!(ca.metric("policy_number_count"), Some(&Value::Int(2)));
        assert_eq!(ca.metric("policy_number_nunique"), Some(&Value::Int(2)));
        assert_eq!(ca.number("premium_sum"), Some(400.0));
        assert_eq!(ca.number("premium_mean"), Some(200.0));
        assert_eq!(agg.groups()[1].key.render(), "TX");
    }

    #[test]
    fn test_empty_table_gives_empty_aggregation() {
        let empty = Table::new(["state", "premium"]);
        let agg = aggregate(&empty, &["state"], &[AggregateSpec::new("premium", AggFn::Sum)]);
        assert!(agg.is_empty());
        assert_eq!(serde_json::to_string(&agg).unwrap(), "{}");
    }

    #[test]
    fn test_missing_group_column_skips_aggregation() {
        let agg = aggregate(&policies(), &["region"], &[AggregateSpec::new("premium", AggFn::Sum)]);
        assert!(agg.is_empty());
    }

    #[test]
    fn test_missing_spec_column_is_skipped() {
        let agg = aggregate(
            &policies(),
            &["state"],
            &[
                AggregateSpec::new("sum_insured", AggFn::Sum),
                AggregateSpec::new("premium", AggFn::Max),
            ],
        );
        let ca = &agg.groups()[0];
        assert!(ca.metric("sum_insured_sum").is_none());
        assert_eq!(ca.number("premium_max"), Some(300.0));
    }

    #[test]
    fn test_min_max_over_dates_and_text() {
        let day = |d: u32| {
            chrono::NaiveDate::from_ymd_opt(2024, 3, d)
                .and_then(|date| date.and_hms_opt(8, 0, 0))
                .unwrap()
        };
        let table = Table::from_rows(
            ["kind", "fecha_reclamo", "estado"],
            vec![
                vec!["auto".into(), day(14).into(), "open".into()],
                vec!["auto".into(), day(2).into(), "closed".into()],
                vec!["auto".into(), Value::Null, Value::Null],
                vec!["auto".into(), day(21).into(), "pending".into()],
            ],
        );
        let mut specs = AggregateSpec::many("fecha_reclamo", &[AggFn::Min, AggFn::Max]);
        specs.extend(AggregateSpec::many("estado", &[AggFn::Min, AggFn::Max]));
        let agg = aggregate(&table, &["kind"], &specs);

        let group = &agg.groups()[0];
        assert_eq!(group.metric("fecha_reclamo_min"), Some(&Value::DateTime(day(2))));
        assert_eq!(group.metric("fecha_reclamo_max"), Some(&Value::DateTime(day(21))));
        assert_eq!(group.metric("estado_min"), Some(&Value::from("closed")));
        assert_eq!(group.metric("estado_max"), Some(&Value::from("pending")));
    }

    #[test]
    fn test_min_max_of_mixed_kinds_is_null() {
        let table = Table::from_rows(
            ["kind", "mixed"],
            vec![
                vec!["a".into(), "text".into()],
                vec!["a".into(), true.into()],
            ],
        );
        let agg = aggregate(&table, &["kind"], &[AggregateSpec::new("mixed", AggFn::Max)]);
        assert_eq!(agg.groups()[0].metric("mixed_max"), Some(&Value::Null));
    }

    #[test]
    fn test_single_group_counts() {
        let table = Table::from_rows(
            ["kind", "status"],
            vec![
                vec!["auto".into(), "open".into()],
                vec!["auto".into(), "open".into()],
                vec!["auto".into(), "open".into()],
            ],
        );
        let agg = aggregate(
            &table,
            &["kind"],
            &[
                AggregateSpec::new("status", AggFn::Count),
                AggregateSpec::new("status", AggFn::Nunique),
                AggregateSpec::new("status", AggFn::Mean),
                AggregateSpec::new("status", AggFn::Std),
            ],
        );
        let group = &agg.groups()[0];
        assert_eq!(group.metric("status_count"), Some(&Value::Int(3)));
        assert_eq!(group.metric("status_nunique"), Some(&Value::Int(1)));
        assert_eq!(group.metric("status_mean"), Some(&Value::Null));
        assert_eq!(group.metric("status_std"), Some(&Value::Null));
    }

    #[test]
    fn test_multi_key_rendering_and_records() {
        let table = Table::from_rows(
            ["code", "active", "premium"],
            vec![
                vec!["AG-1".into(), true.into(), 10.into()],
                vec!["AG-1".into(), true.into(), 5.into()],
            ],
        );
        let agg = aggregate(&table, &["code", "active"], &[AggregateSpec::new("premium", AggFn::Sum)]);
        assert_eq!(agg.groups()[0].key.render(), "AG-1 | true");
        assert_eq!(agg.groups()[0].metric("premium_sum"), Some(&Value::Int(15)));

        let json = serde_json::to_string(&agg).unwrap();
        assert_eq!(json, r#"{"AG-1 | true":{"premium_sum":15}}"#);

        let records = agg.records();
        assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["code", "active", "premium_sum"]);
    }

    #[test]
    fn test_ratio_guards_denominator() {
        assert_eq!(ratio(5.0, 0.0), Ratio::UNDEFINED);
        assert_eq!(percentage(90.0, 100.0), Ratio { value: 90.0, defined: true });
        assert_eq!(percentage(1.0, 3.0).value, 33.33);
        assert_eq!(ratio(f64::NAN, 2.0).get(), None);
    }

    #[test]
    fn test_top_n_is_stable() {
        let records: Vec<Record> = [("a", Some(2)), ("b", None), ("c", Some(5)), ("d", Some(2))]
            .into_iter()
            .map(|(name, n)| {
                let mut r = Record::new();
                r.insert("name", Value::from(name));
                if let Some(n) = n {
                    r.insert("sold", Value::from(n));
                }
                r
            })
            .collect();

        let top: Vec<_> = top_n(&records, "sold", 10)
            .iter()
            .map(|r| r.get("name").unwrap().to_string())
            .collect();
        assert_eq!(top, vec!["c", "a", "d", "b"]);
        assert_eq!(top_n(&records, "sold", 1).len(), 1);
    }

    #[test]
    fn test_value_counts_and_nunique() {
        let counts = value_counts(&policies(), "state").unwrap();
        assert_eq!(counts.iter().collect::<Vec<_>>(), vec![("CA", &3), ("TX", &1)]);
        assert_eq!(nunique(&policies(), "state"), Some(2));
        assert!(value_counts(&policies(), "city").is_none());
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert!((quantile(&values, 0.4).unwrap() - 2.2).abs() < 1e-9);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_describe() {
        let summary = describe(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.count, 8);
        assert_eq!(summary.mean, 5.0);
        assert_eq!(summary.median, 4.5);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
        assert!((summary.std.unwrap() - 2.138).abs() < 1e-3);

        assert!(describe(&[]).is_none());
        assert_eq!(describe(&[3.0]).unwrap().std, None);
    }
}
