//! # Cross-Source Analytics - Domain Model
//!
//! Core value objects shared by every layer: the typed scalar [`Value`], the
//! column-optional [`Table`], column semantics and the three source domains
//! the tables come from. Nothing here knows about storage or reports.
//!
//! Columns are never guaranteed to be present. Every consumer asks the table
//! first ([`Table::has_column`], [`Table::require`]) and decides locally what an
//! absent column means for its own output.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Tokens pandas treats as missing when reading CSV.
const NULL_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>", "#N/A",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Infer a typed value from a raw CSV cell.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if NULL_TOKENS.contains(&trimmed) {
            return Self::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return if f.is_nan() { Self::Null } else { Self::Float(f) };
        }
        match trimmed {
            "true" | "True" | "TRUE" => return Self::Bool(true),
            "false" | "False" | "FALSE" => return Self::Bool(false),
            _ => {}
        }
        if let Some(dt) = parse_datetime(trimmed) {
            return Self::DateTime(dt);
        }
        Self::Text(raw.to_string())
    }

    /// True for `Null` and for a NaN float.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the value. Only `Int` and non-NaN `Float` qualify.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Temporal view of the value; text is parsed leniently.
    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::Text(s) => parse_datetime(s.trim()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Hashable key used for joins, grouping and membership checks.
    ///
    /// Nulls have no key: they never match anything.
    #[must_use]
    pub fn key(&self) -> Option<KeyValue> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(KeyValue::Bool(*b)),
            Self::Int(_) | Self::Float(_) => self.as_f64().map(KeyValue::number),
            Self::Text(s) => Some(KeyValue::Text(s.clone())),
            Self::DateTime(dt) => Some(KeyValue::DateTime(*dt)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if f.is_nan() => serializer.serialize_none(),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::DateTime(dt) => {
                serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S"))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Self::Null, Self::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        if f.is_nan() { Self::Null } else { Self::Float(f) }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::DateTime(d.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Parse the ISO-like date and datetime layouts found in the exported CSVs.
#[must_use]
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if s.len() < 8 || !s.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(chrono::NaiveTime::MIN));
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc())
}

/// Normalized, hashable form of a non-null [`Value`].
///
/// `Int(1)` and `Float(1.0)` produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Bool(bool),
    Number(u64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl KeyValue {
    fn number(f: f64) -> Self {
        // -0.0 and 0.0 must hash identically
        Self::Number((f + 0.0).to_bits())
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// The three independent systems whose exports feed the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDomain {
    /// Identity data: users, clients, agents, beneficiaries.
    Mysql,
    /// Product catalogue and policies.
    Postgresql,
    /// Claims, payments and the transaction audit trail.
    Cassandra,
}

impl SourceDomain {
    pub const ALL: [Self; 3] = [Self::Mysql, Self::Postgresql, Self::Cassandra];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
            Self::Cassandra => "cassandra",
        }
    }

    /// Short alias used by older callers ("A", "B", "C").
    #[must_use]
    pub const fn alias(&self) -> &'static str {
        match self {
            Self::Mysql => "A",
            Self::Postgresql => "B",
            Self::Cassandra => "C",
        }
    }
}

impl fmt::Display for SourceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceDomain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "a" => Ok(Self::Mysql),
            "postgresql" | "postgres" | "b" => Ok(Self::Postgresql),
            "cassandra" | "c" => Ok(Self::Cassandra),
            _ => Err(DomainError::UnknownDomain(s.to_string())),
        }
    }
}

/// Declared semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Temporal,
    Identifier,
}

impl ColumnKind {
    /// Infer a kind from the column name and its non-null values.
    pub fn infer<'a>(name: &str, values: impl IntoIterator<Item = &'a Value>) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower == "id" || lower.ends_with("_id") || lower == "code" || lower.ends_with("_code") {
            return Self::Identifier;
        }

        let (mut numeric, mut temporal, mut other) = (0usize, 0usize, 0usize);
        for value in values {
            match value {
                Value::Int(_) | Value::Float(_) => numeric += 1,
                Value::DateTime(_) => temporal += 1,
                Value::Null => {}
                _ => other += 1,
            }
        }

        if numeric > 0 && temporal == 0 && other == 0 {
            Self::Numeric
        } else if temporal > 0 && numeric == 0 && other == 0 {
            Self::Temporal
        } else {
            Self::Categorical
        }
    }
}

/// Column name plus its semantic kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Fully qualified table reference, e.g. `postgresql.policies`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub domain: SourceDomain,
    pub table: String,
}

impl TableRef {
    pub fn new(domain: SourceDomain, table: impl Into<String>) -> Self {
        Self {
            domain,
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.table)
    }
}

impl FromStr for TableRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, table) = s
            .split_once('.')
            .ok_or_else(|| DomainError::InvalidTableRef(s.to_string()))?;
        if table.is_empty() {
            return Err(DomainError::InvalidTableRef(s.to_string()));
        }
        Ok(Self::new(domain.parse()?, table))
    }
}

// =============================================================================
// TABLE
// =============================================================================

static NULL: Value = Value::Null;

/// In-memory table with ordered columns and insertion-ordered rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from rows; short rows are padded with nulls, long rows truncated.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of `name`, or a [`MissingColumn`] the caller is expected to recover from.
    pub fn require(&self, name: &str) -> Result<usize, MissingColumn> {
        self.column_index(name).ok_or_else(|| MissingColumn {
            column: name.to_string(),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.rows.len()).map(move |index| Row { table: self, index })
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows.len()).then_some(Row { table: self, index })
    }

    /// Cell at (`row`, `column`); `None` when either is out of range.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// All cells of a column in row order.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Numeric view of a column; non-numeric cells become `None`.
    #[must_use]
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name).map(|c| c.map(Value::as_f64).collect())
    }

    /// Temporal view of a column; unparseable cells become `None`.
    #[must_use]
    pub fn datetimes(&self, name: &str) -> Option<Vec<Option<NaiveDateTime>>> {
        self.column(name).map(|c| c.map(Value::as_datetime).collect())
    }

    #[must_use]
    pub fn null_count(&self, name: &str) -> Option<usize> {
        self.column(name).map(|c| c.filter(|v| v.is_null()).count())
    }

    #[must_use]
    pub fn column_spec(&self, name: &str) -> Option<ColumnSpec> {
        let values = self.column(name)?;
        Some(ColumnSpec::new(name, ColumnKind::infer(name, values)))
    }

    /// Derived copy with `name` added (or replaced) by `values`.
    ///
    /// Missing trailing values are filled with nulls.
    #[must_use]
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Self {
        let mut derived = self.clone();
        let mut values = values.into_iter();
        match derived.column_index(name) {
            Some(idx) => {
                for row in &mut derived.rows {
                    row[idx] = values.next().unwrap_or_default();
                }
            }
            None => {
                derived.columns.push(name.to_string());
                for row in &mut derived.rows {
                    row.push(values.next().unwrap_or_default());
                }
            }
        }
        derived
    }

    /// Derived copy keeping only the rows that satisfy `keep`.
    #[must_use]
    pub fn filter(&self, mut keep: impl FnMut(&Row<'_>) -> bool) -> Self {
        let rows = self
            .rows()
            .filter(|row| keep(row))
            .map(|row| row.values().to_vec())
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Borrowed view of a single row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Row<'a> {
    /// Cell for `column`, or `Null` when the column is absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &'a Value {
        self.table
            .column_index(column)
            .map_or(&NULL, |idx| &self.table.rows[self.index][idx])
    }

    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        &self.table.rows[self.index]
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Row identity for duplicate detection; nulls compare equal to each other.
    #[must_use]
    pub fn fingerprint(&self) -> Vec<Option<KeyValue>> {
        self.values().iter().map(Value::key).collect()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// A referenced column is absent from a table.
///
/// Always recovered where it is raised: the dependent section is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("column '{column}' is not present")]
pub struct MissingColumn {
    pub column: String,
}

/// Domain-level errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Unknown source domain: {0}")]
    UnknownDomain(String),

    #[error("Invalid table reference '{0}', expected <domain>.<table>")]
    InvalidTableRef(String),
}
