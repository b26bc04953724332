//! Basic shape information about a loaded table.

use std::collections::BTreeMap;

use crossdata_domain::{ColumnKind, Table};
use serde::Serialize;

/// Row/column counts, inferred column kinds and null counts.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub kinds: BTreeMap<String, ColumnKind>,
    pub null_counts: BTreeMap<String, usize>,
}

#[must_use]
pub fn describe_table(table: &Table) -> TableInfo {
    let mut kinds = BTreeMap::new();
    let mut null_counts = BTreeMap::new();

    for name in table.columns() {
        if let Some(spec) = table.column_spec(name) {
            kinds.insert(name.clone(), spec.kind);
        }
        null_counts.insert(name.clone(), table.null_count(name).unwrap_or(0));
    }

    TableInfo {
        rows: table.len(),
        columns: table.column_count(),
        column_names: table.columns().to_vec(),
        kinds,
        null_counts,
    }
}
