//! # Join Engine
//!
//! Key-based combination of two tables that may come from different sources.
//! A join whose key column is absent is never attempted: the caller receives
//! a [`JoinUnavailable`] and decides how to fall back.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AnalyticsError;
use crossdata_domain::{KeyValue, Table, Value};

// =============================================================================
// TYPES
// =============================================================================

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Matched pairs only.
    Inner,
    /// Every left row, with nulls where nothing matched.
    Left,
}

impl JoinKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            other => Err(AnalyticsError::InvalidParameter(format!(
                "unknown join kind '{other}', expected inner or left"
            ))),
        }
    }
}

/// Suffixes appended to colliding column names, one per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suffixes {
    pub left: &'static str,
    pub right: &'static str,
}

impl Suffixes {
    pub const USER_CLIENT: Self = Self::new("_user", "_client");
    pub const AGENT_POLICY: Self = Self::new("_agent", "_policy");
    pub const POLICY_PRODUCT: Self = Self::new("_policy", "_product");
    pub const POLICY_CLAIM: Self = Self::new("_policy", "_claim");
    pub const LEFT_RIGHT: Self = Self::new("_left", "_right");
    /// Keep left names, suffix only the right side.
    pub const KEEP_LEFT_POLICY: Self = Self::new("", "_policy");
    pub const KEEP_LEFT_PRODUCT: Self = Self::new("", "_product");
    pub const DEFAULT: Self = Self::new("_x", "_y");

    #[must_use]
    pub const fn new(left: &'static str, right: &'static str) -> Self {
        Self { left, right }
    }
}

/// Which side of a join lacks its key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSide {
    Left,
    Right,
    Both,
}

impl fmt::Display for MissingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Both => "both",
        })
    }
}

/// A join that could not be attempted because a key column is absent.
///
/// This is a recoverable outcome, never a failure of the report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot join on {left_key} -> {right_key}: key column missing on {missing} side")]
pub struct JoinUnavailable {
    pub left_key: String,
    pub right_key: String,
    pub missing: MissingSide,
}

// =============================================================================
// JOIN
// =============================================================================

/// Join `left` and `right` on `left_key` / `right_key`.
///
/// Rows follow left row order, then right row order within each match. Null
/// keys never match. When both keys share a name the key is emitted once;
/// every other colliding name gets the side's suffix.
///
/// # Errors
///
/// [`JoinUnavailable`] when either key column is absent.
pub fn join(
    left: &Table,
    left_key: &str,
    right: &Table,
    right_key: &str,
    kind: JoinKind,
    suffixes: Suffixes,
) -> Result<Table, JoinUnavailable> {
    let (left_idx, right_idx) = match (left.column_index(left_key), right.column_index(right_key)) {
        (Some(l), Some(r)) => (l, r),
        (l, r) => {
            let missing = match (l, r) {
                (None, None) => MissingSide::Both,
                (None, Some(_)) => MissingSide::Left,
                _ => MissingSide::Right,
            };
            return Err(JoinUnavailable {
                left_key: left_key.to_string(),
                right_key: right_key.to_string(),
                missing,
            });
        }
    };

    let shared_key = left_key == right_key;
    let right_kept: Vec<usize> = (0..right.column_count())
        .filter(|&i| !(shared_key && i == right_idx))
        .collect();

    let right_names: HashSet<&str> = right_kept
        .iter()
        .map(|&i| right.columns()[i].as_str())
        .collect();
    let left_names: HashSet<&str> = left
        .columns()
        .iter()
        .enumerate()
        .filter(|&(i, _)| !(shared_key && i == left_idx))
        .map(|(_, c)| c.as_str())
        .collect();

    let mut columns: Vec<String> = left
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let is_shared_key = shared_key && i == left_idx;
            if !is_shared_key && right_names.contains(c.as_str()) {
                format!("{c}{}", suffixes.left)
            } else {
                c.clone()
            }
        })
        .collect();
    columns.extend(right_kept.iter().map(|&i| {
        let c = &right.columns()[i];
        if left_names.contains(c.as_str()) {
            format!("{c}{}", suffixes.right)
        } else {
            c.clone()
        }
    }));

    let mut lookup: HashMap<KeyValue, Vec<usize>> = HashMap::new();
    for row in right.rows() {
        if let Some(key) = row.values()[right_idx].key() {
            lookup.entry(key).or_default().push(row.index());
        }
    }

    let mut joined = Table::new(columns);
    for row in left.rows() {
        let matches = row.values()[left_idx]
            .key()
            .and_then(|key| lookup.get(&key));

        match matches {
            Some(indices) => {
                for &ri in indices {
                    let Some(right_row) = right.row(ri) else { continue };
                    let mut values = row.values().to_vec();
                    values.extend(right_kept.iter().map(|&i| right_row.values()[i].clone()));
                    joined.push_row(values);
                }
            }
            None if kind == JoinKind::Left => {
                let mut values = row.values().to_vec();
                values.resize(values.len() + right_kept.len(), Value::Null);
                joined.push_row(values);
            }
            None => {}
        }
    }

    tracing::debug!(
        left_key,
        right_key,
        %kind,
        left_rows = left.len(),
        right_rows = right.len(),
        rows = joined.len(),
        "Joined tables"
    );

    Ok(joined)
}

/// First of `candidates` present in `table`.
///
/// Used to resolve names a join may have suffixed, e.g. `["code_agent", "code"]`.
#[must_use]
pub fn column_of<'a>(table: &Table, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| table.has_column(c))
}

// =============================================================================
// MULTI-HOP
// =============================================================================

/// Sequential two-table joins; stops at the first unavailable hop.
#[derive(Debug, Clone)]
pub struct JoinChain {
    joined: Table,
    row_counts: Vec<usize>,
    broken: Option<(usize, JoinUnavailable)>,
}

/// Final state of a [`JoinChain`].
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    /// Every hop joined. `row_counts[0]` is the starting table, then one
    /// entry per hop.
    Complete { table: Table, row_counts: Vec<usize> },
    /// Hop `hop` (0-based) could not be attempted.
    Broken {
        joined_so_far: Table,
        hop: usize,
        reason: JoinUnavailable,
    },
}

impl JoinChain {
    #[must_use]
    pub fn start(table: Table) -> Self {
        let rows = table.len();
        Self {
            joined: table,
            row_counts: vec![rows],
            broken: None,
        }
    }

    /// Join the running table with `right`. No-op once the chain is broken.
    #[must_use]
    pub fn then(mut self, right: &Table, left_key: &str, right_key: &str, kind: JoinKind, suffixes: Suffixes) -> Self {
        if self.broken.is_some() {
            return self;
        }
        match join(&self.joined, left_key, right, right_key, kind, suffixes) {
            Ok(table) => {
                self.row_counts.push(table.len());
                self.joined = table;
            }
            Err(reason) => {
                let hop = self.row_counts.len() - 1;
                tracing::warn!(hop, %reason, "Join chain broken");
                self.broken = Some((hop, reason));
            }
        }
        self
    }

    /// Like [`JoinChain::then`], but an unavailable hop keeps the running
    /// table unchanged instead of breaking the chain.
    #[must_use]
    pub fn then_optional(mut self, right: &Table, left_key: &str, right_key: &str, kind: JoinKind, suffixes: Suffixes) -> Self {
        if self.broken.is_some() {
            return self;
        }
        match join(&self.joined, left_key, right, right_key, kind, suffixes) {
            Ok(table) => {
                self.row_counts.push(table.len());
                self.joined = table;
            }
            Err(reason) => {
                tracing::debug!(%reason, "Optional join skipped");
                self.row_counts.push(self.joined.len());
            }
        }
        self
    }

    #[must_use]
    pub fn finish(self) -> ChainOutcome {
        match self.broken {
            None => ChainOutcome::Complete {
                table: self.joined,
                row_counts: self.row_counts,
            },
            Some((hop, reason)) => ChainOutcome::Broken {
                joined_so_far: self.joined,
                hop,
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::from_rows(
            ["id", "email", "state"],
            vec![
                vec![1.into(), "a@x.io".into(), "CA".into()],
                vec![2.into(), "b@x.io".into(), "TX".into()],
                vec![3.into(), "c@x.io".into(), "CA".into()],
            ],
        )
    }

    fn clients() -> Table {
        Table::from_rows(
            ["id", "user_id", "state"],
            vec![
                vec![10.into(), 1.into(), "CA".into()],
                vec![11.into(), 3.into(), "NV".into()],
                vec![12.into(), 3.into(), "NV".into()],
                vec![13.into(), Value::Null, "NY".into()],
            ],
        )
    }

    #[test]
    fn test_inner_join_suffixes_collisions() {
        let joined = join(&users(), "id", &clients(), "user_id", JoinKind::Inner, Suffixes::USER_CLIENT).unwrap();

        assert_eq!(
            joined.columns(),
            &["id_user", "email", "state_user", "id_client", "user_id", "state_client"]
        );
        assert_eq!(joined.len(), 3);
        assert!(joined.len() <= users().len() * clients().len());
        assert_eq!(joined.value(0, "id_client"), Some(&Value::Int(10)));
        assert_eq!(joined.value(2, "id_client"), Some(&Value::Int(12)));
    }

    #[test]
    fn test_left_join_keeps_every_left_row() {
        let joined = join(&users(), "id", &clients(), "user_id", JoinKind::Left, Suffixes::USER_CLIENT).unwrap();

        assert_eq!(joined.len(), 4);
        let unmatched = joined.row(1).unwrap();
        assert_eq!(unmatched.get("email"), &Value::from("b@x.io"));
        assert!(unmatched.get("id_client").is_null());
        assert!(unmatched.get("state_client").is_null());
    }

    #[test]
    fn test_shared_key_emitted_once() {
        let policies = Table::from_rows(
            ["policy_number", "premium"],
            vec![vec!["P-1".into(), 100.0.into()], vec!["P-2".into(), 50.0.into()]],
        );
        let claims = Table::from_rows(
            ["policy_number", "monto"],
            vec![vec!["P-2".into(), 10.0.into()]],
        );
        let joined = join(&policies, "policy_number", &claims, "policy_number", JoinKind::Left, Suffixes::POLICY_CLAIM).unwrap();

        assert_eq!(joined.columns(), &["policy_number", "premium", "monto"]);
        assert!(joined.value(0, "monto").unwrap().is_null());
        assert_eq!(joined.value(1, "monto"), Some(&Value::Float(10.0)));
    }

    #[test]
    fn test_empty_left_suffix_keeps_left_names() {
        let left = Table::from_rows(["product_id", "name"], vec![vec!["A".into(), "ana".into()]]);
        let right = Table::from_rows(["code", "name"], vec![vec!["A".into(), "Auto".into()]]);
        let joined = join(&left, "product_id", &right, "code", JoinKind::Left, Suffixes::KEEP_LEFT_PRODUCT).unwrap();

        assert_eq!(joined.columns(), &["product_id", "name", "code", "name_product"]);
        assert_eq!(joined.value(0, "name_product"), Some(&Value::from("Auto")));
    }

    #[test]
    fn test_int_and_float_keys_match() {
        let left = Table::from_rows(["id"], vec![vec![Value::Int(7)]]);
        let right = Table::from_rows(["ref"], vec![vec![Value::Float(7.0)]]);
        let joined = join(&left, "id", &right, "ref", JoinKind::Inner, Suffixes::LEFT_RIGHT).unwrap();
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn test_missing_key_is_unavailable() {
        let err = join(&users(), "uuid", &clients(), "user_id", JoinKind::Inner, Suffixes::USER_CLIENT).unwrap_err();
        assert_eq!(err.missing, MissingSide::Left);

        let err = join(&users(), "uuid", &clients(), "owner", JoinKind::Inner, Suffixes::USER_CLIENT).unwrap_err();
        assert_eq!(err.missing, MissingSide::Both);
    }

    #[test]
    fn test_chain_reports_broken_hop() {
        let policies = Table::from_rows(["policy_number"], vec![vec!["P-1".into()]]);
        let outcome = JoinChain::start(users())
            .then(&clients(), "id", "user_id", JoinKind::Inner, Suffixes::USER_CLIENT)
            .then(&policies, "user_id", "customer_id", JoinKind::Left, Suffixes::KEEP_LEFT_POLICY)
            .finish();

        match outcome {
            ChainOutcome::Broken { joined_so_far, hop, reason } => {
                assert_eq!(hop, 1);
                assert_eq!(joined_so_far.len(), 3);
                assert_eq!(reason.missing, MissingSide::Right);
            }
            ChainOutcome::Complete { .. } => panic!("chain should be broken"),
        }
    }

    #[test]
    fn test_chain_optional_hop_is_skipped() {
        let outcome = JoinChain::start(users())
            .then_optional(&clients(), "missing", "user_id", JoinKind::Left, Suffixes::LEFT_RIGHT)
            .then(&clients(), "id", "user_id", JoinKind::Inner, Suffixes::USER_CLIENT)
            .finish();

        match outcome {
            ChainOutcome::Complete { table, row_counts } => {
                assert_eq!(row_counts, vec![3, 3, 3]);
                assert_eq!(table.len(), 3);
            }
            ChainOutcome::Broken { .. } => panic!("optional hop must not break the chain"),
        }
    }

    #[test]
    fn test_column_of_resolves_suffixed_name() {
        let joined = join(&users(), "id", &clients(), "user_id", JoinKind::Inner, Suffixes::USER_CLIENT).unwrap();
        assert_eq!(column_of(&joined, &["state", "state_user"]), Some("state_user"));
        assert_eq!(column_of(&joined, &["missing"]), None);
    }
}
