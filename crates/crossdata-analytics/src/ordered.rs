//! Insertion-ordered string-keyed maps used for every labelled output.
//!
//! Report consumers read bin labels, periods and group keys in the order the
//! engine produced them, so nothing here ever sorts by key on its own.

use std::collections::HashMap;

use serde::{Serialize, Serializer};

use crossdata_domain::Value;

/// Ordered `label -> value` mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

/// Label counts in first-appearance (or explicitly sorted) order.
pub type Counts = OrderedMap<usize>;

/// One flattened output row: key columns followed by metrics.
pub type Record = OrderedMap<Value>;

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(&pos) = self.index.get(&key) {
            self.entries[pos].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    /// Value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// Mutable value for `key`, inserting `V::default()` first when absent.
    pub fn entry_or_default(&mut self, key: &str) -> &mut V
    where
        V: Default,
    {
        let pos = if let Some(&pos) = self.index.get(key) {
            pos
        } else {
            self.insert(key, V::default());
            self.entries.len() - 1
        };
        &mut self.entries[pos].1
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Values in order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First `n` entries.
    #[must_use]
    pub fn head(self, n: usize) -> Self {
        self.entries.into_iter().take(n).collect()
    }

    /// Last `n` entries.
    #[must_use]
    pub fn tail(self, n: usize) -> Self {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.into_iter().skip(skip).collect()
    }

    /// Stable sort of the entries.
    #[must_use]
    pub fn sorted_by(mut self, compare: impl FnMut(&(String, V), &(String, V)) -> std::cmp::Ordering) -> Self {
        self.entries.sort_by(compare);
        self.entries.into_iter().collect()
    }

    /// Map every value, keeping keys and order.
    pub fn map_values<W>(self, mut f: impl FnMut(V) -> W) -> OrderedMap<W> {
        self.entries.into_iter().map(|(k, v)| (k, f(v))).collect()
    }
}

impl<V: Clone> OrderedMap<V> {
    /// Projection onto `keys`, in the requested order; absent keys are skipped.
    #[must_use]
    pub fn select(&self, keys: &[&str]) -> Self {
        keys.iter()
            .filter_map(|k| self.get(k).map(|v| ((*k).to_string(), v.clone())))
            .collect()
    }
}

impl Counts {
    /// Count one more occurrence of `key`.
    pub fn increment(&mut self, key: &str) {
        *self.entry_or_default(key) += 1;
    }

    /// Seed `keys` with zero counts so they appear even when never seen.
    #[must_use]
    pub fn with_zeroes<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter().map(|k| (k.to_string(), 0)).collect()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.values().sum()
    }

    /// Count for `key`, 0 when absent.
    #[must_use]
    pub fn count(&self, key: &str) -> usize {
        self.get(key).copied().unwrap_or(0)
    }

    /// Descending by count; ties keep their current order.
    #[must_use]
    pub fn by_count_desc(self) -> Self {
        self.sorted_by(|a, b| b.1.cmp(&a.1))
    }

    /// First entry holding the highest count.
    #[must_use]
    pub fn max_entry(&self) -> Option<(&str, usize)> {
        self.iter().fold(None, |best, (k, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((k, v)),
        })
    }

    /// First entry holding the lowest count.
    #[must_use]
    pub fn min_entry(&self) -> Option<(&str, usize)> {
        self.iter().fold(None, |best, (k, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((k, v)),
        })
    }
}

impl Record {
    /// Numeric view of a field.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}
