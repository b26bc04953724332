//! # Table Catalog
//!
//! Registry of the tables each source domain exports and the object key each
//! one is stored under.

use std::collections::BTreeMap;

use crossdata_domain::SourceDomain;
use serde::Serialize;

/// Object keys of the standard export layout.
const DEFAULT_LAYOUT: &[(SourceDomain, &str, &str)] = &[
    (SourceDomain::Mysql, "users", "mysql/users/users.csv"),
    (SourceDomain::Mysql, "clients", "mysql/clients/clients.csv"),
    (SourceDomain::Mysql, "agents", "mysql/agents/agents.csv"),
    (SourceDomain::Mysql, "beneficiaries", "mysql/beneficiaries/beneficiaries.csv"),
    (SourceDomain::Postgresql, "products", "postgresql/products/products.csv"),
    (SourceDomain::Postgresql, "policies", "postgresql/policies/policies.csv"),
    (
        SourceDomain::Postgresql,
        "policy_coverage",
        "postgresql/policy_coverage/policy_coverage.csv",
    ),
    (
        SourceDomain::Postgresql,
        "policy_beneficiaries",
        "postgresql/beneficiaries/beneficiaries.csv",
    ),
    (SourceDomain::Cassandra, "reclamos", "cassandra/reclamos/reclamos.csv"),
    (SourceDomain::Cassandra, "pagos", "cassandra/pagos/pagos.csv"),
    (
        SourceDomain::Cassandra,
        "transaction_audit",
        "cassandra/transaction_audit/transaction_audit.csv",
    ),
];

/// `(domain, table) -> object key` registry.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    entries: BTreeMap<SourceDomain, BTreeMap<String, String>>,
}

impl Catalog {
    /// Catalog with no registered tables.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register (or re-point) a table.
    pub fn register(
        &mut self,
        domain: SourceDomain,
        table: impl Into<String>,
        key: impl Into<String>,
    ) -> &mut Self {
        self.entries
            .entry(domain)
            .or_default()
            .insert(table.into(), key.into());
        self
    }

    /// Object key for a registered table.
    #[must_use]
    pub fn key(&self, domain: SourceDomain, table: &str) -> Option<&str> {
        self.entries
            .get(&domain)
            .and_then(|tables| tables.get(table))
            .map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, domain: SourceDomain, table: &str) -> bool {
        self.key(domain, table).is_some()
    }

    /// Registered table names for one domain, alphabetically.
    #[must_use]
    pub fn tables(&self, domain: SourceDomain) -> Vec<&str> {
        self.entries
            .get(&domain)
            .map(|tables| tables.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every registered `(domain, table)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (SourceDomain, &str)> + '_ {
        self.entries
            .iter()
            .flat_map(|(domain, tables)| tables.keys().map(move |t| (*domain, t.as_str())))
    }

    /// `{domain: [tables]}` listing.
    #[must_use]
    pub fn listing(&self) -> BTreeMap<SourceDomain, Vec<&str>> {
        SourceDomain::ALL
            .iter()
            .map(|domain| (*domain, self.tables(*domain)))
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        for (domain, table, key) in DEFAULT_LAYOUT {
            catalog.register(*domain, *table, *key);
        }
        catalog
    }
}
