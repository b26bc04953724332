//! # Dataset Source Trait
//!
//! The single capability boundary between the analytics core and wherever the
//! exported tables live. Implementations can be swapped for different
//! backends (object store, in-memory test double, ...).

use std::collections::BTreeMap;

use async_trait::async_trait;
use crossdata_domain::{SourceDomain, Table};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::Result;

// =============================================================================
// DATASET SOURCE
// =============================================================================

/// Loads whole tables for a `(domain, table)` pair.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Load a table.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unregistered pair, `Unavailable` when the stored
    /// object is missing, `IoFailure` for any other retrieval or parse error
    /// and `Timeout` when the load exceeds its budget.
    async fn load(&self, domain: SourceDomain, table: &str) -> Result<Table>;

    /// Non-throwing existence probe.
    async fn exists(&self, domain: SourceDomain, table: &str) -> bool;

    /// Every object held by the backing store, catalogued or not, sorted by key.
    ///
    /// # Errors
    ///
    /// `ListingFailed` when the store cannot be enumerated.
    async fn list_objects(&self) -> Result<Vec<StoredObject>>;

    /// Tables this source knows about.
    fn catalog(&self) -> &Catalog;
}

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

// =============================================================================
// HEALTH
// =============================================================================

/// `{domain: {table: available}}` for every catalogued table.
pub async fn availability<S>(source: &S) -> BTreeMap<SourceDomain, BTreeMap<String, bool>>
where
    S: DatasetSource + ?Sized,
{
    let mut report: BTreeMap<SourceDomain, BTreeMap<String, bool>> = SourceDomain::ALL
        .iter()
        .map(|d| (*d, BTreeMap::new()))
        .collect();

    let pairs: Vec<(SourceDomain, String)> = source
        .catalog()
        .iter()
        .map(|(domain, table)| (domain, table.to_string()))
        .collect();

    for (domain, table) in pairs {
        let present = source.exists(domain, &table).await;
        if !present {
            tracing::warn!(%domain, table = %table, "Catalogued table is not available");
        }
        report.entry(domain).or_default().insert(table, present);
    }

    report
}
