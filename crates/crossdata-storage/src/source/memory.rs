//! In-memory dataset source for tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::error::{Result, SourceError};
use crate::source::{DatasetSource, StoredObject};
use crossdata_domain::{SourceDomain, Table};

/// Tables held in memory, keyed like the object store.
///
/// Built once with [`InMemorySource::with_table`] and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    catalog: Catalog,
    tables: HashMap<(SourceDomain, String), Table>,
    extra_objects: Vec<StoredObject>,
}

impl InMemorySource {
    /// Source with the default catalog and no loaded tables, so every
    /// catalogued table reports `Unavailable` until provided.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a table, registering it in the catalog when needed.
    #[must_use]
    pub fn with_table(mut self, domain: SourceDomain, name: &str, table: Table) -> Self {
        if !self.catalog.contains(domain, name) {
            self.catalog
                .register(domain, name, format!("memory://{domain}/{name}"));
        }
        self.tables.insert((domain, name.to_string()), table);
        self
    }

    /// Provide an uncatalogued object that only shows up in listings.
    #[must_use]
    pub fn with_object(mut self, key: &str, size: u64) -> Self {
        self.extra_objects.push(StoredObject {
            key: key.to_string(),
            size,
        });
        self
    }
}

#[async_trait]
impl DatasetSource for InMemorySource {
    async fn load(&self, domain: SourceDomain, table: &str) -> Result<Table> {
        let Some(key) = self.catalog.key(domain, table) else {
            return Err(SourceError::NotFound {
                domain,
                table: table.to_string(),
            });
        };

        self.tables
            .get(&(domain, table.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::Unavailable {
                domain,
                table: table.to_string(),
                key: key.to_string(),
            })
    }

    async fn exists(&self, domain: SourceDomain, table: &str) -> bool {
        self.tables.contains_key(&(domain, table.to_string()))
    }

    /// Held tables under their catalogued keys (size 0) plus the extra objects.
    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        let mut objects: Vec<StoredObject> = self
            .tables
            .keys()
            .filter_map(|(domain, name)| self.catalog.key(*domain, name))
            .map(|key| StoredObject {
                key: key.to_string(),
                size: 0,
            })
            .chain(self.extra_objects.iter().cloned())
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}
