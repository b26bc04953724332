//! Load-budget decorator for any [`DatasetSource`].

use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::error::{Result, SourceError};
use crate::source::{DatasetSource, StoredObject};
use crossdata_domain::{SourceDomain, Table};

/// Default per-table load budget.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Fails a load with [`SourceError::Timeout`] instead of letting a stalled
/// retrieval hold the whole report.
#[derive(Debug)]
pub struct TimeoutSource<S> {
    inner: S,
    budget: Duration,
}

impl<S: DatasetSource> TimeoutSource<S> {
    pub const fn new(inner: S, budget: Duration) -> Self {
        Self { inner, budget }
    }

    pub const fn budget(&self) -> Duration {
        self.budget
    }
}

#[async_trait]
impl<S: DatasetSource> DatasetSource for TimeoutSource<S> {
    async fn load(&self, domain: SourceDomain, table: &str) -> Result<Table> {
        if let Ok(result) = tokio::time::timeout(self.budget, self.inner.load(domain, table)).await {
            result
        } else {
            let timeout_ms = u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX);
            tracing::error!(%domain, table, timeout_ms, "Table load timed out");
            Err(SourceError::Timeout {
                domain,
                table: table.to_string(),
                timeout_ms,
            })
        }
    }

    async fn exists(&self, domain: SourceDomain, table: &str) -> bool {
        tokio::time::timeout(self.budget, self.inner.exists(domain, table))
            .await
            .unwrap_or(false)
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        if let Ok(result) = tokio::time::timeout(self.budget, self.inner.list_objects()).await {
            result
        } else {
            let timeout_ms = u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX);
            tracing::error!(timeout_ms, "Object listing timed out");
            Err(SourceError::ListingFailed {
                message: format!("timed out after {timeout_ms}ms"),
            })
        }
    }

    fn catalog(&self) -> &Catalog {
        self.inner.catalog()
    }
}
