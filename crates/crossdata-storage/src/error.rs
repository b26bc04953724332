//! Dataset source error types

use crossdata_domain::SourceDomain;
use thiserror::Error;

/// Failures raised by a [`DatasetSource`](crate::DatasetSource).
///
/// None of these are recoverable inside a report: the report that needed the
/// table fails as a whole, naming the offending domain and table.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Table '{table}' is not registered for domain {domain}")]
    NotFound { domain: SourceDomain, table: String },

    #[error("Table {domain}.{table} is unavailable: object '{key}' does not exist")]
    Unavailable {
        domain: SourceDomain,
        table: String,
        key: String,
    },

    #[error("I/O failure loading {domain}.{table}: {message}")]
    IoFailure {
        domain: SourceDomain,
        table: String,
        message: String,
    },

    #[error("Loading {domain}.{table} timed out after {timeout_ms}ms")]
    Timeout {
        domain: SourceDomain,
        table: String,
        timeout_ms: u64,
    },

    #[error("Listing stored objects failed: {message}")]
    ListingFailed { message: String },
}

impl SourceError {
    /// Domain of the table that failed to load; `None` for listing failures.
    #[must_use]
    pub const fn domain(&self) -> Option<SourceDomain> {
        match self {
            Self::NotFound { domain, .. }
            | Self::Unavailable { domain, .. }
            | Self::IoFailure { domain, .. }
            | Self::Timeout { domain, .. } => Some(*domain),
            Self::ListingFailed { .. } => None,
        }
    }

    /// Name of the table that failed to load; `None` for listing failures.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::NotFound { table, .. }
            | Self::Unavailable { table, .. }
            | Self::IoFailure { table, .. }
            | Self::Timeout { table, .. } => Some(table),
            Self::ListingFailed { .. } => None,
        }
    }

    pub(crate) fn io(domain: SourceDomain, table: &str, err: impl std::fmt::Display) -> Self {
        Self::IoFailure {
            domain,
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

impl SourceError {
    pub(crate) fn listing(err: impl std::fmt::Display) -> Self {
        Self::ListingFailed {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
