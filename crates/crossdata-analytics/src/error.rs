//! Analytics error types.

use crossdata_storage::SourceError;
use thiserror::Error;

/// Analytics errors.
///
/// Only infrastructure failures surface here. Missing columns and
/// unavailable joins are recovered inside the report that hits them.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// A table could not be loaded from its source
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Reason a metric was omitted instead of computed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsufficientData {
    /// Fewer than two aligned periods
    #[error("at least two periods are required, got {0}")]
    TooFewPeriods(usize),

    /// One of the series never changes
    #[error("series has zero variance")]
    ZeroVariance,
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crossdata_domain::SourceDomain;

    #[test]
    fn test_source_error_names_table() {
        let err = AnalyticsError::from(SourceError::Unavailable {
            domain: SourceDomain::Cassandra,
            table: "pagos".to_string(),
            key: "cassandra/pagos/pagos.csv".to_string(),
        });
        let message = err.to_string();
        assert!(message.contains("cassandra"));
        assert!(message.contains("pagos"));
    }
}
