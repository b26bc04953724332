//! # Cross-Source Storage Library
//!
//! The `DatasetSource` boundary of the analytics engine: every table the
//! engine reads comes through this crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Report Assembler                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  DatasetSource trait                         │
//! │       (load, exists, list objects, catalog of tables)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TimeoutSource wrapper                       │
//! │                (per-table load budget)                       │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │   ObjectStoreSource     │   │      InMemorySource          │
//! │ (local dir / S3, CSV)   │   │   (tests, demos)             │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `s3`: Enable the S3 object store backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crossdata_storage::{DatasetSource, ObjectStoreSource, TimeoutSource};
//!
//! let source = TimeoutSource::new(ObjectStoreSource::local("./data")?, budget);
//! let claims = source.load(SourceDomain::Cassandra, "reclamos").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod codec;
pub mod error;
pub mod info;
pub mod source;

// Re-export commonly used types
pub use catalog::Catalog;
pub use codec::decode_csv;
pub use error::{Result, SourceError};
pub use info::{TableInfo, describe_table};
pub use source::{
    DEFAULT_LOAD_TIMEOUT, DatasetSource, InMemorySource, ObjectStoreSource, StoredObject,
    TimeoutSource, availability,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
