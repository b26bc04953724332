//! # Source Module
//!
//! `DatasetSource` trait and its implementations.

pub mod memory;
pub mod object_store_impl;
pub mod timeout;
pub mod traits;

pub use memory::InMemorySource;
pub use object_store_impl::ObjectStoreSource;
pub use timeout::{DEFAULT_LOAD_TIMEOUT, TimeoutSource};
pub use traits::{DatasetSource, StoredObject, availability};
