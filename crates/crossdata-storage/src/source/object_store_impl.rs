//! Object-store backed dataset source.
//!
//! Tables are CSV objects laid out as described by the [`Catalog`]. The store
//! can be a local directory (development, tests) or an S3 bucket (`s3`
//! feature).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use object_store::{ObjectMeta, ObjectStore};
use object_store::local::LocalFileSystem;
use object_store::path::Path;

use crate::catalog::Catalog;
use crate::codec::decode_csv;
use crate::error::{Result, SourceError};
use crate::source::{DatasetSource, StoredObject};
use crossdata_domain::{SourceDomain, Table};

// =============================================================================
// OBJECT STORE SOURCE
// =============================================================================

/// CSV tables read from an [`ObjectStore`].
#[derive(Debug)]
pub struct ObjectStoreSource {
    store: Arc<dyn ObjectStore>,
    catalog: Catalog,
}

impl ObjectStoreSource {
    /// Wrap an existing store.
    pub fn new(store: Arc<dyn ObjectStore>, catalog: Catalog) -> Self {
        Self { store, catalog }
    }

    /// Source rooted at a local directory using the default catalog layout.
    ///
    /// # Errors
    ///
    /// Fails when `root` does not exist or cannot be canonicalized.
    pub fn local(root: impl AsRef<std::path::Path>) -> object_store::Result<Self> {
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store), Catalog::default()))
    }

    /// Source backed by an S3 bucket. Credentials come from the standard
    /// `AWS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Fails when the builder rejects the configuration.
    #[cfg(feature = "s3")]
    pub fn s3(bucket: &str, region: &str) -> object_store::Result<Self> {
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .build()?;
        Ok(Self::new(Arc::new(store), Catalog::default()))
    }

    fn path_for(&self, domain: SourceDomain, table: &str) -> Result<Path> {
        self.catalog
            .key(domain, table)
            .map(Path::from)
            .ok_or_else(|| SourceError::NotFound {
                domain,
                table: table.to_string(),
            })
    }
}

#[async_trait]
impl DatasetSource for ObjectStoreSource {
    #[tracing::instrument(skip(self))]
    async fn load(&self, domain: SourceDomain, table: &str) -> Result<Table> {
        let path = self.path_for(domain, table)?;

        let fetched = match self.store.get(&path).await {
            Ok(result) => result.bytes().await,
            Err(e) => Err(e),
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(object_store::Error::NotFound { .. }) => {
                tracing::error!(key = %path, "Object not found");
                return Err(SourceError::Unavailable {
                    domain,
                    table: table.to_string(),
                    key: path.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(key = %path, error = %e, "Object retrieval failed");
                return Err(SourceError::io(domain, table, e));
            }
        };

        let decoded = decode_csv(&bytes).map_err(|e| SourceError::io(domain, table, e))?;
        tracing::info!(
            key = %path,
            rows = decoded.len(),
            columns = decoded.column_count(),
            "Loaded table"
        );
        Ok(decoded)
    }

    async fn exists(&self, domain: SourceDomain, table: &str) -> bool {
        match self.path_for(domain, table) {
            Ok(path) => self.store.head(&path).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        let metas: Vec<ObjectMeta> = self
            .store
            .list(None)
            .try_collect()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Object listing failed");
                SourceError::listing(e)
            })?;

        let mut objects: Vec<StoredObject> = metas
            .into_iter()
            .map(|meta| StoredObject {
                key: meta.location.to_string(),
                size: meta.size,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        tracing::info!(objects = objects.len(), "Listed stored objects");
        Ok(objects)
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}
