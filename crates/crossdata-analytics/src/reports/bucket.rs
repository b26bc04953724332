//! Inventory of the objects behind the dataset source, grouped by domain prefix.

use serde::Serialize;

use super::AnalyticsEngine;
use crate::aggregate::round2;
use crate::error::Result;
use crate::ordered::{Counts, OrderedMap};
use crossdata_domain::SourceDomain;

const OTHER: &str = "other";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub total_objects: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    /// Object count per domain prefix plus `other`, always all four.
    pub databases: Counts,
    pub file_list: OrderedMap<Vec<String>>,
}

impl AnalyticsEngine<'_> {
    /// Every stored object, catalogued or not, grouped by its leading
    /// `<domain>/` segment.
    ///
    /// # Errors
    ///
    /// Propagates `ListingFailed` from the source.
    #[tracing::instrument(skip(self))]
    pub async fn bucket_summary(&self) -> Result<BucketSummary> {
        let objects = self.source.list_objects().await.map_err(|e| {
            tracing::error!(error = %e, "Object listing failed");
            e
        })?;

        let groups: Vec<&str> = SourceDomain::ALL
            .iter()
            .map(SourceDomain::as_str)
            .chain(std::iter::once(OTHER))
            .collect();
        let mut file_list: OrderedMap<Vec<String>> =
            groups.iter().map(|group| (*group, Vec::new())).collect();

        for object in &objects {
            let group = SourceDomain::ALL
                .iter()
                .map(SourceDomain::as_str)
                .find(|domain| {
                    object
                        .key
                        .strip_prefix(domain)
                        .is_some_and(|rest| rest.starts_with('/'))
                })
                .unwrap_or(OTHER);
            file_list.entry_or_default(group).push(object.key.clone());
        }

        let total_size_bytes: u64 = objects.iter().map(|o| o.size).sum();
        #[allow(clippy::cast_precision_loss)]
        let total_size_mb = round2(total_size_bytes as f64 / BYTES_PER_MB);

        tracing::info!(objects = objects.len(), total_size_bytes, "Bucket summarized");

        Ok(BucketSummary {
            total_objects: objects.len(),
            total_size_bytes,
            total_size_mb,
            databases: file_list.iter().map(|(group, keys)| (group, keys.len())).collect(),
            file_list,
        })
    }
}
