//! Hierarchy index client.
//!
//! Answers "which documents embed node X in their chain" through the store's
//! secondary indexes. Returns ids only; callers fetch content separately.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use lineage_shared::{DocumentStore, IndexName, Result};

/// Descendant and report lookups over embedded chains.
#[async_trait]
pub trait LineageIndex: Send + Sync {
    /// Contacts whose `parent` chain contains `id`, including `id` itself.
    async fn contacts_under(&self, id: &str) -> Result<Vec<String>>;

    /// Reports whose embedded `contact` chain contains `id`.
    async fn reports_under(&self, id: &str) -> Result<Vec<String>>;
}

/// [`LineageIndex`] served by a [`DocumentStore`]'s views.
#[derive(Clone)]
pub struct ViewIndex {
    store: Arc<dyn DocumentStore>,
}

impl ViewIndex {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LineageIndex for ViewIndex {
    async fn contacts_under(&self, id: &str) -> Result<Vec<String>> {
        let ids = self
            .store
            .query_index(IndexName::ContactsByAncestor, id)
            .await?;
        debug!(%id, count = ids.len(), "contacts under node");
        Ok(ids)
    }

    async fn reports_under(&self, id: &str) -> Result<Vec<String>> {
        let ids = self
            .store
            .query_index(IndexName::ReportsByAncestor, id)
            .await?;
        debug!(%id, count = ids.len(), "reports under node");
        Ok(ids)
    }
}
