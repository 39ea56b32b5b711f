//! In-process document store with view-style indexes.
//!
//! Indexes are computed by scanning on every query, the way a map/reduce view
//! would be rebuilt, so they can never drift from the stored documents.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use lineage_shared::{Document, DocumentStore, IndexName, Result, index_entries};

use crate::{check_revision, next_revision};

/// [`DocumentStore`] backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write each document as a new insert.
    pub async fn seed(&self, docs: impl IntoIterator<Item = Document>) -> Result<()> {
        for doc in docs {
            self.put(&doc).await?;
        }
        Ok(())
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.docs.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn query_index(&self, index: IndexName, key: &str) -> Result<Vec<String>> {
        let docs = self.docs.read().await;
        let mut ids: Vec<String> = docs
            .values()
            .filter(|doc| {
                index_entries(doc)
                    .iter()
                    .any(|(i, k)| *i == index && k == key)
            })
            .map(|doc| doc.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn put(&self, doc: &Document) -> Result<String> {
        let mut docs = self.docs.write().await;
        let stored_rev = docs.get(&doc.id).and_then(|d| d.rev.clone());
        check_revision(&doc.id, stored_rev.as_deref(), doc.rev.as_deref())?;

        let rev = next_revision(stored_rev.as_deref(), doc)?;
        let mut stored = doc.clone();
        stored.rev = Some(rev.clone());
        docs.insert(doc.id.clone(), stored);
        Ok(rev)
    }
}
