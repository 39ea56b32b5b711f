//! Storage port consumed by the lineage engine.
//!
//! The store offers single-document reads and writes with revision-based
//! optimistic concurrency, plus two secondary indexes over embedded chains.
//! There are no joins and no multi-document transactions.

use async_trait::async_trait;

use crate::Result;
use crate::types::Document;

/// Secondary indexes every store must maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexName {
    /// Key X: contacts whose `parent` chain contains X, plus X itself.
    ContactsByAncestor,
    /// Key X: reports whose `contact` chain contains X.
    ReportsByAncestor,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactsByAncestor => "contacts_by_ancestor",
            Self::ReportsByAncestor => "reports_by_ancestor",
        }
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document storage adapter.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Ids of documents indexed under `key`, sorted.
    async fn query_index(&self, index: IndexName, key: &str) -> Result<Vec<String>>;

    /// Write a document. `doc.rev` must match the stored revision (or be
    /// `None` for a new document). Returns the new revision.
    async fn put(&self, doc: &Document) -> Result<String>;
}

/// Index rows a document contributes, as `(index, key)` pairs.
pub fn index_entries(doc: &Document) -> Vec<(IndexName, String)> {
    if doc.is_contact() {
        std::iter::once(doc.id.as_str())
            .chain(doc.parent.ids())
            .map(|key| (IndexName::ContactsByAncestor, key.to_string()))
            .collect()
    } else if doc.is_report() {
        doc.contact
            .iter()
            .flat_map(|chain| chain.ids())
            .map(|key| (IndexName::ReportsByAncestor, key.to_string()))
            .collect()
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocType, Lineage};

    #[test]
    fn contact_indexed_under_self_and_ancestors() {
        let mut doc = Document::new("clinic_1", DocType::Clinic);
        doc.parent = Lineage::from_ids(["health_center_1", "district_1"]);
        let keys: Vec<_> = index_entries(&doc).into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec!["clinic_1", "health_center_1", "district_1"]);
        assert!(
            index_entries(&doc)
                .iter()
                .all(|(i, _)| *i == IndexName::ContactsByAncestor)
        );
    }

    #[test]
    fn report_indexed_under_contact_chain() {
        let mut doc = Document::new("report_1", DocType::DataRecord);
        doc.contact = Some(Lineage::from_ids(["p1", "clinic_1"]));
        let entries = index_entries(&doc);
        assert_eq!(
            entries,
            vec![
                (IndexName::ReportsByAncestor, "p1".to_string()),
                (IndexName::ReportsByAncestor, "clinic_1".to_string()),
            ]
        );

        let bare = Document::new("report_2", DocType::DataRecord);
        assert!(index_entries(&bare).is_empty());
    }

    #[test]
    fn other_documents_not_indexed() {
        let doc = Document::new("settings", DocType::Other("settings".into()));
        assert!(index_entries(&doc).is_empty());
        assert_eq!(IndexName::ReportsByAncestor.to_string(), "reports_by_ancestor");
    }
}
