//! Fixtures shared by the crate's unit tests.
//!
//! The reference hierarchy:
//!
//! ```text
//! district_1
//! └── health_center_1            (primary contact: health_center_1_contact)
//!     ├── health_center_1_contact
//!     │     └── report_1         (submitted by health_center_1_contact)
//!     └── clinic_1
//!         └── patient_1
//! district_2
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use lineage_shared::{
    DocType, Document, DocumentStore, IndexName, Lineage, LineageError, NodeRef, Result,
};
use lineage_storage::MemoryStore;

pub(crate) fn place(id: &str, doc_type: DocType, parents: &[&str]) -> Document {
    let mut doc = Document::new(id, doc_type);
    doc.parent = Lineage::from_ids(parents.iter().copied());
    doc.fields.insert("name".into(), json!(id.replace('_', " ")));
    doc
}

pub(crate) fn person(id: &str, parents: &[&str]) -> Document {
    place(id, DocType::Person, parents)
}

pub(crate) fn report(id: &str, chain: &[&str]) -> Document {
    let mut doc = Document::new(id, DocType::DataRecord);
    doc.contact = Some(Lineage::from_ids(chain.iter().copied()));
    doc.fields.insert("form".into(), json!("pregnancy"));
    doc.fields.insert("fields".into(), json!({"lmp": 12}));
    doc
}

pub(crate) fn with_primary_contact(mut doc: Document, contact_id: &str) -> Document {
    doc.contact = Some(Lineage::link(contact_id, Lineage::root()));
    doc
}

/// Primary contact stored with its own ancestor chain, as person lineage.
pub(crate) fn with_primary_contact_chain(mut doc: Document, contact_id: &str) -> Document {
    doc.contact = Some(Lineage::link(contact_id, doc.lineage_as_parent()));
    doc
}

pub(crate) fn reference_documents() -> Vec<Document> {
    vec![
        place("district_1", DocType::DistrictHospital, &[]),
        place("district_2", DocType::DistrictHospital, &[]),
        with_primary_contact(
            place("health_center_1", DocType::HealthCenter, &["district_1"]),
            "health_center_1_contact",
        ),
        person("health_center_1_contact", &["health_center_1", "district_1"]),
        place("clinic_1", DocType::Clinic, &["health_center_1", "district_1"]),
        person("patient_1", &["clinic_1", "health_center_1", "district_1"]),
        report("report_1", &["health_center_1_contact", "health_center_1", "district_1"]),
    ]
}

pub(crate) async fn store_with(docs: Vec<Document>) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.seed(docs).await.expect("seed store");
    Arc::new(store)
}

pub(crate) async fn reference_store() -> Arc<MemoryStore> {
    store_with(reference_documents()).await
}

pub(crate) fn ids(lineage: &Lineage) -> Vec<&str> {
    lineage.ids().collect()
}

pub(crate) fn primary(id: &str) -> Option<NodeRef> {
    Some(NodeRef::new(id))
}

/// A store that fails reads for selected ids or index keys.
pub(crate) struct FailingStore {
    inner: Arc<MemoryStore>,
    fail_get: HashSet<String>,
    fail_query: HashSet<String>,
}

impl FailingStore {
    pub(crate) fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_get: HashSet::new(),
            fail_query: HashSet::new(),
        }
    }

    pub(crate) fn fail_get(mut self, id: &str) -> Self {
        self.fail_get.insert(id.to_string());
        self
    }

    pub(crate) fn fail_query(mut self, key: &str) -> Self {
        self.fail_query.insert(key.to_string());
        self
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        if self.fail_get.contains(id) {
            return Err(LineageError::Storage(format!("injected read failure for {id}")));
        }
        self.inner.get(id).await
    }

    async fn query_index(&self, index: IndexName, key: &str) -> Result<Vec<String>> {
        if self.fail_query.contains(key) {
            return Err(LineageError::Storage(format!("injected {index} failure for {key}")));
        }
        self.inner.query_index(index, key).await
    }

    async fn put(&self, doc: &Document) -> Result<String> {
        self.inner.put(doc).await
    }
}
