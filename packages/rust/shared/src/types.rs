//! Core document types: contacts (places and people) and reports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lineage::Lineage;

// ---------------------------------------------------------------------------
// DocType
// ---------------------------------------------------------------------------

/// The `type` field of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    DistrictHospital,
    HealthCenter,
    Clinic,
    Person,
    /// Configurable contact; the concrete type lives in `contact_type`.
    Contact,
    /// A submitted report.
    DataRecord,
    /// Anything else, preserved verbatim.
    Other(String),
}

impl DocType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DistrictHospital => "district_hospital",
            Self::HealthCenter => "health_center",
            Self::Clinic => "clinic",
            Self::Person => "person",
            Self::Contact => "contact",
            Self::DataRecord => "data_record",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for DocType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "district_hospital" => Self::DistrictHospital,
            "health_center" => Self::HealthCenter,
            "clinic" => Self::Clinic,
            "person" => Self::Person,
            "contact" => Self::Contact,
            "data_record" => Self::DataRecord,
            _ => Self::Other(s),
        }
    }
}

impl From<DocType> for String {
    fn from(t: DocType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A stored document. Fields outside the lineage model are carried in
/// `fields` and survive a rewrite untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    /// Store revision; `None` for documents never written.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Ancestor chain of a contact. Root-level contacts have none.
    #[serde(default, skip_serializing_if = "Lineage::is_root")]
    pub parent: Lineage,
    /// Primary contact of a place, or the creator chain of a report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Lineage>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, doc_type: DocType) -> Self {
        Self {
            id: id.into(),
            rev: None,
            doc_type,
            parent: Lineage::root(),
            contact: None,
            fields: Map::new(),
        }
    }

    /// Parse a document from JSON text.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::LineageError::parse(e.to_string()))
    }

    pub fn is_report(&self) -> bool {
        self.doc_type == DocType::DataRecord
    }

    pub fn is_contact(&self) -> bool {
        self.contact_type().is_some()
    }

    /// The hierarchy type of a contact, or `None` for non-contacts.
    pub fn contact_type(&self) -> Option<&str> {
        match &self.doc_type {
            DocType::DistrictHospital | DocType::HealthCenter | DocType::Clinic | DocType::Person => {
                Some(self.doc_type.as_str())
            }
            DocType::Contact => self.fields.get("contact_type").and_then(Value::as_str),
            DocType::DataRecord | DocType::Other(_) => None,
        }
    }

    /// The chain this document embeds: `parent` for contacts, `contact` for reports.
    pub fn chain(&self) -> Option<&Lineage> {
        if self.is_report() {
            self.contact.as_ref()
        } else if self.is_contact() {
            Some(&self.parent)
        } else {
            None
        }
    }

    /// The chain a child of this document would carry: this id, then its own parents.
    pub fn lineage_as_parent(&self) -> Lineage {
        Lineage::link(self.id.clone(), self.parent.clone())
    }

    /// Id of a contact's primary person, if set.
    pub fn primary_contact_id(&self) -> Option<&str> {
        if !self.is_contact() {
            return None;
        }
        self.contact
            .as_ref()
            .and_then(Lineage::head)
            .map(|link| link.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_type_roundtrip() {
        for name in [
            "district_hospital",
            "health_center",
            "clinic",
            "person",
            "contact",
            "data_record",
            "feedback",
        ] {
            let t = DocType::from(name.to_string());
            assert_eq!(t.as_str(), name);
        }
        assert_eq!(DocType::from("feedback".to_string()), DocType::Other("feedback".into()));
    }

    #[test]
    fn contact_document_preserves_unknown_fields() {
        let raw = json!({
            "_id": "clinic_1",
            "_rev": "1-abc",
            "type": "clinic",
            "name": "Clinic One",
            "reported_date": 1700000000,
            "parent": {"_id": "health_center_1", "parent": {"_id": "district_1"}},
            "contact": {"_id": "clinic_1_contact", "parent": {"_id": "clinic_1"}}
        });

        let doc: Document = serde_json::from_value(raw.clone()).expect("deserialize");
        assert!(doc.is_contact());
        assert_eq!(doc.contact_type(), Some("clinic"));
        assert_eq!(doc.primary_contact_id(), Some("clinic_1_contact"));
        assert_eq!(doc.parent.to_string(), "[health_center_1, district_1]");

        let back = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(back, raw);
    }

    #[test]
    fn root_contact_omits_parent() {
        let doc = Document::new("district_1", DocType::DistrictHospital);
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("parent").is_none());
        assert!(json.get("_rev").is_none());

        let parsed: Document =
            serde_json::from_value(json!({"_id": "d", "type": "district_hospital", "parent": null}))
                .unwrap();
        assert!(parsed.parent.is_root());
    }

    #[test]
    fn configurable_contact_type() {
        let doc: Document = serde_json::from_value(json!({
            "_id": "chw_area_1",
            "type": "contact",
            "contact_type": "chw_area"
        }))
        .unwrap();
        assert_eq!(doc.contact_type(), Some("chw_area"));

        let untyped: Document =
            serde_json::from_value(json!({"_id": "x", "type": "contact"})).unwrap();
        assert!(!untyped.is_contact());
    }

    #[test]
    fn report_chain_is_contact_field() {
        let doc: Document = serde_json::from_value(json!({
            "_id": "report_1",
            "type": "data_record",
            "form": "pregnancy",
            "contact": {"_id": "p1", "parent": {"_id": "clinic_1"}}
        }))
        .unwrap();
        assert!(doc.is_report());
        assert_eq!(doc.chain().map(ToString::to_string).as_deref(), Some("[p1, clinic_1]"));
        assert_eq!(doc.primary_contact_id(), None);

        let missing: Document =
            serde_json::from_value(json!({"_id": "r2", "type": "data_record"})).unwrap();
        assert!(missing.chain().is_none());
    }

    #[test]
    fn lineage_as_parent_prepends_self() {
        let mut doc = Document::new("health_center_1", DocType::HealthCenter);
        doc.parent = Lineage::from_ids(["district_1"]);
        assert_eq!(doc.lineage_as_parent().to_string(), "[health_center_1, district_1]");
    }

    #[test]
    fn from_json_reports_parse_errors() {
        let err = Document::from_json("{\"_id\": 1}").unwrap_err();
        assert!(err.to_string().starts_with("parse error"));
    }
}
