//! Lineage rewriter: recompute one document's chain for one move.
//!
//! Contacts get `parent` rewritten, along with the chain embedded in their
//! primary `contact`. Reports get their `contact` chain rewritten. Nothing else on the document changes, and an unchanged result
//! is still returned so the staging layer can decide what to do with it.

use lineage_shared::{Document, Lineage, LineageError, Result};

/// The chain a child of `parent` carries; the root sentinel maps to the empty chain.
pub fn root_chain(parent: Option<&Document>) -> Lineage {
    parent.map(Document::lineage_as_parent).unwrap_or_default()
}

/// One contact's relocation.
#[derive(Debug, Clone)]
pub struct MovePlan {
    contact_id: String,
    new_parent: Lineage,
    replacement: Lineage,
}

impl MovePlan {
    pub fn new(contact_id: impl Into<String>, new_parent: Lineage) -> Self {
        let contact_id = contact_id.into();
        let replacement = Lineage::link(contact_id.clone(), new_parent.clone());
        Self {
            contact_id,
            new_parent,
            replacement,
        }
    }

    pub fn contact_id(&self) -> &str {
        &self.contact_id
    }

    /// The moved contact's own new `parent`.
    pub fn new_parent(&self) -> &Lineage {
        &self.new_parent
    }

    /// What replaces the moved contact's link, and everything above it, in a dependent chain.
    pub fn replacement(&self) -> &Lineage {
        &self.replacement
    }
}

/// Rewrite `doc` for `plan`.
pub fn rewrite(doc: &Document, plan: &MovePlan) -> Result<Document> {
    let mut out = doc.clone();

    if doc.is_report() {
        let chain = doc.contact.as_ref().ok_or_else(|| {
            LineageError::unsupported_shape(&doc.id, "report has no contact lineage")
        })?;
        out.contact = Some(chain.splice(&plan.contact_id, &plan.replacement));
    } else if doc.is_contact() {
        out.parent = if doc.id == plan.contact_id {
            plan.new_parent.clone()
        } else {
            doc.parent.splice(&plan.contact_id, &plan.replacement)
        };
        // The primary person keeps its id; only the chain above it follows the move.
        out.contact = doc
            .contact
            .as_ref()
            .map(|chain| chain.splice(&plan.contact_id, &plan.replacement));
    } else {
        return Err(LineageError::unsupported_shape(
            &doc.id,
            format!("documents of type '{}' carry no lineage", doc.doc_type),
        ));
    }

    Ok(out)
}
