//! Move validation: cycles, parent types, and primary-contact protection.

use std::collections::{BTreeMap, HashSet};

use lineage_shared::{Document, Lineage, LineageError, MoveConfig, Result};

/// Reject moving `contact_id` under itself or under one of its descendants.
///
/// Needs only the new parent: a descendant of the contact carries the
/// contact's id in its own chain.
pub fn check_cycle(contact_id: &str, parent: Option<&Document>) -> Result<()> {
    let Some(parent) = parent else {
        return Ok(());
    };
    if parent.id == contact_id {
        return Err(LineageError::invalid_move(format!(
            "cannot move contact '{contact_id}' to be a child of itself"
        )));
    }
    if parent.parent.contains(contact_id) {
        return Err(LineageError::invalid_move(format!(
            "circular hierarchy: '{}' is a descendant of '{contact_id}'",
            parent.id
        )));
    }
    Ok(())
}

/// Parent-type rules from the `[hierarchy]` config table.
#[derive(Debug, Clone)]
pub struct HierarchyRules {
    enforce: bool,
    allowed_parents: BTreeMap<String, Vec<String>>,
}

impl HierarchyRules {
    pub fn from_config(config: &MoveConfig) -> Self {
        Self {
            enforce: config.enforce_hierarchy,
            allowed_parents: config.allowed_parents.clone(),
        }
    }

    /// Check that `contact` may live under `parent` (`None` is the root).
    pub fn check_parent(&self, contact: &Document, parent: Option<&Document>) -> Result<()> {
        let Some(contact_type) = contact.contact_type() else {
            return Err(LineageError::invalid_move(format!(
                "document '{}' of type '{}' is not a contact",
                contact.id, contact.doc_type
            )));
        };

        let Some(parent) = parent else {
            return Ok(());
        };
        let Some(parent_type) = parent.contact_type() else {
            return Err(LineageError::invalid_move(format!(
                "parent '{}' of type '{}' is not a contact",
                parent.id, parent.doc_type
            )));
        };

        if !self.enforce {
            return Ok(());
        }

        let allowed = self.allowed_parents.get(contact_type).ok_or_else(|| {
            LineageError::invalid_move(format!("cannot move contact with unknown type '{contact_type}'"))
        })?;

        if allowed.iter().any(|t| t == parent_type) {
            Ok(())
        } else {
            Err(LineageError::invalid_move(format!(
                "contacts of type '{contact_type}' cannot have parent of type '{parent_type}'"
            )))
        }
    }
}

/// Reject a move that would take a place's primary contact out of that place.
///
/// `ancestors` are the moved contact's current ancestors; those still present
/// in `new_parent` keep the whole subtree and are exempt.
pub fn check_primary_contacts(
    moved_id: &str,
    ancestors: &[&Document],
    subtree: &HashSet<&str>,
    new_parent: &Lineage,
) -> Result<()> {
    for ancestor in ancestors {
        if new_parent.contains(&ancestor.id) {
            continue;
        }
        if let Some(primary) = ancestor.primary_contact_id() {
            if subtree.contains(primary) {
                return Err(LineageError::invalid_move(format!(
                    "contact '{primary}' is the primary contact for '{}' and cannot be moved with '{moved_id}'",
                    ancestor.id
                )));
            }
        }
    }
    Ok(())
}
