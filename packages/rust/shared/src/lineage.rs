//! Embedded ancestor chains ("lineage") and the pure operations over them.
//!
//! A [`Lineage`] is an immutable, `Arc`-linked list of ancestor stubs, nearest
//! ancestor first. Cloning is cheap and [`Lineage::splice`] only copies the
//! links below the cut point; everything above is shared with the replacement.
//!
//! On the wire a lineage is the nested minified form stored in documents:
//!
//! ```json
//! { "_id": "clinic_1", "parent": { "_id": "health_center_1", "parent": { "_id": "district_1" } } }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// NodeRef
// ---------------------------------------------------------------------------

/// A lightweight pointer to another document, compared by id only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "_id")]
    pub id: String,
}

impl NodeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// ---------------------------------------------------------------------------
// Lineage
// ---------------------------------------------------------------------------

/// One ancestor stub in a chain.
#[derive(Debug, PartialEq, Eq)]
pub struct LineageLink {
    /// Ancestor document id.
    pub id: String,
    /// The ancestor's primary contact, when the stub carries it.
    pub contact: Option<NodeRef>,
    /// The rest of the chain above this ancestor.
    pub parent: Lineage,
}

/// An ordered ancestor chain, nearest first. The empty chain is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage(Option<Arc<LineageLink>>);

impl Lineage {
    /// The empty chain (a root-level node has no ancestors).
    pub const fn root() -> Self {
        Self(None)
    }

    /// Prepend `id` to `parent`.
    pub fn link(id: impl Into<String>, parent: Lineage) -> Self {
        Self::with_contact(id, None, parent)
    }

    /// Prepend `id` (optionally carrying its primary contact) to `parent`.
    pub fn with_contact(id: impl Into<String>, contact: Option<NodeRef>, parent: Lineage) -> Self {
        Self(Some(Arc::new(LineageLink {
            id: id.into(),
            contact,
            parent,
        })))
    }

    /// Build a chain from ids ordered nearest ancestor first.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.into_iter()
            .rev()
            .fold(Self::root(), |parent, id| Self::link(id, parent))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    /// The nearest ancestor, if any.
    pub fn head(&self) -> Option<&LineageLink> {
        self.0.as_deref()
    }

    /// Iterate the links, nearest first.
    pub fn iter(&self) -> Links<'_> {
        Links {
            next: self.0.as_deref(),
        }
    }

    /// Iterate the ancestor ids, nearest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|link| link.id.as_str())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether `id` appears anywhere in the chain.
    pub fn contains(&self, id: &str) -> bool {
        self.ids().any(|ancestor| ancestor == id)
    }

    /// Replace the link named `cut_id` and everything above it with `new_prefix`.
    ///
    /// Links strictly below the cut are copied unchanged (including any
    /// `contact` stubs they carry); `new_prefix` is shared, not copied. When
    /// `cut_id` does not occur the chain is returned as is.
    pub fn splice(&self, cut_id: &str, new_prefix: &Lineage) -> Lineage {
        let mut below: Vec<&LineageLink> = Vec::new();
        for link in self.iter() {
            if link.id == cut_id {
                return below.into_iter().rev().fold(new_prefix.clone(), |parent, link| {
                    Self::with_contact(link.id.clone(), link.contact.clone(), parent)
                });
            }
            below.push(link);
        }
        self.clone()
    }

    /// Whether both chains point at the same shared allocation.
    #[cfg(test)]
    fn ptr_eq(&self, other: &Lineage) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Iterator over the links of a [`Lineage`].
pub struct Links<'a> {
    next: Option<&'a LineageLink>,
}

impl<'a> Iterator for Links<'a> {
    type Item = &'a LineageLink;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.0.as_deref();
        Some(current)
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.ids().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// Serde (nested minified JSON form)
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct LinkRepr {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contact: Option<NodeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<LinkRepr>>,
}

impl LinkRepr {
    fn from_lineage(lineage: &Lineage) -> Option<Box<Self>> {
        lineage.head().map(|link| {
            Box::new(Self {
                id: link.id.clone(),
                contact: link.contact.clone(),
                parent: Self::from_lineage(&link.parent),
            })
        })
    }

    fn into_lineage(repr: Option<Box<Self>>) -> Lineage {
        match repr {
            Some(link) => {
                let LinkRepr { id, contact, parent } = *link;
                Lineage::with_contact(id, contact, Self::into_lineage(parent))
            }
            None => Lineage::root(),
        }
    }
}

impl Serialize for Lineage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        LinkRepr::from_lineage(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Lineage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = Option::<Box<LinkRepr>>::deserialize(deserializer)?;
        Ok(LinkRepr::into_lineage(repr))
    }
}
