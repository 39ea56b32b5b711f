//! Affected-document resolver.
//!
//! Given a move request, finds every document whose embedded chain must
//! change and computes its new version:
//!
//! 1. Validate the target parent and the moved contacts (not-found, cycles,
//!    parent types) before any index query
//! 2. Discover descendants, their reports, and primary-contact persons
//! 3. Check primary-contact protection against the leaving ancestors
//! 4. Rewrite every affected document, move by move
//!
//! All reads finish before the first rewrite. The resolver never writes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use lineage_shared::{Document, DocumentStore, LineageError, MoveConfig, Result};

use crate::constraints::{HierarchyRules, check_cycle, check_primary_contacts};
use crate::index::LineageIndex;
use crate::reads::{fetch_documents, run_bounded};
use crate::rewriter::{MovePlan, rewrite, root_chain};

/// Parent id that denotes the top of the hierarchy.
pub const ROOT_SENTINEL: &str = "root";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Where the moved contacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentTarget {
    Root,
    Contact(String),
}

impl ParentTarget {
    pub fn parse(id: &str) -> Self {
        if id == ROOT_SENTINEL {
            Self::Root
        } else {
            Self::Contact(id.to_string())
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Contact(id) => Some(id),
        }
    }
}

impl fmt::Display for ParentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id().unwrap_or(ROOT_SENTINEL))
    }
}

/// `{contactIds, parentId}`.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub contact_ids: Vec<String>,
    pub parent: ParentTarget,
}

impl MoveRequest {
    pub fn new<I, S>(contact_ids: I, parent_id: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contact_ids: contact_ids.into_iter().map(Into::into).collect(),
            parent: ParentTarget::parse(parent_id),
        }
    }

    /// Requested ids without repeats, in request order.
    pub fn unique_contact_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.contact_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Documents reached from one moved contact, in rewrite order.
#[derive(Debug, Clone, Default)]
pub struct AffectedSet {
    pub contact_id: String,
    /// Descendant contacts, excluding the moved contact.
    pub descendants: Vec<String>,
    /// Primary persons of the moved contact and its descendants.
    pub primary_contacts: Vec<String>,
    /// Reports whose chain passes through the subtree.
    pub reports: Vec<String>,
}

impl AffectedSet {
    /// Every affected id: the moved contact first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.contact_id.as_str())
            .chain(self.descendants.iter().map(String::as_str))
            .chain(self.primary_contacts.iter().map(String::as_str))
            .chain(self.reports.iter().map(String::as_str))
    }
}

/// Output of [`Resolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Rewritten documents in computation order; ids may repeat.
    pub updates: Vec<Document>,
    /// Stored versions of every document read.
    pub originals: HashMap<String, Document>,
    /// Per moved contact, what was reached.
    pub affected: Vec<AffectedSet>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Finds and rewrites every document impacted by a move.
pub struct Resolver {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn LineageIndex>,
    rules: HierarchyRules,
    read_concurrency: usize,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn LineageIndex>,
        config: &MoveConfig,
    ) -> Self {
        Self {
            store,
            index,
            rules: HierarchyRules::from_config(config),
            read_concurrency: config.read_concurrency.max(1),
        }
    }

    /// Resolve `request` into rewritten documents.
    #[instrument(skip_all, fields(contacts = request.contact_ids.len(), parent = %request.parent))]
    pub async fn resolve(&self, request: &MoveRequest) -> Result<Resolution> {
        let contact_ids = request.unique_contact_ids();
        if contact_ids.is_empty() {
            return Err(LineageError::validation("no contacts to move"));
        }

        // --- Validate the target parent ---
        let parent = match &request.parent {
            ParentTarget::Root => None,
            ParentTarget::Contact(id) => Some(
                self.store
                    .get(id)
                    .await?
                    .ok_or_else(|| LineageError::not_found(id))?,
            ),
        };
        for id in &contact_ids {
            check_cycle(id, parent.as_ref())?;
        }
        let new_parent = root_chain(parent.as_ref());

        // --- Load and validate the moved contacts ---
        let mut loaded: HashMap<String, Document> = HashMap::new();
        self.load(&mut loaded, contact_ids.clone(), Missing::Fail).await?;
        for id in &contact_ids {
            self.rules.check_parent(&loaded[id], parent.as_ref())?;
        }

        // --- Discover descendants ---
        let index = self.index.clone();
        let descendants = run_bounded(contact_ids.clone(), self.read_concurrency, |id| {
            let index = index.clone();
            async move { index.contacts_under(&id).await }
        })
        .await?;

        let mut affected: Vec<AffectedSet> = descendants
            .into_iter()
            .map(|(contact_id, ids)| AffectedSet {
                descendants: ids.into_iter().filter(|d| *d != contact_id).collect(),
                contact_id,
                ..AffectedSet::default()
            })
            .collect();

        let descendant_ids: Vec<String> = affected
            .iter()
            .flat_map(|set| set.descendants.iter().cloned())
            .collect();
        self.load(&mut loaded, descendant_ids, Missing::Fail).await?;
        for set in &affected {
            for id in &set.descendants {
                check_descendant_shape(&loaded[id], &set.contact_id)?;
            }
        }

        // --- Discover reports through every subtree member ---
        let subtree_keys: Vec<String> = unique(
            affected
                .iter()
                .flat_map(|set| std::iter::once(&set.contact_id).chain(&set.descendants))
                .cloned(),
        );
        let report_hits: HashMap<String, Vec<String>> =
            run_bounded(subtree_keys, self.read_concurrency, |id| {
                let index = index.clone();
                async move { index.reports_under(&id).await }
            })
            .await?
            .into_iter()
            .collect();

        for set in &mut affected {
            let subtree = std::iter::once(&set.contact_id).chain(&set.descendants);
            set.reports = unique(subtree.flat_map(|id| report_hits[id].iter().cloned()));
        }
        let report_ids: Vec<String> =
            affected.iter().flat_map(|s| s.reports.iter().cloned()).collect();
        self.load(&mut loaded, report_ids, Missing::Fail).await?;
        for set in &affected {
            for id in &set.reports {
                check_report_shape(&loaded[id])?;
            }
        }

        // --- Primary contacts of affected contacts ---
        let wanted: Vec<String> = affected
            .iter()
            .flat_map(|set| subtree_primary_ids(set, &loaded))
            .collect();
        self.load(&mut loaded, wanted, Missing::Skip).await?;
        for set in &mut affected {
            let ids = subtree_primary_ids(set, &loaded);
            set.primary_contacts = ids.into_iter().filter(|id| loaded.contains_key(id)).collect();
        }

        // --- Primary-contact protection ---
        let ancestor_ids: Vec<String> = contact_ids
            .iter()
            .flat_map(|id| loaded[id].parent.ids().map(str::to_string).collect::<Vec<_>>())
            .collect();
        self.load(&mut loaded, ancestor_ids, Missing::Skip).await?;
        for set in &affected {
            let moved = &loaded[&set.contact_id];
            let ancestors: Vec<&Document> =
                moved.parent.ids().filter_map(|id| loaded.get(id)).collect();
            let subtree: HashSet<&str> = std::iter::once(set.contact_id.as_str())
                .chain(set.descendants.iter().map(String::as_str))
                .collect();
            check_primary_contacts(&set.contact_id, &ancestors, &subtree, &new_parent)?;
        }

        // --- Rewrite, one move at a time over working copies ---
        let mut working: HashMap<String, Document> = HashMap::new();
        let mut updates: Vec<Document> = Vec::new();
        for set in &affected {
            let plan = MovePlan::new(set.contact_id.clone(), new_parent.clone());
            let mut seen: HashSet<&str> = HashSet::new();
            for id in set.ids().filter(|id| seen.insert(*id)) {
                let base = working.get(id).unwrap_or(&loaded[id]);
                let rewritten = rewrite(base, &plan)?;
                debug!(%id, moved = %set.contact_id, "rewrote lineage");
                working.insert(id.to_string(), rewritten.clone());
                updates.push(rewritten);
            }
        }

        info!(
            moved = affected.len(),
            descendants = affected.iter().map(|s| s.descendants.len()).sum::<usize>(),
            reports = affected.iter().map(|s| s.reports.len()).sum::<usize>(),
            updates = updates.len(),
            "affected documents resolved"
        );

        Ok(Resolution {
            updates,
            originals: loaded,
            affected,
        })
    }

    /// Fetch the ids not yet in `loaded`.
    async fn load(
        &self,
        loaded: &mut HashMap<String, Document>,
        ids: Vec<String>,
        missing: Missing,
    ) -> Result<()> {
        let wanted = unique(ids.into_iter().filter(|id| !loaded.contains_key(id)));
        if wanted.is_empty() {
            return Ok(());
        }

        for (id, doc) in fetch_documents(&self.store, wanted, self.read_concurrency).await? {
            match (doc, missing) {
                (Some(doc), _) => {
                    loaded.insert(id, doc);
                }
                (None, Missing::Fail) => return Err(LineageError::not_found(id)),
                (None, Missing::Skip) => {
                    warn!(%id, "referenced document does not exist, skipping");
                }
            }
        }
        Ok(())
    }
}

/// What to do when a referenced document is absent.
#[derive(Debug, Clone, Copy)]
enum Missing {
    Fail,
    Skip,
}

fn unique(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}

/// Primary-contact ids of the moved contact and its descendants.
fn subtree_primary_ids(set: &AffectedSet, loaded: &HashMap<String, Document>) -> Vec<String> {
    let subtree = std::iter::once(&set.contact_id).chain(&set.descendants);
    unique(
        subtree
            .filter_map(|id| loaded.get(id))
            .filter_map(|doc| doc.primary_contact_id().map(str::to_string)),
    )
}

/// A descendant reached through the index must be a contact below `moved_id`.
fn check_descendant_shape(doc: &Document, moved_id: &str) -> Result<()> {
    if !doc.is_contact() {
        return Err(LineageError::unsupported_shape(
            &doc.id,
            format!("indexed under '{moved_id}' but is not a contact"),
        ));
    }
    if doc.parent.is_root() {
        return Err(LineageError::unsupported_shape(
            &doc.id,
            format!("indexed under '{moved_id}' but has no parent lineage"),
        ));
    }
    Ok(())
}

/// A report reached through the index must carry its creator chain.
fn check_report_shape(doc: &Document) -> Result<()> {
    if !doc.is_report() {
        return Err(LineageError::unsupported_shape(&doc.id, "indexed as a report but is not one"));
    }
    match &doc.contact {
        Some(chain) if !chain.is_root() => Ok(()),
        _ => Err(LineageError::unsupported_shape(&doc.id, "report has no contact lineage")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ViewIndex;
    use crate::test_support::{
        FailingStore, ids, person, place, reference_documents, reference_store, report,
        store_with, with_primary_contact, with_primary_contact_chain,
    };
    use lineage_shared::DocType;

    fn resolver(store: Arc<dyn DocumentStore>) -> Resolver {
        let index = Arc::new(ViewIndex::new(store.clone()));
        Resolver::new(store, index, &MoveConfig::default())
    }

    fn final_versions(resolution: &Resolution) -> HashMap<String, Document> {
        resolution
            .updates
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect()
    }

    #[test]
    fn parent_target_parses_root_sentinel() {
        assert_eq!(ParentTarget::parse("root"), ParentTarget::Root);
        assert_eq!(ParentTarget::parse("d1"), ParentTarget::Contact("d1".into()));
        assert_eq!(ParentTarget::Root.to_string(), "root");
    }

    #[test]
    fn request_dedupes_contact_ids() {
        let req = MoveRequest::new(["a", "b", "a"], "root");
        assert_eq!(req.unique_contact_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn resolves_reference_move() {
        let resolution = resolver(reference_store().await)
            .resolve(&MoveRequest::new(["health_center_1"], "district_2"))
            .await
            .expect("resolve");

        let set = &resolution.affected[0];
        assert_eq!(set.contact_id, "health_center_1");
        assert_eq!(set.descendants, vec!["clinic_1", "health_center_1_contact", "patient_1"]);
        assert_eq!(set.primary_contacts, vec!["health_center_1_contact"]);
        assert_eq!(set.reports, vec!["report_1"]);

        let docs = final_versions(&resolution);
        assert_eq!(docs.len(), 5);
        assert_eq!(ids(&docs["health_center_1"].parent), vec!["district_2"]);
        assert_eq!(
            ids(&docs["health_center_1_contact"].parent),
            vec!["health_center_1", "district_2"]
        );
        assert_eq!(ids(&docs["clinic_1"].parent), vec!["health_center_1", "district_2"]);
        assert_eq!(
            ids(&docs["patient_1"].parent),
            vec!["clinic_1", "health_center_1", "district_2"]
        );
        assert_eq!(
            ids(docs["report_1"].contact.as_ref().unwrap()),
            vec!["health_center_1_contact", "health_center_1", "district_2"]
        );
    }

    #[tokio::test]
    async fn missing_parent_fails_before_index_queries() {
        // A failing index would surface first if it were queried.
        let store = FailingStore::new(reference_store().await).fail_query("health_center_1");
        let err = resolver(Arc::new(store))
            .resolve(&MoveRequest::new(["health_center_1"], "district_9"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::NotFound { ref id } if id == "district_9"));
    }

    #[tokio::test]
    async fn cycle_fails_before_index_queries() {
        let store = FailingStore::new(reference_store().await).fail_query("health_center_1");
        let err = resolver(Arc::new(store))
            .resolve(&MoveRequest::new(["health_center_1"], "clinic_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::InvalidMove { .. }));
    }

    #[tokio::test]
    async fn missing_moved_contact_is_not_found() {
        let err = resolver(reference_store().await)
            .resolve(&MoveRequest::new(["ghost"], "district_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::NotFound { ref id } if id == "ghost"));
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let err = resolver(reference_store().await)
            .resolve(&MoveRequest::new(Vec::<String>::new(), "district_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::Validation { .. }));
    }

    #[tokio::test]
    async fn index_failure_propagates() {
        let store = FailingStore::new(reference_store().await).fail_query("clinic_1");
        let err = resolver(Arc::new(store))
            .resolve(&MoveRequest::new(["health_center_1"], "district_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::Storage(_)));
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let store = FailingStore::new(reference_store().await).fail_get("patient_1");
        let err = resolver(Arc::new(store))
            .resolve(&MoveRequest::new(["health_center_1"], "district_2"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected read failure for patient_1"));
    }

    #[tokio::test]
    async fn indexed_report_without_chain_is_fatal() {
        let mut docs = reference_documents();
        let mut broken = report("report_9", &[]);
        broken.contact = None;
        docs.push(broken);
        let store = store_with(docs).await;

        // An index that still lists report_9 under every node.
        struct StaleIndex;
        #[async_trait::async_trait]
        impl LineageIndex for StaleIndex {
            async fn contacts_under(&self, id: &str) -> Result<Vec<String>> {
                Ok(vec![id.to_string()])
            }
            async fn reports_under(&self, _id: &str) -> Result<Vec<String>> {
                Ok(vec!["report_9".to_string()])
            }
        }

        let resolver = Resolver::new(store, Arc::new(StaleIndex), &MoveConfig::default());
        let err = resolver
            .resolve(&MoveRequest::new(["health_center_1"], "district_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::UnsupportedShape { ref id, .. } if id == "report_9"));
    }

    #[tokio::test]
    async fn report_reached_through_several_nodes_is_rewritten_once() {
        // Submitted by patient_1, so every subtree node in its chain finds it.
        let mut docs = reference_documents();
        docs.push(report(
            "report_2",
            &["patient_1", "clinic_1", "health_center_1", "district_1"],
        ));
        let store = store_with(docs).await;

        let resolution = resolver(store)
            .resolve(&MoveRequest::new(["health_center_1"], "root"))
            .await
            .unwrap();
        let hits = resolution.updates.iter().filter(|d| d.id == "report_2").count();
        assert_eq!(hits, 1);
        let docs = final_versions(&resolution);
        assert_eq!(
            ids(docs["report_2"].contact.as_ref().unwrap()),
            vec!["patient_1", "clinic_1", "health_center_1"]
        );
    }

    #[tokio::test]
    async fn nested_moves_converge_in_either_order() {
        for order in [["health_center_1", "clinic_1"], ["clinic_1", "health_center_1"]] {
            let store = reference_store().await;
            let config = MoveConfig {
                enforce_hierarchy: false,
                ..MoveConfig::default()
            };
            let index = Arc::new(ViewIndex::new(store.clone()));
            let resolver = Resolver::new(store, index, &config);

            let resolution = resolver
                .resolve(&MoveRequest::new(order, "district_2"))
                .await
                .unwrap();
            let docs: HashMap<String, Document> = crate::staging::dedupe(resolution.updates)
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect();

            assert_eq!(ids(&docs["health_center_1"].parent), vec!["district_2"], "{order:?}");
            assert_eq!(ids(&docs["clinic_1"].parent), vec!["district_2"], "{order:?}");
            assert_eq!(
                ids(&docs["patient_1"].parent),
                vec!["clinic_1", "district_2"],
                "{order:?}"
            );
        }
    }

    #[tokio::test]
    async fn primary_contact_cannot_be_moved_out() {
        let err = resolver(reference_store().await)
            .resolve(&MoveRequest::new(["health_center_1_contact"], "district_2"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("primary contact for 'health_center_1'"));
    }

    #[tokio::test]
    async fn primary_contact_chains_are_rewritten() {
        let mut docs: Vec<Document> = reference_documents()
            .into_iter()
            .filter(|d| d.id != "health_center_1")
            .collect();
        docs.push(with_primary_contact_chain(
            place("health_center_1", DocType::HealthCenter, &["district_1"]),
            "health_center_1_contact",
        ));
        docs.push(with_primary_contact_chain(
            place("clinic_2", DocType::Clinic, &["health_center_1", "district_1"]),
            "nurse_2",
        ));
        docs.push(person("nurse_2", &["clinic_2", "health_center_1", "district_1"]));
        let store = store_with(docs).await;

        let resolution = resolver(store)
            .resolve(&MoveRequest::new(["health_center_1"], "district_2"))
            .await
            .unwrap();
        let docs = final_versions(&resolution);

        let hc = &docs["health_center_1"];
        assert_eq!(ids(&hc.parent), vec!["district_2"]);
        assert_eq!(
            ids(hc.contact.as_ref().unwrap()),
            vec!["health_center_1_contact", "health_center_1", "district_2"]
        );
        assert_eq!(hc.primary_contact_id(), Some("health_center_1_contact"));

        assert_eq!(
            ids(docs["clinic_2"].contact.as_ref().unwrap()),
            vec!["nurse_2", "clinic_2", "health_center_1", "district_2"]
        );
        assert_eq!(
            ids(&docs["nurse_2"].parent),
            vec!["clinic_2", "health_center_1", "district_2"]
        );
    }

    #[tokio::test]
    async fn dangling_primary_contact_is_skipped() {
        let mut docs = reference_documents();
        docs.push(with_primary_contact(
            place("clinic_2", DocType::Clinic, &["health_center_1", "district_1"]),
            "deleted_person",
        ));
        docs.push(person("patient_2", &["clinic_2", "health_center_1", "district_1"]));
        let store = store_with(docs).await;

        let resolution = resolver(store)
            .resolve(&MoveRequest::new(["health_center_1"], "district_2"))
            .await
            .unwrap();
        let docs = final_versions(&resolution);
        assert!(!docs.contains_key("deleted_person"));
        assert_eq!(
            ids(&docs["patient_2"].parent),
            vec!["clinic_2", "health_center_1", "district_2"]
        );
    }
}
