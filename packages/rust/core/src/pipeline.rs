//! End-to-end `move` pipeline: request → resolve → rewrite → stage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use lineage_shared::{DocumentStore, MoveConfig, Result};

use crate::index::ViewIndex;
use crate::resolver::{MoveRequest, Resolver};
use crate::staging::{StagingSink, StagingWriter};

/// Result of [`move_contacts`].
#[derive(Debug, Clone)]
pub struct MoveResult {
    /// Contacts moved, after collapsing duplicates.
    pub moved: Vec<String>,
    /// Documents handed to the sink.
    pub staged: usize,
    /// Staged documents identical to their stored version.
    pub unchanged: usize,
    /// Staged ids, in staging order.
    pub staged_ids: Vec<String>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document is staged.
    fn staged(&self, id: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &MoveResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn staged(&self, _id: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &MoveResult) {}
}

/// Move `request.contact_ids` under `request.parent` and stage every
/// affected document into `sink`.
///
/// All validation and reads complete before the first document is staged,
/// so a failed move leaves the sink untouched.
#[instrument(skip_all, fields(contacts = ?request.contact_ids, parent = %request.parent))]
pub async fn move_contacts(
    store: Arc<dyn DocumentStore>,
    sink: &dyn StagingSink,
    request: &MoveRequest,
    config: &MoveConfig,
    progress: &dyn ProgressReporter,
) -> Result<MoveResult> {
    let start = Instant::now();
    info!("starting move");

    progress.phase("Resolving affected documents");
    let index = Arc::new(ViewIndex::new(store.clone()));
    let resolver = Resolver::new(store, index, config);
    let resolution = resolver.resolve(request).await?;

    progress.phase("Staging documents");
    let batch = StagingWriter::new(sink)
        .write(resolution.updates, &resolution.originals, progress)
        .await?;

    let result = MoveResult {
        moved: resolution.affected.into_iter().map(|set| set.contact_id).collect(),
        staged: batch.ids.len(),
        unchanged: batch.unchanged,
        staged_ids: batch.ids,
        elapsed: start.elapsed(),
    };

    info!(
        moved = result.moved.len(),
        staged = result.staged,
        unchanged = result.unchanged,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "move complete"
    );
    progress.done(&result);

    Ok(result)
}
