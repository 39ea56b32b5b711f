//! Staging writer and sinks.
//!
//! A move yields a list of document updates in which the same id may appear
//! more than once (reached through several discovery paths, or rewritten by
//! several moves in one request). [`StagingWriter`] collapses the list to one
//! final version per id and hands each to a [`StagingSink`] exactly once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use lineage_shared::{Document, LineageError, Result};

use crate::pipeline::ProgressReporter;

/// Suffix of staged document files.
const STAGED_SUFFIX: &str = ".doc.json";

/// Receives finished documents. Persistence semantics belong to the sink.
///
/// A batch is `begin`, then one `stage` per id. When staging fails partway
/// the writer calls `abort`, after which the sink must hold nothing from the
/// batch.
#[async_trait]
pub trait StagingSink: Send + Sync {
    /// Called once with every id of the batch, before the first `stage`.
    async fn begin(&self, _ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn stage(&self, doc: &Document) -> Result<()>;

    /// Discard whatever the current batch has staged so far.
    async fn abort(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dedupe
// ---------------------------------------------------------------------------

/// One entry per id, in first-seen order; the last computed content wins.
pub fn dedupe(updates: Vec<Document>) -> Vec<Document> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Document> = Vec::with_capacity(updates.len());

    for doc in updates {
        match position.get(&doc.id) {
            Some(&pos) => unique[pos] = doc,
            None => {
                position.insert(doc.id.clone(), unique.len());
                unique.push(doc);
            }
        }
    }
    unique
}

/// What a [`StagingWriter`] handed to its sink.
#[derive(Debug, Clone, Default)]
pub struct StagedBatch {
    /// Staged ids, in staging order.
    pub ids: Vec<String>,
    /// How many staged documents equal their stored version.
    pub unchanged: usize,
}

/// Deduplicates updates and forwards each id once.
pub struct StagingWriter<'a> {
    sink: &'a dyn StagingSink,
}

impl<'a> StagingWriter<'a> {
    pub fn new(sink: &'a dyn StagingSink) -> Self {
        Self { sink }
    }

    /// Stage `updates`. `baseline` holds the stored versions, for no-op counting.
    ///
    /// Either every document is staged or, on error, none is left in the sink.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub async fn write(
        &self,
        updates: Vec<Document>,
        baseline: &HashMap<String, Document>,
        progress: &dyn ProgressReporter,
    ) -> Result<StagedBatch> {
        let unique = dedupe(updates);
        let total = unique.len();
        let ids: Vec<String> = unique.iter().map(|doc| doc.id.clone()).collect();

        self.sink.begin(&ids).await?;

        let mut batch = StagedBatch::default();
        for (i, doc) in unique.iter().enumerate() {
            if let Err(e) = self.sink.stage(doc).await {
                if let Err(cleanup) = self.sink.abort().await {
                    warn!(error = %cleanup, "could not discard partially staged batch");
                }
                return Err(e);
            }
            if baseline.get(&doc.id) == Some(doc) {
                batch.unchanged += 1;
            }
            progress.staged(&doc.id, i + 1, total);
        }
        batch.ids = ids;

        info!(staged = total, unchanged = batch.unchanged, "staging complete");
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Writes `<dir>/<id>.doc.json` per document.
///
/// The directory holds exactly one batch. A directory with earlier contents
/// is refused unless the sink was created with `force`, in which case those
/// contents are removed when the next batch begins.
pub struct DirectorySink {
    dir: PathBuf,
    force: bool,
    written: Mutex<Vec<PathBuf>>,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, force: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| LineageError::io(&dir, e))?;
        if !force {
            ensure_empty(&dir)?;
        }
        Ok(Self {
            dir,
            force,
            written: Mutex::new(Vec::new()),
        })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(LineageError::validation(format!(
                "document id '{id}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{id}{STAGED_SUFFIX}")))
    }
}

#[async_trait]
impl StagingSink for DirectorySink {
    async fn begin(&self, ids: &[String]) -> Result<()> {
        // Every target must be writable before anything touches the directory.
        for id in ids {
            self.path_for(id)?;
        }

        if self.force {
            clear_dir(&self.dir)?;
        } else {
            ensure_empty(&self.dir)?;
        }
        self.written.lock().await.clear();
        Ok(())
    }

    async fn stage(&self, doc: &Document) -> Result<()> {
        let target = self.path_for(&doc.id)?;
        let temp = self.dir.join(format!(".{}{STAGED_SUFFIX}.tmp", doc.id));

        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| LineageError::validation(format!("JSON serialization failed: {e}")))?;

        // Write to temp file first, then rename over the target
        std::fs::write(&temp, json).map_err(|e| LineageError::io(&temp, e))?;
        if let Err(e) = std::fs::rename(&temp, &target) {
            let _ = std::fs::remove_file(&temp);
            return Err(LineageError::io(&target, e));
        }
        self.written.lock().await.push(target.clone());

        debug!(id = %doc.id, path = %target.display(), "staged document");
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        let mut written = self.written.lock().await;
        for path in written.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LineageError::io(&path, e)),
            }
        }
        info!(dir = %self.dir.display(), "discarded partial batch");
        Ok(())
    }
}

fn ensure_empty(dir: &Path) -> Result<()> {
    let mut entries = std::fs::read_dir(dir).map_err(|e| LineageError::io(dir, e))?;
    if entries.next().is_some() {
        return Err(LineageError::validation(format!(
            "staging directory {} is not empty; pass --force to replace its contents",
            dir.display()
        )));
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| LineageError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| LineageError::io(dir, e))?.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|e| LineageError::io(&path, e))?;
    }
    debug!(dir = %dir.display(), "cleared staging directory");
    Ok(())
}

/// Collects staged documents in memory.
#[derive(Default)]
pub struct MemorySink {
    staged: Mutex<Vec<Document>>,
    batch_start: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything staged so far, in staging order.
    pub async fn documents(&self) -> Vec<Document> {
        self.staged.lock().await.clone()
    }
}

#[async_trait]
impl StagingSink for MemorySink {
    async fn begin(&self, _ids: &[String]) -> Result<()> {
        *self.batch_start.lock().await = self.staged.lock().await.len();
        Ok(())
    }

    async fn stage(&self, doc: &Document) -> Result<()> {
        self.staged.lock().await.push(doc.clone());
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        let start = *self.batch_start.lock().await;
        self.staged.lock().await.truncate(start);
        Ok(())
    }
}

/// Read every `*.json` document in `dir`, sorted by file name.
pub fn read_document_dir(dir: &Path) -> Result<Vec<Document>> {
    let entries = std::fs::read_dir(dir).map_err(|e| LineageError::io(dir, e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LineageError::io(dir, e))?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if !hidden && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path).map_err(|e| LineageError::io(path, e))?;
            Document::from_json(&content).map_err(|e| {
                LineageError::parse(format!("{}: {e}", path.display()))
            })
        })
        .collect()
}
