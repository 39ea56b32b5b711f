//! Bounded concurrent reads against the store.
//!
//! Every read of a phase runs on its own task, at most `concurrency` at a
//! time. The first failure aborts the remaining tasks and is returned as is.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use lineage_shared::{Document, DocumentStore, LineageError, Result};

/// Run `task` for every key, returning `(key, output)` in input order.
pub(crate) async fn run_bounded<T, F, Fut>(
    keys: Vec<String>,
    concurrency: usize,
    task: F,
) -> Result<Vec<(String, T)>>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (pos, key) in keys.into_iter().enumerate() {
        let sem = semaphore.clone();
        let read = task(key.clone());
        set.spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| LineageError::Storage(e.to_string()))?;
            read.await.map(|value| (pos, key, value))
        });
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let item = joined.map_err(|e| LineageError::Storage(format!("read task failed: {e}")))??;
        results.push(item);
    }

    results.sort_by_key(|(pos, _, _)| *pos);
    Ok(results.into_iter().map(|(_, key, value)| (key, value)).collect())
}

/// Fetch documents by id; absent ids map to `None`.
pub(crate) async fn fetch_documents(
    store: &Arc<dyn DocumentStore>,
    ids: Vec<String>,
    concurrency: usize,
) -> Result<Vec<(String, Option<Document>)>> {
    run_bounded(ids, concurrency, |id| {
        let store = store.clone();
        async move { store.get(&id).await }
    })
    .await
}
