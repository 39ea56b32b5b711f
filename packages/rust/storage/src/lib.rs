//! Document storage adapters implementing [`DocumentStore`].
//!
//! The [`Storage`] struct wraps a libSQL database holding every document as a
//! JSON body plus a `lineage_index` table that backs the two secondary
//! indexes. [`MemoryStore`] offers the same contract in process.
//!
//! **Access rules:**
//! - CLI import: read-write via [`Storage::open`]
//! - Moves only read: [`Storage::open_readonly`] is enough

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};

use lineage_shared::{Document, DocumentStore, IndexName, LineageError, Result, index_entries};

pub use memory::MemoryStore;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LineageError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LineageError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LineageError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM docs", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl DocumentStore for Storage {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query("SELECT body FROM docs WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let body: String = row.get(0).map_err(storage_err)?;
                Ok(Some(Document::from_json(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn query_index(&self, index: IndexName, key: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT doc_id FROM lineage_index
                 WHERE index_name = ?1 AND ancestor_id = ?2
                 ORDER BY doc_id",
                params![index.as_str(), key],
            )
            .await
            .map_err(storage_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            ids.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(ids)
    }

    async fn put(&self, doc: &Document) -> Result<String> {
        self.check_writable()?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let stored_rev = {
            let mut rows = tx
                .query("SELECT rev FROM docs WHERE id = ?1", params![doc.id.as_str()])
                .await
                .map_err(storage_err)?;
            match rows.next().await.map_err(storage_err)? {
                Some(row) => Some(row.get::<String>(0).map_err(storage_err)?),
                None => None,
            }
        };
        check_revision(&doc.id, stored_rev.as_deref(), doc.rev.as_deref())?;

        let rev = next_revision(stored_rev.as_deref(), doc)?;
        let mut stored = doc.clone();
        stored.rev = Some(rev.clone());
        let body = serde_json::to_string(&stored).map_err(|e| LineageError::parse(e.to_string()))?;

        tx.execute(
            "INSERT INTO docs (id, rev, doc_type, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
               rev = excluded.rev,
               doc_type = excluded.doc_type,
               body = excluded.body,
               updated_at = excluded.updated_at",
            params![doc.id.as_str(), rev.as_str(), doc.doc_type.as_str(), body],
        )
        .await
        .map_err(storage_err)?;

        tx.execute(
            "DELETE FROM lineage_index WHERE doc_id = ?1",
            params![doc.id.as_str()],
        )
        .await
        .map_err(storage_err)?;

        for (index, key) in index_entries(doc) {
            tx.execute(
                "INSERT OR IGNORE INTO lineage_index (index_name, ancestor_id, doc_id)
                 VALUES (?1, ?2, ?3)",
                params![index.as_str(), key, doc.id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(id = %doc.id, %rev, "stored document");
        Ok(rev)
    }
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// Reject a write whose revision does not match what is stored.
pub(crate) fn check_revision(id: &str, stored: Option<&str>, given: Option<&str>) -> Result<()> {
    if stored == given {
        Ok(())
    } else {
        Err(LineageError::Conflict { id: id.to_string() })
    }
}

/// Next revision string: `<generation>-<content hash>`.
pub(crate) fn next_revision(stored: Option<&str>, doc: &Document) -> Result<String> {
    let generation = stored
        .and_then(|rev| rev.split('-').next())
        .and_then(|g| g.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;

    let mut content = doc.clone();
    content.rev = None;
    let bytes = serde_json::to_vec(&content).map_err(|e| LineageError::parse(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let hash = format!("{:x}", hasher.finalize());

    Ok(format!("{generation}-{}", &hash[..32]))
}

fn storage_err(e: impl std::fmt::Display) -> LineageError {
    LineageError::Storage(e.to_string())
}
