//! SQL migration definitions for the lineage document database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: docs, lineage_index",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Documents, stored as their full JSON body
CREATE TABLE IF NOT EXISTS docs (
    id         TEXT PRIMARY KEY,
    rev        TEXT NOT NULL,
    doc_type   TEXT NOT NULL,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_docs_type ON docs(doc_type);

-- Secondary index over embedded lineage chains.
-- One row per (index, ancestor) a document is reachable from.
CREATE TABLE IF NOT EXISTS lineage_index (
    index_name  TEXT NOT NULL,
    ancestor_id TEXT NOT NULL,
    doc_id      TEXT NOT NULL REFERENCES docs(id) ON DELETE CASCADE,
    PRIMARY KEY (index_name, ancestor_id, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_lineage_index_doc ON lineage_index(doc_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
