//! SQL migration definitions for the Pressroom database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

use pressroom_shared::StageCollection;

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: String,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    let mut initial = String::from(
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
    );

    for collection in StageCollection::ALL {
        initial.push_str(&stage_table_sql(collection));
    }

    initial.push_str(
        r#"
-- Time-bounded key/value cache (execution records)
CREATE TABLE IF NOT EXISTS execution_cache (
    key        TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_execution_cache_expires ON execution_cache(expires_at);

-- Per-source promotion statistics
CREATE TABLE IF NOT EXISTS promotion_stats (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id          TEXT NOT NULL,
    item_count         INTEGER NOT NULL,
    avg_score          REAL NOT NULL,
    avg_promoted_score REAL NOT NULL,
    duplicate_count    INTEGER NOT NULL,
    fallback           INTEGER NOT NULL DEFAULT 0,
    recorded_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_promotion_stats_source ON promotion_stats(source_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    );

    vec![Migration {
        version: 1,
        description: "Initial schema: six stage collections, execution_cache, promotion_stats",
        sql: initial,
    }]
}

/// DDL for one stage collection. Every collection shares the item schema and
/// enforces the (title, link) identity.
fn stage_table_sql(collection: StageCollection) -> String {
    let table = collection.as_str();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    body             TEXT NOT NULL DEFAULT '',
    link             TEXT NOT NULL DEFAULT '',
    source_id        TEXT NOT NULL,
    copyright_status TEXT NOT NULL DEFAULT 'unknown',
    attribution      TEXT NOT NULL DEFAULT '',
    publication_date TEXT NOT NULL DEFAULT '',
    document_number  TEXT NOT NULL DEFAULT '',
    score            REAL,
    reasoning        TEXT,
    scorer_id        TEXT,
    status           TEXT NOT NULL DEFAULT 'new',
    rejection_reason TEXT,
    created_at       TEXT NOT NULL,
    UNIQUE(title, link)
);

CREATE INDEX IF NOT EXISTS idx_{table}_source ON {table}(source_id);
"#
    )
}
