//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the six stage
//! collections, the time-bounded execution cache, and promotion statistics.
//!
//! Every stage collection enforces `UNIQUE(title, link)`. A duplicate insert
//! surfaces as [`PipelineError::Constraint`], which callers count as a skip.
//! Inserts and deletes are independent statements; moving an item between
//! collections is insert-then-delete and is not atomic.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use libsql::{Connection, Database, params};
use pressroom_shared::{
    ContentItem, CopyrightStatus, IdentityKey, ItemStatus, PipelineError, Result, StageCollection,
};
use uuid::Uuid;

const ITEM_COLUMNS: &str = "id, title, body, link, source_id, copyright_status, attribution, \
     publication_date, document_number, score, reasoning, scorer_id, status, rejection_reason, created_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Row selection for [`Storage::query_items`]. Empty filter selects everything.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub source_id: Option<String>,
    /// Only rows with no score yet.
    pub unscored_only: bool,
    pub status: Option<ItemStatus>,
    pub limit: Option<usize>,
}

impl ItemFilter {
    pub fn for_source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            ..Self::default()
        }
    }
}

/// Result of moving an item between collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Row id in the destination collection.
    pub destination_id: String,
    /// The destination already held this identity (an interrupted earlier move).
    pub already_present: bool,
    /// Whether the source row was deleted. `false` leaves a cross-collection
    /// duplicate for the reconciliation sweep.
    pub source_removed: bool,
}

/// Aggregate statistics recorded for one source after a promotion pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub source_id: String,
    pub item_count: usize,
    pub avg_score: f64,
    pub avg_promoted_score: f64,
    pub duplicate_count: usize,
    /// Scores were synthesized because the scorer failed.
    pub fallback: bool,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
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
                self.conn
                    .execute_batch(&migration.sql)
                    .await
                    .map_err(|e| {
                        PipelineError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
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

    // -----------------------------------------------------------------------
    // Stage collection operations
    // -----------------------------------------------------------------------

    /// Insert an item into `collection` under a fresh row id.
    ///
    /// Returns the new id, or [`PipelineError::Constraint`] when the collection
    /// already holds the item's (title, link).
    pub async fn insert_item(
        &self,
        collection: StageCollection,
        item: &ContentItem,
    ) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let sql = format!(
            "INSERT INTO {} ({ITEM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            collection.as_str()
        );
        let result = self
            .conn
            .execute(
                &sql,
                params![
                    id.as_str(),
                    item.title.as_str(),
                    item.body.as_str(),
                    item.link.as_str(),
                    item.source_id.as_str(),
                    item.copyright_status.as_str(),
                    item.attribution.as_str(),
                    item.publication_date.as_str(),
                    item.document_number.as_str(),
                    item.score,
                    item.reasoning.as_deref(),
                    item.scorer_id.as_deref(),
                    item.status.as_str(),
                    item.rejection_reason.as_deref(),
                    item.created_at.to_rfc3339(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                Err(PipelineError::Constraint {
                    collection: collection.to_string(),
                    title: item.title.clone(),
                    link: item.link.clone(),
                })
            }
            Err(e) => Err(PipelineError::Storage(e.to_string())),
        }
    }

    /// Delete a row by id. Returns whether a row was removed.
    pub async fn delete_item(&self, collection: StageCollection, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", collection.as_str());
        let affected = self
            .conn
            .execute(&sql, params![id])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Get one row by id.
    pub async fn get_item(&self, collection: StageCollection, id: &str) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE id = ?1",
            collection.as_str()
        );
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::Storage(e.to_string())),
        }
    }

    /// List rows matching `filter`, in insertion order.
    pub async fn query_items(
        &self,
        collection: StageCollection,
        filter: &ItemFilter,
    ) -> Result<Vec<ContentItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {}
             WHERE (?1 IS NULL OR source_id = ?1)
               AND (?2 = 0 OR score IS NULL)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY rowid
             LIMIT ?4",
            collection.as_str()
        );
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut rows = self
            .conn
            .query(
                &sql,
                params![
                    filter.source_id.as_deref(),
                    i64::from(filter.unscored_only),
                    filter.status.map(|s| s.as_str()),
                    limit,
                ],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }

    /// Number of rows in a collection.
    pub async fn count_items(&self, collection: StageCollection) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.as_str());
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as usize),
            Ok(None) => Ok(0),
            Err(e) => Err(PipelineError::Storage(e.to_string())),
        }
    }

    /// Find the row holding `key` in `collection`, if any.
    pub async fn find_by_identity(
        &self,
        collection: StageCollection,
        key: &IdentityKey,
    ) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE title = ?1 AND link = ?2",
            collection.as_str()
        );
        let mut rows = self
            .conn
            .query(&sql, params![key.title.as_str(), key.link.as_str()])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::Storage(e.to_string())),
        }
    }

    /// Whether `collection` holds `key`.
    pub async fn contains_identity(
        &self,
        collection: StageCollection,
        key: &IdentityKey,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE title = ?1 AND link = ?2 LIMIT 1",
            collection.as_str()
        );
        let mut rows = self
            .conn
            .query(&sql, params![key.title.as_str(), key.link.as_str()])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(found) => Ok(found.is_some()),
            Err(e) => Err(PipelineError::Storage(e.to_string())),
        }
    }

    /// Remove every row from a collection. Returns the number removed.
    pub async fn truncate(&self, collection: StageCollection) -> Result<u64> {
        let sql = format!("DELETE FROM {}", collection.as_str());
        let removed = self
            .conn
            .execute(&sql, params![])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        tracing::info!(%collection, removed, "collection truncated");
        Ok(removed)
    }

    /// Move `item` (whose `id` is its row in `from`) into `to`.
    ///
    /// The destination insert happens first; the source row is deleted only
    /// once the destination holds the item. A destination that already holds
    /// the identity counts as a successful insert.
    pub async fn move_item(
        &self,
        from: StageCollection,
        to: StageCollection,
        item: &ContentItem,
    ) -> Result<MoveOutcome> {
        let (destination_id, already_present) = match self.insert_item(to, item).await {
            Ok(id) => (id, false),
            Err(PipelineError::Constraint { .. }) => {
                let existing = self
                    .find_by_identity(to, &item.identity())
                    .await?
                    .ok_or_else(|| {
                        PipelineError::Storage(format!(
                            "{to} rejected {} but holds no matching row",
                            item.identity()
                        ))
                    })?;
                (existing.id, true)
            }
            Err(e) => return Err(e),
        };

        let source_removed = match self.delete_item(from, &item.id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(
                    item_id = %item.id,
                    %from,
                    %to,
                    error = %e,
                    "source delete failed after insert; left for reconciliation"
                );
                false
            }
        };

        Ok(MoveOutcome {
            destination_id,
            already_present,
            source_removed,
        })
    }

    /// Move row `id` from `from` to `to`, setting its status and rejection reason.
    ///
    /// Returns `Ok(None)` when `from` holds no such row.
    pub async fn transition_item(
        &self,
        from: StageCollection,
        to: StageCollection,
        id: &str,
        status: ItemStatus,
        rejection_reason: Option<&str>,
    ) -> Result<Option<MoveOutcome>> {
        let Some(mut item) = self.get_item(from, id).await? else {
            return Ok(None);
        };
        item.status = status;
        item.rejection_reason = rejection_reason.map(str::to_string);
        self.move_item(from, to, &item).await.map(Some)
    }

    /// Identities present in more than one collection, with every collection
    /// holding them.
    pub async fn find_cross_collection_duplicates(
        &self,
    ) -> Result<Vec<(IdentityKey, Vec<StageCollection>)>> {
        let union = StageCollection::ALL
            .iter()
            .map(|c| format!("SELECT title, link, '{0}' AS coll FROM {0}", c.as_str()))
            .collect::<Vec<_>>()
            .join(" UNION ALL ");
        let sql = format!(
            "SELECT title, link, GROUP_CONCAT(coll, ',') FROM ({union})
             GROUP BY title, link
             HAVING COUNT(*) > 1"
        );

        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let title: String = row
                .get(0)
                .map_err(|e| PipelineError::Storage(e.to_string()))?;
            let link: String = row
                .get(1)
                .map_err(|e| PipelineError::Storage(e.to_string()))?;
            let colls: String = row
                .get(2)
                .map_err(|e| PipelineError::Storage(e.to_string()))?;
            let collections = colls
                .split(',')
                .filter_map(|c| c.parse::<StageCollection>().ok())
                .collect();
            results.push((IdentityKey { title, link }, collections));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Execution cache operations
    // -----------------------------------------------------------------------

    /// Store `value` under `key` for `ttl` (upserts, resetting the expiry).
    pub async fn cache_put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let expires_at = now.timestamp() + ttl.as_secs() as i64;
        self.conn
            .execute(
                "INSERT INTO execution_cache (key, value_json, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                   value_json = excluded.value_json,
                   expires_at = excluded.expires_at,
                   updated_at = excluded.updated_at",
                params![key, value, expires_at, now.to_rfc3339()],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get an unexpired value.
    pub async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_json FROM execution_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| PipelineError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(PipelineError::Storage(e.to_string())),
        }
    }

    /// Delete a cache entry. Returns whether it existed.
    pub async fn cache_delete(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM execution_cache WHERE key = ?1", params![key])
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Unexpired values whose key starts with `prefix`, oldest first.
    pub async fn cache_scan(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{prefix}%");
        let mut rows = self
            .conn
            .query(
                "SELECT value_json FROM execution_cache
                 WHERE key LIKE ?1 AND expires_at > ?2
                 ORDER BY key",
                params![pattern.as_str(), Utc::now().timestamp()],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| PipelineError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Remove expired cache entries. Returns the number removed.
    pub async fn cache_purge_expired(&self) -> Result<u64> {
        self.conn
            .execute(
                "DELETE FROM execution_cache WHERE expires_at <= ?1",
                params![Utc::now().timestamp()],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Promotion statistics
    // -----------------------------------------------------------------------

    /// Append one source's statistics from a promotion pass.
    pub async fn record_source_stats(&self, stats: &SourceStats) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO promotion_stats
                   (source_id, item_count, avg_score, avg_promoted_score, duplicate_count, fallback, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    stats.source_id.as_str(),
                    stats.item_count as i64,
                    stats.avg_score,
                    stats.avg_promoted_score,
                    stats.duplicate_count as i64,
                    i64::from(stats.fallback),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent statistics rows, newest first.
    pub async fn list_source_stats(&self, limit: usize) -> Result<Vec<SourceStats>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_id, item_count, avg_score, avg_promoted_score, duplicate_count, fallback
                 FROM promotion_stats ORDER BY id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(SourceStats {
                source_id: row
                    .get::<String>(0)
                    .map_err(|e| PipelineError::Storage(e.to_string()))?,
                item_count: row.get::<i64>(1).unwrap_or(0) as usize,
                avg_score: row.get::<f64>(2).unwrap_or(0.0),
                avg_promoted_score: row.get::<f64>(3).unwrap_or(0.0),
                duplicate_count: row.get::<i64>(4).unwrap_or(0) as usize,
                fallback: row.get::<i64>(5).unwrap_or(0) != 0,
            });
        }
        Ok(results)
    }
}

/// Convert a database row to a [`ContentItem`].
fn row_to_item(row: &libsql::Row) -> Result<ContentItem> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| PipelineError::Storage(e.to_string()))
    };

    Ok(ContentItem {
        id: text(0)?,
        title: text(1)?,
        body: text(2)?,
        link: text(3)?,
        source_id: text(4)?,
        copyright_status: CopyrightStatus::parse(&text(5)?),
        attribution: text(6)?,
        publication_date: text(7)?,
        document_number: text(8)?,
        score: row.get::<f64>(9).ok(),
        reasoning: row.get::<String>(10).ok(),
        scorer_id: row.get::<String>(11).ok(),
        status: ItemStatus::parse(&text(12)?),
        rejection_reason: row.get::<String>(13).ok(),
        created_at: {
            let s = text(14)?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| PipelineError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("pressroom_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn item(title: &str, link: &str, source: &str) -> ContentItem {
        ContentItem::new(title, link, source)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
        for collection in StageCollection::ALL {
            assert_eq!(storage.count_items(collection).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("pressroom_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_get_and_delete() {
        let storage = test_storage().await;
        let mut original = item("Clean Air Rule", "https://fr.example/d/1", "fr");
        original.document_number = "2026-00001".into();
        original.copyright_status = CopyrightStatus::PublicDomain;

        let id = storage
            .insert_item(StageCollection::Candidates, &original)
            .await
            .expect("insert");

        let found = storage
            .get_item(StageCollection::Candidates, &id)
            .await
            .expect("get")
            .expect("row exists");
        assert_eq!(found.title, "Clean Air Rule");
        assert_eq!(found.document_number, "2026-00001");
        assert_eq!(found.copyright_status, CopyrightStatus::PublicDomain);
        assert!(found.score.is_none());
        assert!(found.reasoning.is_none());

        assert!(storage.delete_item(StageCollection::Candidates, &id).await.unwrap());
        assert!(!storage.delete_item(StageCollection::Candidates, &id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_identity_is_a_constraint_error() {
        let storage = test_storage().await;
        storage
            .insert_item(StageCollection::Candidates, &item("A", "https://a.example", "s1"))
            .await
            .unwrap();

        // Same identity from a different source still collides.
        let err = storage
            .insert_item(StageCollection::Candidates, &item("A", "https://a.example", "s2"))
            .await
            .unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");

        // Other collections are independent at the storage level.
        storage
            .insert_item(StageCollection::Archives, &item("A", "https://a.example", "s1"))
            .await
            .expect("insert into archives");
    }

    #[tokio::test]
    async fn query_filters_and_preserves_insertion_order() {
        let storage = test_storage().await;
        for (title, source) in [("one", "a"), ("two", "b"), ("three", "a")] {
            storage
                .insert_item(
                    StageCollection::Candidates,
                    &item(title, &format!("https://x.example/{title}"), source),
                )
                .await
                .unwrap();
        }
        let mut scored = item("four", "https://x.example/four", "a");
        scored.score = Some(42.0);
        storage
            .insert_item(StageCollection::Candidates, &scored)
            .await
            .unwrap();

        let from_a = storage
            .query_items(StageCollection::Candidates, &ItemFilter::for_source("a"))
            .await
            .unwrap();
        let titles: Vec<&str> = from_a.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["one", "three", "four"]);

        let unscored = storage
            .query_items(
                StageCollection::Candidates,
                &ItemFilter {
                    unscored_only: true,
                    ..ItemFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unscored.len(), 3);

        let limited = storage
            .query_items(
                StageCollection::Candidates,
                &ItemFilter {
                    limit: Some(2),
                    ..ItemFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(from_a[2].score, Some(42.0));
    }

    #[tokio::test]
    async fn move_item_inserts_then_deletes() {
        let storage = test_storage().await;
        let id = storage
            .insert_item(StageCollection::Candidates, &item("M", "https://m.example", "s"))
            .await
            .unwrap();
        let mut moving = storage
            .get_item(StageCollection::Candidates, &id)
            .await
            .unwrap()
            .unwrap();
        moving.status = ItemStatus::Pending;

        let outcome = storage
            .move_item(StageCollection::Candidates, StageCollection::Approvals, &moving)
            .await
            .expect("move");
        assert!(outcome.source_removed);
        assert!(!outcome.already_present);
        assert_eq!(storage.count_items(StageCollection::Candidates).await.unwrap(), 0);

        let moved = storage
            .get_item(StageCollection::Approvals, &outcome.destination_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn move_into_collection_already_holding_identity_removes_source() {
        let storage = test_storage().await;
        let candidate = item("Dup", "https://d.example", "s");
        let existing = storage
            .insert_item(StageCollection::Approvals, &candidate)
            .await
            .unwrap();
        let cid = storage
            .insert_item(StageCollection::Candidates, &candidate)
            .await
            .unwrap();
        let moving = storage
            .get_item(StageCollection::Candidates, &cid)
            .await
            .unwrap()
            .unwrap();

        let outcome = storage
            .move_item(StageCollection::Candidates, StageCollection::Approvals, &moving)
            .await
            .unwrap();
        assert!(outcome.already_present);
        assert_eq!(outcome.destination_id, existing);
        assert_eq!(storage.count_items(StageCollection::Candidates).await.unwrap(), 0);
        assert_eq!(storage.count_items(StageCollection::Approvals).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_destination_insert_leaves_source_in_place() {
        let storage = test_storage().await;
        storage
            .conn
            .execute(
                "CREATE TRIGGER archives_offline BEFORE INSERT ON archives
                 BEGIN SELECT RAISE(ABORT, 'archives offline'); END",
                params![],
            )
            .await
            .unwrap();

        let cid = storage
            .insert_item(StageCollection::Candidates, &item("Stuck", "https://s.example", "s"))
            .await
            .unwrap();
        let moving = storage
            .get_item(StageCollection::Candidates, &cid)
            .await
            .unwrap()
            .unwrap();

        let err = storage
            .move_item(StageCollection::Candidates, StageCollection::Archives, &moving)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(!err.is_constraint());
        assert!(storage
            .get_item(StageCollection::Candidates, &cid)
            .await
            .unwrap()
            .is_some());
        assert_eq!(storage.count_items(StageCollection::Archives).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transition_sets_status_and_reason() {
        let storage = test_storage().await;
        let id = storage
            .insert_item(StageCollection::Approvals, &item("R", "https://r.example", "s"))
            .await
            .unwrap();

        let outcome = storage
            .transition_item(
                StageCollection::Approvals,
                StageCollection::Archives,
                &id,
                ItemStatus::Rejected,
                Some("editor"),
            )
            .await
            .unwrap()
            .expect("row existed");
        let archived = storage
            .get_item(StageCollection::Archives, &outcome.destination_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(archived.status, ItemStatus::Rejected);
        assert_eq!(archived.rejection_reason.as_deref(), Some("editor"));

        let missing = storage
            .transition_item(
                StageCollection::Approvals,
                StageCollection::Archives,
                &id,
                ItemStatus::Rejected,
                None,
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn cross_collection_duplicates_are_reported() {
        let storage = test_storage().await;
        let dup = item("Twice", "https://t.example", "s");
        storage.insert_item(StageCollection::Candidates, &dup).await.unwrap();
        storage.insert_item(StageCollection::Approvals, &dup).await.unwrap();
        storage
            .insert_item(StageCollection::Candidates, &item("Once", "https://o.example", "s"))
            .await
            .unwrap();

        let dups = storage.find_cross_collection_duplicates().await.unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].0.title, "Twice");
        assert!(dups[0].1.contains(&StageCollection::Candidates));
        assert!(dups[0].1.contains(&StageCollection::Approvals));
    }

    #[tokio::test]
    async fn truncate_empties_one_collection() {
        let storage = test_storage().await;
        storage
            .insert_item(StageCollection::Candidates, &item("x", "", "s"))
            .await
            .unwrap();
        storage
            .insert_item(StageCollection::Archives, &item("y", "", "s"))
            .await
            .unwrap();
        assert_eq!(storage.truncate(StageCollection::Candidates).await.unwrap(), 1);
        assert_eq!(storage.count_items(StageCollection::Candidates).await.unwrap(), 0);
        assert_eq!(storage.count_items(StageCollection::Archives).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cache_put_get_and_expiry() {
        let storage = test_storage().await;

        // Miss
        assert!(storage.cache_get("execution:1").await.unwrap().is_none());

        storage
            .cache_put("execution:1", r#"{"status":"running"}"#, Duration::from_secs(3600))
            .await
            .expect("put");
        let hit = storage.cache_get("execution:1").await.unwrap();
        assert!(hit.unwrap().contains("running"));

        // Upsert replaces the value
        storage
            .cache_put("execution:1", r#"{"status":"completed"}"#, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(storage.cache_get("execution:1").await.unwrap().unwrap().contains("completed"));

        // Zero TTL is already expired
        storage
            .cache_put("execution:2", "{}", Duration::ZERO)
            .await
            .unwrap();
        assert!(storage.cache_get("execution:2").await.unwrap().is_none());
        assert_eq!(storage.cache_scan("execution:").await.unwrap().len(), 1);
        assert_eq!(storage.cache_purge_expired().await.unwrap(), 1);

        assert!(storage.cache_delete("execution:1").await.unwrap());
        assert!(storage.cache_get("execution:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn source_stats_roundtrip() {
        let storage = test_storage().await;
        let stats = SourceStats {
            source_id: "fr".into(),
            item_count: 4,
            avg_score: 31.25,
            avg_promoted_score: 55.0,
            duplicate_count: 1,
            fallback: false,
        };
        storage.record_source_stats(&stats).await.expect("record");
        let listed = storage.list_source_stats(10).await.unwrap();
        assert_eq!(listed, vec![stats]);
    }
}
