//! Execution records: storage backends and the tracker that patches them.
//!
//! [`ExecutionStore`] is the seam. [`InMemoryExecutionStore`] keeps records in
//! process memory, [`CachedExecutionStore`] persists them in the libSQL TTL
//! cache under `execution:{id}`, and [`TieredExecutionStore`] reads memory
//! first and mirrors every write to the cache so other processes can poll.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use pressroom_shared::{
    ExecutionErrorEntry, ExecutionId, ExecutionResults, ExecutionStatus, PipelineError, Result,
    WorkflowExecution,
};
use pressroom_storage::Storage;

/// Cache key prefix for execution records.
pub const EXECUTION_KEY_PREFIX: &str = "execution:";

/// Default retention window for execution records.
pub const DEFAULT_EXECUTION_TTL: Duration = Duration::from_secs(3600);

fn execution_key(id: &ExecutionId) -> String {
    format!("{EXECUTION_KEY_PREFIX}{id}")
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or replace a record, restarting its retention window.
    async fn save(&self, execution: &WorkflowExecution) -> Result<()>;

    /// Load a record; expired records are absent.
    async fn load(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>>;

    /// Unexpired records in `status`, oldest first.
    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<WorkflowExecution>>;

    async fn delete(&self, id: &ExecutionId) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

struct MemoryEntry {
    execution: WorkflowExecution,
    expires_at: Instant,
}

/// Process-local store. Records vanish with the process or after the TTL.
pub struct InMemoryExecutionStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    ttl: Duration,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_EXECUTION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            execution.id.to_string(),
            MemoryEntry {
                execution: execution.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    async fn load(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(entries
            .get(&id.to_string())
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.execution.clone()))
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<WorkflowExecution>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        let now = Instant::now();
        let mut found: Vec<WorkflowExecution> = entries
            .values()
            .filter(|entry| entry.expires_at > now && entry.execution.status == status)
            .map(|entry| entry.execution.clone())
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn delete(&self, id: &ExecutionId) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(entries.remove(&id.to_string()).is_some())
    }
}

// ---------------------------------------------------------------------------
// libSQL cache
// ---------------------------------------------------------------------------

/// Records serialized as JSON into the storage TTL cache.
pub struct CachedExecutionStore {
    storage: Arc<Storage>,
    ttl: Duration,
}

impl CachedExecutionStore {
    pub fn new(storage: Arc<Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }
}

#[async_trait]
impl ExecutionStore for CachedExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        let json = serde_json::to_string(execution)
            .map_err(|e| PipelineError::Storage(format!("execution serialization: {e}")))?;
        self.storage
            .cache_put(&execution_key(&execution.id), &json, self.ttl)
            .await
    }

    async fn load(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>> {
        let Some(json) = self.storage.cache_get(&execution_key(id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| PipelineError::Storage(format!("corrupt execution record {id}: {e}")))
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<WorkflowExecution>> {
        let mut found = Vec::new();
        for json in self.storage.cache_scan(EXECUTION_KEY_PREFIX).await? {
            match serde_json::from_str::<WorkflowExecution>(&json) {
                Ok(execution) if execution.status == status => found.push(execution),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable execution record"),
            }
        }
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn delete(&self, id: &ExecutionId) -> Result<bool> {
        self.storage.cache_delete(&execution_key(id)).await
    }
}

// ---------------------------------------------------------------------------
// Tiered
// ---------------------------------------------------------------------------

/// Memory first, mirrored to the persistent cache.
///
/// A failed mirror write is logged and does not fail the save; the memory
/// copy stays authoritative for this process.
pub struct TieredExecutionStore {
    memory: InMemoryExecutionStore,
    cache: CachedExecutionStore,
}

impl TieredExecutionStore {
    pub fn new(storage: Arc<Storage>, ttl: Duration) -> Self {
        Self {
            memory: InMemoryExecutionStore::with_ttl(ttl),
            cache: CachedExecutionStore::new(storage, ttl),
        }
    }
}

#[async_trait]
impl ExecutionStore for TieredExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        self.memory.save(execution).await?;
        if let Err(e) = self.cache.save(execution).await {
            warn!(execution_id = %execution.id, error = %e, "execution cache mirror failed");
        }
        Ok(())
    }

    async fn load(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>> {
        if let Some(execution) = self.memory.load(id).await? {
            return Ok(Some(execution));
        }
        match self.cache.load(id).await {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(execution_id = %id, error = %e, "execution cache read failed");
                Ok(None)
            }
        }
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<WorkflowExecution>> {
        let mut merged: HashMap<String, WorkflowExecution> = HashMap::new();
        match self.cache.list_by_status(status).await {
            Ok(cached) => {
                for execution in cached {
                    merged.insert(execution.id.to_string(), execution);
                }
            }
            Err(e) => warn!(error = %e, "execution cache scan failed"),
        }
        for execution in self.memory.list_by_status(status).await? {
            merged.insert(execution.id.to_string(), execution);
        }

        // A record whose newer memory copy left `status` must not resurface from the cache.
        let mut found = Vec::with_capacity(merged.len());
        for execution in merged.into_values() {
            match self.memory.load(&execution.id).await? {
                Some(current) if current.status != status => {}
                _ => found.push(execution),
            }
        }
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn delete(&self, id: &ExecutionId) -> Result<bool> {
        let in_memory = self.memory.delete(id).await?;
        let in_cache = self.cache.delete(id).await.unwrap_or_else(|e| {
            warn!(execution_id = %id, error = %e, "execution cache delete failed");
            false
        });
        Ok(in_memory || in_cache)
    }
}

// ---------------------------------------------------------------------------
// Patch + tracker
// ---------------------------------------------------------------------------

/// Merge-patch for an execution record. Absent fields are left unchanged;
/// errors are appended.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPatch {
    pub status: Option<ExecutionStatus>,
    pub stage: Option<String>,
    pub progress: Option<u8>,
    pub results: Option<ExecutionResults>,
    pub errors: Vec<ExecutionErrorEntry>,
}

impl ExecutionPatch {
    /// Enter a new phase at `progress`.
    pub fn stage(stage: impl Into<String>, progress: u8) -> Self {
        Self {
            stage: Some(stage.into()),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_results(mut self, results: &ExecutionResults) -> Self {
        self.results = Some(results.clone());
        self
    }

    pub fn with_error(mut self, error: ExecutionErrorEntry) -> Self {
        self.errors.push(error);
        self
    }

    /// Apply to `execution`. Progress never moves backwards; a lower value is
    /// ignored with a warning.
    pub fn apply_to(self, execution: &mut WorkflowExecution) {
        if let Some(status) = self.status {
            execution.status = status;
        }
        if let Some(stage) = self.stage {
            execution.stage = stage;
        }
        if let Some(progress) = self.progress {
            let progress = progress.min(100);
            if progress >= execution.progress {
                execution.progress = progress;
            } else {
                warn!(
                    execution_id = %execution.id,
                    current = execution.progress,
                    requested = progress,
                    "ignoring backwards progress update"
                );
            }
        }
        if let Some(results) = self.results {
            execution.results = results;
        }
        execution.errors.extend(self.errors);
        execution.updated_at = Utc::now();
    }
}

/// Reads and patches execution records through an [`ExecutionStore`].
#[derive(Clone)]
pub struct ExecutionTracker {
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionTracker {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Tracker over a fresh [`InMemoryExecutionStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryExecutionStore::new()))
    }

    pub async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        self.store.save(execution).await
    }

    pub async fn get(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>> {
        self.store.load(id).await
    }

    /// Load, patch, and save `id`. Returns the updated record, or `None` when
    /// it is unknown or expired.
    pub async fn update(
        &self,
        id: &ExecutionId,
        patch: ExecutionPatch,
    ) -> Result<Option<WorkflowExecution>> {
        let Some(mut execution) = self.store.load(id).await? else {
            debug!(execution_id = %id, "update for unknown execution ignored");
            return Ok(None);
        };
        patch.apply_to(&mut execution);
        self.store.save(&execution).await?;
        Ok(Some(execution))
    }

    pub async fn list(&self, status: ExecutionStatus) -> Result<Vec<WorkflowExecution>> {
        self.store.list_by_status(status).await
    }

    pub async fn remove(&self, id: &ExecutionId) -> Result<bool> {
        self.store.delete(id).await
    }
}
