//! Background worker for executions started with `async: true`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use pressroom_shared::{ExecutionId, ExecutionStatus, Result};

use crate::orchestrator::WorkflowOrchestrator;
use crate::progress::SilentProgress;

pub struct Scheduler {
    orchestrator: Arc<WorkflowOrchestrator>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run every scheduled execution once, oldest first. Returns how many ran.
    pub async fn tick(&self) -> Result<usize> {
        match self.orchestrator.storage().cache_purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "expired cache entries purged"),
            Err(e) => warn!(error = %e, "cache purge failed"),
        }

        let mut pending = self
            .orchestrator
            .tracker()
            .list(ExecutionStatus::Scheduled)
            .await?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let count = pending.len();
        for execution in pending {
            info!(execution_id = %execution.id, "running scheduled execution");
            let finished = self
                .orchestrator
                .run_execution(execution, &SilentProgress)
                .await;
            info!(
                execution_id = %finished.id,
                status = %finished.status,
                stored = finished.results.items_stored,
                "scheduled execution finished"
            );
        }
        Ok(count)
    }

    /// Tick on the configured interval until `shutdown` resolves.
    pub async fn run_forever<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(interval_secs = self.interval.as_secs(), "scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Drop a scheduled execution before it runs. Returns `false` when the
    /// execution is unknown or has already started.
    pub async fn cancel(&self, id: &ExecutionId) -> Result<bool> {
        let tracker = self.orchestrator.tracker();
        match tracker.get(id).await? {
            Some(execution) if execution.status == ExecutionStatus::Scheduled => {
                info!(execution_id = %id, "scheduled execution cancelled");
                tracker.remove(id).await
            }
            _ => Ok(false),
        }
    }
}
