//! Pipeline orchestration and domain logic for Pressroom.
//!
//! This crate ties together fetching, normalization, deduplication, storage,
//! scoring and stage promotion into end-to-end runs driven by a
//! [`WorkflowConfig`](pressroom_shared::WorkflowConfig).

pub mod dedup;
pub mod orchestrator;
pub mod progress;
pub mod promotion;
pub mod reconcile;
pub mod scheduler;
pub mod tracker;

pub use dedup::{DedupGate, DedupVerdict};
pub use orchestrator::{DEFAULT_FETCH_TIMEOUT, WorkflowOrchestrator};
pub use progress::{ProgressReporter, SilentProgress};
pub use promotion::{
    DEFAULT_SCORE_TIMEOUT, FALLBACK_REASONING, FALLBACK_SCORER_ID, LOW_SCORE_REASON,
    PromotionEngine, PromotionOutcome, rank, score_with_fallback,
};
pub use reconcile::{ReconcileReport, sweep};
pub use scheduler::Scheduler;
pub use tracker::{
    CachedExecutionStore, DEFAULT_EXECUTION_TTL, EXECUTION_KEY_PREFIX, ExecutionPatch,
    ExecutionStore, ExecutionTracker, InMemoryExecutionStore, TieredExecutionStore,
};
