//! Phase callbacks for front ends that display run progress.

use pressroom_shared::ExecutionSummary;

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run enters a new phase, with the execution's progress.
    fn phase(&self, name: &str, percent: u8);
    /// Called after each source has been fetched (or has failed).
    fn source_done(&self, source_id: &str, fetched: usize, current: usize, total: usize);
    /// Called once the run reaches a terminal state.
    fn done(&self, summary: &ExecutionSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str, _percent: u8) {}
    fn source_done(&self, _source_id: &str, _fetched: usize, _current: usize, _total: usize) {}
    fn done(&self, _summary: &ExecutionSummary) {}
}
