//! Summary/pattern emitters: derives the execution summary and feeds
//! learned patterns into the pattern store (§2, §6).

use tracing::warn;

use crate::aggregator::Aggregator;
use crate::error::{AggregatorError, Result};
use crate::types::{ExecutionSummary, Pattern};

impl Aggregator {
    /// Build the full execution report: worker counts, per-worker and
    /// per-provider cost tables, every recorded conflict, and the merge
    /// decision trail.
    pub async fn generate_summary(&self) -> ExecutionSummary {
        let state = self.state.read().await;
        let total_workers = state.results.len();
        let completed_count = state.completed.len();
        let failed_count = state.failed.len();
        let success_rate = if total_workers == 0 {
            0.0
        } else {
            (completed_count as f64 / total_workers as f64) * 100.0
        };
        let total_duration_secs = chrono::Utc::now()
            .signed_duration_since(state.run_start)
            .num_milliseconds() as f64
            / 1000.0;

        ExecutionSummary {
            total_workers,
            completed_count,
            failed_count,
            success_rate,
            start_time: state.run_start,
            total_duration_secs,
            worker_costs: state.worker_costs.values().cloned().collect(),
            provider_costs: state.provider_costs.values().cloned().collect(),
            cost_tracking: state.cost_tracking,
            conflicts: state.conflicts.clone(),
            conflict_count: state.conflicts.len(),
            merge_strategy: state.merge_config.strategy,
            merge_decisions: state.merge_decisions.clone(),
        }
    }

    /// Feed one `WorkerResult` into the pattern store directly,
    /// surfacing a rejection to the caller (unlike the implicit store
    /// triggered by a completing `AddResult`, which is swallowed).
    ///
    /// # Errors
    ///
    /// [`AggregatorError::StoreError`] if the pattern store rejects it.
    pub async fn store_pattern(&self, result: &crate::types::WorkerResult) -> Result<()> {
        let now = chrono::Utc::now();
        let pattern: Pattern = Self::build_pattern(result, now);
        self.pattern_store
            .store(pattern)
            .await
            .map_err(|err| AggregatorError::StoreError(err.to_string()))
    }
}
