//! C1 — Result Registry: thread-safe store of worker state and
//! terminal results, plus lifecycle transitions (§4.1).

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::error::{AggregatorError, Result};
use crate::types::{
    classify_error, AggregatedResult, Pattern, WorkerResult, WorkerStatus,
};

impl Aggregator {
    /// Register `ids` as expected workers. For any id with no existing
    /// record, create one with status `running` and `start = now`.
    /// Idempotent: re-registering an already-known id is a no-op beyond
    /// the `expected` set insertion.
    pub async fn register_workers(&self, ids: &[String]) {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for id in ids {
            state.expected.insert(id.clone());
            if !state.results.contains_key(id) {
                state.results.insert(
                    id.clone(),
                    WorkerResult {
                        worker_id: id.clone(),
                        provider_id: String::new(),
                        model_id: String::new(),
                        status: WorkerStatus::Running,
                        output: String::new(),
                        error: String::new(),
                        start: now,
                        end: None,
                        metadata: std::collections::HashMap::new(),
                        file_edits: Vec::new(),
                        has_conflicts: false,
                        conflict_count: 0,
                        cost: 0.0,
                        output_bytes: 0,
                    },
                );
            }
        }
        debug!(count = ids.len(), "registered workers");
    }

    /// Submit a worker's result, replacing any prior record in full.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidInput`] if `result.worker_id`
    /// doesn't match `id` (the "nil result" half of §4.1's contract is
    /// expressed in Rust by there being no `Option<WorkerResult>` to be
    /// absent: a caller who has no result simply doesn't call this).
    pub async fn add_result(&self, id: &str, mut result: WorkerResult) -> Result<()> {
        if result.worker_id != id {
            return Err(AggregatorError::InvalidInput(format!(
                "result worker id {:?} does not match {id:?}",
                result.worker_id
            )));
        }
        result.normalize_status();
        let now = Utc::now();
        if result.end.is_none() {
            result.end = Some(now);
        }

        let (notify_completed, notify_failed, pattern) = {
            let mut state = self.state.write().await;
            state.results.insert(id.to_string(), result.clone());

            let mut notify_completed = false;
            let mut notify_failed = false;
            let mut pattern = None;
            if result.status == WorkerStatus::Completed && result.error.is_empty() {
                state.completed.insert(id);
                state.failed.remove(id);
                notify_completed = true;
                pattern = Some(Self::build_pattern(&result, now));
            } else if result.status == WorkerStatus::Failed || !result.error.is_empty() {
                state.failed.insert(id);
                state.completed.remove(id);
                notify_failed = true;
            }

            for edit in &result.file_edits {
                state.record_file_edit_locked(edit.clone());
            }
            if result.cost > 0.0 {
                let method = result
                    .metadata
                    .get("method")
                    .cloned()
                    .unwrap_or_else(|| "AddResult".to_string());
                state.apply_cost_locked(
                    id,
                    &result.provider_id,
                    &result.model_id,
                    &method,
                    result.cost,
                    result.start,
                );
            }

            (notify_completed, notify_failed, pattern)
        };

        if notify_completed {
            info!(worker_id = id, "worker completed");
            let task_id = self.task_registry.extract_task_id(id);
            if !task_id.is_zero() {
                if let Err(err) = self.task_registry.mark_completed(&task_id, "").await {
                    warn!(worker_id = id, error = %err, "task registry mark_completed failed");
                }
            }
            if let Some(pattern) = pattern {
                if let Err(err) = self.pattern_store.store(pattern).await {
                    warn!(worker_id = id, error = %err, "pattern store rejected implicit pattern");
                }
            }
        } else if notify_failed {
            info!(worker_id = id, error = %result.error, "worker failed");
            let task_id = self.task_registry.extract_task_id(id);
            if !task_id.is_zero() {
                if let Err(err) = self
                    .task_registry
                    .mark_failed(&task_id, &result.error)
                    .await
                {
                    warn!(worker_id = id, error = %err, "task registry mark_failed failed");
                }
            }
        }

        Ok(())
    }

    /// Force `id` into `failed` with `msg` as its error, creating a
    /// record if none exists. Also registers `id` as expected.
    pub async fn mark_failed(&self, id: &str, msg: &str) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.expected.insert(id.to_string());
        let entry = state
            .results
            .entry(id.to_string())
            .or_insert_with(|| WorkerResult {
                worker_id: id.to_string(),
                provider_id: String::new(),
                model_id: String::new(),
                status: WorkerStatus::Failed,
                output: String::new(),
                error: String::new(),
                start: now,
                end: None,
                metadata: std::collections::HashMap::new(),
                file_edits: Vec::new(),
                has_conflicts: false,
                conflict_count: 0,
                cost: 0.0,
                output_bytes: 0,
            });
        entry.status = WorkerStatus::Failed;
        entry.error = msg.to_string();
        entry.end = Some(now);
        state.completed.remove(id);
        state.failed.insert(id);
        debug!(worker_id = id, msg, "worker force-marked failed");
    }

    /// Snapshot of one worker's stored result.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::NotFound`] if `id` has no record.
    pub async fn get_result(&self, id: &str) -> Result<WorkerResult> {
        let state = self.state.read().await;
        state
            .results
            .get(id)
            .cloned()
            .ok_or_else(|| AggregatorError::NotFound(format!("worker {id:?}")))
    }

    /// Ids currently classified `completed`, in insertion order.
    pub async fn completed_workers(&self) -> Vec<String> {
        self.state.read().await.completed.to_vec()
    }

    /// Ids currently classified `failed`, in insertion order.
    pub async fn failed_workers(&self) -> Vec<String> {
        self.state.read().await.failed.to_vec()
    }

    /// Number of stored results (registered or submitted).
    pub async fn total_workers(&self) -> usize {
        self.state.read().await.results.len()
    }

    /// `true` iff every expected worker has reached a terminal
    /// classification, and at least one was expected.
    pub async fn all_completed(&self) -> bool {
        self.state.read().await.all_completed()
    }

    /// The cheap snapshot: worker counts plus every stored result.
    pub async fn get_aggregated_result(&self) -> AggregatedResult {
        let state = self.state.read().await;
        AggregatedResult {
            total_workers: state.results.len(),
            completed_workers: state.completed.to_vec(),
            failed_workers: state.failed.to_vec(),
            results: state.results.values().cloned().collect(),
        }
    }

    pub(crate) fn build_pattern(result: &WorkerResult, now: chrono::DateTime<Utc>) -> Pattern {
        let duration_secs = result
            .end
            .unwrap_or(now)
            .signed_duration_since(result.start)
            .num_milliseconds() as f64
            / 1000.0;
        Pattern {
            worker_id: result.worker_id.clone(),
            provider_id: result.provider_id.clone(),
            model_id: result.model_id.clone(),
            status: result.status,
            error_pattern: if result.error.is_empty() {
                None
            } else {
                Some(classify_error(&result.error))
            },
            output_bytes: result.output_bytes,
            cost: result.cost,
            duration_secs,
            timestamp: now,
        }
    }
}
