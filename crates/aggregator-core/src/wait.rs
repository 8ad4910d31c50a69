//! C2 — Wait Coordinator: bounded wait until every registered worker
//! terminates; enforces a deadline and force-terminates stragglers
//! (§4.2).

use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::aggregator::Aggregator;
use crate::types::{AggregatedResult, WorkerStatus};

/// Interval between quiescence checks while `WaitForAll` polls.
/// Busy-waiting is acceptable per §4.2; this is implementation detail,
/// not an observable contract.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Aggregator {
    /// Block until every stored result is terminal (and at least one
    /// has reported) or `timeout` elapses, whichever comes first. A
    /// non-positive `timeout` falls back to the aggregator's configured
    /// default, then to five minutes (§4.2).
    pub async fn wait_for_all(&self, timeout: Duration) -> AggregatedResult {
        let effective_timeout = self.config.effective_wait_timeout(timeout);
        let deadline = Instant::now() + effective_timeout;

        loop {
            if self.state.read().await.is_quiescent() {
                break;
            }
            if Instant::now() >= deadline {
                self.force_timeout_stragglers().await;
                break;
            }
            sleep(POLL_INTERVAL).await;
        }

        self.get_aggregated_result().await
    }

    /// Force every non-terminal stored result into `timeout` status.
    async fn force_timeout_stragglers(&self) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let straggler_ids: Vec<String> = state
            .results
            .iter()
            .filter(|(_, result)| result.end.is_none())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &straggler_ids {
            if let Some(result) = state.results.get_mut(id) {
                result.status = WorkerStatus::Timeout;
                result.error = "worker timed out".to_string();
                result.end = Some(now);
            }
            if !state.completed.contains(id) {
                state.failed.insert(id);
            }
        }

        if !straggler_ids.is_empty() {
            warn!(count = straggler_ids.len(), "workers force-timed-out");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serial_test::serial;

    use super::*;
    use crate::types::{WorkerResult, WorkerStatus};
    use crate::Aggregator;

    fn completed_result(id: &str) -> WorkerResult {
        let now = chrono::Utc::now();
        WorkerResult {
            worker_id: id.to_string(),
            provider_id: "p".to_string(),
            model_id: "m".to_string(),
            status: WorkerStatus::Completed,
            output: "ok".to_string(),
            error: String::new(),
            start: now,
            end: Some(now),
            metadata: Default::default(),
            file_edits: Vec::new(),
            has_conflicts: false,
            conflict_count: 0,
            cost: 0.0,
            output_bytes: 2,
        }
    }

    #[tokio::test]
    #[serial]
    async fn returns_promptly_on_quiescence() {
        let agg = Aggregator::new();
        agg.add_result("w0", completed_result("w0")).await.unwrap();
        let result = agg
            .wait_for_all(Duration::from_secs(5))
            .await;
        assert_eq!(result.completed_workers, vec!["w0".to_string()]);
    }

    #[tokio::test]
    #[serial]
    async fn stragglers_are_force_timed_out_at_deadline() {
        let agg = Aggregator::new();
        agg.register_workers(&["w0".to_string()]).await;
        let result = agg.wait_for_all(Duration::from_millis(30)).await;
        assert_eq!(result.failed_workers, vec!["w0".to_string()]);
        let stored = agg.get_result("w0").await.unwrap();
        assert_eq!(stored.status, WorkerStatus::Timeout);
        assert!(stored.end.is_some());
    }

    #[tokio::test]
    #[serial]
    async fn late_result_after_timeout_overwrites_straggler_entry() {
        let agg = Aggregator::new();
        agg.register_workers(&["w0".to_string()]).await;
        let _ = agg.wait_for_all(Duration::from_millis(30)).await;
        agg.add_result("w0", completed_result("w0")).await.unwrap();
        let stored = agg.get_result("w0").await.unwrap();
        assert_eq!(stored.status, WorkerStatus::Completed);
        assert!(agg.completed_workers().await.contains(&"w0".to_string()));
        assert!(!agg.failed_workers().await.contains(&"w0".to_string()));
    }
}
