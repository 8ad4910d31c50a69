//! Property-based tests for the aggregator-core invariants in §8.
//!
//! Run with: cargo test --test aggregator_properties
//! Reproducible: set `PROPTEST_SEED` for deterministic runs.

use std::collections::HashMap;

use aggregator_core::types::{
    classify_error, CostTrackingConfig, ErrorPatternKind, MergeConfig, MergeStrategy,
    WorkerResult, WorkerStatus,
};
use aggregator_core::Aggregator;
use chrono::Utc;
use proptest::prelude::*;

fn fast_config() -> ProptestConfig {
    ProptestConfig {
        cases: 48,
        ..ProptestConfig::default()
    }
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build current-thread runtime")
        .block_on(fut)
}

fn worker_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,8}".prop_map(|s| s)
}

fn status_strategy() -> impl Strategy<Value = (WorkerStatus, String)> {
    prop_oneof![
        Just((WorkerStatus::Completed, String::new())),
        Just((WorkerStatus::Failed, "boom".to_string())),
        Just((WorkerStatus::Failed, String::new())),
    ]
}

fn make_result(id: &str, status: WorkerStatus, error: &str, cost: f64) -> WorkerResult {
    let now = Utc::now();
    WorkerResult {
        worker_id: id.to_string(),
        provider_id: "provider".to_string(),
        model_id: "model".to_string(),
        status,
        output: format!("output-{id}"),
        error: error.to_string(),
        start: now,
        end: None,
        metadata: HashMap::new(),
        file_edits: Vec::new(),
        has_conflicts: false,
        conflict_count: 0,
        cost,
        output_bytes: 10,
    }
}

proptest! {
    #![proptest_config(fast_config())]

    /// Invariant 1 & 3: every id is in at most one of completed/failed,
    /// and len(completed)+len(failed) <= total, with equality once every
    /// submitted worker is terminal.
    #[test]
    fn prop_classification_is_partitioned(
        ids in prop::collection::vec(worker_id_strategy(), 1..12),
        statuses in prop::collection::vec(status_strategy(), 1..12),
    ) {
        let agg = Aggregator::new();
        let n = ids.len().min(statuses.len());
        block_on(async {
            for i in 0..n {
                let id = &ids[i];
                let (status, error) = &statuses[i];
                let result = make_result(id, *status, error, 0.0);
                let _ = agg.add_result(id, result).await;
            }

            let completed = agg.completed_workers().await;
            let failed = agg.failed_workers().await;
            let total = agg.total_workers().await;

            for id in &completed {
                prop_assert!(!failed.contains(id));
            }
            prop_assert!(completed.len() + failed.len() <= total);
            prop_assert_eq!(completed.len() + failed.len(), total);
            Ok(())
        })?;
    }

    /// Invariant 2: after `AddResult(id, r)`, `GetResult(id)` equals `r`
    /// modulo the auto-filled end timestamp.
    #[test]
    fn prop_get_result_matches_submission(
        id in worker_id_strategy(),
        is_error in any::<bool>(),
    ) {
        let agg = Aggregator::new();
        let (status, error) = if is_error {
            (WorkerStatus::Failed, "oops".to_string())
        } else {
            (WorkerStatus::Completed, String::new())
        };
        let submitted = make_result(&id, status, &error, 0.0);
        block_on(async {
            agg.add_result(&id, submitted.clone()).await.unwrap();
            let stored = agg.get_result(&id).await.unwrap();
            prop_assert_eq!(stored.worker_id, submitted.worker_id);
            prop_assert_eq!(stored.output, submitted.output);
            prop_assert_eq!(stored.error, submitted.error);
            prop_assert_eq!(stored.status, submitted.status);
            prop_assert!(stored.end.is_some());
            Ok(())
        })?;
    }

    /// Invariant 6: worker-cost average and provider remaining/exceeded
    /// are always derived consistently from the running totals.
    #[test]
    fn prop_cost_invariants_hold(
        costs in prop::collection::vec(0.0f64..5.0, 1..10),
        budget in 0.0f64..10.0,
    ) {
        let agg = Aggregator::new();
        block_on(async {
            agg.set_cost_tracking(CostTrackingConfig { enabled: true, budget }).await;
            for (i, cost) in costs.iter().enumerate() {
                agg.track_worker_cost(&format!("w{i}"), "provider", "model", "manual", *cost).await;
            }

            for provider_cost in agg.get_all_provider_costs().await {
                prop_assert!((provider_cost.remaining - (provider_cost.budget - provider_cost.used)).abs() < 1e-9);
                prop_assert_eq!(provider_cost.exceeded, provider_cost.used > provider_cost.budget);
            }
            for worker_cost in agg.get_all_worker_costs().await {
                if worker_cost.task_count > 0 {
                    let expected = worker_cost.total_cost / f64::from(worker_cost.task_count);
                    prop_assert!((worker_cost.avg_cost_per_task - expected).abs() < 1e-9);
                }
            }
            Ok(())
        })?;
    }

    /// Invariant 7: a successful merge's `source_workers` is a subset of
    /// `completed`, and every id in it has an empty error.
    #[test]
    fn prop_merge_source_workers_are_successful_completed(
        ids in prop::collection::vec(worker_id_strategy(), 2..8),
    ) {
        let mut unique = ids;
        unique.sort();
        unique.dedup();
        prop_assume!(unique.len() >= 2);

        let agg = Aggregator::new();
        block_on(async {
            for id in &unique {
                agg.add_result(id, make_result(id, WorkerStatus::Completed, "", 0.0))
                    .await
                    .unwrap();
            }
            agg.set_merge_config(MergeConfig {
                strategy: MergeStrategy::Concat,
                ..MergeConfig::default()
            })
            .await;

            let merged = agg.merge().await.unwrap();
            let completed = agg.completed_workers().await;
            for worker_id in &merged.source_workers {
                prop_assert!(completed.contains(worker_id));
                let result = agg.get_result(worker_id).await.unwrap();
                prop_assert!(result.error.is_empty());
            }
            Ok(())
        })?;
    }

    /// Idempotence: `RegisterWorkers` called twice with the same ids
    /// leaves `total_workers` unchanged.
    #[test]
    fn prop_register_workers_is_idempotent(
        ids in prop::collection::vec(worker_id_strategy(), 1..10),
    ) {
        let agg = Aggregator::new();
        block_on(async {
            agg.register_workers(&ids).await;
            let first = agg.total_workers().await;
            agg.register_workers(&ids).await;
            let second = agg.total_workers().await;
            prop_assert_eq!(first, second);
            Ok(())
        })?;
    }
}

/// Round-trip: a `generate_summary` JSON payload round-trips its
/// `start_time` through RFC 3339 losslessly.
#[tokio::test]
async fn summary_json_round_trips_start_time() {
    let agg = Aggregator::new();
    agg.add_result(
        "w0",
        make_result("w0", WorkerStatus::Completed, "", 0.0),
    )
    .await
    .unwrap();
    let summary = agg.generate_summary().await;
    let json = summary.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    let start_time = parsed
        .get("start_time")
        .and_then(|v| v.as_str())
        .expect("start_time present");
    let reparsed = chrono::DateTime::parse_from_rfc3339(start_time).unwrap();
    assert_eq!(
        reparsed.with_timezone(&chrono::Utc).timestamp_millis(),
        summary.start_time.timestamp_millis()
    );
}

/// Classifier determinism: the same message always classifies the same
/// way, and the documented first-match-wins ordering holds.
#[test]
fn classifier_precedence_matches_spec_order() {
    assert_eq!(classify_error("request timed out"), ErrorPatternKind::Timeout);
    assert_eq!(
        classify_error("rate limit exceeded, too many requests"),
        ErrorPatternKind::RateLimit
    );
    assert_eq!(
        classify_error("authentication failed: unauthorized"),
        ErrorPatternKind::AuthError
    );
    assert_eq!(
        classify_error("context window limit reached"),
        ErrorPatternKind::ContextLimit
    );
    assert_eq!(
        classify_error("memory usage exceeded threshold"),
        ErrorPatternKind::MemoryExceeded
    );
    assert_eq!(
        classify_error("network connection reset"),
        ErrorPatternKind::NetworkError
    );
    assert_eq!(classify_error("something odd happened"), ErrorPatternKind::UnknownError);
    // Timeout takes precedence over a message that would also match network.
    assert_eq!(
        classify_error("connection timed out"),
        ErrorPatternKind::Timeout
    );
}
