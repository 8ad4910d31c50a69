//! C3 — Conflict Engine: records file-edit intervals, detects overlaps
//! across distinct workers, and applies a resolution policy (§4.3).

use chrono::Utc;
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::types::{Conflict, FileEdit, ResolutionStrategy};

impl Aggregator {
    /// Record one `FileEdit`, detecting (at most) one new conflict
    /// against every pre-existing edit on the same path by a different
    /// worker (§4.3, step 1-2).
    pub async fn track_file_edit(&self, edit: FileEdit) {
        let mut state = self.state.write().await;
        state.record_file_edit_locked(edit);
    }

    /// Change the active resolution strategy. Unknown names are
    /// silently ignored — the strategy is left unchanged (§4.3).
    pub async fn set_resolution_strategy(&self, name: &str) {
        if let Some(strategy) = ResolutionStrategy::parse(name) {
            self.state.write().await.resolution_strategy = strategy;
        } else {
            debug!(name, "ignoring unknown resolution strategy");
        }
    }

    /// The current resolution strategy.
    pub async fn get_resolution_strategy(&self) -> ResolutionStrategy {
        self.state.read().await.resolution_strategy
    }

    /// Apply the current resolution policy to every file that has a
    /// recorded conflict. Mutates only `WorkerResult.file_edits` /
    /// `has_conflicts` / `conflict_count`; the raw edit-history index
    /// used for detection is never touched (§4.3's invariant).
    pub async fn resolve_conflicts(&self) {
        let mut state = self.state.write().await;

        let conflicted_paths: std::collections::BTreeSet<String> = state
            .conflicts
            .iter()
            .map(|c| c.file_path.clone())
            .filter(|path| !state.resolved_files.contains(path))
            .collect();

        let strategy = state.resolution_strategy;
        for path in conflicted_paths {
            let Some(edits) = state.file_edits.get(&path).cloned() else {
                continue;
            };
            if edits.len() < 2 {
                continue;
            }

            match strategy {
                ResolutionStrategy::FirstWrite | ResolutionStrategy::LastWrite => {
                    let winner = if strategy == ResolutionStrategy::FirstWrite {
                        edits.iter().min_by_key(|e| e.start)
                    } else {
                        edits.iter().max_by_key(|e| e.start)
                    };
                    let Some(winner) = winner else { continue };
                    for edit in &edits {
                        if edit.worker_id == winner.worker_id {
                            continue;
                        }
                        if let Some(result) = state.results.get_mut(&edit.worker_id) {
                            // Match on the full edit identity, not just
                            // (file_path, start): two edits from the same
                            // worker can share a start timestamp, and a
                            // retain-by-start would strip both instead of
                            // just the one `edit` this iteration covers.
                            // Removing a single positional match keeps the
                            // count at exactly one removal per raw edit.
                            if let Some(pos) = result.file_edits.iter().position(|e| {
                                e.file_path == path
                                    && e.start == edit.start
                                    && e.end == edit.end
                                    && e.operation == edit.operation
                            }) {
                                result.file_edits.remove(pos);
                                result.has_conflicts = true;
                                result.conflict_count += 1;
                            }
                        }
                    }
                }
                ResolutionStrategy::MergeAttempt => {
                    for edit in &edits {
                        if let Some(result) = state.results.get_mut(&edit.worker_id) {
                            result.has_conflicts = true;
                            result.conflict_count += 1;
                        }
                    }
                }
            }

            state.resolved_files.insert(path);
        }
    }

    /// Snapshot of every recorded conflict, in detection order.
    pub async fn get_conflicts(&self) -> Vec<Conflict> {
        self.state.read().await.conflicts.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::Aggregator;

    fn edit(worker: &str, path: &str, start_offset_min: i64, end_offset_min: Option<i64>) -> FileEdit {
        let now = Utc::now();
        FileEdit {
            worker_id: worker.to_string(),
            file_path: path.to_string(),
            start: now + ChronoDuration::minutes(start_offset_min),
            end: end_offset_min.map(|m| now + ChronoDuration::minutes(m)),
            operation: "write".to_string(),
        }
    }

    #[tokio::test]
    async fn overlapping_edits_produce_one_conflict() {
        let agg = Aggregator::new();
        agg.track_file_edit(edit("w0", "/test/file.go", -60, Some(-30)))
            .await;
        agg.track_file_edit(edit("w1", "/test/file.go", -50, Some(-20)))
            .await;
        let conflicts = agg.get_conflicts().await;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].file_path, "/test/file.go");
        assert_eq!(conflicts[0].worker_ids, vec!["w0", "w1"]);
    }

    #[tokio::test]
    async fn touching_intervals_count_as_one_conflict() {
        let agg = Aggregator::new();
        agg.track_file_edit(edit("w0", "/f", -10, Some(0))).await;
        agg.track_file_edit(edit("w1", "/f", 0, Some(10))).await;
        assert_eq!(agg.get_conflicts().await.len(), 1);
    }

    #[tokio::test]
    async fn disjoint_intervals_do_not_conflict() {
        let agg = Aggregator::new();
        agg.track_file_edit(edit("w0", "/f", -20, Some(-10))).await;
        agg.track_file_edit(edit("w1", "/f", -5, Some(5))).await;
        assert!(agg.get_conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn same_worker_edits_never_conflict() {
        let agg = Aggregator::new();
        agg.track_file_edit(edit("w0", "/f", -20, Some(10))).await;
        agg.track_file_edit(edit("w0", "/f", -5, Some(5))).await;
        assert!(agg.get_conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_strategy_leaves_strategy_unchanged() {
        let agg = Aggregator::new();
        agg.set_resolution_strategy("last_write").await;
        agg.set_resolution_strategy("bogus").await;
        assert_eq!(
            agg.get_resolution_strategy().await,
            ResolutionStrategy::LastWrite
        );
    }

    /// A losing worker with two edits on the same file that share a
    /// `start` timestamp (but differ in `end`/`operation`) must have
    /// exactly those two edits removed individually — not have the
    /// removal of one collapse into stripping both via a start-only
    /// match.
    #[tokio::test]
    async fn resolution_disambiguates_edits_sharing_a_start_timestamp() {
        use crate::types::{WorkerResult, WorkerStatus};

        let agg = Aggregator::new();
        let now = Utc::now();

        // Spans long enough to overlap both of w1's edits below.
        let winner = WorkerResult {
            worker_id: "w0".to_string(),
            provider_id: "p".to_string(),
            model_id: "m".to_string(),
            status: WorkerStatus::Completed,
            output: String::new(),
            error: String::new(),
            start: now + ChronoDuration::minutes(-20),
            end: Some(now + ChronoDuration::minutes(-5)),
            metadata: Default::default(),
            file_edits: vec![edit("w0", "/f", -20, Some(-5))],
            has_conflicts: false,
            conflict_count: 0,
            cost: 0.0,
            output_bytes: 0,
        };
        agg.add_result("w0", winner).await.unwrap();

        let shared_start = -10;
        let loser_edits = vec![
            FileEdit {
                worker_id: "w1".to_string(),
                file_path: "/f".to_string(),
                start: now + ChronoDuration::minutes(shared_start),
                end: Some(now + ChronoDuration::minutes(shared_start + 1)),
                operation: "write".to_string(),
            },
            FileEdit {
                worker_id: "w1".to_string(),
                file_path: "/f".to_string(),
                start: now + ChronoDuration::minutes(shared_start),
                end: Some(now + ChronoDuration::minutes(shared_start + 50)),
                operation: "append".to_string(),
            },
        ];
        agg.add_result(
            "w1",
            WorkerResult {
                worker_id: "w1".to_string(),
                provider_id: "p".to_string(),
                model_id: "m".to_string(),
                status: WorkerStatus::Completed,
                output: String::new(),
                error: String::new(),
                start: now + ChronoDuration::minutes(shared_start),
                end: Some(now + ChronoDuration::minutes(shared_start + 50)),
                metadata: Default::default(),
                file_edits: loser_edits,
                has_conflicts: false,
                conflict_count: 0,
                cost: 0.0,
                output_bytes: 0,
            },
        )
        .await
        .unwrap();

        agg.set_resolution_strategy("first_write").await;
        agg.resolve_conflicts().await;

        let w1 = agg.get_result("w1").await.unwrap();
        assert!(w1.file_edits.is_empty());
        assert_eq!(w1.conflict_count, 2);
        assert!(w1.has_conflicts);
    }
}
