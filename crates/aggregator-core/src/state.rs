//! The single piece of mutable state every aggregator operation reads
//! or writes, protected by one `tokio::sync::RwLock` (§5, §9: "reader/
//! writer lock over a god-object").

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::ordered_set::OrderedIdSet;
use crate::types::{
    Conflict, CostTrackingConfig, FileEdit, MergeConfig, MergeDecision, MergedOutput,
    ProviderCost, ResolutionStrategy, WorkerCost, WorkerResult,
};

#[derive(Debug)]
pub(crate) struct AggregatorState {
    /// Authoritative store: worker id -> its one result record.
    pub(crate) results: HashMap<String, WorkerResult>,
    /// Ids registered via `RegisterWorkers`, independent of `results`.
    pub(crate) expected: HashSet<String>,
    pub(crate) completed: OrderedIdSet,
    pub(crate) failed: OrderedIdSet,

    /// Raw, append-only edit history indexed by file path. This is the
    /// conflict engine's own index; `ResolveConflicts` never mutates it.
    pub(crate) file_edits: HashMap<String, Vec<FileEdit>>,
    pub(crate) conflicts: Vec<Conflict>,
    pub(crate) resolution_strategy: ResolutionStrategy,
    /// File paths already folded into a `WorkerResult` by
    /// `ResolveConflicts`, so repeated calls don't re-penalize the same
    /// edits (see `DESIGN.md` for why this dedup exists).
    pub(crate) resolved_files: HashSet<String>,

    pub(crate) merge_config: MergeConfig,
    pub(crate) merge_decisions: Vec<MergeDecision>,
    pub(crate) merged_output: Option<MergedOutput>,

    pub(crate) worker_costs: HashMap<String, WorkerCost>,
    pub(crate) provider_costs: HashMap<String, ProviderCost>,
    pub(crate) cost_tracking: CostTrackingConfig,

    pub(crate) run_start: DateTime<Utc>,
}

impl AggregatorState {
    pub(crate) fn new(
        merge_config: MergeConfig,
        cost_tracking: CostTrackingConfig,
        resolution_strategy: ResolutionStrategy,
    ) -> Self {
        Self {
            results: HashMap::new(),
            expected: HashSet::new(),
            completed: OrderedIdSet::new(),
            failed: OrderedIdSet::new(),
            file_edits: HashMap::new(),
            conflicts: Vec::new(),
            resolution_strategy,
            resolved_files: HashSet::new(),
            merge_config,
            merge_decisions: Vec::new(),
            merged_output: None,
            worker_costs: HashMap::new(),
            provider_costs: HashMap::new(),
            cost_tracking,
            run_start: Utc::now(),
        }
    }

    /// §4.2's "allDone" predicate: quiescent iff every stored result is
    /// terminal and at least one has reported. Deliberately keyed off
    /// `results`, not `expected` — see §9's Open Question on this
    /// duality, preserved as specified.
    pub(crate) fn is_quiescent(&self) -> bool {
        !self.results.is_empty() && self.completed.len() + self.failed.len() == self.results.len()
    }

    /// `AllCompleted`'s predicate, which *is* keyed off `expected`.
    pub(crate) fn all_completed(&self) -> bool {
        !self.expected.is_empty()
            && self.expected.len() == self.completed.len() + self.failed.len()
    }

    /// C3's per-edit algorithm (§4.3), callable while the write lock is
    /// already held — shared by the public `TrackFileEdit` and the
    /// implicit forwarding `AddResult` does for each of a result's
    /// `FileEdit`s.
    pub(crate) fn record_file_edit_locked(&mut self, edit: FileEdit) {
        let now = Utc::now();
        let path = edit.file_path.clone();
        let prior_edits = self.file_edits.get(&path).cloned().unwrap_or_default();

        for prior in prior_edits.iter().filter(|p| p.worker_id != edit.worker_id) {
            let end1 = prior.effective_end(now);
            let end2 = edit.effective_end(now);
            if prior.start < end2 && !(end1 < edit.start) {
                self.conflicts.push(Conflict {
                    file_path: path.clone(),
                    worker_ids: vec![prior.worker_id.clone(), edit.worker_id.clone()],
                    resolution_policy: self.resolution_strategy.as_str().to_string(),
                    detected_at: now,
                });
                break;
            }
        }

        self.file_edits.entry(path).or_default().push(edit);
    }

    /// C5's per-observation algorithm (§4.5), callable while the write
    /// lock is already held — shared by the public `TrackWorkerCost`
    /// and the implicit forwarding `AddResult` does for a non-zero
    /// `WorkerResult.cost`.
    pub(crate) fn apply_cost_locked(
        &mut self,
        worker_id: &str,
        provider_id: &str,
        _model_id: &str,
        method: &str,
        cost: f64,
        start: DateTime<Utc>,
    ) {
        let now = Utc::now();
        match self.worker_costs.get_mut(worker_id) {
            Some(existing) => {
                existing.total_cost += cost;
                existing.task_count += 1;
                existing.avg_cost_per_task =
                    existing.total_cost / f64::from(existing.task_count);
                existing.end = now;
            }
            None => {
                self.worker_costs.insert(
                    worker_id.to_string(),
                    WorkerCost {
                        worker_id: worker_id.to_string(),
                        method: method.to_string(),
                        total_cost: cost,
                        task_count: 1,
                        avg_cost_per_task: cost,
                        start,
                        end: now,
                    },
                );
            }
        }

        let configured_budget = if self.cost_tracking.enabled {
            self.cost_tracking.budget
        } else {
            0.0
        };
        match self.provider_costs.get_mut(provider_id) {
            Some(existing) => {
                existing.total_cost += cost;
                existing.task_count += 1;
                existing.avg_cost_per_task =
                    existing.total_cost / f64::from(existing.task_count);
                existing.used = existing.total_cost;
                existing.remaining = existing.budget - existing.used;
                existing.exceeded = existing.used > existing.budget;
            }
            None => {
                self.provider_costs.insert(
                    provider_id.to_string(),
                    ProviderCost {
                        provider_id: provider_id.to_string(),
                        currency: "USD".to_string(),
                        total_cost: cost,
                        task_count: 1,
                        avg_cost_per_task: cost,
                        budget: configured_budget,
                        used: cost,
                        remaining: configured_budget - cost,
                        exceeded: cost > configured_budget,
                    },
                );
            }
        }
    }
}
