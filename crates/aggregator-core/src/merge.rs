//! C4 — Merger: selects one or combines many successful outputs under
//! a declarative strategy, emitting an auditable decision trail (§4.4).

use chrono::Utc;
use tracing::warn;

use crate::aggregator::Aggregator;
use crate::error::{AggregatorError, Result};
use crate::types::{
    JsonConflictPolicy, MergeConfig, MergeDecision, MergeStrategy, MergedOutput, WorkerResult,
};

impl Aggregator {
    /// Merge the current `completed` set's successful outputs under the
    /// active [`MergeConfig`]. Takes the writer lock for the duration
    /// (§4.4).
    ///
    /// # Errors
    ///
    /// [`AggregatorError::NotReady`] if no completed worker has an
    /// empty error. [`AggregatorError::InvalidConfig`] if the active
    /// strategy's preconditions aren't met (see §4.4's table).
    pub async fn merge(&self) -> Result<MergedOutput> {
        let mut state = self.state.write().await;

        let completed_ids: Vec<String> = state.completed.to_vec();
        let successful: Vec<WorkerResult> = completed_ids
            .iter()
            .filter_map(|id| state.results.get(id))
            .filter(|r| r.error.is_empty())
            .cloned()
            .collect();

        if successful.is_empty() {
            let msg = "no successful results to merge".to_string();
            let mut output = MergedOutput::default();
            output.errors.push(msg.clone());
            state.merged_output = Some(output);
            return Err(AggregatorError::NotReady(msg));
        }

        let config = state.merge_config.clone();
        let outcome = match config.strategy {
            MergeStrategy::FirstSuccess => {
                Self::select_single(&successful, 0, MergeStrategy::FirstSuccess)
            }
            MergeStrategy::LastSuccess => Self::select_single(
                &successful,
                successful.len() - 1,
                MergeStrategy::LastSuccess,
            ),
            MergeStrategy::Concat => Self::merge_concat(&successful, &completed_ids),
            MergeStrategy::JsonMerge => Self::merge_json(&successful, &config),
            MergeStrategy::Priority => Self::merge_priority(&successful, &config),
            MergeStrategy::PreferredProvider => {
                Self::merge_preferred_provider(&successful, &config)
            }
        };

        match outcome {
            Ok((mut output, decision)) => {
                output.decisions = {
                    let mut decisions = state.merge_decisions.clone();
                    decisions.push(decision.clone());
                    decisions
                };
                state.merge_decisions.push(decision);
                state.merged_output = Some(output.clone());
                Ok(output)
            }
            Err(err) => {
                let mut output = MergedOutput::default();
                output.errors.push(err.to_string());
                state.merged_output = Some(output);
                Err(err)
            }
        }
    }

    fn select_single(
        successful: &[WorkerResult],
        index: usize,
        strategy: MergeStrategy,
    ) -> std::result::Result<(MergedOutput, MergeDecision), AggregatorError> {
        let selected = &successful[index];
        let skipped: Vec<String> = successful
            .iter()
            .map(|r| r.worker_id.clone())
            .filter(|id| id != &selected.worker_id)
            .collect();
        let reason = format!("selected {} under {:?}", selected.worker_id, strategy);
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("provider".to_string(), selected.provider_id.clone());
        metadata.insert("model".to_string(), selected.model_id.clone());
        Ok((
            MergedOutput {
                content: selected.output.clone(),
                source_workers: vec![selected.worker_id.clone()],
                metadata,
                decisions: Vec::new(),
                errors: Vec::new(),
            },
            MergeDecision {
                strategy,
                selected_worker: selected.worker_id.clone(),
                skipped_workers: skipped,
                reason,
                timestamp: Utc::now(),
            },
        ))
    }

    fn merge_concat(
        successful: &[WorkerResult],
        completed_ids: &[String],
    ) -> std::result::Result<(MergedOutput, MergeDecision), AggregatorError> {
        let content = successful
            .iter()
            .map(|r| r.output.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let source_workers: Vec<String> =
            successful.iter().map(|r| r.worker_id.clone()).collect();
        // §9: skipped = completed \ sourceWorkers, not necessarily empty
        // if a `completed`-classified worker somehow carries an error.
        let skipped: Vec<String> = completed_ids
            .iter()
            .filter(|id| !source_workers.contains(id))
            .cloned()
            .collect();
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("worker_count".to_string(), successful.len().to_string());
        Ok((
            MergedOutput {
                content,
                source_workers: source_workers.clone(),
                metadata,
                decisions: Vec::new(),
                errors: Vec::new(),
            },
            MergeDecision {
                strategy: MergeStrategy::Concat,
                selected_worker: source_workers.join(","),
                skipped_workers: skipped,
                reason: format!("concatenated {} successful outputs", successful.len()),
                timestamp: Utc::now(),
            },
        ))
    }

    fn merge_json(
        successful: &[WorkerResult],
        config: &MergeConfig,
    ) -> std::result::Result<(MergedOutput, MergeDecision), AggregatorError> {
        let mut merged = serde_json::Map::new();
        let mut source_workers = Vec::new();
        let mut key_count = 0usize;

        for result in successful {
            let Ok(serde_json::Value::Object(parsed)) =
                serde_json::from_str::<serde_json::Value>(&result.output)
            else {
                warn!(worker_id = %result.worker_id, "json_merge: unparseable output skipped");
                continue;
            };
            source_workers.push(result.worker_id.clone());
            for (key, value) in parsed {
                if merged.contains_key(&key) {
                    match config.on_conflict {
                        JsonConflictPolicy::Skip => {}
                        JsonConflictPolicy::Markers => {
                            let marked = format!("{key}_{}", result.worker_id);
                            merged.insert(marked, value);
                            key_count += 1;
                        }
                    }
                } else {
                    merged.insert(key, value);
                    key_count += 1;
                }
            }
        }

        if source_workers.is_empty() {
            return Err(AggregatorError::InvalidConfig(
                "no result yielded a valid map for json_merge".to_string(),
            ));
        }

        let content = serde_json::Value::Object(merged).to_string();
        let skipped: Vec<String> = successful
            .iter()
            .map(|r| r.worker_id.clone())
            .filter(|id| !source_workers.contains(id))
            .collect();
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("key_count".to_string(), key_count.to_string());
        metadata.insert("worker_count".to_string(), source_workers.len().to_string());
        Ok((
            MergedOutput {
                content,
                source_workers: source_workers.clone(),
                metadata,
                decisions: Vec::new(),
                errors: Vec::new(),
            },
            MergeDecision {
                strategy: MergeStrategy::JsonMerge,
                selected_worker: source_workers.join(","),
                skipped_workers: skipped,
                reason: format!("merged {key_count} keys from {} workers", source_workers.len()),
                timestamp: Utc::now(),
            },
        ))
    }

    fn merge_priority(
        successful: &[WorkerResult],
        config: &MergeConfig,
    ) -> std::result::Result<(MergedOutput, MergeDecision), AggregatorError> {
        if config.priority.is_empty() {
            return Err(AggregatorError::InvalidConfig(
                "priority list is empty".to_string(),
            ));
        }

        let mut best: Option<(usize, &WorkerResult)> = None;
        for result in successful {
            let Some(rank) = config
                .priority
                .iter()
                .position(|provider| provider == &result.provider_id)
            else {
                continue;
            };
            match best {
                Some((best_rank, _)) if rank >= best_rank => {}
                _ => best = Some((rank, result)),
            }
        }

        let Some((rank, selected)) = best else {
            return Err(AggregatorError::InvalidConfig(
                "no successful worker's provider is in the priority list".to_string(),
            ));
        };

        let skipped: Vec<String> = successful
            .iter()
            .map(|r| r.worker_id.clone())
            .filter(|id| id != &selected.worker_id)
            .collect();
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("provider".to_string(), selected.provider_id.clone());
        metadata.insert("priority".to_string(), rank.to_string());
        Ok((
            MergedOutput {
                content: selected.output.clone(),
                source_workers: vec![selected.worker_id.clone()],
                metadata,
                decisions: Vec::new(),
                errors: Vec::new(),
            },
            MergeDecision {
                strategy: MergeStrategy::Priority,
                selected_worker: selected.worker_id.clone(),
                skipped_workers: skipped,
                reason: format!(
                    "provider {:?} ranked {rank} in priority list",
                    selected.provider_id
                ),
                timestamp: Utc::now(),
            },
        ))
    }

    fn merge_preferred_provider(
        successful: &[WorkerResult],
        config: &MergeConfig,
    ) -> std::result::Result<(MergedOutput, MergeDecision), AggregatorError> {
        if config.preferred_provider.is_empty() {
            return Err(AggregatorError::InvalidConfig(
                "preferred provider is empty".to_string(),
            ));
        }

        let Some(selected) = successful
            .iter()
            .find(|r| r.provider_id == config.preferred_provider)
        else {
            return Err(AggregatorError::InvalidConfig(format!(
                "no successful worker matched preferred provider {:?}",
                config.preferred_provider
            )));
        };

        let skipped: Vec<String> = successful
            .iter()
            .map(|r| r.worker_id.clone())
            .filter(|id| id != &selected.worker_id)
            .collect();
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("provider".to_string(), selected.provider_id.clone());
        metadata.insert("model".to_string(), selected.model_id.clone());
        Ok((
            MergedOutput {
                content: selected.output.clone(),
                source_workers: vec![selected.worker_id.clone()],
                metadata,
                decisions: Vec::new(),
                errors: Vec::new(),
            },
            MergeDecision {
                strategy: MergeStrategy::PreferredProvider,
                selected_worker: selected.worker_id.clone(),
                skipped_workers: skipped,
                reason: format!("provider matched preferred {:?}", config.preferred_provider),
                timestamp: Utc::now(),
            },
        ))
    }

    /// Current merge configuration.
    pub async fn get_merge_config(&self) -> MergeConfig {
        self.state.read().await.merge_config.clone()
    }

    /// Replace the merge configuration wholesale.
    pub async fn set_merge_config(&self, config: MergeConfig) {
        self.state.write().await.merge_config = config;
    }

    /// The most recently produced `MergedOutput`, if `Merge` has ever
    /// been called (successfully or not).
    pub async fn get_merged_output(&self) -> Option<MergedOutput> {
        self.state.read().await.merged_output.clone()
    }

    /// Every recorded merge decision, in decision-time order.
    pub async fn get_merge_decisions(&self) -> Vec<MergeDecision> {
        self.state.read().await.merge_decisions.clone()
    }
}
