//! The `Aggregator` handle itself: construction and the shared state it
//! wraps. The five components (§4.1-4.5) are implemented as `impl
//! Aggregator` blocks in their own sibling modules — `registry.rs`,
//! `wait.rs`, `conflict.rs`, `merge.rs`, `cost.rs` — plus `summary.rs`
//! for the summary/pattern emitters.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::collaborators::{NoopPatternStore, NoopTaskRegistry, PatternStore, TaskRegistry};
use crate::config::AggregatorConfig;
use crate::state::AggregatorState;

/// The multi-worker result aggregator described by §4 of the design.
///
/// Cheaply `Clone`-able: the state and both collaborators are held
/// behind `Arc`, so every clone shares the same underlying lock and the
/// same registered collaborators.
#[derive(Clone)]
pub struct Aggregator {
    pub(crate) state: Arc<RwLock<AggregatorState>>,
    pub(crate) task_registry: Arc<dyn TaskRegistry>,
    pub(crate) pattern_store: Arc<dyn PatternStore>,
    pub(crate) config: AggregatorConfig,
}

impl Aggregator {
    /// Build an aggregator with no-op collaborators and a default
    /// configuration. The common case for tests and for callers that
    /// wire up collaborators later.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(AggregatorConfig::default())
    }

    /// Build an aggregator with no-op collaborators and an explicit
    /// configuration.
    #[must_use]
    pub fn with_config(config: AggregatorConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(NoopTaskRegistry),
            Arc::new(NoopPatternStore),
        )
    }

    /// Build an aggregator with explicit collaborators and
    /// configuration. The constructor a real driver uses once it has a
    /// concrete task registry and pattern store.
    #[must_use]
    pub fn with_collaborators(
        config: AggregatorConfig,
        task_registry: Arc<dyn TaskRegistry>,
        pattern_store: Arc<dyn PatternStore>,
    ) -> Self {
        let state = AggregatorState::new(
            config.merge_config.clone(),
            config.cost_tracking,
            config.resolution_strategy,
        );
        Self {
            state: Arc::new(RwLock::new(state)),
            task_registry,
            pattern_store,
            config,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator").finish_non_exhaustive()
    }
}
