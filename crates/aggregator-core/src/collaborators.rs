//! The two external collaborators the aggregator core talks to, but
//! does not own: the task registry and the learning/pattern store.
//!
//! Both are consumed only through these narrow traits — the aggregator
//! never reaches into a concrete task-registry or pattern-store
//! implementation. Failures from either are advisory: the aggregator
//! logs them at `warn` and continues, per §7's propagation policy.

use async_trait::async_trait;

use crate::types::Pattern;

/// An opaque task identity extracted from a worker id by the task
/// registry. `IsZero` is exposed as [`TaskId::is_zero`] rather than a
/// free function, since the zero value is a property of the id itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TaskId(pub String);

impl TaskId {
    /// The registry's notion of "no task associated with this worker".
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

/// The task registry this aggregator notifies as workers terminate.
///
/// Implementations live outside this crate; the aggregator only calls
/// `mark_completed`/`mark_failed` after a worker's terminal state is
/// already visible in the registry (see §5's ordering guarantee).
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Recover the task id a worker id refers to. Implementations that
    /// can't find one return a zero `TaskId`.
    fn extract_task_id(&self, worker_id: &str) -> TaskId;

    /// Record that the task behind `id` completed successfully.
    async fn mark_completed(&self, id: &TaskId, notes: &str) -> anyhow::Result<()>;

    /// Record that the task behind `id` failed.
    async fn mark_failed(&self, id: &TaskId, error_msg: &str) -> anyhow::Result<()>;
}

/// The learning/pattern store this aggregator feeds execution patterns
/// into on every successful completion (and on direct `StorePattern`
/// calls).
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Persist one learned pattern.
    async fn store(&self, pattern: Pattern) -> anyhow::Result<()>;
}

/// A `TaskRegistry` that never finds a task and always succeeds. The
/// default collaborator for an `Aggregator` built with [`crate::Aggregator::new`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTaskRegistry;

#[async_trait]
impl TaskRegistry for NoopTaskRegistry {
    fn extract_task_id(&self, _worker_id: &str) -> TaskId {
        TaskId::default()
    }

    async fn mark_completed(&self, _id: &TaskId, _notes: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn mark_failed(&self, _id: &TaskId, _error_msg: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A `PatternStore` that discards everything it's given.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPatternStore;

#[async_trait]
impl PatternStore for NoopPatternStore {
    async fn store(&self, _pattern: Pattern) -> anyhow::Result<()> {
        Ok(())
    }
}
