//! The data model shared by every component of the aggregator core.
//!
//! See §3 of the design for the authoritative field-level contract; this
//! module is the literal Rust encoding of it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque worker identity. Uniqueness across a run is a caller
/// obligation — the aggregator never generates or validates these.
pub type WorkerId = String;

/// Terminal/non-terminal status of a [`WorkerResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Registered or submitted but not yet terminal.
    Running,
    /// Finished successfully with no error.
    Completed,
    /// Finished with an error (or forced failed by `MarkFailed`).
    Failed,
    /// Force-terminated by `WaitForAll` after its deadline passed.
    Timeout,
}

impl WorkerStatus {
    /// Any of `completed`, `failed`, `timeout`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A single file edit reported by a worker.
///
/// `end = None` means "still in progress at observation time"; overlap
/// checks in the conflict engine substitute the current wall-clock time
/// for a `None` end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEdit {
    pub worker_id: WorkerId,
    pub file_path: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Free-form operation tag (e.g. `"write"`, `"delete"`).
    pub operation: String,
}

impl FileEdit {
    /// The end of this edit's interval for overlap purposes: `end` if
    /// set, otherwise `now`.
    #[must_use]
    pub fn effective_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end.unwrap_or(now)
    }
}

/// A record produced at most once per worker per run. Later
/// `AddResult` calls replace the prior record in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_id: WorkerId,
    pub provider_id: String,
    pub model_id: String,
    pub status: WorkerStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub file_edits: Vec<FileEdit>,
    #[serde(default)]
    pub has_conflicts: bool,
    #[serde(default)]
    pub conflict_count: u32,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub output_bytes: usize,
}

impl WorkerResult {
    /// Apply §3's invariant: a non-empty error always means the worker
    /// is failed, regardless of the status the caller declared.
    pub(crate) fn normalize_status(&mut self) {
        if !self.error.is_empty() && self.status != WorkerStatus::Failed {
            self.status = WorkerStatus::Failed;
        }
    }

    /// `true` iff this result is terminal and carries no error.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status == WorkerStatus::Completed && self.error.is_empty()
    }
}

/// An append-only record of a detected overlap between two workers'
/// edits of the same file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub file_path: String,
    pub worker_ids: Vec<WorkerId>,
    pub resolution_policy: String,
    pub detected_at: DateTime<Utc>,
}

/// The conflict-resolution policy applied by `ResolveConflicts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The earliest edit on a file wins; every other edit is removed.
    FirstWrite,
    /// The latest edit on a file wins; every other edit is removed.
    LastWrite,
    /// No edit is removed; every touching worker is flagged conflicted.
    MergeAttempt,
}

impl ResolutionStrategy {
    /// Parse a strategy name, returning `None` for anything unknown —
    /// `SetResolutionStrategy` silently ignores unknown values rather
    /// than erroring.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "first_write" => Some(Self::FirstWrite),
            "last_write" => Some(Self::LastWrite),
            "merge_attempt" => Some(Self::MergeAttempt),
            _ => None,
        }
    }

    /// The canonical name stored on recorded `Conflict`s.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstWrite => "first_write",
            Self::LastWrite => "last_write",
            Self::MergeAttempt => "merge_attempt",
        }
    }
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        Self::FirstWrite
    }
}

/// The merge strategy a [`MergeConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    FirstSuccess,
    LastSuccess,
    Concat,
    JsonMerge,
    Priority,
    PreferredProvider,
}

impl Default for MergeStrategy {
    // §8 scenario S1 submits w0..w4 in order and requires that `Merge()`
    // under an *untouched* default config returns content = "out4",
    // sourceWorkers = ["w4"] — i.e. the last submission wins. That is
    // only true if the default strategy is `last_success`.
    fn default() -> Self {
        Self::LastSuccess
    }
}

/// How `json_merge` handles a key present in more than one worker's
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonConflictPolicy {
    /// Keep the first value seen, drop the later duplicate silently.
    Skip,
    /// Keep the first value, and additionally insert the duplicate
    /// under `"<key>_<worker-id>"`.
    Markers,
}

impl Default for JsonConflictPolicy {
    fn default() -> Self {
        Self::Skip
    }
}

/// Declarative configuration for `Merge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub strategy: MergeStrategy,
    /// Provider ids in descending priority order, used by the
    /// `priority` strategy.
    #[serde(default)]
    pub priority: Vec<String>,
    /// Provider id used by the `preferred_provider` strategy.
    #[serde(default)]
    pub preferred_provider: String,
    #[serde(default)]
    pub on_conflict: JsonConflictPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::default(),
            priority: Vec::new(),
            preferred_provider: String::new(),
            on_conflict: JsonConflictPolicy::default(),
        }
    }
}

/// One auditable record of a successful `Merge` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub strategy: MergeStrategy,
    pub selected_worker: String,
    pub skipped_workers: Vec<WorkerId>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// The output of `Merge`, successful or not.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedOutput {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source_workers: Vec<WorkerId>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub decisions: Vec<MergeDecision>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Per-worker running cost total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCost {
    pub worker_id: WorkerId,
    pub method: String,
    pub total_cost: f64,
    pub task_count: u32,
    pub avg_cost_per_task: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Per-provider running cost total against a configured budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCost {
    pub provider_id: String,
    pub currency: String,
    pub total_cost: f64,
    pub task_count: u32,
    pub avg_cost_per_task: f64,
    pub budget: f64,
    pub used: f64,
    pub remaining: f64,
    pub exceeded: bool,
}

/// Global cost-tracking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostTrackingConfig {
    pub enabled: bool,
    /// Budget applied to every provider as it's first observed. Zero
    /// when cost tracking is disabled.
    pub budget: f64,
}

impl Default for CostTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            budget: 0.0,
        }
    }
}

/// The cheap snapshot `WaitForAll` returns: worker counts plus a full
/// per-worker result listing, without the cost/conflict/merge sections
/// that make [`ExecutionSummary`] expensive to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub total_workers: usize,
    pub completed_workers: Vec<WorkerId>,
    pub failed_workers: Vec<WorkerId>,
    pub results: Vec<WorkerResult>,
}

/// A deterministic classification of an error string, used both by
/// `StorePattern` and directly available to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPatternKind {
    Timeout,
    RateLimit,
    AuthError,
    ContextLimit,
    MemoryExceeded,
    NetworkError,
    UnknownError,
}

/// Classify an error message per §6's deterministic, lowercase
/// substring rules. First match wins, in the documented order.
#[must_use]
pub fn classify_error(message: &str) -> ErrorPatternKind {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ErrorPatternKind::Timeout
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        ErrorPatternKind::RateLimit
    } else if lower.contains("authentication") || lower.contains("unauthorized") {
        ErrorPatternKind::AuthError
    } else if lower.contains("context") && lower.contains("limit") {
        ErrorPatternKind::ContextLimit
    } else if lower.contains("memory") && lower.contains("exceed") {
        ErrorPatternKind::MemoryExceeded
    } else if lower.contains("connection") || lower.contains("network") {
        ErrorPatternKind::NetworkError
    } else {
        ErrorPatternKind::UnknownError
    }
}

/// A single learned execution pattern handed to the pattern store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub worker_id: WorkerId,
    pub provider_id: String,
    pub model_id: String,
    pub status: WorkerStatus,
    pub error_pattern: Option<ErrorPatternKind>,
    pub output_bytes: usize,
    pub cost: f64,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// The full execution report produced by `GenerateSummary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_workers: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub start_time: DateTime<Utc>,
    pub total_duration_secs: f64,
    pub worker_costs: Vec<WorkerCost>,
    pub provider_costs: Vec<ProviderCost>,
    pub cost_tracking: CostTrackingConfig,
    pub conflicts: Vec<Conflict>,
    pub conflict_count: usize,
    pub merge_strategy: MergeStrategy,
    pub merge_decisions: Vec<MergeDecision>,
}

impl ExecutionSummary {
    /// Render a human report with Worker-Cost, Provider-Cost, Conflict,
    /// and Merge-Decision sections. Rendering surfaces are illustrative
    /// (§6) — there is no fixed wire contract on the exact Markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Execution Summary\n\n");
        out.push_str(&format!(
            "- Total workers: {}\n- Completed: {}\n- Failed: {}\n- Success rate: {:.1}%\n- Started: {}\n- Duration: {:.2}s\n\n",
            self.total_workers,
            self.completed_count,
            self.failed_count,
            self.success_rate,
            self.start_time.to_rfc3339(),
            self.total_duration_secs,
        ));

        out.push_str("## Worker Cost\n\n");
        if self.worker_costs.is_empty() {
            out.push_str("_none_\n\n");
        } else {
            for wc in &self.worker_costs {
                out.push_str(&format!(
                    "- {}: total={:.4} count={} avg={:.4} method={}\n",
                    wc.worker_id, wc.total_cost, wc.task_count, wc.avg_cost_per_task, wc.method
                ));
            }
            out.push('\n');
        }

        out.push_str("## Provider Cost\n\n");
        if self.provider_costs.is_empty() {
            out.push_str("_none_\n\n");
        } else {
            for pc in &self.provider_costs {
                out.push_str(&format!(
                    "- {}: used={:.4} budget={:.4} remaining={:.4} exceeded={}\n",
                    pc.provider_id, pc.used, pc.budget, pc.remaining, pc.exceeded
                ));
            }
            out.push('\n');
        }

        out.push_str(&format!("## Conflicts ({})\n\n", self.conflict_count));
        if self.conflicts.is_empty() {
            out.push_str("_none_\n\n");
        } else {
            for conflict in &self.conflicts {
                out.push_str(&format!(
                    "- {}: {} ({})\n",
                    conflict.file_path,
                    conflict.worker_ids.join(", "),
                    conflict.resolution_policy
                ));
            }
            out.push('\n');
        }

        out.push_str(&format!("## Merge Decisions ({:?})\n\n", self.merge_strategy));
        if self.merge_decisions.is_empty() {
            out.push_str("_none_\n");
        } else {
            for decision in &self.merge_decisions {
                out.push_str(&format!(
                    "- {}: {} (skipped: {})\n",
                    decision.selected_worker,
                    decision.reason,
                    decision.skipped_workers.join(", ")
                ));
            }
        }

        out
    }

    /// Render the same data as JSON with RFC 3339 timestamps and
    /// `snake_case` keys, which `serde`'s `DateTime<Utc>` and this
    /// struct's field naming already give for free.
    ///
    /// # Errors
    ///
    /// Propagates any `serde_json` serialization failure (practically
    /// unreachable for this struct's field types).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
