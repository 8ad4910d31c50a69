//! Error taxonomy for the aggregator core.
//!
//! Failures that indicate caller misuse or an unsatisfiable postcondition
//! are surfaced to the caller as [`AggregatorError`]. Failures from the two
//! external collaborators (task registry, pattern store) are advisory —
//! they are logged at `warn` and never turn into an `AggregatorError`.

use thiserror::Error;

/// The result type used throughout the aggregator core.
pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Errors surfaced by [`crate::Aggregator`] operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregatorError {
    /// `AddResult` was called with a nil result or a worker id that
    /// doesn't match the submitted result's own id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A lookup (`GetResult`, `GetWorkerCost`, `GetProviderCosts`, ...)
    /// referenced a worker id or provider key that isn't known.
    #[error("not found: {0}")]
    NotFound(String),

    /// `Merge` was called with no successful results available.
    #[error("not ready: {0}")]
    NotReady(String),

    /// `Merge` was called with a strategy or config that cannot produce
    /// a result (unknown strategy, empty priority list, missing
    /// preferred provider, ...).
    #[error("invalid merge config: {0}")]
    InvalidConfig(String),

    /// The pattern store rejected a `StorePattern` call outright. This
    /// only reaches the caller when `StorePattern` is invoked directly;
    /// the implicit store triggered by `AddResult` swallows this error.
    #[error("pattern store error: {0}")]
    StoreError(String),
}
