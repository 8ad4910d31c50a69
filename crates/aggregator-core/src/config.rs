//! Construction-time configuration for [`crate::Aggregator`].
//!
//! `spec.md` describes the runtime mutators (`SetMergeConfig`,
//! `SetCostTracking`, `SetResolutionStrategy`) but never how an
//! aggregator comes into being in the first place; this is the plumbing
//! `Aggregator::new` needs, not a [MODULE] operation in its own right
//! (see `SPEC_FULL.md` §C.1).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{CostTrackingConfig, MergeConfig, ResolutionStrategy};

/// The default `WaitForAll` timeout when neither the caller nor this
/// config supplies a positive value (§4.2: "five minutes").
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Construction-time configuration for an [`crate::Aggregator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Effective timeout used by `WaitForAll` when the caller passes a
    /// non-positive duration. `None` falls back to
    /// [`DEFAULT_WAIT_TIMEOUT`].
    #[serde(default)]
    pub default_wait_timeout: Option<Duration>,
    /// The resolution strategy the conflict engine starts with.
    #[serde(default)]
    pub resolution_strategy: ResolutionStrategy,
    /// The merge configuration the merger starts with.
    #[serde(default)]
    pub merge_config: MergeConfig,
    /// The cost-tracking configuration the ledger starts with.
    #[serde(default)]
    pub cost_tracking: CostTrackingConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout: None,
            resolution_strategy: ResolutionStrategy::default(),
            merge_config: MergeConfig::default(),
            cost_tracking: CostTrackingConfig::default(),
        }
    }
}

impl AggregatorConfig {
    /// Resolve the effective `WaitForAll` timeout for a caller-supplied
    /// value: the caller's value if positive, else this config's
    /// default, else [`DEFAULT_WAIT_TIMEOUT`] (§4.2).
    #[must_use]
    pub fn effective_wait_timeout(&self, requested: Duration) -> Duration {
        if requested > Duration::ZERO {
            requested
        } else {
            self.default_wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_request_wins() {
        let config = AggregatorConfig::default();
        assert_eq!(
            config.effective_wait_timeout(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn zero_request_falls_back_to_default_constant() {
        let config = AggregatorConfig::default();
        assert_eq!(
            config.effective_wait_timeout(Duration::ZERO),
            DEFAULT_WAIT_TIMEOUT
        );
    }

    #[test]
    fn zero_request_falls_back_to_configured_default() {
        let config = AggregatorConfig {
            default_wait_timeout: Some(Duration::from_secs(42)),
            ..AggregatorConfig::default()
        };
        assert_eq!(
            config.effective_wait_timeout(Duration::ZERO),
            Duration::from_secs(42)
        );
    }
}
