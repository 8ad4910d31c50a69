//! C5 — Cost Ledger: per-worker and per-provider cost accumulation
//! against a configured budget (§4.5).

use chrono::Utc;

use crate::aggregator::Aggregator;
use crate::error::{AggregatorError, Result};
use crate::types::{CostTrackingConfig, ProviderCost, WorkerCost};

impl Aggregator {
    /// Record a cost observation for `worker_id` against `provider_id`.
    /// Creates the worker/provider cost records on first observation,
    /// accumulates on every subsequent call (§4.5).
    pub async fn track_worker_cost(
        &self,
        worker_id: &str,
        provider_id: &str,
        model_id: &str,
        method: &str,
        cost: f64,
    ) {
        let start = Utc::now();
        let mut state = self.state.write().await;
        state.apply_cost_locked(worker_id, provider_id, model_id, method, cost, start);
    }

    /// Replace the global cost-tracking configuration. Does not
    /// retroactively change budgets already allocated to existing
    /// `ProviderCost` records.
    pub async fn set_cost_tracking(&self, config: CostTrackingConfig) {
        self.state.write().await.cost_tracking = config;
    }

    /// The active cost-tracking configuration.
    pub async fn get_cost_tracking(&self) -> CostTrackingConfig {
        self.state.read().await.cost_tracking
    }

    /// Snapshot of one worker's running cost total.
    ///
    /// # Errors
    ///
    /// [`AggregatorError::NotFound`] if no cost has ever been observed
    /// for `worker_id`.
    pub async fn get_worker_cost(&self, worker_id: &str) -> Result<WorkerCost> {
        self.state
            .read()
            .await
            .worker_costs
            .get(worker_id)
            .cloned()
            .ok_or_else(|| AggregatorError::NotFound(format!("worker cost {worker_id:?}")))
    }

    /// Snapshot of one provider's running cost total.
    ///
    /// # Errors
    ///
    /// [`AggregatorError::NotFound`] if no cost has ever been observed
    /// for `provider_id`.
    pub async fn get_provider_costs(&self, provider_id: &str) -> Result<ProviderCost> {
        self.state
            .read()
            .await
            .provider_costs
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AggregatorError::NotFound(format!("provider cost {provider_id:?}")))
    }

    /// Every worker cost record currently tracked.
    pub async fn get_all_worker_costs(&self) -> Vec<WorkerCost> {
        self.state.read().await.worker_costs.values().cloned().collect()
    }

    /// Every provider cost record currently tracked.
    pub async fn get_all_provider_costs(&self) -> Vec<ProviderCost> {
        self.state
            .read()
            .await
            .provider_costs
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Aggregator;

    #[tokio::test]
    async fn accumulates_per_provider_totals() {
        let agg = Aggregator::new();
        let observations = [
            ("w0", "glm", 0.02),
            ("w1", "kimi", 0.03),
            ("w2", "deepseek", 0.025),
            ("w3", "glm", 0.015),
            ("w4", "kimi", 0.035),
        ];
        for (worker, provider, cost) in observations {
            agg.track_worker_cost(worker, provider, "model", "manual", cost)
                .await;
        }

        let glm = agg.get_provider_costs("glm").await.unwrap();
        assert!((glm.total_cost - 0.035).abs() < 1e-9);
        let kimi = agg.get_provider_costs("kimi").await.unwrap();
        assert!((kimi.total_cost - 0.065).abs() < 1e-9);
    }

    #[tokio::test]
    async fn worker_cost_average_matches_invariant() {
        let agg = Aggregator::new();
        agg.track_worker_cost("w0", "glm", "m", "manual", 0.01).await;
        agg.track_worker_cost("w0", "glm", "m", "manual", 0.03).await;
        let wc = agg.get_worker_cost("w0").await.unwrap();
        assert_eq!(wc.task_count, 2);
        assert!((wc.avg_cost_per_task - wc.total_cost / f64::from(wc.task_count)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn budget_exceeded_is_derived_correctly() {
        let agg = Aggregator::new();
        agg.set_cost_tracking(CostTrackingConfig {
            enabled: true,
            budget: 0.05,
        })
        .await;
        agg.track_worker_cost("w0", "glm", "m", "manual", 0.04).await;
        let first = agg.get_provider_costs("glm").await.unwrap();
        assert!(!first.exceeded);
        agg.track_worker_cost("w1", "glm", "m", "manual", 0.04).await;
        let second = agg.get_provider_costs("glm").await.unwrap();
        assert!(second.exceeded);
        assert!((second.remaining - (second.budget - second.used)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unknown_worker_cost_is_not_found() {
        let agg = Aggregator::new();
        assert!(matches!(
            agg.get_worker_cost("nope").await,
            Err(AggregatorError::NotFound(_))
        ));
    }
}
