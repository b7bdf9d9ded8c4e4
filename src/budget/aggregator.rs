use std::time::Duration;

use tracing::debug;

use super::{BudgetError, PodCounts};
use crate::remote::fan_out;
use crate::selector::{LabelSelector, WireLabelSelector};
use crate::state::messages::GetStateRequest;
use crate::state::StateClientPool;

/// Sums pod counts reported by the state servers of every remote cluster
pub struct RemoteAggregator {
    pool: StateClientPool,
    endpoints: Vec<String>,
    timeout: Duration,
}

impl RemoteAggregator {
    pub fn new(pool: StateClientPool, endpoints: Vec<String>, timeout: Duration) -> Self {
        Self {
            pool,
            endpoints,
            timeout,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Combined counts of all remote clusters.
    ///
    /// Zero when no remote endpoints are configured. Any failing endpoint
    /// fails the whole aggregation, as does a total that overflows.
    pub async fn pod_counts(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<PodCounts, BudgetError> {
        if self.endpoints.is_empty() {
            return Ok(PodCounts::default());
        }

        let request = GetStateRequest {
            namespace: namespace.to_string(),
            label_selector: WireLabelSelector::from(selector),
        };

        let responses = fan_out(&self.pool, &self.endpoints, self.timeout, |client| {
            let request = &request;
            async move { client.get_state(request).await }
        })
        .await?;

        let total = responses
            .iter()
            .map(|r| PodCounts {
                expected: r.desired_healthy,
                healthy: r.healthy,
            })
            .try_fold(PodCounts::default(), PodCounts::checked_add)?;

        debug!(
            namespace = %namespace,
            endpoints = self.endpoints.len(),
            expected = total.expected,
            healthy = total.healthy,
            "Aggregated remote pod counts"
        );
        Ok(total)
    }
}
