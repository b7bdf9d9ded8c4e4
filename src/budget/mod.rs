//! Budget evaluation
//!
//! Finds the budget protecting a pod, counts expected and healthy pods for
//! its selector in this cluster and the remote ones, and applies the
//! budget's threshold to the combined counts.

pub mod aggregator;
pub mod threshold;

pub use aggregator::RemoteAggregator;
pub use threshold::{desired_healthy, disruption_allowed};

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::remote::FanOutError;
use crate::resources::{Pod, ThresholdError, XPodDisruptionBudget};
use crate::scale::{ScaleError, ScaleResolver};
use crate::selector::{LabelSelector, SelectorError};
use crate::store::{BudgetStore, PodStore, StoreError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scale(#[from] ScaleError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("error getting remote pod counts: {0}")]
    Remote(#[from] FanOutError),

    #[error("pod counts overflow adding {0:?} to {1:?}")]
    CountOverflow(PodCounts, PodCounts),
}

/// Expected and healthy pod counts for a selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PodCounts {
    pub expected: i32,
    pub healthy: i32,
}

impl PodCounts {
    /// Sum of both counts; remote servers report arbitrary values
    pub fn checked_add(self, other: PodCounts) -> Result<PodCounts, BudgetError> {
        match (
            self.expected.checked_add(other.expected),
            self.healthy.checked_add(other.healthy),
        ) {
            (Some(expected), Some(healthy)) => Ok(PodCounts { expected, healthy }),
            _ => Err(BudgetError::CountOverflow(self, other)),
        }
    }
}

pub fn count_healthy(pods: &[Pod]) -> i32 {
    pods.iter().filter(|p| p.is_healthy()).count() as i32
}

pub struct BudgetService {
    pods: Arc<dyn PodStore>,
    budgets: Arc<dyn BudgetStore>,
    scale: Arc<dyn ScaleResolver>,
    remote: RemoteAggregator,
}

impl BudgetService {
    pub fn new(
        pods: Arc<dyn PodStore>,
        budgets: Arc<dyn BudgetStore>,
        scale: Arc<dyn ScaleResolver>,
        remote: RemoteAggregator,
    ) -> Self {
        Self {
            pods,
            budgets,
            scale,
            remote,
        }
    }

    /// Counts for `selector` in this cluster only
    pub async fn pod_counts(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<PodCounts, BudgetError> {
        selector.validate()?;
        let pods = self.pods.list_pods(namespace, selector).await?;
        let expected = self.scale.expected_scale(&pods).await?;

        let counts = PodCounts {
            expected: expected.expected_count,
            healthy: count_healthy(&pods),
        };
        debug!(
            namespace = %namespace,
            selector = %selector,
            expected = counts.expected,
            healthy = counts.healthy,
            "Local pod counts"
        );
        Ok(counts)
    }

    /// Budgets in the pod's namespace whose selector matches the pod
    pub async fn budgets_for_pod(
        &self,
        pod: &Pod,
    ) -> Result<Vec<XPodDisruptionBudget>, BudgetError> {
        let budgets = self.budgets.list_budgets(pod.namespace()).await?;

        let mut matching = Vec::new();
        for budget in budgets {
            budget.spec.selector.validate()?;
            if budget.spec.selector.matches(&pod.metadata.labels) {
                matching.push(budget);
            }
        }
        Ok(matching)
    }

    /// Evaluate the budget against local and remote counts combined.
    ///
    /// Callers are expected to hold the budget's lock across this call.
    pub async fn can_pod_be_disrupted(
        &self,
        pod: &Pod,
        budget: &XPodDisruptionBudget,
    ) -> Result<bool, BudgetError> {
        let namespace = budget.namespace();
        let selector = &budget.spec.selector;

        let (remote, local) = tokio::try_join!(
            self.remote.pod_counts(namespace, selector),
            self.pod_counts(namespace, selector),
        )
        .inspect_err(|e| error!(xpdb = %budget.metadata.key(), error = %e, "Error getting pod counts"))?;

        let total = local.checked_add(remote)?;
        info!(
            xpdb = %budget.metadata.key(),
            total_expected = total.expected,
            total_healthy = total.healthy,
            local_expected = local.expected,
            local_healthy = local.healthy,
            "xpdb aggregated remote state"
        );

        Ok(disruption_allowed(budget, pod, total)?)
    }
}
