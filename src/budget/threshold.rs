use tracing::info;

use super::PodCounts;
use crate::resources::{Pod, Threshold, ThresholdError, XPodDisruptionBudget};

/// Number of pods that must stay healthy across all clusters
pub fn desired_healthy(
    budget: &XPodDisruptionBudget,
    expected_count: i32,
) -> Result<i32, ThresholdError> {
    Ok(match budget.threshold()? {
        Threshold::MaxUnavailable(max) => {
            let unavailable = max.scaled_value(expected_count, true)?;
            expected_count.checked_sub(unavailable).ok_or_else(|| {
                ThresholdError::Overflow(format!("{} - {}", expected_count, unavailable))
            })?
        }
        Threshold::MinAvailable(min) => min.scaled_value(expected_count, true)?,
        Threshold::Unset => 0,
    })
}

/// Decide whether removing `candidate` keeps the budget satisfied.
///
/// A candidate that is already not ready is not part of `healthy`, so it is
/// compensated for before subtracting the hypothetical removal.
pub fn disruption_allowed(
    budget: &XPodDisruptionBudget,
    candidate: &Pod,
    counts: PodCounts,
) -> Result<bool, ThresholdError> {
    let desired = desired_healthy(budget, counts.expected)?;
    let candidate_ready = candidate.is_ready();
    let compensation = if candidate_ready { 0 } else { 1 };

    let allowed = i64::from(counts.healthy) + compensation - 1 >= i64::from(desired);

    info!(
        xpdb = %budget.metadata.key(),
        pod = %candidate.name(),
        pod_ready = candidate_ready,
        expected = counts.expected,
        healthy = counts.healthy,
        desired_healthy = desired,
        allowed,
        "xpdb evaluation verdict"
    );

    Ok(allowed)
}
