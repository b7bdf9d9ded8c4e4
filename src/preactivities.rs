//! Disruption pre-activities
//!
//! Workloads can ask for time to prepare before a pod is disrupted by
//! annotating it with `xpdb.io/pre-activity.<name>`. While any such annotation
//! is present the disruption is held back and the pod is marked with
//! `xpdb.io/has-pending-disruption=true` so the workload's controller knows
//! to run its pre-activities and remove the annotations.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::resources::Pod;
use crate::store::{PodStore, StoreError};

pub const PRE_ACTIVITY_ANNOTATION_PREFIX: &str = "xpdb.io/pre-activity.";
pub const PENDING_DISRUPTION_ANNOTATION: &str = "xpdb.io/has-pending-disruption";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreActivityError {
    #[error("could not add pending disruption annotation to pod '{pod}': {source}")]
    MarkPending { pod: String, source: StoreError },
}

/// Names of the pre-activities still pending on `pod`, sorted
pub fn pending_preactivities(pod: &Pod) -> Vec<String> {
    let mut pending: Vec<String> = pod
        .metadata
        .annotations
        .keys()
        .filter(|k| k.contains(PRE_ACTIVITY_ANNOTATION_PREFIX))
        .map(|k| {
            k.strip_prefix(PRE_ACTIVITY_ANNOTATION_PREFIX)
                .unwrap_or(k)
                .to_string()
        })
        .collect();
    pending.sort();
    pending
}

pub struct PreActivityService {
    pods: Arc<dyn PodStore>,
}

impl PreActivityService {
    pub fn new(pods: Arc<dyn PodStore>) -> Self {
        Self { pods }
    }

    /// `false` while pre-activities are pending; the pod is then marked as
    /// having a pending disruption.
    pub async fn can_pod_be_disrupted(&self, pod: &Pod) -> Result<bool, PreActivityError> {
        let pending = pending_preactivities(pod);
        if pending.is_empty() {
            return Ok(true);
        }

        info!(pod = %pod.metadata.key(), pending = ?pending, "Pod has pending pre-activities");

        let mut marked = pod.clone();
        marked
            .metadata
            .annotations
            .insert(PENDING_DISRUPTION_ANNOTATION.to_string(), "true".to_string());

        self.pods.update_pod(&marked).await.map_err(|e| {
            error!(pod = %pod.metadata.key(), error = %e, "Could not add pending disruption annotation");
            PreActivityError::MarkPending {
                pod: pod.metadata.key(),
                source: e,
            }
        })?;

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCluster;

    fn annotated(name: &str, annotations: &[&str]) -> Pod {
        let mut pod = Pod::new("shop", name);
        for a in annotations {
            pod.metadata.annotations.insert(a.to_string(), "".to_string());
        }
        pod
    }

    #[test]
    fn test_pending_preactivities() {
        let pod = annotated(
            "web-0",
            &[
                "xpdb.io/pre-activity.drain-connections",
                "xpdb.io/pre-activity.backup",
                "unrelated/annotation",
            ],
        );
        assert_eq!(
            pending_preactivities(&pod),
            vec!["backup".to_string(), "drain-connections".to_string()]
        );
    }

    #[test]
    fn test_prefix_anywhere_in_key_is_pending() {
        let pod = annotated("web-0", &["team.example/xpdb.io/pre-activity.flush"]);
        assert_eq!(
            pending_preactivities(&pod),
            vec!["team.example/xpdb.io/pre-activity.flush".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_preactivities_allows() {
        let cluster = InMemoryCluster::new();
        let service = PreActivityService::new(Arc::new(cluster));
        assert!(service
            .can_pod_be_disrupted(&Pod::new("shop", "web-0"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_pending_preactivity_marks_pod() {
        let cluster = InMemoryCluster::new();
        let pod = annotated("web-0", &["xpdb.io/pre-activity.backup"]);
        cluster.insert_pod(pod.clone());
        let service = PreActivityService::new(Arc::new(cluster.clone()));

        assert!(!service.can_pod_be_disrupted(&pod).await.unwrap());

        let stored = cluster.get_pod("shop", "web-0").await.unwrap().unwrap();
        assert_eq!(
            stored.metadata.annotations.get(PENDING_DISRUPTION_ANNOTATION),
            Some(&"true".to_string())
        );
    }

    #[tokio::test]
    async fn test_mark_failure_is_an_error() {
        let cluster = InMemoryCluster::new();
        let service = PreActivityService::new(Arc::new(cluster));
        let pod = annotated("gone", &["xpdb.io/pre-activity.backup"]);

        let err = service.can_pod_be_disrupted(&pod).await.unwrap_err();
        assert!(matches!(err, PreActivityError::MarkPending { .. }));
    }
}
