//! Expected scale resolution
//!
//! A budget's percentage thresholds and `maxUnavailable` are relative to the
//! number of pods the owning controllers *want*, not the number that exist.
//! [`ScaleFinder`] walks each pod's controller reference through an ordered
//! list of finders and sums the declared scale of every distinct controller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::resources::{api_group, OwnerReference, Pod, Workload};
use crate::store::{StoreError, WorkloadStore};

const KIND_REPLICA_SET: &str = "ReplicaSet";
const KIND_DEPLOYMENT: &str = "Deployment";
const KIND_STATEFUL_SET: &str = "StatefulSet";
const KIND_REPLICATION_CONTROLLER: &str = "ReplicationController";

const APPS_GROUPS: &[&str] = &["apps", "extensions"];
const CORE_GROUP: &[&str] = &[""];

/// Errors resolving the expected scale of a set of pods
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScaleError {
    #[error("found no controllers for pod '{0}'")]
    NoController(String),

    #[error("Invalid apiVersion '{0}'")]
    InvalidApiVersion(String),

    #[error("{kind} '{name}' does not implement the scale subresource")]
    ScaleNotImplemented { kind: String, name: String },

    #[error("sum of controller scales overflows")]
    Overflow,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sum of controller scale over a set of pods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedScale {
    pub expected_count: i32,
    /// Pods without a controller reference; they do not contribute to the count
    pub unmanaged_pods: Vec<String>,
}

/// Resolves how many pods the controllers of the given pods declare
#[async_trait]
pub trait ScaleResolver: Send + Sync {
    async fn expected_scale(&self, pods: &[Pod]) -> Result<ExpectedScale, ScaleError>;
}

/// A controller's identity and declared replica count
#[derive(Debug, Clone, PartialEq, Eq)]
struct ControllerScale {
    uid: String,
    scale: i32,
}

/// One way of mapping a controller reference to a scale
#[async_trait]
trait ControllerFinder: Send + Sync {
    async fn find(
        &self,
        store: &dyn WorkloadStore,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError>;
}

/// Kind matches and the group is one of `groups`
fn verify_group_kind(
    owner: &OwnerReference,
    kind: &str,
    groups: &[&str],
) -> Result<bool, ScaleError> {
    let group = api_group(&owner.api_version)
        .ok_or_else(|| ScaleError::InvalidApiVersion(owner.api_version.clone()))?;
    Ok(owner.kind == kind && groups.contains(&group))
}

/// Fetch `owner` as `kind` and check it is the same object (UID)
async fn fetch_owned(
    store: &dyn WorkloadStore,
    owner: &OwnerReference,
    kind: &str,
    namespace: &str,
) -> Result<Option<Workload>, ScaleError> {
    let workload = store.get_workload(namespace, kind, &owner.name).await?;
    Ok(workload.filter(|w| w.metadata.uid == owner.uid))
}

fn declared_scale(workload: &Workload) -> ControllerScale {
    // Built-in controllers default to one replica when unset
    ControllerScale {
        uid: workload.metadata.uid.clone(),
        scale: workload.replicas.unwrap_or(1),
    }
}

struct ReplicationControllerFinder;

#[async_trait]
impl ControllerFinder for ReplicationControllerFinder {
    async fn find(
        &self,
        store: &dyn WorkloadStore,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError> {
        if !verify_group_kind(owner, KIND_REPLICATION_CONTROLLER, CORE_GROUP)? {
            return Ok(None);
        }
        let rc = fetch_owned(store, owner, KIND_REPLICATION_CONTROLLER, namespace).await?;
        Ok(rc.as_ref().map(declared_scale))
    }
}

/// Pod -> ReplicaSet -> Deployment
struct DeploymentFinder;

#[async_trait]
impl ControllerFinder for DeploymentFinder {
    async fn find(
        &self,
        store: &dyn WorkloadStore,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError> {
        if !verify_group_kind(owner, KIND_REPLICA_SET, APPS_GROUPS)? {
            return Ok(None);
        }
        let Some(rs) = fetch_owned(store, owner, KIND_REPLICA_SET, namespace).await? else {
            return Ok(None);
        };
        let Some(rs_owner) = rs.metadata.controller() else {
            return Ok(None);
        };
        if !verify_group_kind(rs_owner, KIND_DEPLOYMENT, APPS_GROUPS)? {
            return Ok(None);
        }
        let deployment = fetch_owned(store, rs_owner, KIND_DEPLOYMENT, namespace).await?;
        Ok(deployment.as_ref().map(declared_scale))
    }
}

/// Standalone ReplicaSets; those controlled by a Deployment are skipped
struct ReplicaSetFinder;

#[async_trait]
impl ControllerFinder for ReplicaSetFinder {
    async fn find(
        &self,
        store: &dyn WorkloadStore,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError> {
        if !verify_group_kind(owner, KIND_REPLICA_SET, APPS_GROUPS)? {
            return Ok(None);
        }
        let Some(rs) = fetch_owned(store, owner, KIND_REPLICA_SET, namespace).await? else {
            return Ok(None);
        };
        if rs
            .metadata
            .controller()
            .is_some_and(|c| c.kind == KIND_DEPLOYMENT)
        {
            return Ok(None);
        }
        Ok(Some(declared_scale(&rs)))
    }
}

struct StatefulSetFinder;

#[async_trait]
impl ControllerFinder for StatefulSetFinder {
    async fn find(
        &self,
        store: &dyn WorkloadStore,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError> {
        if !verify_group_kind(owner, KIND_STATEFUL_SET, &["apps"])? {
            return Ok(None);
        }
        let ss = fetch_owned(store, owner, KIND_STATEFUL_SET, namespace).await?;
        Ok(ss.as_ref().map(declared_scale))
    }
}

/// Any other kind exposing a scale
struct GenericScaleFinder;

#[async_trait]
impl ControllerFinder for GenericScaleFinder {
    async fn find(
        &self,
        store: &dyn WorkloadStore,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError> {
        let group = api_group(&owner.api_version)
            .ok_or_else(|| ScaleError::InvalidApiVersion(owner.api_version.clone()))?;

        let Some(workload) = fetch_owned(store, owner, &owner.kind, namespace).await? else {
            return Ok(None);
        };
        if workload.group() != Some(group) {
            return Ok(None);
        }

        match workload.replicas {
            Some(scale) => Ok(Some(ControllerScale {
                uid: workload.metadata.uid.clone(),
                scale,
            })),
            None => Err(ScaleError::ScaleNotImplemented {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            }),
        }
    }
}

/// Default [`ScaleResolver`] backed by a [`WorkloadStore`]
pub struct ScaleFinder {
    store: Arc<dyn WorkloadStore>,
    finders: Vec<Box<dyn ControllerFinder>>,
}

impl ScaleFinder {
    pub fn new(store: Arc<dyn WorkloadStore>) -> Self {
        Self {
            store,
            finders: vec![
                Box::new(ReplicationControllerFinder),
                Box::new(DeploymentFinder),
                Box::new(ReplicaSetFinder),
                Box::new(StatefulSetFinder),
                Box::new(GenericScaleFinder),
            ],
        }
    }

    async fn find_controller(
        &self,
        owner: &OwnerReference,
        namespace: &str,
    ) -> Result<Option<ControllerScale>, ScaleError> {
        for finder in &self.finders {
            if let Some(found) = finder.find(self.store.as_ref(), owner, namespace).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ScaleResolver for ScaleFinder {
    async fn expected_scale(&self, pods: &[Pod]) -> Result<ExpectedScale, ScaleError> {
        let mut controller_scale: HashMap<String, i32> = HashMap::new();
        let mut unmanaged_pods = Vec::new();

        for pod in pods {
            let Some(owner) = pod.controller() else {
                unmanaged_pods.push(pod.name().to_string());
                continue;
            };
            if controller_scale.contains_key(&owner.uid) {
                continue;
            }

            let found = self
                .find_controller(owner, pod.namespace())
                .await?
                .ok_or_else(|| ScaleError::NoController(pod.name().to_string()))?;
            controller_scale.insert(found.uid, found.scale);
        }

        if !unmanaged_pods.is_empty() {
            debug!(pods = ?unmanaged_pods, "Pods without a controller excluded from expected count");
        }

        let expected_count = controller_scale
            .values()
            .try_fold(0i32, |acc, scale| acc.checked_add(*scale))
            .ok_or(ScaleError::Overflow)?;

        Ok(ExpectedScale {
            expected_count,
            unmanaged_pods,
        })
    }
}
