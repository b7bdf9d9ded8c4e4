//! In-memory cluster
//!
//! Backs every store trait with concurrent maps. Used by the binary when it
//! runs from a cluster snapshot file and by tests that stand up several
//! clusters in one process.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{BudgetStore, LeaseStore, PodStore, StoreError, WorkloadStore};
use crate::resources::{Lease, Pod, Workload, XPodDisruptionBudget};
use crate::selector::LabelSelector;

/// Serializable contents of an [`InMemoryCluster`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub budgets: Vec<XPodDisruptionBudget>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

#[derive(Clone, Default)]
pub struct InMemoryCluster {
    /// Pods indexed by namespace/name
    pods: Arc<DashMap<String, Pod>>,

    /// Budgets indexed by namespace/name
    budgets: Arc<DashMap<String, XPodDisruptionBudget>>,

    /// Leases indexed by namespace/name
    leases: Arc<DashMap<String, Lease>>,

    /// Workloads indexed by namespace/kind/name
    workloads: Arc<DashMap<String, Workload>>,
}

fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn workload_key(namespace: &str, kind: &str, name: &str) -> String {
    format!("{}/{}/{}", namespace, kind, name)
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ClusterSnapshot) -> Self {
        let cluster = Self::new();
        for pod in snapshot.pods {
            cluster.insert_pod(pod);
        }
        for budget in snapshot.budgets {
            cluster.insert_budget(budget);
        }
        for workload in snapshot.workloads {
            cluster.insert_workload(workload);
        }
        cluster
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn insert_pod(&self, pod: Pod) {
        self.pods.insert(pod.metadata.key(), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .remove(&object_key(namespace, name))
            .map(|(_, pod)| pod)
    }

    pub fn insert_budget(&self, budget: XPodDisruptionBudget) {
        self.budgets.insert(budget.metadata.key(), budget);
    }

    pub fn insert_workload(&self, workload: Workload) {
        let key = workload_key(
            &workload.metadata.namespace,
            &workload.kind,
            &workload.metadata.name,
        );
        self.workloads.insert(key, workload);
    }

    /// Current lease, without going through the async store API
    pub fn lease(&self, namespace: &str, name: &str) -> Option<Lease> {
        self.leases
            .get(&object_key(namespace, name))
            .map(|l| l.value().clone())
    }

    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Overwrite a lease unconditionally
    pub fn put_lease(&self, lease: Lease) {
        self.leases.insert(lease.metadata.key(), lease);
    }
}

#[async_trait]
impl PodStore for InMemoryCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        Ok(self
            .pods
            .get(&object_key(namespace, name))
            .map(|p| p.value().clone()))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, StoreError> {
        selector
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let mut pods: Vec<Pod> = self
            .pods
            .iter()
            .filter(|p| p.metadata.namespace == namespace && selector.matches(&p.metadata.labels))
            .map(|p| p.value().clone())
            .collect();
        pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(pods)
    }

    async fn update_pod(&self, pod: &Pod) -> Result<(), StoreError> {
        match self.pods.get_mut(&pod.metadata.key()) {
            Some(mut existing) => {
                *existing = pod.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "Pod",
                name: pod.metadata.key(),
            }),
        }
    }
}

#[async_trait]
impl BudgetStore for InMemoryCluster {
    async fn list_budgets(
        &self,
        namespace: &str,
    ) -> Result<Vec<XPodDisruptionBudget>, StoreError> {
        let mut budgets: Vec<XPodDisruptionBudget> = self
            .budgets
            .iter()
            .filter(|b| b.metadata.namespace == namespace)
            .map(|b| b.value().clone())
            .collect();
        budgets.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(budgets)
    }
}

#[async_trait]
impl LeaseStore for InMemoryCluster {
    async fn create_lease(&self, mut lease: Lease) -> Result<Lease, StoreError> {
        match self.leases.entry(lease.metadata.key()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                kind: "Lease",
                name: lease.metadata.key(),
            }),
            Entry::Vacant(slot) => {
                lease.resource_version = 1;
                slot.insert(lease.clone());
                Ok(lease)
            }
        }
    }

    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<Lease>, StoreError> {
        Ok(self.lease(namespace, name))
    }

    async fn update_lease(&self, mut lease: Lease) -> Result<Lease, StoreError> {
        let key = lease.metadata.key();
        let mut existing = self.leases.get_mut(&key).ok_or(StoreError::NotFound {
            kind: "Lease",
            name: key.clone(),
        })?;

        if existing.resource_version != lease.resource_version {
            return Err(StoreError::Conflict {
                name: key,
                expected: lease.resource_version,
                found: existing.resource_version,
            });
        }

        lease.resource_version += 1;
        *existing = lease.clone();
        Ok(lease)
    }

    async fn delete_lease(
        &self,
        namespace: &str,
        name: &str,
        resource_version: u64,
    ) -> Result<(), StoreError> {
        let key = object_key(namespace, name);
        match self.leases.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().resource_version != resource_version => {
                Err(StoreError::Conflict {
                    name: key,
                    expected: resource_version,
                    found: slot.get().resource_version,
                })
            }
            Entry::Occupied(slot) => {
                slot.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound {
                kind: "Lease",
                name: key,
            }),
        }
    }
}

#[async_trait]
impl WorkloadStore for InMemoryCluster {
    async fn get_workload(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<Workload>, StoreError> {
        Ok(self
            .workloads
            .get(&workload_key(namespace, kind, name))
            .map(|w| w.value().clone()))
    }
}
