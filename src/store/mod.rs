//! Cluster object stores
//!
//! The engine never talks to an API server directly. Pods, budgets, leases
//! and workloads are reached through these traits so the admission pipeline
//! can run against a real cluster client or the in-memory cluster in
//! [`memory`].

pub mod memory;

pub use memory::{ClusterSnapshot, InMemoryCluster};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::resources::{Lease, Pod, Workload, XPodDisruptionBudget};
use crate::selector::LabelSelector;

/// Errors returned by object stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Conflict updating '{name}': expected resource version {expected}, found {found}")]
    Conflict {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait PodStore: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError>;

    /// Pods in `namespace` whose labels match `selector`
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, StoreError>;

    async fn update_pod(&self, pod: &Pod) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn list_budgets(&self, namespace: &str)
        -> Result<Vec<XPodDisruptionBudget>, StoreError>;
}

/// Lease persistence with create-if-absent and compare-and-swap updates
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Fails with [`StoreError::AlreadyExists`] if a lease with the same name exists
    async fn create_lease(&self, lease: Lease) -> Result<Lease, StoreError>;

    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<Lease>, StoreError>;

    /// Fails with [`StoreError::Conflict`] unless `lease.resource_version`
    /// matches the stored version
    async fn update_lease(&self, lease: Lease) -> Result<Lease, StoreError>;

    /// Fails with [`StoreError::Conflict`] unless the stored lease is still at
    /// `resource_version`
    async fn delete_lease(
        &self,
        namespace: &str,
        name: &str,
        resource_version: u64,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get_workload(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<Workload>, StoreError>;
}

/// The stores one cluster's services are built over
#[derive(Clone)]
pub struct ClusterStores {
    pub pods: Arc<dyn PodStore>,
    pub budgets: Arc<dyn BudgetStore>,
    pub leases: Arc<dyn LeaseStore>,
    pub workloads: Arc<dyn WorkloadStore>,
}

impl ClusterStores {
    /// Every store served by one backend
    pub fn shared<S>(backend: Arc<S>) -> Self
    where
        S: PodStore + BudgetStore + LeaseStore + WorkloadStore + 'static,
    {
        Self {
            pods: backend.clone(),
            budgets: backend.clone(),
            leases: backend.clone(),
            workloads: backend,
        }
    }
}

impl From<InMemoryCluster> for ClusterStores {
    fn from(cluster: InMemoryCluster) -> Self {
        Self::shared(Arc::new(cluster))
    }
}
