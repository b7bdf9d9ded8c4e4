//! Lock service
//!
//! Serialises disruption decisions for a budget across clusters. A lock is a
//! lease named after the budget's namespace and selector; locking takes the
//! lease in the local cluster and then in every remote cluster through its
//! state server. Leases are never renewed: they expire after a few seconds,
//! after which any holder may take them over.

pub mod lease;

pub use lease::{build_lease, holder_identity, lease_name};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::remote::{fan_out, ClientError, FanOutError};
use crate::selector::{LabelSelector, WireLabelSelector};
use crate::state::messages::{LockRequest, UnlockRequest};
use crate::state::StateClientPool;
use crate::store::{LeaseStore, StoreError};

pub const DEFAULT_LEASE_DURATION_SECS: i64 = 5;

/// Errors that can occur while locking or unlocking a budget
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("lease deadline not reached: '{lease}' is held by '{holder}' for another {remaining_ms}ms")]
    NotExpired {
        lease: String,
        holder: String,
        remaining_ms: i64,
    },

    #[error("holder identity does not match, someone else has taken over the lease '{lease}': expected={expected:?} seen={seen:?}")]
    HolderMismatch {
        lease: String,
        expected: String,
        seen: String,
    },

    #[error("unable to take over lease '{0}': it disappeared, try again")]
    Vanished(String),

    #[error("lease store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote lock failed: {0}")]
    Remote(#[from] FanOutError),
}

/// Lock service configuration
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Namespace holding the lease records
    pub lease_namespace: String,

    /// State server endpoints of the other clusters
    pub remote_endpoints: Vec<String>,

    pub lease_duration_secs: i64,

    /// Per-endpoint bound on each remote call
    pub remote_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_namespace: "kube-system".to_string(),
            remote_endpoints: Vec::new(),
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
            remote_timeout: Duration::from_secs(2),
        }
    }
}

impl LockConfig {
    pub fn with_lease_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lease_namespace = namespace.into();
        self
    }

    pub fn with_remote_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.remote_endpoints = endpoints;
        self
    }

    pub fn with_lease_duration_secs(mut self, secs: i64) -> Self {
        self.lease_duration_secs = secs;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}

pub struct LockService {
    leases: Arc<dyn LeaseStore>,
    pool: StateClientPool,
    config: LockConfig,
}

impl LockService {
    pub fn new(leases: Arc<dyn LeaseStore>, pool: StateClientPool, config: LockConfig) -> Self {
        Self {
            leases,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Lock the budget in this cluster and in every remote cluster.
    ///
    /// If a remote cluster refuses or cannot be reached, the leases taken so
    /// far are released before the error is returned.
    pub async fn lock(
        &self,
        holder: &str,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), LockError> {
        self.local_lock(holder, namespace, selector).await?;

        if self.config.remote_endpoints.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.remote_lock(holder, namespace, selector).await {
            warn!(holder = %holder, error = %e, "Remote lock failed, releasing partially acquired leases");
            if let Err(unlock_err) = self.unlock(holder, namespace, selector).await {
                warn!(holder = %holder, error = %unlock_err, "Failed to release leases after remote lock failure");
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Release the budget's lease locally and in every remote cluster
    pub async fn unlock(
        &self,
        holder: &str,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), LockError> {
        self.local_unlock(holder, namespace, selector).await?;

        if !self.config.remote_endpoints.is_empty() {
            self.remote_unlock(holder, namespace, selector).await?;
        }

        Ok(())
    }

    /// Acquire the lease in this cluster.
    ///
    /// Creates the lease if absent. An existing lease is taken over only once
    /// its deadline has passed; the takeover is a compare-and-swap on the
    /// lease version so two contenders for an expired lease cannot both win.
    pub async fn local_lock(
        &self,
        holder: &str,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), LockError> {
        let lease = build_lease(
            &self.config.lease_namespace,
            holder,
            namespace,
            selector,
            self.config.lease_duration_secs,
            Utc::now(),
        );
        let name = lease.metadata.name.clone();
        debug!(lease = %name, holder = %holder, "Attempting to lock");

        match self.leases.create_lease(lease).await {
            Ok(_) => {
                debug!(lease = %name, holder = %holder, "Acquired lock");
                Ok(())
            }
            Err(StoreError::AlreadyExists { .. }) => self.take_over(&name, holder).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn take_over(&self, name: &str, holder: &str) -> Result<(), LockError> {
        let mut existing = self
            .leases
            .get_lease(&self.config.lease_namespace, name)
            .await?
            .ok_or_else(|| LockError::Vanished(name.to_string()))?;

        let now = Utc::now();
        if !existing.is_expired_at(now) {
            let remaining_ms = (existing.deadline() - now).num_milliseconds();
            info!(lease = %name, holder = %existing.holder(), remaining_ms, "Lease deadline not reached");
            return Err(LockError::NotExpired {
                lease: name.to_string(),
                holder: existing.holder().to_string(),
                remaining_ms,
            });
        }

        info!(
            lease = %name,
            old_holder = %existing.holder(),
            new_holder = %holder,
            "Lease deadline reached, taking it over"
        );
        existing.spec.holder_identity = holder.to_string();
        existing.spec.acquire_time = now;
        self.leases.update_lease(existing).await?;
        Ok(())
    }

    /// Release the lease in this cluster.
    ///
    /// A missing lease counts as released. A lease held by someone else,
    /// including one taken over while this unlock was in flight, is left
    /// untouched and reported as an error.
    pub async fn local_unlock(
        &self,
        holder: &str,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), LockError> {
        let name = lease_name(namespace, selector);
        let ns = &self.config.lease_namespace;

        let Some(existing) = self.leases.get_lease(ns, &name).await? else {
            debug!(lease = %name, "Lease already released");
            return Ok(());
        };

        if existing.holder() != holder {
            return Err(LockError::HolderMismatch {
                lease: name,
                expected: holder.to_string(),
                seen: existing.holder().to_string(),
            });
        }

        // Only the version we saw held by `holder` may be deleted
        match self
            .leases
            .delete_lease(ns, &name, existing.resource_version)
            .await
        {
            Ok(()) | Err(StoreError::NotFound { .. }) => {
                debug!(lease = %name, holder = %holder, "Released lock");
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => {
                let seen = self
                    .leases
                    .get_lease(ns, &name)
                    .await?
                    .map(|lease| lease.holder().to_string())
                    .unwrap_or_default();
                warn!(lease = %name, holder = %holder, seen = %seen, "Lease changed hands before it could be released");
                Err(LockError::HolderMismatch {
                    lease: name,
                    expected: holder.to_string(),
                    seen,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remote_lock(
        &self,
        holder: &str,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), FanOutError> {
        let request = LockRequest {
            lease_holder_identity: holder.to_string(),
            namespace: namespace.to_string(),
            label_selector: WireLabelSelector::from(selector),
        };

        fan_out(
            &self.pool,
            &self.config.remote_endpoints,
            self.config.remote_timeout,
            |client| {
                let request = &request;
                async move {
                    let response = client.lock(request).await?;
                    if response.acquired {
                        Ok(())
                    } else {
                        Err(ClientError::Rejected(format!(
                            "lock not acquired: {}",
                            response.error
                        )))
                    }
                }
            },
        )
        .await
        .map(|_| ())
    }

    async fn remote_unlock(
        &self,
        holder: &str,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<(), FanOutError> {
        let request = UnlockRequest {
            lease_holder_identity: holder.to_string(),
            namespace: namespace.to_string(),
            label_selector: WireLabelSelector::from(selector),
        };

        fan_out(
            &self.pool,
            &self.config.remote_endpoints,
            self.config.remote_timeout,
            |client| {
                let request = &request;
                async move {
                    let response = client.unlock(request).await?;
                    if response.unlocked {
                        Ok(())
                    } else {
                        Err(ClientError::Rejected(format!(
                            "unlock failed: {}",
                            response.error
                        )))
                    }
                }
            },
        )
        .await
        .map(|_| ())
    }
}
