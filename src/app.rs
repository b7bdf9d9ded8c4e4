//! Service wiring
//!
//! Builds every service of one cluster from [`Settings`] over a set of
//! [`ClusterStores`] and exposes the webhook and state routers.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::budget::{BudgetService, RemoteAggregator};
use crate::config::Settings;
use crate::events::{EventRecorder, LoggingRecorder};
use crate::lock::{LockConfig, LockService};
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::preactivities::PreActivityService;
use crate::probe::{ProbeClientPool, ProbeService};
use crate::scale::ScaleFinder;
use crate::server::{create_router, AppState};
use crate::state::{create_state_router, StateClientPool, StateServerState};
use crate::store::ClusterStores;
use crate::webhook::{PodValidationWebhook, WebhookConfig, WebhookServices};

/// All services of one cluster
pub struct XpdbApp {
    metrics: SharedMetrics,
    webhook: Arc<PodValidationWebhook>,
    state: StateServerState,
}

impl XpdbApp {
    pub fn new(settings: &Settings, stores: impl Into<ClusterStores>) -> Self {
        Self::with_recorder(settings, stores, Arc::new(LoggingRecorder))
    }

    pub fn with_recorder(
        settings: &Settings,
        stores: impl Into<ClusterStores>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        let stores = stores.into();
        let metrics = new_shared_metrics();
        let state_pool = StateClientPool::new(settings.state_tls(), metrics.clone());

        let budgets = Arc::new(BudgetService::new(
            stores.pods.clone(),
            stores.budgets.clone(),
            Arc::new(ScaleFinder::new(stores.workloads.clone())),
            RemoteAggregator::new(
                state_pool.clone(),
                settings.remote_endpoints.clone(),
                settings.remote_timeout(),
            ),
        ));

        let locks = Arc::new(LockService::new(
            stores.leases.clone(),
            state_pool,
            LockConfig::default()
                .with_lease_namespace(settings.lease_namespace.clone())
                .with_remote_endpoints(settings.remote_endpoints.clone())
                .with_lease_duration_secs(settings.lease_duration_secs)
                .with_remote_timeout(settings.remote_timeout()),
        ));

        let probes = Arc::new(ProbeService::new(
            ProbeClientPool::new(settings.probe_tls(), metrics.clone()),
            settings.probe_timeout(),
        ));

        let services = WebhookServices {
            pods: stores.pods.clone(),
            budgets: budgets.clone(),
            locks: locks.clone(),
            probes,
            preactivities: Arc::new(PreActivityService::new(stores.pods)),
            recorder,
            metrics: metrics.clone(),
        };

        let webhook = Arc::new(PodValidationWebhook::new(
            services,
            WebhookConfig::default()
                .with_cluster_id(settings.cluster_id.clone())
                .with_pod_id(settings.pod_id.clone())
                .with_dry_run(settings.dry_run)
                .with_timeout(settings.admission_timeout()),
        ));

        info!(
            cluster_id = %settings.cluster_id,
            pod_id = %settings.pod_id,
            remote_endpoints = settings.remote_endpoints.len(),
            dry_run = settings.dry_run,
            "xpdb services initialised"
        );

        Self {
            metrics,
            webhook,
            state: StateServerState::new(locks, budgets),
        }
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn webhook(&self) -> &Arc<PodValidationWebhook> {
        &self.webhook
    }

    /// Admission webhook, health and metrics endpoints
    pub fn webhook_router(&self) -> Router {
        create_router(AppState::new(self.webhook.clone(), self.metrics.clone()))
    }

    /// Lock, unlock and state endpoints for remote clusters
    pub fn state_router(&self) -> Router {
        create_state_router(self.state.clone())
    }
}

/// Serve `router` until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{BudgetSpec, IntOrPercent, Pod, XPodDisruptionBudget};
    use crate::selector::LabelSelector;
    use crate::store::InMemoryCluster;
    use crate::webhook::AdmissionRequest;

    #[tokio::test]
    async fn test_leases_kept_in_their_own_store() {
        let objects = InMemoryCluster::new();
        let leases = InMemoryCluster::new();
        for i in 0..3 {
            objects.insert_pod(
                Pod::new("shop", format!("web-{}", i))
                    .with_label("app", "web")
                    .with_ready(true),
            );
        }
        objects.insert_budget(XPodDisruptionBudget::new(
            "shop",
            "web",
            BudgetSpec {
                min_available: Some(IntOrPercent::Int(1)),
                selector: LabelSelector::matching("app", "web"),
                ..Default::default()
            },
        ));

        let stores = ClusterStores {
            leases: Arc::new(leases.clone()),
            ..ClusterStores::from(objects.clone())
        };
        let app = XpdbApp::new(&Settings::default(), stores);

        let request = AdmissionRequest {
            uid: "req-1".into(),
            name: "web-0".into(),
            namespace: "shop".into(),
            operation: "DELETE".into(),
            ..Default::default()
        };
        assert!(app.webhook().handle(&request).await.allowed);
        assert_eq!(leases.lease_count(), 1);
        assert_eq!(objects.lease_count(), 0);
    }
}
