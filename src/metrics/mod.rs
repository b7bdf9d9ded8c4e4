//! Admission metrics
//!
//! Counters for rejected disruptions, configuration problems, lock failures
//! and remote calls, rendered in Prometheus text format on `GET /metrics`.

use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

/// All counters exported by the webhook and state server
///
/// Each instance owns its registry so several clusters can run in one
/// process.
pub struct XpdbMetrics {
    registry: Registry,
    pub eviction_rejected: IntCounterVec,
    pub multiple_matches: IntCounterVec,
    pub lock_errors: IntCounterVec,
    pub remote_calls: IntCounterVec,
    pub dry_run_denials: IntCounterVec,
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    // Names and labels are constants below; construction cannot fail
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .expect("static metric definition is valid");
    registry
        .register(Box::new(counter.clone()))
        .expect("metric names are unique within the registry");
    counter
}

impl XpdbMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        Self {
            eviction_rejected: counter(
                &registry,
                "xpdb_pod_eviction_rejected",
                "Pod disruptions rejected by an xpdb",
                &["namespace", "resource", "subresource", "operation"],
            ),
            multiple_matches: counter(
                &registry,
                "xpdb_pod_matches_multiple_xpdbs",
                "Pods that matched more than one xpdb",
                &["namespace"],
            ),
            lock_errors: counter(
                &registry,
                "xpdb_lock_errors",
                "Failures to lock an xpdb across clusters",
                &["namespace"],
            ),
            remote_calls: counter(
                &registry,
                "xpdb_remote_calls",
                "Calls to remote state servers and disruption probes",
                &["endpoint", "method", "result"],
            ),
            dry_run_denials: counter(
                &registry,
                "xpdb_dry_run_denials",
                "Disruptions that would have been denied outside dry-run mode",
                &["namespace"],
            ),
            registry,
        }
    }

    pub fn observe_eviction_rejected(
        &self,
        namespace: &str,
        resource: &str,
        subresource: &str,
        operation: &str,
    ) {
        self.eviction_rejected
            .with_label_values(&[namespace, resource, subresource, operation])
            .inc();
    }

    pub fn observe_multiple_matches(&self, namespace: &str) {
        self.multiple_matches.with_label_values(&[namespace]).inc();
    }

    pub fn observe_lock_error(&self, namespace: &str) {
        self.lock_errors.with_label_values(&[namespace]).inc();
    }

    pub fn observe_remote_call(&self, endpoint: &str, method: &str, ok: bool) {
        let result = if ok { "success" } else { "error" };
        self.remote_calls
            .with_label_values(&[endpoint, method, result])
            .inc();
    }

    pub fn observe_dry_run_denial(&self, namespace: &str) {
        self.dry_run_denials.with_label_values(&[namespace]).inc();
    }

    /// Prometheus text exposition of every counter
    pub fn render(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to encode metrics");
                String::new()
            })
    }
}

impl Default for XpdbMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics for use across async tasks
pub type SharedMetrics = Arc<XpdbMetrics>;

pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(XpdbMetrics::new())
}
