use std::fmt::Display;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::admission::{AdmissionRequest, AdmissionResponse, Verdict};
use crate::budget::BudgetService;
use crate::events::{Event, EventReason, EventRecorder, EventType};
use crate::lock::{holder_identity, LockService};
use crate::metrics::SharedMetrics;
use crate::preactivities::PreActivityService;
use crate::probe::ProbeService;
use crate::resources::{Pod, XPodDisruptionBudget};
use crate::store::PodStore;

pub const PENDING_ACTIVITIES_MESSAGE: &str =
    "Cannot disrupt pod has it has pending disruption pre-activities.";
pub const PENDING_ACTIVITIES_ERROR_MESSAGE: &str =
    "error verifying if pod had pending pre-activities";
pub const MULTIPLE_BUDGETS_MESSAGE: &str = "Cannot disrupt pod as it matched multiple xpdbs.";
pub const LOCK_ERROR_MESSAGE: &str = "Cannot disrupt pod because xpdb couldn't obtain lock";
pub const BUDGET_NOT_ALLOWED_MESSAGE: &str =
    "Cannot disrupt pod as it would violate the pod's xpdb disruption budget.";
pub const BUDGET_ERROR_MESSAGE: &str =
    "Cannot disrupt pod as there was an error evaluating pod's xpdb disruption budget";
pub const PROBE_NOT_ALLOWED_MESSAGE: &str =
    "Cannot disrupt pod as the pod's xpdb disruption probe didn't allow it.";
pub const PROBE_ERROR_MESSAGE: &str =
    "Cannot disrupt pod as there was an error calling pod's xpdb disruption probe";
pub const TIMEOUT_MESSAGE: &str = "Cannot disrupt pod as the xpdb admission check timed out";

/// Matches the status of a PDB-blocked eviction so clients retry
const TOO_MANY_REQUESTS: u16 = 429;
/// Matches the status of a pod matching several PDBs
const INTERNAL_SERVER_ERROR: u16 = 500;

/// Webhook configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub cluster_id: String,
    pub pod_id: String,
    /// Record denials but never block
    pub dry_run: bool,
    /// Bound on the whole decision pipeline
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            cluster_id: "no-id-set".to_string(),
            pod_id: "xpdb".to_string(),
            dry_run: false,
            timeout: Duration::from_secs(10),
        }
    }
}

impl WebhookConfig {
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    pub fn with_pod_id(mut self, pod_id: impl Into<String>) -> Self {
        self.pod_id = pod_id.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Collaborators of the validation webhook
#[derive(Clone)]
pub struct WebhookServices {
    pub pods: Arc<dyn PodStore>,
    pub budgets: Arc<BudgetService>,
    pub locks: Arc<LockService>,
    pub probes: Arc<ProbeService>,
    pub preactivities: Arc<PreActivityService>,
    pub recorder: Arc<dyn EventRecorder>,
    pub metrics: SharedMetrics,
}

/// Lock taken, or about to be taken, by an in-flight pipeline
struct PendingLock {
    holder: String,
    budget: XPodDisruptionBudget,
}

/// Decides whether a pod deletion or eviction may proceed
pub struct PodValidationWebhook {
    services: WebhookServices,
    config: WebhookConfig,
}

impl PodValidationWebhook {
    pub fn new(services: WebhookServices, config: WebhookConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Run the pipeline for one admission request and build the response
    pub async fn handle(&self, request: &AdmissionRequest) -> AdmissionResponse {
        let pending = OnceLock::new();
        let verdict = match tokio::time::timeout(self.config.timeout, self.decide(request, &pending))
            .await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(
                    pod = %request.name,
                    namespace = %request.namespace,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Admission check timed out"
                );
                // The abandoned pipeline may have locked the budget
                if let Some(lock) = pending.get() {
                    self.release(&lock.budget, &lock.holder).await;
                }
                Verdict::deny(TIMEOUT_MESSAGE)
            }
        };

        if self.config.dry_run {
            if let Verdict::Deny { message, code } = &verdict {
                self.services.metrics.observe_dry_run_denial(&request.namespace);
                warn!(
                    pod = %request.name,
                    namespace = %request.namespace,
                    code = ?code,
                    message = %message,
                    "Dry-run: disruption would have been denied"
                );
            }
        }

        verdict.into_response(&request.uid, self.config.dry_run)
    }

    /// The decision pipeline.
    ///
    /// A successful verdict leaves the budget locked: the disruption is still
    /// in flight and the lease expiring on its own is what releases it.
    pub async fn validate(&self, request: &AdmissionRequest) -> Verdict {
        self.decide(request, &OnceLock::new()).await
    }

    /// Records the lock it is about to take in `pending` so a caller that
    /// abandons the pipeline can release it
    async fn decide(
        &self,
        request: &AdmissionRequest,
        pending: &OnceLock<PendingLock>,
    ) -> Verdict {
        let pod = match self.decode_pod(request).await {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                debug!(pod = %request.name, namespace = %request.namespace, "Pod not found, allowing");
                return Verdict::Allow;
            }
            Err(e) => {
                debug!(pod = %request.name, namespace = %request.namespace, error = %e, "Could not decode pod, allowing");
                return Verdict::Allow;
            }
        };

        if pod.is_terminating() {
            return Verdict::Allow;
        }

        debug!(
            pod = %pod.metadata.key(),
            kind = %request.kind.kind,
            resource = %request.resource.resource,
            subresource = %request.sub_resource,
            operation = %request.operation,
            username = %request.user_info.username,
            dry_run = ?request.dry_run,
            phase = ?pod.status.phase,
            reason = ?pod.status.reason,
            "Received webhook request"
        );

        // Involuntary disruptions (taint eviction, preemption, node loss) are not ours to gate
        if let Some(condition) = pod.disruption_target() {
            info!(
                pod = %pod.metadata.key(),
                reason = ?condition.reason,
                message = ?condition.message,
                "Ignoring pod: deleted due to disruption"
            );
            return Verdict::Allow;
        }
        if pod.is_node_lost() {
            info!(pod = %pod.metadata.key(), "Ignoring pod: has status.reason=NodeLost");
            return Verdict::Allow;
        }

        match self.services.preactivities.can_pod_be_disrupted(&pod).await {
            Ok(true) => {}
            Ok(false) => {
                return Verdict::deny_with_code(PENDING_ACTIVITIES_MESSAGE, TOO_MANY_REQUESTS)
            }
            Err(e) => {
                return Verdict::deny(format!("{}: {}", PENDING_ACTIVITIES_ERROR_MESSAGE, e))
            }
        }

        let budgets = match self.services.budgets.budgets_for_pod(&pod).await {
            Ok(budgets) => budgets,
            Err(e) => return Verdict::deny(format!("could not get xpdbs for pod: {}", e)),
        };

        let budget = match budgets.as_slice() {
            [] => return Verdict::Allow,
            [budget] => budget,
            many => return self.reject_multiple(&pod, many),
        };

        if budget.is_suspended() {
            info!(pod = %pod.metadata.key(), xpdb = %budget.metadata.key(), "xpdb is suspended, allowing");
            return Verdict::Allow;
        }

        let holder = holder_identity(
            &self.config.cluster_id,
            &self.config.pod_id,
            pod.namespace(),
            pod.name(),
        );
        let _ = pending.set(PendingLock {
            holder: holder.clone(),
            budget: budget.clone(),
        });
        if let Err(e) = self
            .services
            .locks
            .lock(&holder, budget.namespace(), &budget.spec.selector)
            .await
        {
            error!(pod = %pod.metadata.key(), holder = %holder, error = %e, "Could not obtain xpdb lock");
            self.services.metrics.observe_lock_error(pod.namespace());
            return Verdict::deny(format!("{}: {}", LOCK_ERROR_MESSAGE, e));
        }

        match self.services.budgets.can_pod_be_disrupted(&pod, budget).await {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .block(request, budget, &pod, &holder, BUDGET_NOT_ALLOWED_MESSAGE)
                    .await
            }
            Err(e) => return self.fail(budget, &holder, BUDGET_ERROR_MESSAGE, e).await,
        }

        if budget.probe_endpoint().is_some() {
            match self.services.probes.can_pod_be_disrupted(&pod, budget).await {
                Ok(true) => {}
                Ok(false) => {
                    return self
                        .block(request, budget, &pod, &holder, PROBE_NOT_ALLOWED_MESSAGE)
                        .await
                }
                Err(e) => return self.fail(budget, &holder, PROBE_ERROR_MESSAGE, e).await,
            }
        }

        self.services.recorder.record(Event::for_budget(
            budget,
            EventType::Normal,
            EventReason::Accepted,
            format!("attempted eviction of {}", pod.name()),
        ));
        info!(pod = %pod.metadata.key(), xpdb = %budget.metadata.key(), "Disruption accepted");

        Verdict::Allow
    }

    async fn decode_pod(&self, request: &AdmissionRequest) -> Result<Option<Pod>, String> {
        match &request.old_object {
            Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(|e| e.to_string()),
            _ => self
                .services
                .pods
                .get_pod(&request.namespace, &request.name)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    fn reject_multiple(&self, pod: &Pod, budgets: &[XPodDisruptionBudget]) -> Verdict {
        let names: Vec<&str> = budgets.iter().map(|b| b.name()).collect();
        self.services.recorder.record(Event::for_pod(
            pod,
            EventType::Warning,
            EventReason::InvalidConfiguration,
            format!(
                "invalid configuration: pod matches multiple XPDBs: {}",
                names.join(", ")
            ),
        ));
        self.services.metrics.observe_multiple_matches(pod.namespace());
        error!(pod = %pod.metadata.key(), xpdbs = ?names, "Pod matches multiple xpdbs");

        Verdict::deny_with_code(MULTIPLE_BUDGETS_MESSAGE, INTERNAL_SERVER_ERROR)
    }

    /// Disruption refused by the budget or its probe
    async fn block(
        &self,
        request: &AdmissionRequest,
        budget: &XPodDisruptionBudget,
        pod: &Pod,
        holder: &str,
        message: &str,
    ) -> Verdict {
        self.services.recorder.record(Event::for_budget(
            budget,
            EventType::Normal,
            EventReason::Blocked,
            format!("attempted eviction of {}", pod.name()),
        ));
        self.services.metrics.observe_eviction_rejected(
            budget.namespace(),
            &request.resource.resource,
            &request.sub_resource,
            &request.operation,
        );
        self.release(budget, holder).await;

        Verdict::deny_with_code(message, TOO_MANY_REQUESTS)
    }

    /// Evaluation or probe failed
    async fn fail(
        &self,
        budget: &XPodDisruptionBudget,
        holder: &str,
        description: &str,
        err: impl Display,
    ) -> Verdict {
        error!(xpdb = %budget.metadata.key(), error = %err, "Pod disruption check returned an error");
        self.release(budget, holder).await;
        Verdict::deny(format!("{}: {}", description, err))
    }

    async fn release(&self, budget: &XPodDisruptionBudget, holder: &str) {
        if let Err(e) = self
            .services
            .locks
            .unlock(holder, budget.namespace(), &budget.spec.selector)
            .await
        {
            error!(xpdb = %budget.metadata.key(), holder = %holder, error = %e, "Unable to release xpdb lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::RemoteAggregator;
    use crate::events::MemoryRecorder;
    use crate::lock::LockConfig;
    use crate::metrics::{new_shared_metrics, XpdbMetrics};
    use crate::probe::ProbeClientPool;
    use crate::remote::TlsSettings;
    use crate::resources::{
        BudgetSpec, ConditionStatus, IntOrPercent, ObjectMeta, OwnerReference, PodCondition,
        Workload, DISRUPTION_TARGET_CONDITION, NODE_LOST_REASON,
    };
    use crate::scale::ScaleFinder;
    use crate::selector::LabelSelector;
    use crate::state::StateClientPool;
    use crate::store::InMemoryCluster;
    use crate::webhook::admission::{GroupVersionResource, DEFAULT_DENY_CODE};
    use chrono::Utc;

    struct Harness {
        cluster: InMemoryCluster,
        recorder: Arc<MemoryRecorder>,
        metrics: Arc<XpdbMetrics>,
        webhook: PodValidationWebhook,
    }

    fn harness_with(config: WebhookConfig) -> Harness {
        let cluster = InMemoryCluster::new();
        let store = Arc::new(cluster.clone());
        let metrics = new_shared_metrics();
        let recorder = Arc::new(MemoryRecorder::new());
        let pool = StateClientPool::new(TlsSettings::plaintext(), metrics.clone());

        let services = WebhookServices {
            pods: store.clone(),
            budgets: Arc::new(BudgetService::new(
                store.clone(),
                store.clone(),
                Arc::new(ScaleFinder::new(store.clone())),
                RemoteAggregator::new(pool.clone(), Vec::new(), Duration::from_secs(2)),
            )),
            locks: Arc::new(LockService::new(store.clone(), pool, LockConfig::default())),
            probes: Arc::new(ProbeService::new(
                ProbeClientPool::new(TlsSettings::plaintext(), metrics.clone()),
                Duration::from_millis(500),
            )),
            preactivities: Arc::new(PreActivityService::new(store)),
            recorder: recorder.clone(),
            metrics: metrics.clone(),
        };

        Harness {
            cluster,
            recorder,
            metrics,
            webhook: PodValidationWebhook::new(services, config.with_cluster_id("eu-1")),
        }
    }

    fn harness() -> Harness {
        harness_with(WebhookConfig::default())
    }

    impl Harness {
        /// StatefulSet `web` with `replicas` pods, the first `ready` of them Ready
        fn seed_web(&self, replicas: i32, ready: usize) {
            self.cluster.insert_workload(Workload::new(
                "apps/v1",
                "StatefulSet",
                ObjectMeta::new("shop", "web").with_uid("ss-1"),
                Some(replicas),
            ));
            for i in 0..replicas as usize {
                self.cluster.insert_pod(
                    Pod::new("shop", format!("web-{}", i))
                        .with_label("app", "web")
                        .with_owner(OwnerReference::controller(
                            "apps/v1",
                            "StatefulSet",
                            "web",
                            "ss-1",
                        ))
                        .with_ready(i < ready),
                );
            }
        }

        fn add_budget(&self, name: &str, spec: BudgetSpec) {
            self.cluster
                .insert_budget(XPodDisruptionBudget::new("shop", name, spec));
        }

        fn lease_count(&self) -> usize {
            self.cluster.lease_count()
        }
    }

    fn min_available(min: i32) -> BudgetSpec {
        BudgetSpec {
            min_available: Some(IntOrPercent::Int(min)),
            selector: LabelSelector::matching("app", "web"),
            ..Default::default()
        }
    }

    fn eviction(name: &str) -> AdmissionRequest {
        AdmissionRequest {
            uid: "req-1".into(),
            resource: GroupVersionResource {
                group: "".into(),
                version: "v1".into(),
                resource: "pods".into(),
            },
            sub_resource: "eviction".into(),
            name: name.into(),
            namespace: "shop".into(),
            operation: "CREATE".into(),
            ..Default::default()
        }
    }

    fn deletion_of(pod: &Pod) -> AdmissionRequest {
        AdmissionRequest {
            uid: "req-2".into(),
            name: pod.name().into(),
            namespace: pod.namespace().into(),
            operation: "DELETE".into(),
            old_object: Some(serde_json::to_value(pod).unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pod_without_budget_is_allowed() {
        let h = harness();
        h.seed_web(3, 3);
        assert_eq!(h.webhook.validate(&eviction("web-0")).await, Verdict::Allow);
        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_or_undecodable_pod_is_allowed() {
        let h = harness();
        assert_eq!(h.webhook.validate(&eviction("ghost")).await, Verdict::Allow);

        let mut request = eviction("web-0");
        request.old_object = Some(serde_json::json!({"metadata": "not-an-object"}));
        assert_eq!(h.webhook.validate(&request).await, Verdict::Allow);
    }

    #[tokio::test]
    async fn test_involuntary_disruptions_are_allowed() {
        let h = harness();
        h.seed_web(3, 3);
        h.add_budget("web", min_available(3));

        let mut terminating = Pod::new("shop", "web-0").with_label("app", "web");
        terminating.metadata.deletion_timestamp = Some(Utc::now());
        assert_eq!(h.webhook.validate(&deletion_of(&terminating)).await, Verdict::Allow);

        let mut targeted = Pod::new("shop", "web-0")
            .with_label("app", "web")
            .with_ready(true);
        targeted.set_condition(PodCondition::new(
            DISRUPTION_TARGET_CONDITION,
            ConditionStatus::True,
        ));
        assert_eq!(h.webhook.validate(&deletion_of(&targeted)).await, Verdict::Allow);

        let mut lost = Pod::new("shop", "web-0").with_label("app", "web");
        lost.status.reason = Some(NODE_LOST_REASON.into());
        assert_eq!(h.webhook.validate(&deletion_of(&lost)).await, Verdict::Allow);

        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_pending_preactivities_block() {
        let h = harness();
        let mut pod = Pod::new("shop", "web-0").with_label("app", "web");
        pod.metadata
            .annotations
            .insert("xpdb.io/pre-activity.backup".into(), "".into());
        h.cluster.insert_pod(pod);

        assert_eq!(
            h.webhook.validate(&eviction("web-0")).await,
            Verdict::deny_with_code(PENDING_ACTIVITIES_MESSAGE, 429)
        );
    }

    #[tokio::test]
    async fn test_multiple_budgets_is_configuration_error() {
        let h = harness();
        h.seed_web(3, 3);
        h.add_budget("web-a", min_available(1));
        h.add_budget("web-b", min_available(1));

        let verdict = h.webhook.validate(&eviction("web-0")).await;
        assert_eq!(
            verdict,
            Verdict::deny_with_code(MULTIPLE_BUDGETS_MESSAGE, 500)
        );
        assert_eq!(h.recorder.count(EventReason::InvalidConfiguration), 1);
        assert_eq!(
            h.metrics.multiple_matches.with_label_values(&["shop"]).get(),
            1
        );
        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_suspended_budget_allows() {
        let h = harness();
        h.seed_web(3, 1);
        let mut spec = min_available(3);
        spec.suspend = Some(true);
        h.add_budget("web", spec);

        assert_eq!(h.webhook.validate(&eviction("web-0")).await, Verdict::Allow);
        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_allowed_disruption_keeps_lock() {
        let h = harness();
        h.seed_web(3, 3);
        h.add_budget("web", min_available(2));

        assert_eq!(h.webhook.validate(&eviction("web-0")).await, Verdict::Allow);
        assert_eq!(h.recorder.count(EventReason::Accepted), 1);
        assert_eq!(h.lease_count(), 1);

        // A second eviction inside the lease window cannot lock the budget
        let verdict = h.webhook.validate(&eviction("web-1")).await;
        assert!(matches!(verdict, Verdict::Deny { code: None, ref message } if message.starts_with(LOCK_ERROR_MESSAGE)));
        assert_eq!(h.metrics.lock_errors.with_label_values(&["shop"]).get(), 1);
    }

    #[tokio::test]
    async fn test_budget_violation_blocks_and_unlocks() {
        let h = harness();
        h.seed_web(3, 2);
        h.add_budget("web", min_available(2));

        let verdict = h.webhook.validate(&eviction("web-0")).await;
        assert_eq!(verdict, Verdict::deny_with_code(BUDGET_NOT_ALLOWED_MESSAGE, 429));
        assert_eq!(h.recorder.count(EventReason::Blocked), 1);
        assert_eq!(
            h.metrics
                .eviction_rejected
                .with_label_values(&["shop", "pods", "eviction", "CREATE"])
                .get(),
            1
        );
        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_unready_candidate_is_compensated() {
        let h = harness();
        // web-2 is the unready one
        h.seed_web(3, 2);
        h.add_budget("web", min_available(2));

        assert_eq!(h.webhook.validate(&eviction("web-2")).await, Verdict::Allow);
    }

    #[tokio::test]
    async fn test_evaluation_error_denies_and_unlocks() {
        let h = harness();
        h.seed_web(3, 3);
        h.add_budget(
            "web",
            BudgetSpec {
                min_available: Some(IntOrPercent::Percent("most".into())),
                selector: LabelSelector::matching("app", "web"),
                ..Default::default()
            },
        );

        let verdict = h.webhook.validate(&eviction("web-0")).await;
        assert!(matches!(verdict, Verdict::Deny { code: None, ref message } if message.starts_with(BUDGET_ERROR_MESSAGE)));
        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_error_denies_and_unlocks() {
        let h = harness();
        h.seed_web(3, 3);
        let mut spec = min_available(1);
        spec.probe = Some(crate::resources::ProbeSpec {
            enabled: None,
            endpoint: "http://127.0.0.1:1".into(),
        });
        h.add_budget("web", spec);

        let verdict = h.webhook.validate(&eviction("web-0")).await;
        assert!(matches!(verdict, Verdict::Deny { code: None, ref message } if message.starts_with(PROBE_ERROR_MESSAGE)));
        assert_eq!(h.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_check_releases_lock() {
        // Accepts connections into the backlog and never answers
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", silent.local_addr().unwrap());

        let h = harness_with(WebhookConfig::default().with_timeout(Duration::from_millis(150)));
        h.seed_web(3, 3);
        let mut spec = min_available(1);
        spec.probe = Some(crate::resources::ProbeSpec {
            enabled: None,
            endpoint,
        });
        h.add_budget("web", spec);

        let response = h.webhook.handle(&eviction("web-0")).await;
        assert!(!response.allowed);
        assert_eq!(response.status.unwrap().message, TIMEOUT_MESSAGE);
        assert_eq!(h.lease_count(), 0);

        // The budget is free again for the next disruption
        let mut spec = min_available(1);
        spec.probe = None;
        h.add_budget("web", spec);
        assert!(h.webhook.handle(&eviction("web-1")).await.allowed);
    }

    #[tokio::test]
    async fn test_handle_presents_denials() {
        let h = harness();
        h.seed_web(3, 2);
        h.add_budget("web", min_available(2));

        let response = h.webhook.handle(&eviction("web-0")).await;
        assert!(!response.allowed);
        assert_eq!(response.uid, "req-1");
        assert_eq!(response.status.unwrap().code, 429);

        let response = h.webhook.handle(&eviction("ghost")).await;
        assert!(response.allowed);

        // Lock failure carries no explicit code
        let h = harness();
        h.seed_web(3, 3);
        h.add_budget("web", min_available(1));
        assert!(h.webhook.handle(&eviction("web-0")).await.allowed);
        let response = h.webhook.handle(&eviction("web-1")).await;
        assert_eq!(response.status.unwrap().code, DEFAULT_DENY_CODE);
    }

    #[tokio::test]
    async fn test_dry_run_never_blocks_but_records() {
        let h = harness_with(WebhookConfig::default().with_dry_run(true));
        h.seed_web(3, 2);
        h.add_budget("web", min_available(2));

        let response = h.webhook.handle(&eviction("web-0")).await;
        assert!(response.allowed);
        assert_eq!(response.warnings.len(), 1);
        assert!(response.warnings[0].contains(BUDGET_NOT_ALLOWED_MESSAGE));

        assert_eq!(
            h.metrics.dry_run_denials.with_label_values(&["shop"]).get(),
            1
        );
        assert_eq!(h.recorder.count(EventReason::Blocked), 1);
        assert_eq!(h.lease_count(), 0);
    }
}
