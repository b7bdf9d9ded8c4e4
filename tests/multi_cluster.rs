//! Integration tests for cross-cluster budgets
//!
//! Each simulated cluster runs its own webhook and state server on localhost
//! with ephemeral ports; budgets are evaluated over every cluster's pods.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use xpdb::app::{serve, XpdbApp};
use xpdb::config::Settings;
use xpdb::lock::lease_name;
use xpdb::resources::{
    BudgetSpec, IntOrPercent, ObjectMeta, OwnerReference, Pod, Workload, XPodDisruptionBudget,
};
use xpdb::selector::LabelSelector;
use xpdb::store::InMemoryCluster;

const REPLICAS: i32 = 3;

struct TestCluster {
    app: XpdbApp,
    cluster: InMemoryCluster,
    webhook_url: String,
}

impl TestCluster {
    fn cluster(&self) -> &InMemoryCluster {
        &self.cluster
    }
}

/// Guard cancelling every server when the test ends
struct Clusters {
    members: Vec<TestCluster>,
    shutdown: CancellationToken,
}

impl Drop for Clusters {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::ops::Index<usize> for Clusters {
    type Output = TestCluster;

    fn index(&self, i: usize) -> &TestCluster {
        &self.members[i]
    }
}

fn selector() -> LabelSelector {
    LabelSelector::matching("app", "web")
}

/// StatefulSet `web` with REPLICAS ready pods
fn seed_cluster(cluster: &InMemoryCluster, min_available: i32) {
    cluster.insert_workload(Workload::new(
        "apps/v1",
        "StatefulSet",
        ObjectMeta::new("shop", "web").with_uid("ss-web"),
        Some(REPLICAS),
    ));
    for i in 0..REPLICAS {
        cluster.insert_pod(
            Pod::new("shop", format!("web-{}", i))
                .with_label("app", "web")
                .with_owner(OwnerReference::controller(
                    "apps/v1",
                    "StatefulSet",
                    "web",
                    "ss-web",
                ))
                .with_ready(true),
        );
    }
    cluster.insert_budget(XPodDisruptionBudget::new(
        "shop",
        "web",
        BudgetSpec {
            min_available: Some(IntOrPercent::Int(min_available)),
            selector: selector(),
            ..Default::default()
        },
    ));
}

fn set_ready(cluster: &InMemoryCluster, name: &str, ready: bool) {
    cluster.insert_pod(
        Pod::new("shop", name)
            .with_label("app", "web")
            .with_owner(OwnerReference::controller(
                "apps/v1",
                "StatefulSet",
                "web",
                "ss-web",
            ))
            .with_ready(ready),
    );
}

/// Start `count` clusters that all know each other's state servers
async fn start_clusters(count: usize, configure: impl Fn(&mut Settings)) -> Clusters {
    let shutdown = CancellationToken::new();

    let mut state_listeners = Vec::new();
    let mut state_addrs = Vec::new();
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        state_addrs.push(listener.local_addr().unwrap().to_string());
        state_listeners.push(listener);
    }

    let mut members = Vec::new();
    for (i, state_listener) in state_listeners.into_iter().enumerate() {
        let mut settings = Settings {
            cluster_id: format!("cluster-{}", i),
            pod_id: format!("xpdb-{}", i),
            remote_endpoints: state_addrs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, addr)| addr.clone())
                .collect(),
            remote_timeout_ms: 1000,
            ..Default::default()
        };
        configure(&mut settings);

        let cluster = InMemoryCluster::new();
        let app = XpdbApp::new(&settings, cluster.clone());
        let webhook_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let webhook_url = format!("http://{}/validate", webhook_listener.local_addr().unwrap());

        tokio::spawn(serve(state_listener, app.state_router(), shutdown.clone()));
        tokio::spawn(serve(webhook_listener, app.webhook_router(), shutdown.clone()));

        members.push(TestCluster {
            app,
            cluster,
            webhook_url,
        });
    }

    Clusters { members, shutdown }
}

async fn evict(cluster: &TestCluster, pod: &str) -> serde_json::Value {
    let review = serde_json::json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": format!("evict-{}", pod),
            "kind": {"group": "policy", "version": "v1", "kind": "Eviction"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "subResource": "eviction",
            "name": pod,
            "namespace": "shop",
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:drainer"}
        }
    });

    let response = reqwest::Client::new()
        .post(&cluster.webhook_url)
        .json(&review)
        .send()
        .await
        .expect("Failed to reach webhook");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    body["response"].clone()
}

fn lease_held(cluster: &TestCluster) -> bool {
    cluster
        .cluster()
        .lease("kube-system", &lease_name("shop", &selector()))
        .is_some()
}

#[tokio::test]
async fn test_budget_counts_pods_in_every_cluster() {
    let clusters = start_clusters(3, |_| {}).await;
    for member in &clusters.members {
        seed_cluster(member.cluster(), 8);
    }

    // 9 healthy across three clusters, one may go
    let response = evict(&clusters[0], "web-0").await;
    assert_eq!(response["allowed"], true, "{}", response);

    // The lock stays held everywhere until its lease expires
    assert!(clusters.members.iter().all(lease_held));
}

#[tokio::test]
async fn test_unhealthy_remote_pod_blocks_local_eviction() {
    let clusters = start_clusters(3, |_| {}).await;
    for member in &clusters.members {
        seed_cluster(member.cluster(), 8);
    }
    set_ready(clusters[2].cluster(), "web-1", false);

    // 8 healthy: removing a ready pod would leave 7
    let response = evict(&clusters[0], "web-0").await;
    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 429);
    assert_eq!(
        clusters[0]
            .app
            .metrics()
            .eviction_rejected
            .with_label_values(&["shop", "pods", "eviction", "CREATE"])
            .get(),
        1
    );

    // A rejected disruption releases the lock in every cluster
    assert!(!clusters.members.iter().any(lease_held));

    // The unready pod itself can go, it is already counted as unavailable
    let response = evict(&clusters[2], "web-1").await;
    assert_eq!(response["allowed"], true, "{}", response);
}

#[tokio::test]
async fn test_concurrent_disruptions_are_serialised_across_clusters() {
    let clusters = start_clusters(3, |settings| settings.lease_duration_secs = 1).await;
    for member in &clusters.members {
        seed_cluster(member.cluster(), 6);
    }

    let response = evict(&clusters[0], "web-0").await;
    assert_eq!(response["allowed"], true, "{}", response);

    // Cluster 1 sees the lease taken on behalf of cluster 0
    let response = evict(&clusters[1], "web-0").await;
    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 403);
    assert!(response["status"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Cannot disrupt pod because xpdb couldn't obtain lock"));
    let lock_errors = &clusters[1].app.metrics().lock_errors;
    assert_eq!(lock_errors.with_label_values(&["shop"]).get(), 1);

    // The first disruption went through; once the lease lapses the next one may proceed
    clusters[0].cluster().remove_pod("shop", "web-0");
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let response = evict(&clusters[1], "web-0").await;
    assert_eq!(response["allowed"], true, "{}", response);
}

#[tokio::test]
async fn test_unreachable_cluster_fails_closed() {
    let clusters = start_clusters(1, |settings| {
        settings.remote_endpoints = vec!["127.0.0.1:1".to_string()];
        settings.remote_timeout_ms = 500;
    })
    .await;
    seed_cluster(clusters[0].cluster(), 1);

    let response = evict(&clusters[0], "web-0").await;
    assert_eq!(response["allowed"], false);
    assert!(response["status"]["message"]
        .as_str()
        .unwrap()
        .contains("127.0.0.1:1"));

    // The local lease taken before the remote failure is released again
    assert!(!lease_held(&clusters[0]));
}

#[tokio::test]
async fn test_failing_remote_state_denies_and_releases_every_lease() {
    let clusters = start_clusters(3, |_| {}).await;
    for member in &clusters.members {
        seed_cluster(member.cluster(), 1);
    }
    // Cluster 2 cannot resolve this pod's controller, so its state server errors
    clusters[2].cluster().insert_pod(
        Pod::new("shop", "stray-0")
            .with_label("app", "web")
            .with_owner(OwnerReference::controller(
                "apps/v1",
                "StatefulSet",
                "gone",
                "ss-gone",
            ))
            .with_ready(true),
    );

    let response = evict(&clusters[0], "web-0").await;
    assert_eq!(response["allowed"], false);
    let message = response["status"]["message"].as_str().unwrap();
    assert!(
        message.starts_with(
            "Cannot disrupt pod as there was an error evaluating pod's xpdb disruption budget"
        ),
        "{}",
        message
    );

    // Every remote lock had succeeded; all of them are released again
    assert!(!clusters.members.iter().any(lease_held));
}

#[tokio::test]
async fn test_dry_run_reports_without_blocking() {
    let clusters = start_clusters(2, |settings| settings.dry_run = true).await;
    for member in &clusters.members {
        seed_cluster(member.cluster(), 6);
    }

    let response = evict(&clusters[0], "web-0").await;
    assert_eq!(response["allowed"], true);
    assert!(response["warnings"][0]
        .as_str()
        .unwrap()
        .contains("would violate"));
    let denials = &clusters[0].app.metrics().dry_run_denials;
    assert_eq!(denials.with_label_values(&["shop"]).get(), 1);
}
