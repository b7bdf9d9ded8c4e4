use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::resources::{Lease, LeaseSpec, ObjectMeta};
use crate::selector::LabelSelector;

pub const LEASE_NAME_PREFIX: &str = "xpdb-";
pub const POD_NAMESPACE_ANNOTATION: &str = "xpdb.io/pod-namespace";
pub const POD_SELECTOR_ANNOTATION: &str = "xpdb.io/pod-selector";
pub const LEASE_APP_LABEL: (&str, &str) = ("app", "xpdb");

const LEASE_HASH_CHARS: usize = 48;

/// Deterministic lease name for a budget's namespace and selector
///
/// Every cluster derives the same name for the same budget, which is what
/// makes the remote lock calls contend on a single record per cluster.
pub fn lease_name(namespace: &str, selector: &LabelSelector) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"/");
    hasher.update(selector.canonical().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}{}", LEASE_NAME_PREFIX, &digest[..LEASE_HASH_CHARS])
}

/// Unique holder identity for one admission attempt
pub fn holder_identity(cluster_id: &str, pod_id: &str, namespace: &str, name: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        cluster_id,
        pod_id,
        namespace,
        name,
        Uuid::new_v4()
    )
}

pub fn build_lease(
    lease_namespace: &str,
    holder: &str,
    namespace: &str,
    selector: &LabelSelector,
    duration_secs: i64,
    now: DateTime<Utc>,
) -> Lease {
    let mut annotations = HashMap::new();
    annotations.insert(POD_NAMESPACE_ANNOTATION.to_string(), namespace.to_string());
    annotations.insert(POD_SELECTOR_ANNOTATION.to_string(), selector.to_string());

    let mut metadata = ObjectMeta::new(lease_namespace, lease_name(namespace, selector))
        .with_label(LEASE_APP_LABEL.0, LEASE_APP_LABEL.1);
    metadata.annotations = annotations;

    Lease {
        metadata,
        spec: LeaseSpec {
            holder_identity: holder.to_string(),
            acquire_time: now,
            lease_duration_seconds: duration_secs,
        },
        resource_version: 0,
    }
}
