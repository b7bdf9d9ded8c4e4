use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ObjectMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseSpec {
    pub holder_identity: String,
    pub acquire_time: DateTime<Utc>,
    pub lease_duration_seconds: i64,
}

/// Time-bounded lock record stored in the lease namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub metadata: ObjectMeta,
    pub spec: LeaseSpec,
    /// Bumped by the store on every write
    #[serde(default)]
    pub resource_version: u64,
}

impl Lease {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn holder(&self) -> &str {
        &self.spec.holder_identity
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.spec.acquire_time + Duration::seconds(self.spec.lease_duration_seconds)
    }

    /// Expired once the deadline is no longer in the future
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline() <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(acquired: DateTime<Utc>) -> Lease {
        Lease {
            metadata: ObjectMeta::new("kube-system", "xpdb-test"),
            spec: LeaseSpec {
                holder_identity: "a".into(),
                acquire_time: acquired,
                lease_duration_seconds: 5,
            },
            resource_version: 0,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(!lease(now).is_expired_at(now));
        assert!(!lease(now - Duration::seconds(4)).is_expired_at(now));
        assert!(lease(now - Duration::seconds(5)).is_expired_at(now));
        assert!(lease(now - Duration::seconds(60)).is_expired_at(now));
    }
}
