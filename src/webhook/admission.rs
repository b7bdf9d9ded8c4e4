use serde::{Deserialize, Serialize};

pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// Status code used for denials without a more specific code
pub const DEFAULT_DENY_CODE: u16 = 403;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_resource: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionReview {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    pub fn request(request: AdmissionRequest) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: ADMISSION_REVIEW_KIND.to_string(),
            request: Some(request),
            response: None,
        }
    }

    pub fn response(response: AdmissionResponse) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: ADMISSION_REVIEW_KIND.to_string(),
            request: None,
            response: Some(response),
        }
    }
}

/// Outcome of the admission pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny { message: String, code: Option<u16> },
}

impl Verdict {
    pub fn deny(message: impl Into<String>) -> Self {
        Verdict::Deny {
            message: message.into(),
            code: None,
        }
    }

    pub fn deny_with_code(message: impl Into<String>, code: u16) -> Self {
        Verdict::Deny {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Admission response for this verdict.
    ///
    /// In dry-run mode a denial is turned into an allowed response carrying
    /// the denial as a warning.
    pub fn into_response(self, uid: &str, dry_run: bool) -> AdmissionResponse {
        match self {
            Verdict::Allow => AdmissionResponse {
                uid: uid.to_string(),
                allowed: true,
                status: None,
                warnings: Vec::new(),
            },
            Verdict::Deny { message, .. } if dry_run => AdmissionResponse {
                uid: uid.to_string(),
                allowed: true,
                status: None,
                warnings: vec![format!("xpdb dry-run, would have denied: {}", message)],
            },
            Verdict::Deny { message, code } => AdmissionResponse {
                uid: uid.to_string(),
                allowed: false,
                status: Some(Status {
                    code: code.unwrap_or(DEFAULT_DENY_CODE),
                    message,
                }),
                warnings: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_eviction_review() {
        let json = r#"{
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "policy", "version": "v1", "kind": "Eviction"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "subResource": "eviction",
                "name": "web-0",
                "namespace": "shop",
                "operation": "CREATE",
                "userInfo": {"username": "system:serviceaccount:kube-system:drainer"},
                "object": {"apiVersion": "policy/v1", "kind": "Eviction"},
                "dryRun": false
            }
        }"#;

        let review: AdmissionReview = serde_json::from_str(json).unwrap();
        let request = review.request.unwrap();
        assert_eq!(request.sub_resource, "eviction");
        assert_eq!(request.resource.resource, "pods");
        assert_eq!(request.operation, "CREATE");
        assert!(request.old_object.is_none());
    }

    #[test]
    fn test_deny_codes() {
        let response = Verdict::deny_with_code("busy", 429).into_response("u1", false);
        assert!(!response.allowed);
        assert_eq!(response.status.unwrap().code, 429);

        let response = Verdict::deny("nope").into_response("u2", false);
        assert_eq!(
            response.status,
            Some(Status {
                code: DEFAULT_DENY_CODE,
                message: "nope".into()
            })
        );
    }

    #[test]
    fn test_dry_run_allows_with_warning() {
        let response = Verdict::deny_with_code("busy", 429).into_response("u1", true);
        assert!(response.allowed);
        assert!(response.status.is_none());
        assert_eq!(response.warnings.len(), 1);
        assert!(response.warnings[0].contains("busy"));
    }

    #[test]
    fn test_response_shape() {
        let review = AdmissionReview::response(Verdict::Allow.into_response("u1", false));
        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["apiVersion"], ADMISSION_API_VERSION);
        assert_eq!(json["response"]["uid"], "u1");
        assert_eq!(json["response"]["allowed"], true);
        assert!(json.get("request").is_none());
        assert!(json["response"].get("status").is_none());
    }
}
