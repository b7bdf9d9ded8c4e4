use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ObjectMeta;
use crate::selector::LabelSelector;

pub const XPDB_API_VERSION: &str = "xpdb.io/v1alpha1";
pub const XPDB_KIND: &str = "XPodDisruptionBudget";

/// Errors in budget threshold arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("Invalid value for IntOrPercent: {0:?} is not a percentage")]
    NotAPercentage(String),

    #[error("Invalid percentage {0:?}")]
    InvalidPercentage(String),

    #[error("Budget '{0}' sets both minAvailable and maxUnavailable")]
    Conflicting(String),

    #[error("Threshold arithmetic overflowed: {0}")]
    Overflow(String),
}

/// Integer or `"NN%"` string, as used by `minAvailable`/`maxUnavailable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(i32),
    Percent(String),
}

impl IntOrPercent {
    pub fn percent(value: u32) -> Self {
        IntOrPercent::Percent(format!("{}%", value))
    }

    /// Resolve against `total`. Integers are returned as-is, percentages are
    /// scaled and rounded up or down.
    pub fn scaled_value(&self, total: i32, round_up: bool) -> Result<i32, ThresholdError> {
        match self {
            IntOrPercent::Int(value) => Ok(*value),
            IntOrPercent::Percent(raw) => {
                let digits = raw
                    .strip_suffix('%')
                    .ok_or_else(|| ThresholdError::NotAPercentage(raw.clone()))?;
                let percent: i64 = digits
                    .parse()
                    .map_err(|_| ThresholdError::InvalidPercentage(raw.clone()))?;

                let overflow = || ThresholdError::Overflow(format!("{} of {}", raw, total));
                let scaled = percent
                    .checked_mul(i64::from(total))
                    .ok_or_else(overflow)?;
                let value = if round_up {
                    scaled.checked_add(99).ok_or_else(overflow)?.div_euclid(100)
                } else {
                    scaled.div_euclid(100)
                };
                i32::try_from(value).map_err(|_| overflow())
            }
        }
    }
}

/// The threshold form a budget uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Threshold<'a> {
    MinAvailable(&'a IntOrPercent),
    MaxUnavailable(&'a IntOrPercent),
    Unset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    /// Defaults to enabled when the probe block is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSpec {
    /// Suspension only affects disruptions of local pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrPercent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrPercent>,

    #[serde(default)]
    pub selector: LabelSelector,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeSpec>,
}

/// Cross-cluster pod disruption budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XPodDisruptionBudget {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: BudgetSpec,
}

fn default_api_version() -> String {
    XPDB_API_VERSION.to_string()
}

fn default_kind() -> String {
    XPDB_KIND.to_string()
}

impl XPodDisruptionBudget {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: BudgetSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(namespace, name),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn is_suspended(&self) -> bool {
        self.spec.suspend.unwrap_or(false)
    }

    /// Probe endpoint to call, if a probe is declared and enabled
    pub fn probe_endpoint(&self) -> Option<&str> {
        self.spec
            .probe
            .as_ref()
            .filter(|p| p.enabled.unwrap_or(true))
            .map(|p| p.endpoint.as_str())
    }

    pub fn threshold(&self) -> Result<Threshold<'_>, ThresholdError> {
        match (&self.spec.min_available, &self.spec.max_unavailable) {
            (Some(_), Some(_)) => Err(ThresholdError::Conflicting(self.metadata.key())),
            (Some(min), None) => Ok(Threshold::MinAvailable(min)),
            (None, Some(max)) => Ok(Threshold::MaxUnavailable(max)),
            (None, None) => Ok(Threshold::Unset),
        }
    }
}
