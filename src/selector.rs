//! Label selectors
//!
//! Budgets pick their pods with Kubernetes-style label selectors: exact
//! `matchLabels` plus `matchExpressions` requirements. Between clusters the
//! selector travels in a looser form ([`WireLabelSelector`]) whose requirement
//! keys and operators are optional; decoding validates them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for malformed selectors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Unknown selector operator: {0:?}")]
    UnknownOperator(String),

    #[error("Selector requirement is missing a key")]
    MissingKey,

    #[error("Selector requirement for key '{0}' is missing an operator")]
    MissingOperator(String),

    #[error("Operator '{operator}' on key '{key}' requires at least one value")]
    MissingValues { key: String, operator: String },

    #[error("Operator '{operator}' on key '{key}' does not accept values")]
    UnexpectedValues { key: String, operator: String },

    #[error("Invalid label value {value:?} for key '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Set-based requirement operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl SelectorOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorOperator::In => "In",
            SelectorOperator::NotIn => "NotIn",
            SelectorOperator::Exists => "Exists",
            SelectorOperator::DoesNotExist => "DoesNotExist",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SelectorError> {
        match s {
            "In" => Ok(SelectorOperator::In),
            "NotIn" => Ok(SelectorOperator::NotIn),
            "Exists" => Ok(SelectorOperator::Exists),
            "DoesNotExist" => Ok(SelectorOperator::DoesNotExist),
            other => Err(SelectorError::UnknownOperator(other.to_string())),
        }
    }

    fn takes_values(&self) -> bool {
        matches!(self, SelectorOperator::In | SelectorOperator::NotIn)
    }
}

/// A single `matchExpressions` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelSelectorRequirement {
    pub fn new(key: impl Into<String>, operator: SelectorOperator, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }

    fn validate(&self) -> Result<(), SelectorError> {
        if self.key.is_empty() {
            return Err(SelectorError::MissingKey);
        }
        if self.operator.takes_values() && self.values.is_empty() {
            return Err(SelectorError::MissingValues {
                key: self.key.clone(),
                operator: self.operator.as_str().to_string(),
            });
        }
        if !self.operator.takes_values() && !self.values.is_empty() {
            return Err(SelectorError::UnexpectedValues {
                key: self.key.clone(),
                operator: self.operator.as_str().to_string(),
            });
        }
        for value in &self.values {
            validate_label_value(&self.key, value)?;
        }
        Ok(())
    }

    /// Render in label-query syntax with values sorted
    fn canonical(&self) -> String {
        let mut values = self.values.clone();
        values.sort();
        values.dedup();
        match self.operator {
            SelectorOperator::In => format!("{} in ({})", self.key, values.join(",")),
            SelectorOperator::NotIn => format!("{} notin ({})", self.key, values.join(",")),
            SelectorOperator::Exists => self.key.clone(),
            SelectorOperator::DoesNotExist => format!("!{}", self.key),
        }
    }
}

/// Label query over pods
///
/// An empty selector matches every pod in the namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Create a selector that matches a specific label
    pub fn matching(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(key.into(), value.into());
        Self {
            match_labels,
            match_expressions: Vec::new(),
        }
    }

    /// Add a set-based requirement
    pub fn with_expression(mut self, requirement: LabelSelectorRequirement) -> Self {
        self.match_expressions.push(requirement);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn validate(&self) -> Result<(), SelectorError> {
        for (key, value) in &self.match_labels {
            validate_label_value(key, value)?;
        }
        for requirement in &self.match_expressions {
            requirement.validate()?;
        }
        Ok(())
    }

    /// Check if labels satisfy every label and requirement of this selector
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }

    /// Stable string form used to derive lock identities.
    ///
    /// `matchLabels` are emitted as `k=v` in key order, followed by the
    /// requirements sorted by key, operator and values (values sorted too),
    /// all joined with `,`. Two selectors that match the same set of pods
    /// through the same terms render identically regardless of the order
    /// their terms were written in.
    pub fn canonical(&self) -> String {
        let mut terms: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut requirements: Vec<&LabelSelectorRequirement> =
            self.match_expressions.iter().collect();
        requirements.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then(a.operator.cmp(&b.operator))
                .then_with(|| a.canonical().cmp(&b.canonical()))
        });
        terms.extend(requirements.iter().map(|r| r.canonical()));
        terms.dedup();

        terms.join(",")
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<everything>")
        } else {
            write!(f, "{}", self.canonical())
        }
    }
}

fn label_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").expect("static regex")
    })
}

fn validate_label_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.len() > 63 || !label_value_regex().is_match(value) {
        return Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Wire representation
// ============================================================================

/// Selector as exchanged between clusters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub match_expressions: Vec<WireRequirement>,
}

/// Requirement as exchanged between clusters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default)]
    pub values: Vec<String>,
}

impl From<&LabelSelector> for WireLabelSelector {
    fn from(selector: &LabelSelector) -> Self {
        Self {
            match_labels: selector.match_labels.clone(),
            match_expressions: selector
                .match_expressions
                .iter()
                .map(|r| WireRequirement {
                    key: Some(r.key.clone()),
                    operator: Some(r.operator.as_str().to_string()),
                    values: r.values.clone(),
                })
                .collect(),
        }
    }
}

impl TryFrom<WireLabelSelector> for LabelSelector {
    type Error = SelectorError;

    fn try_from(wire: WireLabelSelector) -> Result<Self, Self::Error> {
        let mut match_expressions = Vec::with_capacity(wire.match_expressions.len());
        for requirement in wire.match_expressions {
            let key = requirement
                .key
                .filter(|k| !k.is_empty())
                .ok_or(SelectorError::MissingKey)?;
            let operator = requirement
                .operator
                .ok_or_else(|| SelectorError::MissingOperator(key.clone()))?;
            match_expressions.push(LabelSelectorRequirement {
                operator: SelectorOperator::parse(&operator)?,
                key,
                values: requirement.values,
            });
        }

        let selector = LabelSelector {
            match_labels: wire.match_labels,
            match_expressions,
        };
        selector.validate()?;
        Ok(selector)
    }
}
