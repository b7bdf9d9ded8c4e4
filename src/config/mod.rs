//! Process configuration
//!
//! Settings come from an optional YAML (or JSON) file; command line flags and
//! `XPDB_*` environment variables override individual values afterwards.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::TlsSettings;
use crate::store::ClusterSnapshot;
use crate::{DEFAULT_STATE_ADDR, DEFAULT_WEBHOOK_ADDR};

pub const DEFAULT_CLUSTER_ID: &str = "no-id-set";
pub const DEFAULT_LEASE_NAMESPACE: &str = "kube-system";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid remote endpoints: {}", .0.join("; "))]
    InvalidEndpoints(Vec<String>),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Runtime settings of the webhook and state servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Identifies this cluster in lease holder identities
    pub cluster_id: String,
    /// Identifies this replica in lease holder identities
    pub pod_id: String,
    pub lease_namespace: String,
    pub lease_duration_secs: i64,
    /// State servers of the other clusters
    pub remote_endpoints: Vec<String>,
    pub remote_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub admission_timeout_ms: u64,
    pub dry_run: bool,
    pub webhook_addr: String,
    pub state_addr: String,
    /// `ca.crt`, `tls.crt` and `tls.key` for calls to remote state servers
    pub state_certs_dir: Option<PathBuf>,
    /// `ca.crt` for calls to disruption probes
    pub probe_certs_dir: Option<PathBuf>,
    /// Snapshot seeding the in-memory cluster
    pub cluster_state_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_id: DEFAULT_CLUSTER_ID.to_string(),
            pod_id: default_pod_id(),
            lease_namespace: DEFAULT_LEASE_NAMESPACE.to_string(),
            lease_duration_secs: 5,
            remote_endpoints: Vec::new(),
            remote_timeout_ms: 2000,
            probe_timeout_ms: 2000,
            admission_timeout_ms: 10_000,
            dry_run: false,
            webhook_addr: DEFAULT_WEBHOOK_ADDR.to_string(),
            state_addr: DEFAULT_STATE_ADDR.to_string(),
            state_certs_dir: None,
            probe_certs_dir: None,
            cluster_state_file: None,
        }
    }
}

/// `HOSTNAME` when set, else the system hostname
fn default_pod_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
        })
        .unwrap_or_else(|| "xpdb".to_string())
}

impl Settings {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    /// Mutual TLS towards remote state servers when a certificate directory is set
    pub fn state_tls(&self) -> TlsSettings {
        match &self.state_certs_dir {
            Some(dir) => TlsSettings::mutual(expand_path(dir)),
            None => TlsSettings::plaintext(),
        }
    }

    pub fn probe_tls(&self) -> TlsSettings {
        match &self.probe_certs_dir {
            Some(dir) => TlsSettings::server_only(expand_path(dir)),
            None => TlsSettings::plaintext(),
        }
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_id.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster-id must not be empty".into()));
        }
        if self.lease_duration_secs <= 0 {
            return Err(ConfigError::Invalid(format!(
                "lease-duration-secs must be positive, got {}",
                self.lease_duration_secs
            )));
        }
        for (name, value) in [
            ("remote-timeout-ms", self.remote_timeout_ms),
            ("probe-timeout-ms", self.probe_timeout_ms),
            ("admission-timeout-ms", self.admission_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        for (name, addr) in [
            ("webhook-addr", &self.webhook_addr),
            ("state-addr", &self.state_addr),
        ] {
            addr.parse::<SocketAddr>().map_err(|e| {
                ConfigError::Invalid(format!("{} '{}' is not a socket address: {}", name, addr, e))
            })?;
        }

        let empty: Vec<String> = self
            .remote_endpoints
            .iter()
            .enumerate()
            .filter(|(_, e)| e.trim().is_empty())
            .map(|(i, _)| format!("entry {} is empty", i + 1))
            .collect();
        if !empty.is_empty() {
            return Err(ConfigError::InvalidEndpoints(empty));
        }

        Ok(())
    }
}

// ============================================================================
// SBIO: Pure parsing
// ============================================================================

/// Parse a comma separated endpoint list.
///
/// A blank string means no remote clusters. Every empty entry in a non-blank
/// list is reported in one error.
pub fn parse_endpoints(raw: &str) -> Result<Vec<String>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<&str> = raw.split(',').map(str::trim).collect();
    let errors: Vec<String> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_empty())
        .map(|(i, _)| format!("entry {} is empty", i + 1))
        .collect();

    if !errors.is_empty() {
        return Err(ConfigError::InvalidEndpoints(errors));
    }
    Ok(entries.into_iter().map(String::from).collect())
}

/// Expand a leading `~` in a path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

fn read_file(path: &Path) -> Result<(PathBuf, String), ConfigError> {
    let path = expand_path(path);
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok((path, content))
}

/// Load settings from a YAML or JSON file
pub fn load_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let (path, content) = read_file(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}

/// Load a cluster snapshot from a YAML or JSON file
pub fn load_cluster_snapshot(path: &Path) -> Result<ClusterSnapshot, ConfigError> {
    let (path, content) = read_file(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}
