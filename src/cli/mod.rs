//! CLI module for xpdb
//!
//! Provides the process entrypoints:
//! - `xpdb webhook` - Run the admission webhook server
//! - `xpdb state` - Run the state server queried by other clusters
//! - `xpdb serve` - Run both servers in one process

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{parse_endpoints, ConfigError, Settings};

#[derive(Parser, Debug)]
#[command(name = "xpdb")]
#[command(about = "Cross-cluster pod disruption budgets")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a YAML or JSON settings file
    #[arg(short, long, value_name = "FILE", env = "XPDB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file loaded before reading XPDB_* variables
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the admission webhook server
    Webhook,

    /// Run the state server for remote clusters
    State,

    /// Run the webhook and state servers together
    Serve,
}

impl Commands {
    pub fn runs_webhook(&self) -> bool {
        matches!(self, Commands::Webhook | Commands::Serve)
    }

    pub fn runs_state(&self) -> bool {
        matches!(self, Commands::State | Commands::Serve)
    }
}

/// Values overriding the settings file
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// Identifier of this cluster
    #[arg(long, env = "XPDB_CLUSTER_ID", global = true)]
    pub cluster_id: Option<String>,

    /// Identifier of this replica (defaults to the hostname)
    #[arg(long, env = "XPDB_POD_ID", global = true)]
    pub pod_id: Option<String>,

    /// Namespace holding the lock leases
    #[arg(long, env = "XPDB_LEASE_NAMESPACE", global = true)]
    pub lease_namespace: Option<String>,

    #[arg(long, env = "XPDB_LEASE_DURATION_SECS", global = true)]
    pub lease_duration_secs: Option<i64>,

    /// Comma separated state server addresses of the other clusters
    #[arg(long, value_name = "ENDPOINTS", env = "XPDB_REMOTE_ENDPOINTS", global = true)]
    pub remote_endpoints: Option<String>,

    #[arg(long, env = "XPDB_REMOTE_TIMEOUT_MS", global = true)]
    pub remote_timeout_ms: Option<u64>,

    #[arg(long, env = "XPDB_PROBE_TIMEOUT_MS", global = true)]
    pub probe_timeout_ms: Option<u64>,

    #[arg(long, env = "XPDB_ADMISSION_TIMEOUT_MS", global = true)]
    pub admission_timeout_ms: Option<u64>,

    /// Report would-be denials without blocking
    #[arg(long, env = "XPDB_DRY_RUN", global = true)]
    pub dry_run: bool,

    #[arg(long, value_name = "ADDR", env = "XPDB_WEBHOOK_ADDR", global = true)]
    pub webhook_addr: Option<String>,

    #[arg(long, value_name = "ADDR", env = "XPDB_STATE_ADDR", global = true)]
    pub state_addr: Option<String>,

    /// Directory with ca.crt, tls.crt and tls.key for remote state servers
    #[arg(long, value_name = "DIR", env = "XPDB_STATE_CERTS_DIR", global = true)]
    pub state_certs_dir: Option<PathBuf>,

    /// Directory with ca.crt for disruption probes
    #[arg(long, value_name = "DIR", env = "XPDB_PROBE_CERTS_DIR", global = true)]
    pub probe_certs_dir: Option<PathBuf>,

    /// YAML snapshot of pods, budgets and workloads
    #[arg(long, value_name = "FILE", env = "XPDB_CLUSTER_STATE_FILE", global = true)]
    pub cluster_state_file: Option<PathBuf>,
}

impl SettingsOverrides {
    /// Apply every value that was given
    pub fn apply(&self, settings: &mut Settings) -> Result<(), ConfigError> {
        if let Some(ref v) = self.cluster_id {
            settings.cluster_id = v.clone();
        }
        if let Some(ref v) = self.pod_id {
            settings.pod_id = v.clone();
        }
        if let Some(ref v) = self.lease_namespace {
            settings.lease_namespace = v.clone();
        }
        if let Some(v) = self.lease_duration_secs {
            settings.lease_duration_secs = v;
        }
        if let Some(ref v) = self.remote_endpoints {
            settings.remote_endpoints = parse_endpoints(v)?;
        }
        if let Some(v) = self.remote_timeout_ms {
            settings.remote_timeout_ms = v;
        }
        if let Some(v) = self.probe_timeout_ms {
            settings.probe_timeout_ms = v;
        }
        if let Some(v) = self.admission_timeout_ms {
            settings.admission_timeout_ms = v;
        }
        if self.dry_run {
            settings.dry_run = true;
        }
        if let Some(ref v) = self.webhook_addr {
            settings.webhook_addr = v.clone();
        }
        if let Some(ref v) = self.state_addr {
            settings.state_addr = v.clone();
        }
        if let Some(ref v) = self.state_certs_dir {
            settings.state_certs_dir = Some(v.clone());
        }
        if let Some(ref v) = self.probe_certs_dir {
            settings.probe_certs_dir = Some(v.clone());
        }
        if let Some(ref v) = self.cluster_state_file {
            settings.cluster_state_file = Some(v.clone());
        }
        Ok(())
    }
}

/// Default log filter for a `-v` count
pub fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
