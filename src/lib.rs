//! # xpdb
//!
//! Cross-cluster pod disruption budgets. Every participating cluster runs an
//! admission webhook that gates voluntary pod disruptions (evictions and
//! deletions) and a state server that lets the other clusters lock budgets and
//! read local pod health.
//!
//! ```text
//!            cluster A                         cluster B
//!  ┌──────────────────────────┐      ┌──────────────────────────┐
//!  │ admission webhook        │      │ admission webhook        │
//!  │   └─ lock / evaluate ────┼──────┼─▶ state server :9643     │
//!  │ state server :9643  ◀────┼──────┼─── lock / evaluate       │
//!  └──────────────────────────┘      └──────────────────────────┘
//! ```

pub mod app;
pub mod budget;
pub mod cli;
pub mod config;
pub mod events;
pub mod lock;
pub mod metrics;
pub mod preactivities;
pub mod probe;
pub mod remote;
pub mod resources;
pub mod scale;
pub mod selector;
pub mod server;
pub mod state;
pub mod store;
pub mod webhook;

/// Default admission webhook listen address
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:9443";

/// Default state server listen address
pub const DEFAULT_STATE_ADDR: &str = "0.0.0.0:9643";
