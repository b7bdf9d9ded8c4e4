//! State wire service
//!
//! Each cluster exposes its lock and pod-count operations to the other
//! clusters over HTTP/JSON. [`client::StateClient`] calls a remote state
//! server; [`server::create_state_router`] serves the local one.

pub mod client;
pub mod messages;
pub mod server;

pub use client::StateClient;
pub use server::{create_state_router, StateServerState};

use crate::remote::EndpointPool;

/// Pool of state clients keyed by remote endpoint
pub type StateClientPool = EndpointPool<StateClient>;
