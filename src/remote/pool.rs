use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{ClientError, TlsSettings};
use crate::metrics::SharedMetrics;

/// Everything a client needs to connect to one endpoint
pub struct ConnectContext {
    pub tls: TlsSettings,
    pub metrics: SharedMetrics,
}

/// A client bound to a single remote endpoint
pub trait EndpointClient: Send + Sync + Sized + 'static {
    fn connect(endpoint: &str, context: &ConnectContext) -> Result<Self, ClientError>;
}

/// Lazily populated cache of one client per endpoint string
///
/// Clients are never evicted; the number of endpoints is bounded by
/// configuration and budget probe declarations.
pub struct EndpointPool<C> {
    clients: Arc<DashMap<String, Arc<C>>>,
    context: Arc<ConnectContext>,
}

impl<C> Clone for EndpointPool<C> {
    fn clone(&self) -> Self {
        Self {
            clients: Arc::clone(&self.clients),
            context: Arc::clone(&self.context),
        }
    }
}

impl<C: EndpointClient> EndpointPool<C> {
    pub fn new(tls: TlsSettings, metrics: SharedMetrics) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            context: Arc::new(ConnectContext { tls, metrics }),
        }
    }

    /// Get the client for `endpoint`, creating it on first use
    pub fn get(&self, endpoint: &str) -> Result<Arc<C>, ClientError> {
        if let Some(client) = self.clients.get(endpoint) {
            return Ok(Arc::clone(client.value()));
        }

        // Two callers may race to create the same client; the first insert wins
        // and the loser's client is dropped.
        let client = Arc::new(C::connect(endpoint, &self.context)?);
        let entry = self
            .clients
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                debug!(endpoint = %endpoint, "Created client for remote endpoint");
                client
            });
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
