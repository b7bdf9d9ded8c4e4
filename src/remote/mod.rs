//! Remote endpoints
//!
//! HTTP plumbing shared by the state client and the disruption probe client:
//! TLS material, JSON calls, the per-endpoint client pool and the concurrent
//! fan-out used for cross-cluster lock and state requests.

mod fanout;
mod pool;

pub use fanout::{fan_out, EndpointFailure, FanOutError};
pub use pool::{ConnectContext, EndpointClient, EndpointPool};

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const CA_CERT_FILE: &str = "ca.crt";
pub const CLIENT_CERT_FILE: &str = "tls.crt";
pub const CLIENT_KEY_FILE: &str = "tls.key";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("{0}")]
    Rejected(String),
}

/// Certificate material for outbound connections
///
/// With a certs directory set, `ca.crt` is trusted as the only root and, when
/// `client_identity` is on, `tls.crt`/`tls.key` are presented as the client
/// certificate. Without one, endpoints are reached over plain HTTP.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub certs_dir: Option<PathBuf>,
    pub client_identity: bool,
}

impl TlsSettings {
    pub fn plaintext() -> Self {
        Self::default()
    }

    /// Mutual TLS: trust `ca.crt`, present `tls.crt`/`tls.key`
    pub fn mutual(certs_dir: impl Into<PathBuf>) -> Self {
        Self {
            certs_dir: Some(certs_dir.into()),
            client_identity: true,
        }
    }

    /// Server-authenticated TLS: trust `ca.crt` only
    pub fn server_only(certs_dir: impl Into<PathBuf>) -> Self {
        Self {
            certs_dir: Some(certs_dir.into()),
            client_identity: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.certs_dir.is_some()
    }
}

fn read_pem(dir: &std::path::Path, file: &str) -> Result<Vec<u8>, ClientError> {
    let path = dir.join(file);
    std::fs::read(&path)
        .map_err(|e| ClientError::Tls(format!("failed to read {}: {}", path.display(), e)))
}

/// Build an HTTP client honouring the TLS settings
pub fn build_http_client(tls: &TlsSettings) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder();

    if let Some(dir) = &tls.certs_dir {
        let ca = reqwest::Certificate::from_pem(&read_pem(dir, CA_CERT_FILE)?)
            .map_err(|e| ClientError::Tls(e.to_string()))?;
        builder = builder
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .min_tls_version(reqwest::tls::Version::TLS_1_2);

        if tls.client_identity {
            let mut pem = read_pem(dir, CLIENT_CERT_FILE)?;
            pem.extend_from_slice(b"\n");
            pem.extend_from_slice(&read_pem(dir, CLIENT_KEY_FILE)?);
            let identity =
                reqwest::Identity::from_pem(&pem).map_err(|e| ClientError::Tls(e.to_string()))?;
            builder = builder.identity(identity);
        }
    }

    builder.build().map_err(|e| ClientError::Http(e.to_string()))
}

/// Normalise an endpoint into a base URL
///
/// Bare `host:port` endpoints get `https://` when TLS is configured and
/// `http://` otherwise.
pub fn base_url(endpoint: &str, tls: &TlsSettings) -> Result<String, ClientError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ClientError::InvalidEndpoint(endpoint.to_string()));
    }
    if endpoint.contains("://") {
        return Ok(endpoint.trim_end_matches('/').to_string());
    }
    let scheme = if tls.is_enabled() { "https" } else { "http" };
    Ok(format!("{}://{}", scheme, endpoint.trim_end_matches('/')))
}

/// POST a JSON body and decode a JSON response
///
/// Non-2xx responses become [`ClientError::Api`] carrying the response body.
pub async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    url: &str,
    body: &Req,
) -> Result<Resp, ClientError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ClientError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: text,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let plain = TlsSettings::plaintext();
        let tls = TlsSettings::mutual("/etc/xpdb/certs");

        assert_eq!(base_url("b.example:9643", &plain).unwrap(), "http://b.example:9643");
        assert_eq!(base_url("b.example:9643", &tls).unwrap(), "https://b.example:9643");
        assert_eq!(
            base_url("http://127.0.0.1:9643/", &tls).unwrap(),
            "http://127.0.0.1:9643"
        );
        assert!(matches!(
            base_url("  ", &plain),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_missing_certs_is_tls_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_http_client(&TlsSettings::mutual(dir.path())).unwrap_err();
        assert!(matches!(err, ClientError::Tls(msg) if msg.contains("ca.crt")));
    }

    #[test]
    fn test_plaintext_client_builds() {
        assert!(build_http_client(&TlsSettings::plaintext()).is_ok());
    }
}
