//! How registrar commands reach the registrar.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::RegistrarError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Carries one command as query parameters and returns the raw body.
#[async_trait]
pub trait RegistrarTransport: Send + Sync {
    async fn get(&self, params: &[(String, String)]) -> Result<String, RegistrarError>;
}

/// Sends commands to the storefront's same-origin registrar proxy.
///
/// The proxy holds the registrar credential; this transport never sees it.
#[derive(Clone)]
pub struct ProxyTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl ProxyTransport {
    /// Create a transport for the proxy at `endpoint`
    /// (e.g. `http://127.0.0.1:3000/api/registrar`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RegistrarError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RegistrarTransport for ProxyTransport {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn get(&self, params: &[(String, String)]) -> Result<String, RegistrarError> {
        let response = self.client.get(&self.endpoint).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, bytes = body.len(), "Registrar proxy response");

        if !status.is_success() {
            return Err(RegistrarError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }
}
