//! REST specialization of `ConnectionHandler` (spec §4.2, §4.1 table row
//! "REST"): a pooled `reqwest::Client` with connect/read/total timeouts, a
//! GET-based health probe, and a pluggable request signer.

use super::handler::ConnectionHandler;
use crate::error::CoreError;
use crate::health::HealthCheckResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;

/// Hook for request signing (e.g. the exchange REST client's RSA-PSS
/// signer). The default `NoopSigner` leaves requests untouched.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
    }
}

#[derive(Debug, Default)]
pub struct NoopSigner;
impl RequestSigner for NoopSigner {}

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub service_name: String,
    pub base_url: String,
    pub health_check_path: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl RestConfig {
    pub fn new(service_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            base_url: base_url.into(),
            health_check_path: "/".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_health_check_path(mut self, path: impl Into<String>) -> Self {
        self.health_check_path = path.into();
        self
    }
}

/// Pooled REST session handler. `establish` builds the `reqwest::Client`;
/// `cleanup` drops it, returning pooled connections to the OS within
/// reqwest's own idle-timeout.
pub struct RestConnectionHandler {
    config: RestConfig,
    client: RwLock<Option<reqwest::Client>>,
}

impl RestConnectionHandler {
    pub fn new(config: RestConfig) -> Self {
        Self { config, client: RwLock::new(None) }
    }

    /// Borrow the pooled client for a request. Returns `Transport` if
    /// `establish` has not (yet) succeeded.
    pub async fn client(&self) -> Result<reqwest::Client, CoreError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| CoreError::transport(&self.config.service_name, "client not established"))
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[async_trait]
impl ConnectionHandler for RestConnectionHandler {
    async fn establish(&self) -> Result<(), CoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| CoreError::transport(&self.config.service_name, e.to_string()))?;
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn check_health(&self) -> HealthCheckResult {
        let client = match self.client.read().await.clone() {
            Some(c) => c,
            None => return HealthCheckResult::unhealthy("client not established"),
        };
        let url = format!("{}{}", self.config.base_url, self.config.health_check_path);
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                HealthCheckResult::healthy().with_detail("status", resp.status().as_u16())
            }
            Ok(resp) => HealthCheckResult::unhealthy(format!("unhealthy status {}", resp.status())),
            Err(e) => HealthCheckResult::unhealthy(e.to_string()),
        }
    }

    async fn cleanup(&self) {
        *self.client.write().await = None;
    }

    fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn establish_then_cleanup_round_trips() {
        let handler =
            RestConnectionHandler::new(RestConfig::new("svc", "http://127.0.0.1:9"));
        assert!(handler.client().await.is_err());
        handler.establish().await.unwrap();
        assert!(handler.client().await.is_ok());
        handler.cleanup().await;
        assert!(handler.client().await.is_err());
    }

    #[tokio::test]
    async fn health_check_unestablished_is_unhealthy() {
        let handler =
            RestConnectionHandler::new(RestConfig::new("svc", "http://127.0.0.1:9"));
        let result = handler.check_health().await;
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn health_check_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/health").with_status(200).create_async().await;

        let handler = RestConnectionHandler::new(
            RestConfig::new("svc", server.url()).with_health_check_path("/health"),
        );
        handler.establish().await.unwrap();
        let result = handler.check_health().await;
        assert!(result.healthy);
        mock.assert_async().await;
    }
}
