//! Scraper specialization of `ConnectionHandler` (spec §4.1 table row
//! "Scraper"): fetches a fixed set of URLs through a pooled HTTP session,
//! validating each body with pluggable content validators. Healthy iff at
//! least half the configured URLs pass.

use super::handler::ConnectionHandler;
use crate::error::CoreError;
use crate::health::HealthCheckResult;
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::RwLock;

/// Validates a scraped body, e.g. "contains expected marker text" or "valid
/// JSON with the expected top-level keys".
pub trait ContentValidator: Send + Sync {
    fn validate(&self, body: &str) -> Result<(), String>;
}

/// Accepts any non-empty body.
#[derive(Debug, Default)]
pub struct NonEmptyValidator;
impl ContentValidator for NonEmptyValidator {
    fn validate(&self, body: &str) -> Result<(), String> {
        if body.trim().is_empty() {
            Err("empty body".to_string())
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub service_name: String,
    pub urls: Vec<String>,
    pub user_agent: String,
    pub accept_header: String,
    pub request_timeout: Duration,
}

impl ScraperConfig {
    pub fn new(service_name: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            service_name: service_name.into(),
            urls,
            user_agent: "kalshi-core-scraper/1.0".to_string(),
            accept_header: "text/html,application/json".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Result of scraping a single URL.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub url: String,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl ScrapeResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ScraperConnectionHandler {
    config: ScraperConfig,
    validator: Box<dyn ContentValidator>,
    client: RwLock<Option<reqwest::Client>>,
}

impl ScraperConnectionHandler {
    pub fn new(config: ScraperConfig, validator: Box<dyn ContentValidator>) -> Self {
        Self { config, validator, client: RwLock::new(None) }
    }

    async fn client(&self) -> Result<reqwest::Client, CoreError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| CoreError::transport(&self.config.service_name, "client not established"))
    }

    /// Fetch and validate a single URL. Errors are returned, not panicked
    /// on, so callers can isolate per-URL failures (spec §4.1: "per-URL
    /// error isolation").
    pub async fn scrape_url(&self, url: &str) -> ScrapeResult {
        let client = match self.client().await {
            Ok(c) => c,
            Err(e) => return ScrapeResult { url: url.to_string(), body: None, error: Some(e.to_string()) },
        };
        let response = client
            .get(url)
            .header("User-Agent", &self.config.user_agent)
            .header("Accept", &self.config.accept_header)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => match self.validator.validate(&body) {
                    Ok(()) => ScrapeResult { url: url.to_string(), body: Some(body), error: None },
                    Err(reason) => ScrapeResult { url: url.to_string(), body: None, error: Some(reason) },
                },
                Err(e) => ScrapeResult { url: url.to_string(), body: None, error: Some(e.to_string()) },
            },
            Ok(resp) => ScrapeResult {
                url: url.to_string(),
                body: None,
                error: Some(format!("unexpected status {}", resp.status())),
            },
            Err(e) => ScrapeResult { url: url.to_string(), body: None, error: Some(e.to_string()) },
        }
    }

    /// Fetch every configured URL concurrently, isolating per-URL failures.
    pub async fn scrape_all_urls(&self) -> Vec<ScrapeResult> {
        join_all(self.config.urls.iter().map(|url| self.scrape_url(url))).await
    }
}

#[async_trait]
impl ConnectionHandler for ScraperConnectionHandler {
    async fn establish(&self) -> Result<(), CoreError> {
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| CoreError::transport(&self.config.service_name, e.to_string()))?;
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn check_health(&self) -> HealthCheckResult {
        if self.config.urls.is_empty() {
            return HealthCheckResult::unhealthy("no urls configured");
        }
        let results = self.scrape_all_urls().await;
        let passing = results.iter().filter(|r| r.is_ok()).count();
        let required = (self.config.urls.len() + 1) / 2;
        if passing >= required {
            HealthCheckResult::healthy()
                .with_detail("passing", passing as i64)
                .with_detail("total", self.config.urls.len() as i64)
        } else {
            let failures: Vec<String> =
                results.iter().filter(|r| !r.is_ok()).filter_map(|r| r.error.clone()).collect();
            HealthCheckResult::unhealthy(format!(
                "only {passing}/{} urls passed: {}",
                self.config.urls.len(),
                failures.join("; ")
            ))
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
    async fn health_check_majority_pass_is_healthy() {
        let mut server = mockito::Server::new_async().await;
        let ok_mock = server.mock("GET", "/ok").with_status(200).with_body("content").create_async().await;
        let bad_mock = server.mock("GET", "/bad").with_status(500).create_async().await;

        let config = ScraperConfig::new(
            "svc",
            vec![format!("{}/ok", server.url()), format!("{}/bad", server.url())],
        );
        let handler = ScraperConnectionHandler::new(config, Box::new(NonEmptyValidator));
        handler.establish().await.unwrap();
        let result = handler.check_health().await;
        assert!(result.healthy);
        ok_mock.assert_async().await;
        bad_mock.assert_async().await;
    }

    #[tokio::test]
    async fn health_check_minority_pass_is_unhealthy() {
        let mut server = mockito::Server::new_async().await;
        let _bad1 = server.mock("GET", "/bad1").with_status(500).create_async().await;
        let _bad2 = server.mock("GET", "/bad2").with_status(500).create_async().await;
        let _ok = server.mock("GET", "/ok").with_status(200).with_body("content").create_async().await;

        let config = ScraperConfig::new(
            "svc",
            vec![
                format!("{}/bad1", server.url()),
                format!("{}/bad2", server.url()),
                format!("{}/ok", server.url()),
            ],
        );
        let handler = ScraperConnectionHandler::new(config, Box::new(NonEmptyValidator));
        handler.establish().await.unwrap();
        let result = handler.check_health().await;
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn empty_body_fails_validator() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/empty").with_status(200).with_body("").create_async().await;

        let config = ScraperConfig::new("svc", vec![format!("{}/empty", server.url())]);
        let handler = ScraperConnectionHandler::new(config, Box::new(NonEmptyValidator));
        handler.establish().await.unwrap();
        let result = handler.scrape_url(&handler.config.urls[0]).await;
        assert!(!result.is_ok());
    }
}
