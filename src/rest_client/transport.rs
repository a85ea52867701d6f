//! `api_request`: the single choke point every higher-level operation goes
//! through (spec §4.3). Validates the path, signs the request, retries on
//! 429 and transport errors with `min(base*2^(attempt-1), max)` backoff, and
//! validates the response is a JSON object with `status` in {200,201,202}.

use super::config::RestClientConfig;
use super::signer::RsaPssSigner;
use crate::error::CoreError;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

const SUCCESS_STATUSES: &[u16] = &[200, 201, 202];

pub struct RestTransport {
    config: RestClientConfig,
    signer: RsaPssSigner,
    client: RwLock<Option<reqwest::Client>>,
}

impl RestTransport {
    pub fn new(config: RestClientConfig, signer: RsaPssSigner) -> Self {
        Self { config, signer, client: RwLock::new(None) }
    }

    pub async fn initialize(&self) -> Result<(), CoreError> {
        if self.client.read().await.is_some() {
            return Ok(());
        }
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| CoreError::transport("kalshi", e.to_string()))?;
        *self.client.write().await = Some(client);
        Ok(())
    }

    pub async fn close(&self) {
        *self.client.write().await = None;
    }

    /// Execute one logical API call, retrying transport failures and 429s.
    /// `path` must start with `/`.
    pub async fn api_request(
        &self,
        method: &str,
        path: &str,
        params: Option<&[(&str, String)]>,
        json_body: Option<&JsonValue>,
    ) -> Result<JsonValue, CoreError> {
        if !path.starts_with('/') {
            return Err(CoreError::validation("rest_client", "path must begin with '/'"));
        }
        self.initialize().await?;

        let max_attempts = self.config.max_retries.max(1);
        let mut last_error: Option<CoreError> = None;

        for attempt in 1..=max_attempts {
            match self.try_once(method, path, params, json_body).await {
                Ok(TryOutcome::Done(value)) => return Ok(value),
                Ok(TryOutcome::RateLimited) => {
                    if attempt < max_attempts {
                        let delay = self.retry_delay(attempt);
                        tracing::debug!(path, attempt, max_attempts, delay, "rate limited; retrying");
                        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                        continue;
                    }
                    return Err(CoreError::RateLimit { service: "kalshi".to_string(), retry_after: None });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_attempts {
                        let delay = self.retry_delay(attempt);
                        tracing::warn!(path, attempt, max_attempts, delay, "request failed; retrying");
                        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::transport("kalshi", "request failed without error")))
    }

    fn retry_delay(&self, attempt: u32) -> f64 {
        let base = self.config.backoff_base_seconds.max(0.5);
        let max = self.config.backoff_max_seconds.max(base);
        (base * 2f64.powi((attempt - 1) as i32)).min(max)
    }

    async fn try_once(
        &self,
        method: &str,
        path: &str,
        params: Option<&[(&str, String)]>,
        json_body: Option<&JsonValue>,
    ) -> Result<TryOutcome, CoreError> {
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or_else(|| CoreError::transport("kalshi", "client not initialized"))?;

        let headers = self.signer.sign(method, path)?;
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = client
            .request(method.parse().map_err(|_| CoreError::validation("rest_client", "invalid HTTP method"))?, &url)
            .header("ACCESS-KEY", headers.access_key)
            .header("ACCESS-SIGNATURE", headers.signature_base64)
            .header("ACCESS-TIMESTAMP", headers.timestamp_millis);

        if let Some(p) = params {
            builder = builder.query(p);
        }
        if let Some(body) = json_body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| CoreError::transport("kalshi", e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Ok(TryOutcome::RateLimited);
        }

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| CoreError::transport("kalshi", e.to_string()))?;
        let payload: JsonValue = serde_json::from_str(&text)
            .map_err(|_| CoreError::validation("rest_client", format!("response for {path} was not JSON: {text}")))?;

        if !SUCCESS_STATUSES.contains(&status) {
            return Err(CoreError::validation(
                "rest_client",
                format!("request {path} returned {status}: {payload}"),
            ));
        }
        if !payload.is_object() {
            return Err(CoreError::validation("rest_client", format!("response for {path} was not a JSON object")));
        }

        Ok(TryOutcome::Done(payload))
    }
}

enum TryOutcome {
    Done(JsonValue),
    RateLimited,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    fn signer() -> RsaPssSigner {
        let key = RsaPrivateKey::new(&mut rsa::signature::rand_core::OsRng, 2048).unwrap();
        RsaPssSigner::new("access-key", key)
    }

    #[tokio::test]
    async fn rejects_paths_without_leading_slash() {
        let config = RestClientConfig::new("http://127.0.0.1:9", "key");
        let transport = RestTransport::new(config, signer());
        let err = transport.api_request("GET", "no-leading-slash", None, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn successful_request_returns_parsed_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade-api/v2/exchange/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"exchange_active": true, "trading_active": true}"#)
            .create_async()
            .await;

        let config = RestClientConfig::new(server.url(), "key");
        let transport = RestTransport::new(config, signer());
        let result = transport.api_request("GET", "/trade-api/v2/exchange/status", None, None).await.unwrap();
        assert_eq!(result["exchange_active"], JsonValue::Bool(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_object_json_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/trade-api/v2/series")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[1, 2, 3]")
            .create_async()
            .await;

        let config = RestClientConfig::new(server.url(), "key");
        let transport = RestTransport::new(config, signer());
        let err = transport.api_request("GET", "/trade-api/v2/series", None, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn unexpected_status_is_rejected_after_retries_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/trade-api/v2/portfolio/balance")
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "boom"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut config = RestClientConfig::new(server.url(), "key");
        config.max_retries = 1;
        let transport = RestTransport::new(config, signer());
        let err = transport.api_request("GET", "/trade-api/v2/portfolio/balance", None, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}
