//! Higher-level exchange operations (spec §4.3): thin orchestrators over
//! `RestTransport::api_request`, each doing fail-fast field validation on
//! the way back out. Grounded on
//! `original_source/common/kalshi_api/{portfolio,order}_operations.py` and
//! `client_helpers/{series,market_status,fills}_operations.py`.

use super::transport::RestTransport;
use super::types::*;
use crate::error::CoreError;
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub struct KalshiClient {
    transport: Arc<RestTransport>,
}

impl KalshiClient {
    pub fn new(transport: Arc<RestTransport>) -> Self {
        Self { transport }
    }

    pub async fn get_portfolio_balance(&self) -> Result<PortfolioBalance, CoreError> {
        let payload = self.transport.api_request("GET", "/trade-api/v2/portfolio/balance", None, None).await?;
        let balance_cents = require_i64(&payload, "balance")?;
        let updated_ts = require_i64(&payload, "updated_ts")?;
        let seconds = if updated_ts >= 10_i64.pow(12) { updated_ts / 1000 } else { updated_ts };
        let timestamp = chrono::DateTime::<chrono::Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| CoreError::validation("portfolio_balance", "invalid updated_ts"))?;
        Ok(PortfolioBalance { balance_cents, timestamp, currency: "USD".to_string() })
    }

    pub async fn get_portfolio_positions(&self) -> Result<Vec<PortfolioPosition>, CoreError> {
        let payload = self.transport.api_request("GET", "/trade-api/v2/portfolio/positions", None, None).await?;
        let raw = payload
            .get("market_positions")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| CoreError::validation("portfolio_positions", "missing 'market_positions' list"))?;

        raw.iter().map(parse_position_entry).collect()
    }

    pub async fn create_order(&self, request: &OrderRequest) -> Result<OrderResponse, CoreError> {
        let payload = request.to_payload()?;
        let created = self
            .transport
            .api_request("POST", "/trade-api/v2/portfolio/orders", None, Some(&payload))
            .await?;
        let order_id = require_str(&created, "order_id")?.to_string();
        self.get_order(&order_id, request.trade_rule.clone(), request.trade_reason.clone()).await
    }

    /// Submit a batch of orders, isolating per-order failures (spec §4.3:
    /// batch order failures never fail the whole batch).
    pub async fn batch_create_orders(&self, requests: &[OrderRequest]) -> Vec<BatchOrderResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = self.create_order(request).await;
            results.push(BatchOrderResult { client_order_id: request.client_order_id.clone(), outcome });
        }
        results
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<JsonValue, CoreError> {
        if order_id.is_empty() {
            return Err(CoreError::validation("cancel_order", "order_id must be provided"));
        }
        let path = format!("/trade-api/v2/portfolio/orders/{order_id}");
        self.transport.api_request("DELETE", &path, None, None).await
    }

    pub async fn get_order(
        &self,
        order_id: &str,
        trade_rule: Option<String>,
        trade_reason: Option<String>,
    ) -> Result<OrderResponse, CoreError> {
        if order_id.is_empty() {
            return Err(CoreError::validation("get_order", "order_id must be provided"));
        }
        let path = format!("/trade-api/v2/portfolio/orders/{order_id}");
        let payload = self.transport.api_request("GET", &path, None, None).await?;
        parse_order_response(&payload, trade_rule, trade_reason)
    }

    pub async fn get_fills(&self, order_id: &str) -> Result<Vec<OrderFill>, CoreError> {
        if order_id.is_empty() {
            return Err(CoreError::validation("get_fills", "order_id must be provided"));
        }
        let path = format!("/trade-api/v2/portfolio/orders/{order_id}/fills");
        let payload = self.transport.api_request("GET", &path, None, None).await?;
        let fills = payload
            .get("fills")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| CoreError::validation("get_fills", "response missing 'fills' list"))?;
        fills.iter().map(parse_order_fill).collect()
    }

    /// One page of all fills across orders, filtered server-side.
    pub async fn get_all_fills(
        &self,
        min_ts: Option<i64>,
        max_ts: Option<i64>,
        ticker: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<JsonValue, CoreError> {
        let mut params = Vec::new();
        if let Some(v) = min_ts {
            params.push(("min_ts", v.to_string()));
        }
        if let Some(v) = max_ts {
            params.push(("max_ts", v.to_string()));
        }
        if let Some(v) = ticker {
            params.push(("ticker", v.to_string()));
        }
        if let Some(v) = cursor {
            params.push(("cursor", v.to_string()));
        }
        self.transport.api_request("GET", "/trade-api/v2/portfolio/fills", Some(&params), None).await
    }

    pub async fn get_series(&self, category: Option<&str>) -> Result<Vec<JsonValue>, CoreError> {
        let mut params = Vec::new();
        if let Some(c) = category {
            params.push(("category", c.to_string()));
        }
        let payload = self.transport.api_request("GET", "/trade-api/v2/series", Some(&params), None).await?;
        payload
            .get("series")
            .and_then(JsonValue::as_array)
            .cloned()
            .ok_or_else(|| CoreError::validation("get_series", "response missing 'series' list"))
    }

    pub async fn get_exchange_status(&self) -> Result<ExchangeStatus, CoreError> {
        let payload = self.transport.api_request("GET", "/trade-api/v2/exchange/status", None, None).await?;
        let exchange_active = payload
            .get("exchange_active")
            .and_then(JsonValue::as_bool)
            .ok_or_else(|| CoreError::validation("exchange_status", "missing 'exchange_active'"))?;
        let trading_active = payload
            .get("trading_active")
            .and_then(JsonValue::as_bool)
            .ok_or_else(|| CoreError::validation("exchange_status", "missing 'trading_active'"))?;
        Ok(ExchangeStatus { exchange_active, trading_active })
    }

    pub async fn is_market_open(&self) -> Result<bool, CoreError> {
        Ok(self.get_exchange_status().await?.is_market_open())
    }

    pub async fn get_event(&self, event_ticker: &str) -> Result<JsonValue, CoreError> {
        if event_ticker.is_empty() {
            return Err(CoreError::validation("get_event", "event_ticker must be provided"));
        }
        let path = format!("/trade-api/v2/events/{event_ticker}");
        self.transport.api_request("GET", &path, None, None).await
    }

    /// One page of the open-markets listing, for catalog discovery.
    /// Returns the raw response (containing `markets` and an optional
    /// `cursor`) so the catalog fetcher controls pagination itself.
    pub async fn list_markets_page(&self, params: &[(&str, String)]) -> Result<JsonValue, CoreError> {
        self.transport.api_request("GET", "/trade-api/v2/markets", Some(params), None).await
    }

    /// Event details with nested markets, for catalog discovery. Returns
    /// `None` when the response has no `event` field.
    pub async fn get_event_details(&self, event_ticker: &str) -> Result<Option<JsonValue>, CoreError> {
        let path = format!("/trade-api/v2/events/{event_ticker}");
        let payload = self
            .transport
            .api_request("GET", &path, Some(&[("with_nested_markets", "true".to_string())]), None)
            .await?;
        Ok(payload.get("event").cloned())
    }
}

fn parse_position_entry(item: &JsonValue) -> Result<PortfolioPosition, CoreError> {
    if !item.is_object() {
        return Err(CoreError::validation("portfolio_positions", "position entry was not a JSON object"));
    }
    let ticker = require_str(item, "ticker")?.to_string();
    let position_count = require_i64(item, "position")?;
    let side = OrderSide::parse(require_str(item, "side")?)?;
    let market_value_cents = optional_i64(item, "market_value").unwrap_or(0);
    let unrealized_pnl_cents = optional_i64(item, "unrealized_pnl").unwrap_or(0);
    let average_price_cents = item
        .get("average_price")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| CoreError::validation("portfolio_positions", "position missing 'average_price'"))?;

    Ok(PortfolioPosition {
        ticker,
        position_count,
        side,
        market_value_cents,
        unrealized_pnl_cents,
        average_price_cents,
        last_updated: chrono::Utc::now(),
    })
}

fn parse_order_fill(item: &JsonValue) -> Result<OrderFill, CoreError> {
    let price_cents = require_i64(item, "price")?;
    let count = require_i64(item, "count")?;
    let timestamp = require_timestamp(item, "timestamp")?;
    Ok(OrderFill { price_cents, count, timestamp })
}

fn parse_order_response(
    payload: &JsonValue,
    trade_rule: Option<String>,
    trade_reason: Option<String>,
) -> Result<OrderResponse, CoreError> {
    let order_id = require_str(payload, "order_id")?.to_string();
    let client_order_id = require_str(payload, "client_order_id")?.to_string();
    let status = OrderStatus::parse(require_str(payload, "status")?)?;
    let ticker = require_str(payload, "ticker")?.to_string();
    let side = OrderSide::parse(require_str(payload, "side")?)?;
    let action = OrderAction::parse(require_str(payload, "action")?)?;
    let order_type = OrderType::parse(require_str(payload, "type")?)?;
    let filled_count = require_i64(payload, "filled_count")?;
    let remaining_count = require_i64(payload, "remaining_count")?;
    let fees_cents = require_i64(payload, "fees")?;
    let timestamp = require_timestamp(payload, "timestamp")?;
    let average_fill_price_cents = optional_i64(payload, "average_fill_price");
    let fills = payload
        .get("fills")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| CoreError::validation("order_response", "missing 'fills' list"))?
        .iter()
        .map(parse_order_fill)
        .collect::<Result<Vec<_>, _>>()?;
    let rejection_reason = payload.get("rejection_reason").and_then(JsonValue::as_str).map(String::from);

    Ok(OrderResponse {
        order_id,
        client_order_id,
        status,
        ticker,
        side,
        action,
        order_type,
        filled_count,
        remaining_count,
        average_fill_price_cents,
        timestamp,
        fees_cents,
        fills,
        trade_rule,
        trade_reason,
        rejection_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest_client::config::RestClientConfig;
    use crate::rest_client::signer::RsaPssSigner;
    use rsa::RsaPrivateKey;

    fn signer() -> RsaPssSigner {
        let key = RsaPrivateKey::new(&mut rsa::signature::rand_core::OsRng, 2048).unwrap();
        RsaPssSigner::new("access-key", key)
    }

    #[tokio::test]
    async fn get_exchange_status_parses_booleans() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/trade-api/v2/exchange/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"exchange_active": true, "trading_active": false}"#)
            .create_async()
            .await;

        let config = RestClientConfig::new(server.url(), "key");
        let client = KalshiClient::new(Arc::new(RestTransport::new(config, signer())));
        let status = client.get_exchange_status().await.unwrap();
        assert!(status.exchange_active);
        assert!(!status.trading_active);
        assert!(!status.is_market_open());
    }

    #[tokio::test]
    async fn get_portfolio_balance_rejects_missing_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/trade-api/v2/portfolio/balance")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"updated_ts": 1700000000}"#)
            .create_async()
            .await;

        let config = RestClientConfig::new(server.url(), "key");
        let client = KalshiClient::new(Arc::new(RestTransport::new(config, signer())));
        let err = client.get_portfolio_balance().await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn cancel_order_rejects_empty_order_id() {
        let config = RestClientConfig::new("http://127.0.0.1:9", "key");
        let client = KalshiClient::new(Arc::new(RestTransport::new(config, signer())));
        let err = client.cancel_order("").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}
