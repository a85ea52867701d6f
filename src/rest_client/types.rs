//! Trading data models for the exchange REST client (spec §4.3), mirroring
//! `original_source/common/data_models/trading.py`'s shape with Rust enums
//! and fail-fast field validation instead of dataclasses.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Yes,
    No,
}

impl OrderSide {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.to_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            other => Err(CoreError::validation("order_side", format!("unknown side '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(CoreError::validation("order_action", format!("unknown action '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.to_lowercase().as_str() {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            other => Err(CoreError::validation("order_type", format!("unknown order type '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Resting,
    Canceled,
    Executed,
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.to_lowercase().as_str() {
            "resting" => Ok(Self::Resting),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "executed" => Ok(Self::Executed),
            other => Err(CoreError::validation("order_status", format!("unknown status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub price_cents: i64,
    pub count: i64,
    pub timestamp: DateTime<Utc>,
}

/// A request to place a new order. `price_cents` is required for `Limit`
/// orders and ignored for `Market` orders.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: OrderSide,
    pub action: OrderAction,
    pub order_type: OrderType,
    pub count: i64,
    pub price_cents: Option<i64>,
    pub client_order_id: String,
    pub trade_rule: Option<String>,
    pub trade_reason: Option<String>,
}

impl OrderRequest {
    /// Build the JSON body the exchange expects, failing fast if a `Limit`
    /// order is missing its price.
    pub fn to_payload(&self) -> Result<JsonValue, CoreError> {
        if self.order_type == OrderType::Limit && self.price_cents.is_none() {
            return Err(CoreError::validation("order_request", "limit orders require price_cents"));
        }
        let mut payload = serde_json::json!({
            "ticker": self.ticker,
            "side": self.side.as_str(),
            "action": self.action.as_str(),
            "type": self.order_type.as_str(),
            "count": self.count,
            "client_order_id": self.client_order_id,
        });
        if let Some(price) = self.price_cents {
            payload["yes_price"] = serde_json::json!(price);
        }
        Ok(payload)
    }
}

#[derive(Debug, Clone)]
pub struct OrderResponse {
    pub order_id: String,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub ticker: String,
    pub side: OrderSide,
    pub action: OrderAction,
    pub order_type: OrderType,
    pub filled_count: i64,
    pub remaining_count: i64,
    pub average_fill_price_cents: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub fees_cents: i64,
    pub fills: Vec<OrderFill>,
    pub trade_rule: Option<String>,
    pub trade_reason: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Outcome of one order within a `batch_create_orders` call — failures are
/// isolated per-order, never fatal to the whole batch (spec §4.3).
#[derive(Debug)]
pub struct BatchOrderResult {
    pub client_order_id: String,
    pub outcome: Result<OrderResponse, CoreError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioBalance {
    pub balance_cents: i64,
    pub timestamp: DateTime<Utc>,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPosition {
    pub ticker: String,
    pub position_count: i64,
    pub side: OrderSide,
    pub market_value_cents: i64,
    pub unrealized_pnl_cents: i64,
    pub average_price_cents: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeStatus {
    pub exchange_active: bool,
    pub trading_active: bool,
}

impl ExchangeStatus {
    pub fn is_market_open(&self) -> bool {
        self.exchange_active && self.trading_active
    }
}

pub(crate) fn require_str<'a>(payload: &'a JsonValue, field: &str) -> Result<&'a str, CoreError> {
    payload
        .get(field)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CoreError::validation("response_parser", format!("missing or non-string field '{field}'")))
}

pub(crate) fn require_i64(payload: &JsonValue, field: &str) -> Result<i64, CoreError> {
    payload
        .get(field)
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| CoreError::validation("response_parser", format!("missing or non-integer field '{field}'")))
}

pub(crate) fn optional_i64(payload: &JsonValue, field: &str) -> Option<i64> {
    payload.get(field).and_then(JsonValue::as_i64)
}

pub(crate) fn require_timestamp(payload: &JsonValue, field: &str) -> Result<DateTime<Utc>, CoreError> {
    let raw = payload
        .get(field)
        .ok_or_else(|| CoreError::validation("response_parser", format!("missing field '{field}'")))?;
    if let Some(seconds) = raw.as_i64() {
        return DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| CoreError::validation("response_parser", format!("invalid timestamp in '{field}'")));
    }
    if let Some(s) = raw.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CoreError::validation("response_parser", format!("invalid timestamp '{s}': {e}")));
    }
    Err(CoreError::validation("response_parser", format!("field '{field}' was not a timestamp")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_side_parse_is_case_insensitive() {
        assert_eq!(OrderSide::parse("YES").unwrap(), OrderSide::Yes);
        assert!(OrderSide::parse("maybe").is_err());
    }

    #[test]
    fn limit_order_without_price_fails_fast() {
        let request = OrderRequest {
            ticker: "FOO".into(),
            side: OrderSide::Yes,
            action: OrderAction::Buy,
            order_type: OrderType::Limit,
            count: 1,
            price_cents: None,
            client_order_id: "abc".into(),
            trade_rule: None,
            trade_reason: None,
        };
        assert!(request.to_payload().is_err());
    }

    #[test]
    fn market_order_payload_omits_price() {
        let request = OrderRequest {
            ticker: "FOO".into(),
            side: OrderSide::Yes,
            action: OrderAction::Buy,
            order_type: OrderType::Market,
            count: 1,
            price_cents: None,
            client_order_id: "abc".into(),
            trade_rule: None,
            trade_reason: None,
        };
        let payload = request.to_payload().unwrap();
        assert!(payload.get("yes_price").is_none());
    }
}
