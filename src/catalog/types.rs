//! Catalog data model (spec §3 / §4.4): `DiscoveredMarket` and
//! `DiscoveredEvent`, mirroring `original_source/kalshi_catalog/types.py`'s
//! field set with constructor-time invariant checks instead of dataclasses.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// Which bucket a market/event falls into for filtering purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Crypto,
    Weather,
    Other,
}

/// A single market surviving strike validation and window filtering.
#[derive(Debug, Clone)]
pub struct DiscoveredMarket {
    pub ticker: String,
    pub event_ticker: String,
    pub close_time: DateTime<Utc>,
    pub floor_strike: Option<f64>,
    pub cap_strike: Option<f64>,
    pub raw: JsonValue,
}

impl DiscoveredMarket {
    /// Builds a market from its raw JSON payload, enforcing the strike
    /// invariant: at least one of floor/cap present, and floor != cap when
    /// both are.
    pub fn from_raw(raw: JsonValue) -> Result<Self, CoreError> {
        let ticker = require_str(&raw, "ticker")?.to_uppercase();
        let event_ticker = require_str(&raw, "event_ticker")?.to_string();
        let close_time = require_timestamp(&raw, "close_time")?;
        let floor_strike = raw.get("floor_strike").and_then(JsonValue::as_f64);
        let cap_strike = raw.get("cap_strike").and_then(JsonValue::as_f64);

        if floor_strike.is_none() && cap_strike.is_none() {
            return Err(CoreError::validation(
                "discovered_market",
                format!("market {ticker} has neither floor_strike nor cap_strike"),
            ));
        }
        if let (Some(floor), Some(cap)) = (floor_strike, cap_strike) {
            if floor == cap {
                return Err(CoreError::validation(
                    "discovered_market",
                    format!("market {ticker} has floor_strike == cap_strike ({floor})"),
                ));
            }
        }

        Ok(Self { ticker, event_ticker, close_time, floor_strike, cap_strike, raw })
    }

    pub fn is_within_window(&self, now: DateTime<Utc>, window_seconds: i64) -> bool {
        let deadline = now + chrono::Duration::seconds(window_seconds);
        self.close_time >= now && self.close_time <= deadline
    }
}

/// A validated mutually-exclusive event with its filtered market set.
#[derive(Debug, Clone)]
pub struct DiscoveredEvent {
    pub event_ticker: String,
    pub title: String,
    pub category: Category,
    pub mutually_exclusive: bool,
    pub markets: Vec<DiscoveredMarket>,
}

impl DiscoveredEvent {
    /// Builds an event from its raw JSON payload and an already-filtered
    /// market set, enforcing the minimum-markets and shared-ticker
    /// invariants (spec §3).
    pub fn new(
        raw: &JsonValue,
        category: Category,
        markets: Vec<DiscoveredMarket>,
        min_markets_per_event: usize,
    ) -> Result<Self, CoreError> {
        let event_ticker = require_str(raw, "event_ticker")?.to_string();
        let title = raw.get("title").and_then(JsonValue::as_str).unwrap_or_default().to_string();
        let mutually_exclusive = raw.get("mutually_exclusive").and_then(JsonValue::as_bool).unwrap_or(false);

        if markets.len() < min_markets_per_event {
            return Err(CoreError::discovery(format!(
                "event {event_ticker} has {} markets, fewer than the minimum {min_markets_per_event}",
                markets.len()
            )));
        }
        if markets.iter().any(|m| m.event_ticker != event_ticker) {
            return Err(CoreError::discovery(format!(
                "event {event_ticker} has a market tagged with a different event_ticker"
            )));
        }

        Ok(Self { event_ticker, title, category, mutually_exclusive, markets })
    }
}

pub(crate) fn require_str<'a>(payload: &'a JsonValue, field: &str) -> Result<&'a str, CoreError> {
    payload
        .get(field)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CoreError::validation("catalog", format!("missing or non-string field '{field}'")))
}

pub(crate) fn require_timestamp(payload: &JsonValue, field: &str) -> Result<DateTime<Utc>, CoreError> {
    let raw = payload
        .get(field)
        .ok_or_else(|| CoreError::validation("catalog", format!("missing field '{field}'")))?;
    if let Some(seconds) = raw.as_i64() {
        return DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| CoreError::validation("catalog", format!("invalid timestamp in '{field}'")));
    }
    if let Some(s) = raw.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CoreError::validation("catalog", format!("invalid timestamp '{s}': {e}")));
    }
    Err(CoreError::validation("catalog", format!("field '{field}' was not a timestamp")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market_json(ticker: &str, floor: Option<f64>, cap: Option<f64>) -> JsonValue {
        json!({
            "ticker": ticker,
            "event_ticker": "BTC-24JUN30",
            "close_time": "2026-06-30T00:00:00Z",
            "floor_strike": floor,
            "cap_strike": cap,
        })
    }

    #[test]
    fn market_requires_at_least_one_strike_bound() {
        let err = DiscoveredMarket::from_raw(market_json("btc-foo", None, None)).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn market_rejects_equal_floor_and_cap() {
        let err = DiscoveredMarket::from_raw(market_json("btc-foo", Some(10.0), Some(10.0))).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn market_ticker_is_upper_cased() {
        let market = DiscoveredMarket::from_raw(market_json("btc-foo", Some(10.0), None)).unwrap();
        assert_eq!(market.ticker, "BTC-FOO");
    }

    #[test]
    fn event_rejects_fewer_markets_than_minimum() {
        let raw = json!({"event_ticker": "BTC-24JUN30", "title": "BTC", "mutually_exclusive": true});
        let market = DiscoveredMarket::from_raw(market_json("btc-foo", Some(10.0), None)).unwrap();
        let err = DiscoveredEvent::new(&raw, Category::Crypto, vec![market], 2).unwrap_err();
        assert!(matches!(err, CoreError::Discovery { .. }));
    }
}
