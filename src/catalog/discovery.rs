//! `discover_mutually_exclusive_markets`: the Market Catalog Pipeline's
//! entry point (spec §4.4), grounded on
//! `original_source/kalshi_catalog/discovery.py`.

use super::filter::{classify, is_valid_crypto_strike_type, is_valid_crypto_ticker, weather_station_token};
use super::types::{Category, DiscoveredEvent, DiscoveredMarket};
use super::{fetcher, CatalogConfig};
use crate::error::CoreError;
use crate::rest_client::KalshiClient;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reports pipeline progress for callers that want to surface it (spec
/// §4.4's optional `progress` callback).
pub trait DiscoveryProgress: Send + Sync {
    fn on_markets_fetched(&self, _count: usize) {}
    fn on_events_fetched(&self, _count: usize) {}
    fn on_events_emitted(&self, _count: usize) {}
}

/// A no-op progress sink, used when the caller doesn't care.
pub struct NoProgress;
impl DiscoveryProgress for NoProgress {}

/// Fetches open markets, batches their event details, filters to
/// mutually-exclusive events with valid strikes, and emits the surviving
/// set. See spec §4.4 for the full algorithm.
pub async fn discover_mutually_exclusive_markets(
    client: Arc<KalshiClient>,
    config: &CatalogConfig,
    progress: &dyn DiscoveryProgress,
) -> Result<Vec<DiscoveredEvent>, CoreError> {
    let now = Utc::now();

    let raw_markets = fetcher::fetch_open_markets(&client, now, config.expiry_window_seconds).await?;
    progress.on_markets_fetched(raw_markets.len());

    let mut markets_by_event: HashMap<String, Vec<JsonValue>> = HashMap::new();
    for raw in raw_markets {
        let Some(event_ticker) = raw.get("event_ticker").and_then(JsonValue::as_str) else {
            continue;
        };
        let close_time = raw.get("close_time").and_then(JsonValue::as_str).and_then(|s| {
            DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
        });
        let within_window = close_time
            .map(|t| t >= now && t <= now + chrono::Duration::seconds(config.expiry_window_seconds))
            .unwrap_or(false);
        if within_window {
            markets_by_event.entry(event_ticker.to_string()).or_default().push(raw);
        }
    }

    let event_tickers: Vec<String> = markets_by_event.keys().cloned().collect();
    let event_details = fetcher::fetch_event_details(Arc::clone(&client), &event_tickers).await;
    progress.on_events_fetched(event_details.len());

    let stations = super::filter::load_weather_stations(config.weather_station_mapping_path.as_deref());

    let mut emitted = Vec::new();
    for event_raw in event_details {
        let Some(event_ticker) = event_raw.get("event_ticker").and_then(JsonValue::as_str) else {
            tracing::warn!("event details payload missing event_ticker; dropping");
            continue;
        };
        let mutually_exclusive = event_raw.get("mutually_exclusive").and_then(JsonValue::as_bool).unwrap_or(false);
        if !mutually_exclusive {
            continue;
        }

        let candidates = match markets_by_event.get(event_ticker) {
            Some(candidates) => candidates,
            None => continue,
        };

        let category = classify(event_ticker);
        let valid_markets = filter_markets(candidates, category, &stations, now, config.expiry_window_seconds);

        match DiscoveredEvent::new(&event_raw, category, valid_markets, config.min_markets_per_event) {
            Ok(event) => emitted.push(event),
            Err(e) => {
                tracing::debug!(event_ticker, error = %e, "event dropped during validation");
            }
        }
    }

    if emitted.is_empty() {
        return Err(CoreError::discovery("no mutually-exclusive events survived filtering"));
    }

    progress.on_events_emitted(emitted.len());
    Ok(emitted)
}

fn filter_markets(
    candidates: &[JsonValue],
    category: Category,
    stations: &HashSet<String>,
    now: DateTime<Utc>,
    window_seconds: i64,
) -> Vec<DiscoveredMarket> {
    candidates
        .iter()
        .filter_map(|raw| {
            let market = DiscoveredMarket::from_raw(raw.clone()).ok()?;
            if !market.is_within_window(now, window_seconds) {
                return None;
            }
            if !category_allows(category, &market, stations) {
                return None;
            }
            Some(market)
        })
        .collect()
}

fn category_allows(category: Category, market: &DiscoveredMarket, stations: &HashSet<String>) -> bool {
    match category {
        Category::Crypto => {
            if !is_valid_crypto_ticker(&market.ticker) {
                return false;
            }
            market
                .raw
                .get("strike_type")
                .and_then(JsonValue::as_str)
                .map(is_valid_crypto_strike_type)
                .unwrap_or(true)
        }
        Category::Weather => match weather_station_token(&market.ticker) {
            Some(station) => stations.contains(&station),
            None => false,
        },
        Category::Other => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest_client::{RestClientConfig, RestTransport};
    use rsa::RsaPrivateKey;

    fn test_client(base_url: &str) -> Arc<KalshiClient> {
        let key = RsaPrivateKey::new(&mut rsa::signature::rand_core::OsRng, 2048).unwrap();
        let signer = crate::rest_client::RsaPssSigner::new("access-key", key);
        let mut config = RestClientConfig::new(base_url, "access-key");
        config.max_retries = 1;
        let transport = Arc::new(RestTransport::new(config, signer));
        Arc::new(KalshiClient::new(transport))
    }

    #[tokio::test]
    async fn empty_filtered_set_raises_discovery_error() {
        let mut server = mockito::Server::new_async().await;
        let _markets = server
            .mock("GET", "/trade-api/v2/markets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"markets": []}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let config = CatalogConfig { expiry_window_seconds: 3600, min_markets_per_event: 2, weather_station_mapping_path: None };
        let err = discover_mutually_exclusive_markets(client, &config, &NoProgress).await.unwrap_err();
        assert!(matches!(err, CoreError::Discovery { .. }));
    }

    #[tokio::test]
    async fn mutually_exclusive_event_with_enough_markets_is_emitted() {
        let now = Utc::now();
        let close_time = (now + chrono::Duration::seconds(60)).to_rfc3339();
        let market_body = serde_json::json!({
            "markets": [
                {"ticker": "INXD-A", "event_ticker": "INXD-EVT", "close_time": close_time, "floor_strike": 10.0},
                {"ticker": "INXD-B", "event_ticker": "INXD-EVT", "close_time": close_time, "cap_strike": 20.0},
            ]
        });

        let mut server = mockito::Server::new_async().await;
        let _markets = server
            .mock("GET", "/trade-api/v2/markets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(market_body.to_string())
            .create_async()
            .await;
        let _event = server
            .mock("GET", "/trade-api/v2/events/INXD-EVT")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"event": {"event_ticker": "INXD-EVT", "title": "INXD", "mutually_exclusive": true}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let config = CatalogConfig { expiry_window_seconds: 3600, min_markets_per_event: 2, weather_station_mapping_path: None };
        let events = discover_mutually_exclusive_markets(client, &config, &NoProgress).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].markets.len(), 2);
    }
}
