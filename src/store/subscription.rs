//! Subscription Store (spec §4.6), grounded on
//! `original_source/redis_protocol/kalshi_store/subscription_helpers/`
//! (`market_subscription_manager.py`, `subscription_id_manager.py`) and
//! `reader_helpers/snapshotreader_helpers/subscription_retriever.py`.

use crate::error::CoreError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Accepted shapes for `update_service_status` (spec §4.6: "either a string
/// or a `{status: ...}` mapping").
#[derive(Debug, Clone)]
pub enum ServiceStatus {
    Value(String),
    Mapping(JsonValue),
}

impl From<&str> for ServiceStatus {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for ServiceStatus {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<JsonValue> for ServiceStatus {
    fn from(value: JsonValue) -> Self {
        Self::Mapping(value)
    }
}

impl ServiceStatus {
    /// Extracts the stored status string: the value itself if a plain
    /// string, or its `status` field if a mapping. Anything else (missing
    /// field, non-string field, non-string non-mapping input) falls back
    /// to `"unknown"`.
    fn resolve(&self) -> String {
        match self {
            Self::Value(value) => value.clone(),
            Self::Mapping(mapping) => mapping
                .get("status")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

pub const SUBSCRIPTIONS_KEY: &str = "ops:subscriptions:kalshi";
pub const SUBSCRIBED_MARKETS_SET: &str = "subscribed_markets";

/// Per-service subscription bookkeeping (spec §4.6). `service_prefix`
/// namespaces every field this instance owns within the shared
/// subscriptions hash (e.g. `"rest"` or `"ws"`).
pub struct SubscriptionStore {
    conn: ConnectionManager,
    service_prefix: String,
}

impl SubscriptionStore {
    pub fn new(conn: ConnectionManager, service_prefix: impl Into<String>) -> Self {
        Self { conn, service_prefix: service_prefix.into() }
    }

    fn field_for(&self, ticker: &str) -> String {
        format!("{}:{ticker}", self.service_prefix)
    }

    /// Tickers subscribed under this service's prefix, where the stored
    /// value is the literal `"1"`.
    pub async fn get_subscribed_markets(&mut self) -> Result<HashSet<String>, CoreError> {
        let all: Vec<(String, String)> =
            self.conn.hgetall(SUBSCRIPTIONS_KEY).await.map_err(|e| CoreError::store(SUBSCRIPTIONS_KEY, e.to_string()))?;
        let prefix = format!("{}:", self.service_prefix);
        Ok(all
            .into_iter()
            .filter_map(|(key, value)| {
                (value == "1").then(|| key.strip_prefix(&prefix).map(str::to_string)).flatten()
            })
            .collect())
    }

    pub async fn add_subscribed_market(&mut self, ticker: &str) -> Result<(), CoreError> {
        let field = self.field_for(ticker);
        let _: () = self
            .conn
            .hset(SUBSCRIPTIONS_KEY, &field, "1")
            .await
            .map_err(|e| CoreError::store(SUBSCRIPTIONS_KEY, format!("failed to add {ticker}: {e}")))?;
        let _: () = self
            .conn
            .sadd(SUBSCRIBED_MARKETS_SET, ticker)
            .await
            .map_err(|e| CoreError::store(SUBSCRIBED_MARKETS_SET, format!("failed to add {ticker}: {e}")))?;
        Ok(())
    }

    pub async fn remove_subscribed_market(&mut self, ticker: &str) -> Result<(), CoreError> {
        let field = self.field_for(ticker);
        let _: () = self
            .conn
            .hdel(SUBSCRIPTIONS_KEY, &field)
            .await
            .map_err(|e| CoreError::store(SUBSCRIPTIONS_KEY, format!("failed to remove {ticker}: {e}")))?;
        Ok(())
    }

    /// Persists vendor-assigned subscription IDs, skipping tickers with no
    /// ID and doing nothing if the mapping is empty.
    pub async fn record_subscription_ids(&mut self, ids_key: &str, subscriptions: &[(String, String)]) -> Result<(), CoreError> {
        if subscriptions.is_empty() {
            return Ok(());
        }
        let mapping: Vec<(String, String)> =
            subscriptions.iter().map(|(market, sub_id)| (self.field_for(market), sub_id.clone())).collect();
        let _: () = self
            .conn
            .hset_multiple(ids_key, &mapping)
            .await
            .map_err(|e| CoreError::store(ids_key, format!("failed to record subscription ids: {e}")))?;
        Ok(())
    }

    pub async fn fetch_subscription_ids(&mut self, ids_key: &str, markets: &[String]) -> Result<Vec<(String, String)>, CoreError> {
        if markets.is_empty() {
            return Ok(Vec::new());
        }
        let fields: Vec<String> = markets.iter().map(|m| self.field_for(m)).collect();
        let raw: Vec<Option<String>> =
            self.conn.hget(ids_key, &fields).await.map_err(|e| CoreError::store(ids_key, format!("failed to fetch subscription ids: {e}")))?;
        Ok(markets.iter().cloned().zip(raw).filter_map(|(market, value)| value.map(|v| (market, v))).collect())
    }

    /// Writes `status` under `service` in the service-status hash. `status`
    /// accepts either a plain string or a `{status: ...}` mapping, matching
    /// upstream callers that pass either shape.
    pub async fn update_service_status(
        &mut self,
        status_key: &str,
        service: &str,
        status: impl Into<ServiceStatus>,
    ) -> Result<(), CoreError> {
        let status_value = status.into().resolve();
        let _: () = self
            .conn
            .hset(status_key, service, &status_value)
            .await
            .map_err(|e| CoreError::store(status_key, format!("failed to update status for {service}: {e}")))?;
        Ok(())
    }

    /// Deletes every `kalshi:{prefix}:*` key and this prefix's subscription
    /// fields, plus clears its subscription-IDs hash, in one pipeline.
    pub async fn remove_service_keys(&mut self, ids_key: &str) -> Result<(), CoreError> {
        let pattern = format!("kalshi:{}:*", self.service_prefix);
        let service_keys: Vec<String> = self.conn.keys(&pattern).await.map_err(|e| CoreError::store(&pattern, e.to_string()))?;

        let all_subscriptions: Vec<(String, String)> =
            self.conn.hgetall(SUBSCRIPTIONS_KEY).await.map_err(|e| CoreError::store(SUBSCRIPTIONS_KEY, e.to_string()))?;
        let prefix = format!("{}:", self.service_prefix);
        let own_fields: Vec<String> = all_subscriptions.into_iter().map(|(k, _)| k).filter(|k| k.starts_with(&prefix)).collect();

        let mut pipeline = redis::pipe();
        pipeline.atomic();
        for key in &service_keys {
            pipeline.del(key).ignore();
        }
        if !own_fields.is_empty() {
            pipeline.hdel(SUBSCRIPTIONS_KEY, &own_fields).ignore();
        }
        pipeline.del(ids_key).ignore();

        pipeline.query_async::<()>(&mut self.conn).await.map_err(|e| CoreError::store(&pattern, format!("failed to remove service keys: {e}")))?;
        Ok(())
    }

    /// Pipelines the full removal of a market: its set membership, its
    /// subscription field, its market hash, and its snapshot.
    pub async fn remove_market_completely(&mut self, ticker: &str, market_hash_key: &str, snapshot_key: &str) -> Result<(), CoreError> {
        let field = self.field_for(ticker);
        let mut pipeline = redis::pipe();
        pipeline.atomic();
        pipeline.srem(SUBSCRIBED_MARKETS_SET, ticker).ignore();
        pipeline.hdel(SUBSCRIPTIONS_KEY, &field).ignore();
        pipeline.del(market_hash_key).ignore();
        pipeline.del(snapshot_key).ignore();
        pipeline.query_async::<()>(&mut self.conn).await.map_err(|e| CoreError::store(ticker, format!("failed to remove market: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_the_documented_key_names() {
        assert_eq!(SUBSCRIPTIONS_KEY, "ops:subscriptions:kalshi");
        assert_eq!(SUBSCRIBED_MARKETS_SET, "subscribed_markets");
    }

    #[test]
    fn service_status_resolves_plain_string() {
        let status: ServiceStatus = "running".into();
        assert_eq!(status.resolve(), "running");
    }

    #[test]
    fn service_status_resolves_status_field_from_mapping() {
        let status: ServiceStatus = serde_json::json!({"status": "degraded", "detail": "slow"}).into();
        assert_eq!(status.resolve(), "degraded");
    }

    #[test]
    fn service_status_mapping_without_status_field_falls_back_to_unknown() {
        let status: ServiceStatus = serde_json::json!({"detail": "slow"}).into();
        assert_eq!(status.resolve(), "unknown");
    }
}
