//! Paginated market listing and concurrency-limited event-detail fetch
//! (spec §4.4), grounded on `original_source/kalshi_catalog/fetcher.py`.

use crate::error::CoreError;
use crate::rest_client::KalshiClient;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

const MAX_LIMIT: i64 = 100;
const MAX_CONCURRENT_REQUESTS: usize = 10;
const EVENT_DETAIL_BATCH_SIZE: usize = 100;

/// Fetches every open market closing within `window_seconds` of `now`,
/// paginating with a cursor and failing with a discovery error if any
/// cursor value is seen twice.
pub async fn fetch_open_markets(
    client: &KalshiClient,
    now: DateTime<Utc>,
    window_seconds: i64,
) -> Result<Vec<JsonValue>, CoreError> {
    let min_close_ts = now.timestamp();
    let max_close_ts = (now + chrono::Duration::seconds(window_seconds)).timestamp();

    let mut markets = Vec::new();
    let mut seen_cursors: HashSet<String> = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut params = vec![
            ("status", "open".to_string()),
            ("min_close_ts", min_close_ts.to_string()),
            ("max_close_ts", max_close_ts.to_string()),
            ("limit", MAX_LIMIT.to_string()),
        ];
        if let Some(c) = &cursor {
            params.push(("cursor", c.clone()));
        }

        let page = client.list_markets_page(&params).await?;
        let page_markets = page
            .get("markets")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| CoreError::discovery("markets page response missing 'markets' array"))?;
        markets.extend(page_markets.iter().cloned());

        let next_cursor = page.get("cursor").and_then(JsonValue::as_str).map(str::to_string);
        match next_cursor {
            Some(next) if !next.is_empty() => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(CoreError::discovery(format!(
                        "pagination error: received repeated cursor '{next}'"
                    )));
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }

    Ok(markets)
}

/// Fetches event details for each `event_ticker`, in batches of
/// [`EVENT_DETAIL_BATCH_SIZE`] with an outer concurrency limit of
/// [`MAX_CONCURRENT_REQUESTS`]. Per-event failures are logged and dropped.
pub async fn fetch_event_details(
    client: Arc<KalshiClient>,
    event_tickers: &[String],
) -> Vec<JsonValue> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));
    let mut details = Vec::new();

    for batch in event_tickers.chunks(EVENT_DETAIL_BATCH_SIZE) {
        let tasks = batch.iter().cloned().map(|ticker| {
            let client = Arc::clone(&client);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                client.get_event_details(&ticker).await
            })
        });

        for result in futures::future::join_all(tasks).await {
            match result {
                Ok(Ok(Some(event))) => details.push(event),
                Ok(Ok(None)) => {
                    tracing::warn!("event details response had no 'event' field; dropping");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "event details fetch failed; dropping event");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "event details task panicked; dropping event");
                }
            }
        }
    }

    details
}
