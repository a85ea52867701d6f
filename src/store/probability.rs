//! Probability Store (spec §4.5), grounded on
//! `original_source/redis_protocol/probability_store/` — the compact
//! (`probabilities:CURRENCY`, one JSON blob per `expiry:strike` field) and
//! human-readable (`probabilities:CURRENCY:EXPIRY:STRIKE_TYPE:STRIKE`, one
//! hash per strike) encodings, each write-validated before returning.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Rounds a strike to the nearest integer for its key segment, rejecting
/// non-finite values (spec §4.5, `normalise_strike_value`).
pub fn normalize_strike(strike: f64) -> Result<i64, CoreError> {
    if !strike.is_finite() {
        return Err(CoreError::validation("probability_store", format!("strike value {strike} must be finite")));
    }
    Ok(strike.round() as i64)
}

pub fn compact_key(currency: &str) -> String {
    format!("probabilities:{}", currency.to_uppercase())
}

pub fn human_readable_key(currency: &str, expiry: &str, strike_type: &str, strike: i64) -> String {
    format!("probabilities:{}:{expiry}:{strike_type}:{strike}", currency.to_uppercase())
}

/// Encodes one payload value as a Redis hash field string, preserving NaN
/// and null as literal sentinel strings rather than dropping the field.
pub fn encode_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if f.is_nan() => "NaN".to_string(),
            _ => n.to_string(),
        },
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Splits a compact-format field ("expiry:strike") into its two parts,
/// handling the three expiry shapes the original format allows: ISO8601
/// with `Z`, ISO8601 with a `+00:00` offset, and a bare colon-delimited
/// expiry (spec §4.5).
pub fn split_probability_field(field: &str) -> Result<(String, String), CoreError> {
    if let Some(z_index) = field.find("Z:") {
        let expiry = field[..=z_index].to_string();
        let strike = field[z_index + 2..].to_string();
        return Ok((expiry, strike));
    }
    if let Some(plus_index) = field.find("+00:00:") {
        let expiry = field[..plus_index + 6].to_string();
        let strike = field[plus_index + 7..].to_string();
        return Ok((expiry, strike));
    }
    match field.rfind(':') {
        Some(idx) => Ok((field[..idx].to_string(), field[idx + 1..].to_string())),
        None => Err(CoreError::validation("probability_store", format!("invalid probability field format: {field}"))),
    }
}

/// Sort key for strike labels: plain numbers first, then `>`/`<`-prefixed
/// bounds (ordered after/before plain values respectively), then ranges
/// (`"10-20"`, sorted by their start) — spec §4.5 / `keys.py::strike_sort_key`.
pub fn strike_sort_key(strike: &str) -> Result<(i32, f64), CoreError> {
    if let Ok(value) = strike.parse::<f64>() {
        return Ok((0, value));
    }
    if let Some(rest) = strike.strip_prefix('>') {
        let value = rest
            .parse::<f64>()
            .map_err(|_| CoreError::validation("probability_store", format!("invalid strike key '{strike}'")))?;
        return Ok((1, value));
    }
    if let Some(rest) = strike.strip_prefix('<') {
        let value = rest
            .parse::<f64>()
            .map_err(|_| CoreError::validation("probability_store", format!("invalid strike key '{strike}'")))?;
        return Ok((-1, value));
    }
    if let Some((start, _)) = strike.split_once('-') {
        let value = start
            .parse::<f64>()
            .map_err(|_| CoreError::validation("probability_store", format!("invalid strike range '{strike}'")))?;
        return Ok((0, value));
    }
    Err(CoreError::validation("probability_store", format!("unsupported strike key '{strike}'")))
}

/// Sort key for expiry labels: parsed timestamps sort chronologically
/// before (and among themselves ahead of) anything that didn't parse.
pub fn expiry_sort_key(expiry: &str) -> (i32, Option<DateTime<Utc>>, String) {
    let normalized = expiry.replacen('Z', "+00:00", 1);
    match DateTime::parse_from_rfc3339(&normalized) {
        Ok(dt) => (0, Some(dt.with_timezone(&Utc)), String::new()),
        Err(_) => (1, None, expiry.to_string()),
    }
}

/// Splits a full human-readable key ("probabilities:CURRENCY:expiry:
/// strike_type:strike") into its (expiry, strike_type, strike) components.
/// The expiry itself may contain colons (an RFC3339 offset like
/// `+00:00`), so everything between the currency segment and the trailing
/// `strike_type:strike` pair belongs to it (spec §4.5 / `keys.py::parse_probability_key`).
fn parse_probability_key(key: &str) -> Result<(String, String, String), CoreError> {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.len() < 5 {
        return Err(CoreError::validation("probability_store", format!("invalid probability key format: {key}")));
    }
    let (expiry, strike_type, strike) = if parts.len() > 5 {
        (parts[2..parts.len() - 2].join(":"), parts[parts.len() - 2].to_string(), parts[parts.len() - 1].to_string())
    } else {
        (parts[2].to_string(), parts[3].to_string(), parts[4].to_string())
    };
    if expiry.is_empty() {
        return Err(CoreError::validation("probability_store", format!("could not extract expiry from key: {key}")));
    }
    Ok((expiry, strike_type, strike))
}

/// Decodes one human-readable hash field value. `"NaN"` is preserved as
/// the literal string (not converted to a numeric NaN, which JSON cannot
/// represent); anything else that parses as a float becomes a number;
/// everything else stays a string (spec §4.5 / `codec.py::decode_probability_hash`).
fn decode_human_readable_value(value: &str) -> JsonValue {
    if value == "NaN" {
        return JsonValue::String(value.to_string());
    }
    match value.parse::<f64>() {
        Ok(f) => serde_json::Number::from_f64(f).map(JsonValue::Number).unwrap_or_else(|| JsonValue::String(value.to_string())),
        Err(_) => JsonValue::String(value.to_string()),
    }
}

/// One row to write in the human-readable encoding.
pub struct HumanReadableRecord {
    pub expiry: String,
    pub strike_type: String,
    pub strike: i64,
    pub event_title: Option<String>,
    pub fields: BTreeMap<String, JsonValue>,
}

pub struct ProbabilityStore {
    conn: ConnectionManager,
}

impl ProbabilityStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Compact write: delete the currency's hash, then HSET every
    /// `expiry:strike` field to its JSON-encoded payload in one pipeline,
    /// validating the pipeline's result count and the post-write HLEN.
    pub async fn store_probabilities(
        &mut self,
        currency: &str,
        probabilities: &BTreeMap<String, JsonValue>,
    ) -> Result<(), CoreError> {
        let key = compact_key(currency);
        let field_count = probabilities.len();

        let mut pipeline = redis::pipe();
        pipeline.atomic();
        pipeline.del(&key).ignore();
        for (field, payload) in probabilities {
            let encoded = serde_json::to_string(payload)
                .map_err(|e| CoreError::store(&key, format!("failed to serialize payload for {field}: {e}")))?;
            pipeline.hset(&key, field, encoded).ignore();
        }

        pipeline
            .query_async::<()>(&mut self.conn)
            .await
            .map_err(|e| CoreError::store(&key, format!("pipeline execution failed: {e}")))?;

        let actual_count: usize = self.conn.hlen(&key).await.map_err(|e| CoreError::store(&key, e.to_string()))?;
        if actual_count != field_count {
            return Err(CoreError::store(
                &key,
                format!("field count mismatch after store: expected {field_count}, got {actual_count}"),
            ));
        }

        tracing::info!(currency, field_count, "stored compact probabilities");
        Ok(())
    }

    /// Human-readable write: delete every existing key under the
    /// currency's prefix, HSET each record's fields in one pipeline, then
    /// verify with a second pipeline of EXISTS probes on a sample of the
    /// written keys, falling back to a dedicated connectivity probe if a
    /// sampled key is unexpectedly missing.
    pub async fn store_probabilities_human_readable(
        &mut self,
        currency: &str,
        records: &[HumanReadableRecord],
    ) -> Result<(), CoreError> {
        let prefix = format!("probabilities:{}:", currency.to_uppercase());
        let existing_keys = self.scan_keys(&format!("{prefix}*")).await?;

        let mut pipeline = redis::pipe();
        pipeline.atomic();
        for key in &existing_keys {
            pipeline.del(key).ignore();
        }

        let mut written_keys = Vec::with_capacity(records.len());
        for record in records {
            let key = human_readable_key(currency, &record.expiry, &record.strike_type, record.strike);
            let mut mapping: Vec<(String, String)> =
                record.fields.iter().map(|(field, value)| (field.clone(), encode_value(value))).collect();
            if let Some(title) = &record.event_title {
                mapping.push(("event_title".to_string(), title.clone()));
            }
            pipeline.hset_multiple(&key, &mapping).ignore();
            written_keys.push(key);
        }

        pipeline
            .query_async::<()>(&mut self.conn)
            .await
            .map_err(|e| CoreError::store(&prefix, format!("pipeline execution failed: {e}")))?;

        self.verify_written_keys(&prefix, &written_keys).await?;

        tracing::info!(currency, written = written_keys.len(), "stored human-readable probabilities");
        Ok(())
    }

    async fn verify_written_keys(&mut self, context: &str, keys: &[String]) -> Result<(), CoreError> {
        const SAMPLE_SIZE: usize = 5;
        let sample: Vec<&String> = keys.iter().take(SAMPLE_SIZE).collect();
        if sample.is_empty() {
            return Ok(());
        }

        let mut pipeline = redis::pipe();
        for key in &sample {
            pipeline.exists(key.as_str());
        }
        let results: Vec<bool> = pipeline
            .query_async(&mut self.conn)
            .await
            .map_err(|e| CoreError::store(context, format!("verification pipeline failed: {e}")))?;

        if let Some((key, _)) = sample.iter().zip(&results).find(|(_, exists)| !**exists) {
            self.run_connectivity_probe(context).await?;
            return Err(CoreError::store(context, format!("verification miss: key {key} not found after write")));
        }
        Ok(())
    }

    /// SET/GET/DELETE on a dedicated probe key, to distinguish "Redis is
    /// unreachable" from "our write genuinely didn't land".
    async fn run_connectivity_probe(&mut self, context: &str) -> Result<(), CoreError> {
        let probe_key = "probabilities:__connectivity_probe__";
        let _: () = self
            .conn
            .set(probe_key, "1")
            .await
            .map_err(|e| CoreError::store(context, format!("connectivity probe SET failed: {e}")))?;
        let value: Option<String> =
            self.conn.get(probe_key).await.map_err(|e| CoreError::store(context, format!("connectivity probe GET failed: {e}")))?;
        let _: () = self.conn.del(probe_key).await.map_err(|e| CoreError::store(context, format!("connectivity probe DEL failed: {e}")))?;
        if value.as_deref() != Some("1") {
            return Err(CoreError::store(context, "connectivity probe failed: Redis did not round-trip the probe key"));
        }
        Ok(())
    }

    async fn scan_keys(&mut self, pattern: &str) -> Result<Vec<String>, CoreError> {
        let keys: Vec<String> = self.conn.keys(pattern).await.map_err(|e| CoreError::store(pattern, e.to_string()))?;
        Ok(keys)
    }

    /// Decodes the compact hash for `currency`, sorted by expiry then
    /// strike (spec §4.5).
    pub async fn get_probabilities(
        &mut self,
        currency: &str,
    ) -> Result<BTreeMap<String, BTreeMap<String, JsonValue>>, CoreError> {
        let key = compact_key(currency);
        let raw: Vec<(String, String)> = self.conn.hgetall(&key).await.map_err(|e| CoreError::store(&key, e.to_string()))?;
        if raw.is_empty() {
            return Err(CoreError::store(&key, format!("no probability data found for {currency}")));
        }

        let mut result: BTreeMap<String, BTreeMap<String, JsonValue>> = BTreeMap::new();
        for (field, value_text) in raw {
            let (expiry, strike) = split_probability_field(&field)?;
            let payload: JsonValue = serde_json::from_str(&value_text)
                .map_err(|e| CoreError::store(&key, format!("error parsing payload for field {field}: {e}")))?;
            result.entry(expiry).or_default().insert(strike, payload);
        }

        let mut ordered: BTreeMap<String, BTreeMap<String, JsonValue>> = BTreeMap::new();
        let mut expiries: Vec<&String> = result.keys().collect();
        expiries.sort_by_key(|e| expiry_sort_key(e));
        for expiry in expiries {
            let strikes = &result[expiry];
            let mut strike_keys: Vec<&String> = strikes.keys().collect();
            strike_keys.sort_by(|a, b| {
                let ka = strike_sort_key(a).unwrap_or((0, 0.0));
                let kb = strike_sort_key(b).unwrap_or((0, 0.0));
                ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut bucket = BTreeMap::new();
            for strike in strike_keys {
                bucket.insert(strike.clone(), strikes[strike].clone());
            }
            ordered.insert(expiry.clone(), bucket);
        }
        Ok(ordered)
    }

    /// Looks up `event_ticker` on the key built from
    /// `"SYMBOL:expiry:strike:strike_type"`; missing key or field is fatal.
    pub async fn get_event_ticker_for_key(&mut self, symbol_expiry_strike_type: &str) -> Result<String, CoreError> {
        let parts: Vec<&str> = symbol_expiry_strike_type.splitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(CoreError::validation(
                "probability_store",
                format!("expected 'SYMBOL:expiry:strike:strike_type', got '{symbol_expiry_strike_type}'"),
            ));
        }
        let [currency, expiry, strike, strike_type] = [parts[0], parts[1], parts[2], parts[3]];
        let strike_value: f64 = strike
            .parse()
            .map_err(|_| CoreError::validation("probability_store", format!("strike '{strike}' is not numeric")))?;
        let strike_int = normalize_strike(strike_value)?;
        let key = human_readable_key(currency, expiry, strike_type, strike_int);

        let event_ticker: Option<String> =
            self.conn.hget(&key, "event_ticker").await.map_err(|e| CoreError::store(&key, e.to_string()))?;
        event_ticker.ok_or_else(|| CoreError::store(&key, "key or event_ticker field not found"))
    }

    /// Decodes every human-readable key under `currency`'s prefix, grouped
    /// as `{expiry: {event_title: {strike_type: {strike: {field: value}}}}}`.
    /// A key whose hash is empty, or whose hash has no `event_title` field,
    /// is fatal (spec §4.5 / `human_readable_retrieval.py`).
    pub async fn get_probabilities_human_readable(
        &mut self,
        currency: &str,
    ) -> Result<BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, JsonValue>>>>, CoreError> {
        let prefix = format!("probabilities:{}:", currency.to_uppercase());
        let keys = self.scan_keys(&format!("{prefix}*")).await?;
        if keys.is_empty() {
            return Err(CoreError::store(&prefix, format!("no human-readable probability data found for {currency}")));
        }

        let mut result: BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, JsonValue>>>> = BTreeMap::new();
        for key in &keys {
            let (expiry, strike_type, strike) = parse_probability_key(key)?;
            let raw: Vec<(String, String)> = self.conn.hgetall(key).await.map_err(|e| CoreError::store(key, e.to_string()))?;
            if raw.is_empty() {
                return Err(CoreError::store(key, format!("probability payload missing for key {key}")));
            }
            let fields: BTreeMap<String, JsonValue> =
                raw.into_iter().map(|(field, value)| (field, decode_human_readable_value(&value))).collect();

            let event_title = match fields.get("event_title") {
                Some(JsonValue::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => return Err(CoreError::store(key, format!("missing event_title for key {key}"))),
            };

            result.entry(expiry).or_default().entry(event_title).or_default().entry(strike_type).or_default().insert(strike, JsonValue::Object(fields.into_iter().collect()));
        }

        tracing::info!(currency, keys = keys.len(), "retrieved human-readable probabilities");
        Ok(result)
    }

    /// Probabilities under `currency`'s prefix filtered to records whose
    /// `event_type` field equals `event_type` exactly, grouped as
    /// `{expiry: {strike_type: {strike: {field: value}}}}` (spec §4.5 /
    /// `event_type_filtering.py`).
    pub async fn get_probabilities_by_event_type(
        &mut self,
        currency: &str,
        event_type: &str,
    ) -> Result<BTreeMap<String, BTreeMap<String, BTreeMap<String, JsonValue>>>, CoreError> {
        let prefix = format!("probabilities:{}:", currency.to_uppercase());
        let keys = self.scan_keys(&format!("{prefix}*")).await?;

        let mut matched = Vec::new();
        for key in &keys {
            let stored: Option<String> = self.conn.hget(key, "event_type").await.map_err(|e| CoreError::store(key, e.to_string()))?;
            if stored.as_deref() == Some(event_type) {
                matched.push(key.clone());
            }
        }
        if matched.is_empty() {
            return Err(CoreError::store(&prefix, format!("no data found for event type '{event_type}' for {currency}")));
        }

        let mut result: BTreeMap<String, BTreeMap<String, BTreeMap<String, JsonValue>>> = BTreeMap::new();
        for key in &matched {
            let (expiry, strike_type, strike) = parse_probability_key(key)?;
            let raw: Vec<(String, String)> = self.conn.hgetall(key).await.map_err(|e| CoreError::store(key, e.to_string()))?;
            if raw.is_empty() {
                return Err(CoreError::store(key, format!("probability payload missing for key {key}")));
            }
            let fields: BTreeMap<String, JsonValue> =
                raw.into_iter().map(|(field, value)| (field, decode_human_readable_value(&value))).collect();
            result.entry(expiry).or_default().entry(strike_type).or_default().insert(strike, JsonValue::Object(fields.into_iter().collect()));
        }

        tracing::info!(currency, event_type, matched = matched.len(), "retrieved probabilities by event type");
        Ok(result)
    }

    /// Unique non-null `event_type` field values across `currency`'s
    /// human-readable records; fatal if none are found (spec §4.5 /
    /// `event_type_enumeration.py`).
    pub async fn get_all_event_types(&mut self, currency: &str) -> Result<Vec<String>, CoreError> {
        let prefix = format!("probabilities:{}:", currency.to_uppercase());
        let keys = self.scan_keys(&format!("{prefix}*")).await?;
        if keys.is_empty() {
            return Err(CoreError::store(&prefix, format!("no probability data found for {currency}")));
        }

        let mut event_types = std::collections::BTreeSet::new();
        for key in &keys {
            let value: Option<String> = self.conn.hget(key, "event_type").await.map_err(|e| CoreError::store(key, e.to_string()))?;
            match value {
                Some(v) if !v.is_empty() && v != "null" => {
                    event_types.insert(v);
                }
                _ => continue,
            }
        }

        if event_types.is_empty() {
            return Err(CoreError::store(&prefix, format!("no event types found for {currency}")));
        }
        Ok(event_types.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_strike_rounds_and_rejects_non_finite() {
        assert_eq!(normalize_strike(49999.6).unwrap(), 50000);
        assert!(normalize_strike(f64::NAN).is_err());
        assert!(normalize_strike(f64::INFINITY).is_err());
    }

    #[test]
    fn encode_value_preserves_sentinels() {
        assert_eq!(encode_value(&JsonValue::Null), "null");
        assert_eq!(encode_value(&json!(f64::NAN)), "NaN");
        assert_eq!(encode_value(&json!(0.87)), "0.87");
    }

    #[test]
    fn split_handles_all_three_expiry_shapes() {
        assert_eq!(split_probability_field("2026-01-01T00:00:00Z:50000").unwrap(), ("2026-01-01T00:00:00Z".to_string(), "50000".to_string()));
        assert_eq!(
            split_probability_field("2026-01-01T00:00:00+00:00:50000").unwrap(),
            ("2026-01-01T00:00:00+00:00".to_string(), "50000".to_string())
        );
        assert_eq!(split_probability_field("2026-01-01:50000").unwrap(), ("2026-01-01".to_string(), "50000".to_string()));
    }

    #[test]
    fn strike_sort_key_orders_prefixed_keys_around_plain_ones() {
        let less = strike_sort_key("<50000").unwrap();
        let plain = strike_sort_key("50000").unwrap();
        let greater = strike_sort_key(">50000").unwrap();
        assert!(less < plain);
        assert!(plain < greater);
    }

    #[test]
    fn strike_sort_key_rejects_unsupported_format() {
        assert!(strike_sort_key("not-a-number").is_err());
    }

    #[test]
    fn expiry_sort_key_orders_parsed_timestamps_before_unparsed() {
        let parsed = expiry_sort_key("2026-01-01T00:00:00Z");
        let unparsed = expiry_sort_key("not-a-date");
        assert!(parsed < unparsed);
    }

    #[test]
    fn human_readable_key_matches_documented_shape() {
        assert_eq!(human_readable_key("btc", "2026-01-01T00:00:00Z", "greater", 50000), "probabilities:BTC:2026-01-01T00:00:00Z:greater:50000");
    }

    #[test]
    fn parse_probability_key_handles_plain_expiry() {
        let (expiry, strike_type, strike) = parse_probability_key("probabilities:BTC:2026-01-01:greater:50000").unwrap();
        assert_eq!((expiry.as_str(), strike_type.as_str(), strike.as_str()), ("2026-01-01", "greater", "50000"));
    }

    #[test]
    fn parse_probability_key_rejoins_expiry_containing_colons() {
        let (expiry, strike_type, strike) = parse_probability_key("probabilities:BTC:2026-01-01T00:00:00+00:00:greater:50000").unwrap();
        assert_eq!(expiry, "2026-01-01T00:00:00+00:00");
        assert_eq!(strike_type, "greater");
        assert_eq!(strike, "50000");
    }

    #[test]
    fn parse_probability_key_rejects_too_few_segments() {
        assert!(parse_probability_key("probabilities:BTC:50000").is_err());
    }

    #[test]
    fn decode_human_readable_value_preserves_nan_literal_and_parses_numbers() {
        assert_eq!(decode_human_readable_value("NaN"), json!("NaN"));
        assert_eq!(decode_human_readable_value("0.87"), json!(0.87));
        assert_eq!(decode_human_readable_value("BTC-2026"), json!("BTC-2026"));
    }
}
