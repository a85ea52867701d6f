//! Market/event classification and strike validation (spec §4.4), grounded
//! on `original_source/kalshi_catalog_helpers/market_filter_helpers/`:
//! `crypto_pattern_matcher.py`, `crypto_detector.py`, `crypto_validator.py`,
//! `weather_filter.py`, and `station_loader.py`.

use super::types::Category;
use crate::error::CoreError;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

const CRYPTO_TICKER_PREFIXES: &[&str] = &["BTC", "ETH", "KXBTC", "KXETH"];
const CRYPTO_ASSETS: &[&str] = &["BTC", "ETH"];
const VALID_CRYPTO_STRIKE_TYPES: &[&str] =
    &["greater", "less", "greater_or_equal", "less_or_equal", "between"];
const WEATHER_TICKER_PREFIX: &str = "KXHIGH";

const DEFAULT_WEATHER_STATIONS: &[&str] =
    &["AUS", "AUSHAUS", "CHI", "DEN", "LAX", "MIA", "NY", "NYC", "PHIL", "PHL"];

fn crypto_month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{2}(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)\d{2}").expect("valid regex")
    })
}

/// Classifies an event/market ticker into crypto, weather, or other.
pub fn classify(ticker: &str) -> Category {
    let upper = ticker.to_uppercase();
    if CRYPTO_TICKER_PREFIXES.iter().any(|prefix| upper.starts_with(prefix)) {
        Category::Crypto
    } else if upper.starts_with(WEATHER_TICKER_PREFIX) {
        Category::Weather
    } else {
        Category::Other
    }
}

/// A crypto ticker is valid when it carries a recognized asset and a
/// well-formed month code (spec §4.4).
pub fn is_valid_crypto_ticker(ticker: &str) -> bool {
    let upper = ticker.to_uppercase();
    let has_asset = CRYPTO_ASSETS.iter().any(|asset| upper.contains(asset));
    has_asset && crypto_month_pattern().is_match(&upper)
}

pub fn is_valid_crypto_strike_type(strike_type: &str) -> bool {
    VALID_CRYPTO_STRIKE_TYPES.contains(&strike_type.to_lowercase().as_str())
}

/// Extracts the station token from a weather ticker, e.g. `KXHIGHNY-26JUL26`
/// -> `NY`. Returns `None` if the ticker has no `-` separator.
pub fn weather_station_token(ticker: &str) -> Option<String> {
    let upper = ticker.to_uppercase();
    let rest = upper.strip_prefix(WEATHER_TICKER_PREFIX)?;
    let station = rest.split('-').next()?;
    if station.is_empty() {
        None
    } else {
        Some(station.to_string())
    }
}

/// Loads the weather station whitelist from a JSON mapping file (an array
/// of station codes, or an object whose keys are station codes). Falls back
/// to the built-in default set, with a warning, when the path is absent or
/// the file fails to parse.
pub fn load_weather_stations(path: Option<&Path>) -> HashSet<String> {
    let Some(path) = path else {
        return default_weather_stations();
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(value) => match parse_station_set(&value) {
                Some(set) if !set.is_empty() => set,
                _ => {
                    tracing::warn!(path = %path.display(), "weather station mapping had no stations; using default set");
                    default_weather_stations()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse weather station mapping; using default set");
                default_weather_stations()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read weather station mapping; using default set");
            default_weather_stations()
        }
    }
}

fn parse_station_set(value: &serde_json::Value) -> Option<HashSet<String>> {
    if let Some(array) = value.as_array() {
        return Some(array.iter().filter_map(|v| v.as_str()).map(str::to_uppercase).collect());
    }
    if let Some(object) = value.as_object() {
        return Some(object.keys().map(|k| k.to_uppercase()).collect());
    }
    None
}

fn default_weather_stations() -> HashSet<String> {
    DEFAULT_WEATHER_STATIONS.iter().map(|s| s.to_string()).collect()
}

/// Strike bounds for a pair of (floor, cap), validated for the given
/// strike_type (spec §4.4, crypto strike-type contract).
pub fn validate_strike_bounds(
    strike_type: &str,
    floor: Option<f64>,
    cap: Option<f64>,
) -> Result<(), CoreError> {
    if !is_valid_crypto_strike_type(strike_type) {
        return Err(CoreError::validation("catalog", format!("unknown strike_type '{strike_type}'")));
    }
    match strike_type.to_lowercase().as_str() {
        "greater" | "greater_or_equal" => {
            if floor.is_none() {
                return Err(CoreError::validation("catalog", "strike_type requires floor_strike"));
            }
        }
        "less" | "less_or_equal" => {
            if cap.is_none() {
                return Err(CoreError::validation("catalog", "strike_type requires cap_strike"));
            }
        }
        "between" => {
            match (floor, cap) {
                (Some(f), Some(c)) if f < c => {}
                (Some(_), Some(_)) => {
                    return Err(CoreError::validation("catalog", "'between' requires floor_strike < cap_strike"))
                }
                _ => return Err(CoreError::validation("catalog", "'between' requires both floor and cap strike")),
            }
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_crypto_and_weather_and_other() {
        assert_eq!(classify("BTC-24JUN30-T50000"), Category::Crypto);
        assert_eq!(classify("KXHIGHNY-26JUL26"), Category::Weather);
        assert_eq!(classify("INXD-24JUN30"), Category::Other);
    }

    #[test]
    fn crypto_ticker_requires_asset_and_month_code() {
        assert!(is_valid_crypto_ticker("KXBTC-24JUN30-T50000"));
        assert!(!is_valid_crypto_ticker("KXBTC-NOMONTH-T50000"));
        assert!(!is_valid_crypto_ticker("INXD-24JUN30"));
    }

    #[test]
    fn weather_station_token_extracts_prefix_before_dash() {
        assert_eq!(weather_station_token("KXHIGHNY-26JUL26").as_deref(), Some("NY"));
        assert_eq!(weather_station_token("KXHIGHCHI-26JUL26").as_deref(), Some("CHI"));
        assert_eq!(weather_station_token("BTC-24JUN30"), None);
    }

    #[test]
    fn default_stations_load_when_path_is_none() {
        let stations = load_weather_stations(None);
        assert!(stations.contains("NYC"));
        assert_eq!(stations.len(), DEFAULT_WEATHER_STATIONS.len());
    }

    #[test]
    fn default_stations_load_when_file_missing() {
        let stations = load_weather_stations(Some(Path::new("/nonexistent/stations.json")));
        assert!(stations.contains("LAX"));
    }

    #[test]
    fn validate_strike_bounds_rejects_unknown_type() {
        assert!(validate_strike_bounds("sideways", Some(1.0), None).is_err());
    }

    #[test]
    fn validate_strike_bounds_between_requires_ordered_pair() {
        assert!(validate_strike_bounds("between", Some(10.0), Some(5.0)).is_err());
        assert!(validate_strike_bounds("between", Some(5.0), Some(10.0)).is_ok());
    }
}
