//! Market Catalog Pipeline (spec §4.4): paginated, concurrency-limited
//! discovery of mutually-exclusive events with validated strike layouts.

pub mod discovery;
pub mod fetcher;
pub mod filter;
pub mod types;

pub use discovery::{discover_mutually_exclusive_markets, DiscoveryProgress, NoProgress};
pub use types::{Category, DiscoveredEvent, DiscoveredMarket};

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub expiry_window_seconds: i64,
    pub min_markets_per_event: usize,
    pub weather_station_mapping_path: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { expiry_window_seconds: 3600, min_markets_per_event: 2, weather_station_mapping_path: None }
    }
}
