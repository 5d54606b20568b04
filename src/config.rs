//! Run configuration and its defaults.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PRICE_FEED_URL: &str = "https://donnees.roulez-eco.fr/opendata/instantane";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_REGION: &str = "France";
pub const DEFAULT_REFERENCE_KEY: &str = "ref:FR:prix-carburants";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Everything a single sync run needs to know.
///
/// `price_feed` and `geo_feed` accept either an `http(s)://` URL or a local
/// path. When `geo_feed` is `None` the stations of `region` are queried from
/// the Overpass API at `overpass_url`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub price_feed: String,
    pub geo_feed: Option<String>,
    pub overpass_url: String,
    pub region: String,
    pub reference_key: String,
    pub report_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            price_feed: DEFAULT_PRICE_FEED_URL.to_string(),
            geo_feed: None,
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            region: DEFAULT_REGION.to_string(),
            reference_key: DEFAULT_REFERENCE_KEY.to_string(),
            report_path: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Overpass QL selecting every fuel station inside the named area.
    pub fn overpass_query(&self) -> String {
        let region = self.region.replace('\\', "\\\\").replace('\'', "\\'");
        format!("area[name='{region}']; nwr(area)['amenity'=fuel]; out;")
    }
}
