//! Proxy Harvest - Proxy discovery and validation
//!
//! Collects candidate proxies from public sources, probes each one through an
//! echo service, classifies its anonymity and publishes the working set to a
//! snapshot file and a Redis set.

pub mod collector;
pub mod error;
pub mod proxy;
pub mod shutdown;
pub mod store;

pub use collector::{Collector, RunOutcome};
pub use proxy::*;
pub use shutdown::{ShutdownController, ShutdownStage};

use std::path::PathBuf;
use std::time::Duration;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Environment variable overriding the snapshot file path
pub const PROXY_FILE_ENV: &str = "PROXY_HARVEST_FILE";

/// Environment variable overriding the GeoIP database path
pub const GEOIP_PATH_ENV: &str = "PROXY_HARVEST_GEOIP";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis key holding the verified signatures
    pub set_key: String,
    /// Redis connection URL
    pub redis_url: String,
    /// Redis database index
    pub redis_db: i64,
    /// Newline-delimited JSON snapshot of verified proxies
    pub proxy_file: PathBuf,
    /// GeoLite2 country database
    pub geoip_path: PathBuf,
    pub checker: CheckerConfig,
    pub validator: ValidatorConfig,
    pub crawler: CrawlerConfig,
    /// Wall-clock budget for all sources together
    pub discovery_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            set_key: "set:proxies".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_db: 0,
            proxy_file: PathBuf::from("proxy.jsonl"),
            geoip_path: PathBuf::from("data/GeoLite2-Country.mmdb"),
            checker: CheckerConfig::default(),
            validator: ValidatorConfig::default(),
            crawler: CrawlerConfig::default(),
            discovery_deadline: Duration::from_secs(8 * 60),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, set_key: String, redis_url: String, redis_db: i64) -> Self {
        self.set_key = set_key;
        self.redis_url = redis_url;
        self.redis_db = redis_db;
        self
    }

    pub fn with_proxy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.proxy_file = path.into();
        self
    }

    pub fn with_geoip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.geoip_path = path.into();
        self
    }

    /// Apply [`PROXY_FILE_ENV`] and [`GEOIP_PATH_ENV`] when set
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(PROXY_FILE_ENV).filter(|p| !p.is_empty()) {
            self.proxy_file = PathBuf::from(path);
        }
        if let Some(path) = lookup(GEOIP_PATH_ENV).filter(|p| !p.is_empty()) {
            self.geoip_path = PathBuf::from(path);
        }
        self
    }
}
