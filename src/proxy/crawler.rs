//! Proxy crawler module: the HTTP fetcher shared by proxy sources
//!
//! Every fetch is retried a few times. Each attempt goes out through the next
//! relay from a queue of already-verified proxies, or directly once the queue
//! runs dry.

use crate::proxy::models::{Scheme, VerifiedProxy};
use crate::Result;
use anyhow::{anyhow, bail};
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of attempts per URL
const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for proxy crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Attempts per URL before giving up
    pub max_attempts: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// Fetcher used by proxy sources
#[derive(Clone)]
pub struct ProxyCrawler {
    config: CrawlerConfig,
    client: Client,
    relays: Arc<Mutex<VecDeque<VerifiedProxy>>>,
}

impl ProxyCrawler {
    /// Create a new proxy crawler with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(CrawlerConfig::default())
    }

    /// Create a new proxy crawler with custom configuration
    pub fn with_config(config: CrawlerConfig) -> Result<Self> {
        let client = Self::builder(&config).build()?;

        Ok(Self {
            config,
            client,
            relays: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    /// Seed the relay queue attempts are routed through
    ///
    /// Clones made afterwards share the queue; earlier clones keep their own.
    pub fn with_relays(self, relays: Vec<VerifiedProxy>) -> Self {
        Self {
            relays: Arc::new(Mutex::new(relays.into())),
            ..self
        }
    }

    fn builder(config: &CrawlerConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
    }

    fn lock_relays(&self) -> std::sync::MutexGuard<'_, VecDeque<VerifiedProxy>> {
        match self.relays.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of relays not yet used
    pub fn relays_remaining(&self) -> usize {
        self.lock_relays().len()
    }

    /// Fetch a URL body, retrying up to the configured number of attempts
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    debug!("attempt {} for {} failed: {}", attempt, url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("no attempts made for {}", url)))
    }

    async fn try_fetch(&self, url: &str) -> Result<String> {
        let relay = self.lock_relays().pop_front();
        let client = match relay {
            Some(relay) => self.relay_client(&relay)?,
            None => self.client.clone(),
        };

        let response = client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            bail!("HTTP status: {}", response.status());
        }
        Ok(response.text().await?)
    }

    /// A client routing requests of the relay's own scheme through it
    fn relay_client(&self, relay: &VerifiedProxy) -> Result<Client> {
        let proxy_url = relay.to_candidate().proxy_url();
        let proxy = match relay.scheme {
            Scheme::Http => ReqwestProxy::http(&proxy_url)?,
            Scheme::Https => ReqwestProxy::https(&proxy_url)?,
        };
        Ok(Self::builder(&self.config).proxy(proxy).build()?)
    }
}
