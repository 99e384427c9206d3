//! Proxy checker module: one verification probe per candidate and scheme

use crate::proxy::dedup::Deduplicator;
use crate::proxy::geo::CountryResolver;
use crate::proxy::models::{AnonymityLevel, Candidate, Scheme, VerifiedProxy};
use crate::proxy::validator::Probe;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default echo service host; answers `/get?show_env=1` with the request it saw
pub const DEFAULT_ECHO_HOST: &str = "httpbin.org";

/// Header a proxy adds to announce that it forwarded the request
const FORWARDING_HEADER: &str = "Via";

/// `Via` value the echo service's own front end always adds
const ECHO_VIA_DECORATION: &str = "1.1 vegur";

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each proxy check
    pub timeout: Duration,
    /// Host of the echo service probes are sent to
    pub echo_host: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            echo_host: DEFAULT_ECHO_HOST.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_echo_host(mut self, host: impl Into<String>) -> Self {
        self.echo_host = host.into();
        self
    }
}

/// Why a probe produced no record; only ever logged
#[derive(Debug)]
enum Rejection {
    Duplicate,
    Transport(reqwest::Error),
    Malformed(String),
    NonceMismatch,
    Status(StatusCode),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Duplicate => write!(f, "already probed"),
            Rejection::Transport(e) if e.is_timeout() => write!(f, "timed out"),
            Rejection::Transport(e) => write!(f, "transport error: {}", e),
            Rejection::Malformed(e) => write!(f, "malformed echo body: {}", e),
            Rejection::NonceMismatch => write!(f, "echoed nonce does not match"),
            Rejection::Status(status) => write!(f, "HTTP status: {}", status),
        }
    }
}

/// The parts of the echo service's answer the checker inspects
#[derive(Debug, Deserialize)]
struct EchoResponse {
    #[serde(default)]
    args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    origin: String,
}

impl EchoResponse {
    fn nonce(&self) -> Option<&str> {
        self.args.get("cur").and_then(|v| v.as_str())
    }
}

/// Classify a proxy from the echo service's view of the forwarded request
///
/// `body` is the raw response text; any occurrence of our own address in it
/// means the proxy leaked it.
pub fn classify_anonymity(
    body: &str,
    headers: &BTreeMap<String, String>,
    origin_ip: &str,
) -> AnonymityLevel {
    if !origin_ip.is_empty() && body.contains(origin_ip) {
        return AnonymityLevel::Transparent;
    }

    let via = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(FORWARDING_HEADER))
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();

    if !via.is_empty() && via != ECHO_VIA_DECORATION {
        AnonymityLevel::Anonymous
    } else {
        AnonymityLevel::HighAnonymous
    }
}

/// Addresses listed in the echo `origin` field, minus our own
pub fn origin_addresses(origin_field: &str, origin_ip: &str) -> Vec<String> {
    origin_field
        .split(", ")
        .map(str::trim)
        .filter(|addr| !addr.is_empty() && *addr != origin_ip)
        .map(String::from)
        .collect()
}

fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

fn new_nonce() -> String {
    format!("{}.{}", Utc::now().timestamp_micros(), Uuid::new_v4().simple())
}

/// Proxy checker for validating proxies
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    origin_ip: Arc<str>,
    dedup: Arc<Deduplicator>,
    countries: Option<Arc<dyn CountryResolver>>,
}

impl ProxyChecker {
    /// Create a new proxy checker with custom configuration
    pub fn with_config(
        config: CheckerConfig,
        origin_ip: impl Into<String>,
        dedup: Arc<Deduplicator>,
    ) -> Self {
        Self {
            config,
            origin_ip: Arc::from(origin_ip.into()),
            dedup,
            countries: None,
        }
    }

    pub fn with_country_resolver(mut self, resolver: Arc<dyn CountryResolver>) -> Self {
        self.countries = Some(resolver);
        self
    }

    /// Probe one candidate over one scheme
    pub async fn check_proxy(&self, candidate: &Candidate, scheme: Scheme) -> Option<VerifiedProxy> {
        match self.attempt(candidate, scheme).await {
            Ok(record) => {
                debug!("Verified {}", record);
                Some(record)
            }
            Err(rejection) => {
                trace!("{}://{} rejected: {}", scheme, candidate, rejection);
                None
            }
        }
    }

    async fn attempt(
        &self,
        candidate: &Candidate,
        scheme: Scheme,
    ) -> std::result::Result<VerifiedProxy, Rejection> {
        let hash = candidate.signature(scheme);
        if !self.dedup.claim(&hash) {
            return Err(Rejection::Duplicate);
        }

        let client = self
            .create_client(candidate, scheme)
            .map_err(Rejection::Transport)?;
        let nonce = new_nonce();
        let url = format!(
            "{}://{}/get?show_env=1&cur={}",
            scheme, self.config.echo_host, nonce
        );

        let start = Instant::now();
        let response = client.get(&url).send().await.map_err(Rejection::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(Rejection::Transport)?;
        let elapsed = start.elapsed();

        let echo: EchoResponse =
            serde_json::from_str(&body).map_err(|e| Rejection::Malformed(e.to_string()))?;
        if echo.nonce() != Some(nonce.as_str()) {
            return Err(Rejection::NonceMismatch);
        }
        if !status.is_success() {
            return Err(Rejection::Status(status));
        }

        Ok(VerifiedProxy {
            hash,
            scheme,
            host: candidate.host.clone(),
            port: candidate.port,
            origin_addresses: origin_addresses(&echo.origin, &self.origin_ip),
            anonymity_level: classify_anonymity(&body, &echo.headers, &self.origin_ip),
            country: self.resolve_country(candidate),
            response_time_seconds: round_seconds(elapsed),
            source_tag: candidate.source_tag.clone(),
        })
    }

    fn resolve_country(&self, candidate: &Candidate) -> Option<String> {
        if candidate.country.is_some() {
            return candidate.country.clone();
        }
        let resolver = self.countries.as_ref()?;
        match resolver.lookup(&candidate.host) {
            Ok(code) => Some(code),
            Err(e) => {
                trace!("country unknown: {}", e);
                None
            }
        }
    }

    /// Create a reqwest client that routes `scheme` requests through the candidate
    fn create_client(&self, candidate: &Candidate, scheme: Scheme) -> reqwest::Result<Client> {
        let proxy_url = candidate.proxy_url();

        let reqwest_proxy = match scheme {
            Scheme::Http => ReqwestProxy::http(&proxy_url)?,
            Scheme::Https => ReqwestProxy::https(&proxy_url)?,
        };

        Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout)
            .build()
    }
}

#[async_trait]
impl Probe for ProxyChecker {
    async fn verify(&self, candidate: &Candidate, scheme: Scheme) -> Option<VerifiedProxy> {
        self.check_proxy(candidate, scheme).await
    }
}
