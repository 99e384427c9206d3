//! Proxy data models

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Scheme a candidate is probed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    /// Every scheme a candidate gets probed over, in scheduling order
    pub const ALL: [Scheme; 2] = [Scheme::Http, Scheme::Https];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical `scheme://host:port` key of a probe target
pub fn signature(scheme: Scheme, host: &str, port: u16) -> String {
    format!("{}://{}:{}", scheme, host, port)
}

/// An unverified host/port pair produced by a source or loaded from disk
///
/// Deserializes from a persisted [`VerifiedProxy`] line as well, since the
/// record keeps the same `host`, `port`, `country` and `from` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(rename = "from", default)]
    pub source_tag: String,
}

/// Some sources hand out ports as strings and those records are persisted as-is
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match RawPort::deserialize(deserializer)? {
        RawPort::Number(port) => Ok(port),
        RawPort::Text(text) => text.trim().parse().map_err(de::Error::custom),
    }
}

impl Candidate {
    pub fn new(host: impl Into<String>, port: u16, source_tag: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            country: None,
            source_tag: source_tag.into(),
        }
    }

    /// Attach a country reported by the source itself
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn signature(&self, scheme: Scheme) -> String {
        signature(scheme, &self.host, self.port)
    }

    /// Proxy URL a transport uses to route through this candidate
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How much a proxy reveals about the original requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymityLevel {
    Transparent,
    Anonymous,
    HighAnonymous,
}

impl fmt::Display for AnonymityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnonymityLevel::Transparent => write!(f, "transparent"),
            AnonymityLevel::Anonymous => write!(f, "anonymous"),
            AnonymityLevel::HighAnonymous => write!(f, "high_anonymous"),
        }
    }
}

/// A proxy that answered a probe correctly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedProxy {
    /// Signature of the probe that produced this record
    pub hash: String,
    #[serde(rename = "type")]
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Addresses the echo service saw connecting, minus our own
    #[serde(rename = "origin")]
    pub origin_addresses: Vec<String>,
    #[serde(rename = "anonymity")]
    pub anonymity_level: AnonymityLevel,
    /// ISO country code; `None` when unknown
    pub country: Option<String>,
    #[serde(rename = "response_time")]
    pub response_time_seconds: f64,
    #[serde(rename = "from")]
    pub source_tag: String,
}

impl VerifiedProxy {
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            host: self.host.clone(),
            port: self.port,
            country: self.country.clone(),
            source_tag: self.source_tag.clone(),
        }
    }
}

impl fmt::Display for VerifiedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {:.2}s)",
            self.hash, self.anonymity_level, self.response_time_seconds
        )
    }
}
