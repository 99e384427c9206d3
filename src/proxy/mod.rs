//! Proxy module for discovering and validating proxies
//!
//! This module provides functionality for:
//! - Fetching candidate lists from public proxy sources
//! - Probing candidates through an echo service under a bounded pool
//! - Classifying anonymity and resolving the country of working proxies

pub mod checker;
pub mod crawler;
pub mod dedup;
pub mod geo;
pub mod models;
pub mod origin;
pub mod parser;
pub mod sources;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use checker::{CheckerConfig, ProxyChecker};
pub use crawler::{CrawlerConfig, ProxyCrawler};
pub use dedup::Deduplicator;
pub use geo::{CountryResolver, GeoLocator};
pub use models::{AnonymityLevel, Candidate, Scheme, VerifiedProxy};
pub use origin::OriginOracle;
pub use parser::ProxyParser;
pub use sources::{default_sources, SourcePlugin};
pub use validator::{Probe, ResultSet, Validator, ValidatorConfig};
