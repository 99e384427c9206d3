//! Typed errors for the oracle contracts
//!
//! Everything else in the crate reports failures through [`crate::Result`].

use reqwest::StatusCode;
use thiserror::Error;

/// Failure to learn our own public address
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("echo endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),
    #[error("echo endpoint answered with status {0}")]
    Status(StatusCode),
    #[error("malformed echo response: {0}")]
    Malformed(String),
}

/// Failure to map an address to a country
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no country entry for {0}")]
    NotFound(String),
}
