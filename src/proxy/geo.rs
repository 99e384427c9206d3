//! Country lookup for proxy hosts using an MMDB database

use crate::error::LookupError;
use crate::Result;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Maps a host to an ISO 3166-1 alpha-2 country code
pub trait CountryResolver: Send + Sync {
    fn lookup(&self, host: &str) -> std::result::Result<String, LookupError>;
}

/// GeoLocator for looking up IP addresses in MMDB databases
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Create a new GeoLocator from an MMDB file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    fn country_code(&self, ip: IpAddr) -> Option<String> {
        let lookup_result = self.reader.lookup(ip).ok()?;
        let country: geoip2::Country = lookup_result.decode().ok()??;
        country.country.iso_code.map(String::from)
    }
}

impl CountryResolver for GeoLocator {
    fn lookup(&self, host: &str) -> std::result::Result<String, LookupError> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| LookupError::NotFound(host.to_string()))?;
        self.country_code(ip)
            .ok_or_else(|| LookupError::NotFound(host.to_string()))
    }
}

impl Clone for GeoLocator {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}
