//! Persistence sinks for the verified proxy set

use crate::proxy::models::{Candidate, VerifiedProxy};
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Newline-delimited JSON snapshot of verified proxies
#[derive(Debug, Clone)]
pub struct ProxyFile {
    path: PathBuf,
}

impl ProxyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the previous snapshot back as candidates
    ///
    /// A missing file is an empty seed; lines that do not parse are skipped.
    pub fn load(&self) -> Result<Vec<Candidate>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No proxy file at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {:?}", self.path));
            }
        };

        let mut candidates = Vec::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Candidate>(line) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warn!("Skipping line {} of {:?}: {}", number + 1, self.path, e),
            }
        }
        Ok(candidates)
    }

    /// Overwrite the file with one JSON record per line
    pub fn save(&self, proxies: &[VerifiedProxy]) -> Result<()> {
        let mut content = String::new();
        for proxy in proxies {
            content.push_str(&serde_json::to_string(proxy)?);
            content.push('\n');
        }

        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}

/// A keyed set store the verified signatures are published to
#[async_trait]
pub trait SetStore: Send + Sync {
    /// Replace the whole set under `key` with `members`
    async fn replace_members(&self, key: &str, members: &[String]) -> Result<()>;
}

/// Redis-backed [`SetStore`]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// Open a client for `url`, selecting database `db` unless the URL
    /// already names one in its path or `db` query parameter
    ///
    /// No connection is made until the first publish.
    pub fn new(url: &str, db: i64) -> Result<Self> {
        let mut info = url
            .into_connection_info()
            .with_context(|| format!("Invalid redis url {}", url))?;
        if !url_selects_db(url) {
            info.redis.db = db;
        }
        Ok(Self {
            client: Client::open(info)?,
        })
    }
}

fn url_selects_db(url: &str) -> bool {
    redis::parse_redis_url(url).map_or(false, |parsed| {
        parsed.query_pairs().any(|(name, _)| name == "db")
            || (matches!(parsed.scheme(), "redis" | "rediss")
                && !parsed.path().trim_matches('/').is_empty())
    })
}

#[async_trait]
impl SetStore for RedisStore {
    async fn replace_members(&self, key: &str, members: &[String]) -> Result<()> {
        let mut connection = ConnectionManager::new(self.client.clone())
            .await
            .context("Failed to connect to redis")?;

        // DEL and SADD run as one MULTI/EXEC so readers never see the key empty
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !members.is_empty() {
            pipe.sadd(key, members).ignore();
        }
        pipe.query_async::<_, ()>(&mut connection)
            .await
            .with_context(|| format!("Failed to publish {} members to {}", members.len(), key))?;
        Ok(())
    }
}
