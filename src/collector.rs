//! Collection run: validate the previous snapshot, discover fresh candidates,
//! validate those, then persist everything that passed.

use crate::proxy::checker::ProxyChecker;
use crate::proxy::crawler::ProxyCrawler;
use crate::proxy::dedup::Deduplicator;
use crate::proxy::geo::GeoLocator;
use crate::proxy::models::Candidate;
use crate::proxy::origin::OriginOracle;
use crate::proxy::sources::{default_sources, SourcePlugin};
use crate::proxy::validator::{Probe, ResultSet, Validator};
use crate::shutdown::ShutdownController;
use crate::store::{ProxyFile, RedisStore, SetStore};
use crate::{Config, Result};
use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Default wall-clock budget for source discovery in seconds
const DEFAULT_DISCOVERY_DEADLINE_SECS: u64 = 8 * 60;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage ran
    Completed,
    /// Stopped at a stage boundary after the first interrupt
    WarmShutdown,
    /// Stopped mid-stage after the second interrupt
    ColdShutdown,
}

impl Collector<ProxyChecker> {
    /// Resolve our own address and wire up the production collaborators
    ///
    /// Fails when the origin cannot be resolved, the store URL is invalid or
    /// the run goes cold first; a missing GeoIP database just leaves
    /// countries unknown.
    pub async fn bootstrap(config: &Config, shutdown: Arc<ShutdownController>) -> Result<Self> {
        info!("[*] Init");
        let oracle = OriginOracle::with_echo_host(config.checker.echo_host.clone())?;
        let origin_ip = tokio::select! {
            resolved = oracle.resolve() => {
                resolved.context("Cannot determine own public address")?
            }
            _ = shutdown.cold() => bail!("Cold shut down before init finished"),
        };

        let dedup = Arc::new(Deduplicator::new());
        let mut checker =
            ProxyChecker::with_config(config.checker.clone(), origin_ip, Arc::clone(&dedup));
        match GeoLocator::from_path(&config.geoip_path) {
            Ok(geo) => checker = checker.with_country_resolver(Arc::new(geo)),
            Err(e) => warn!(
                "[-] GeoIP database {:?} unavailable, countries will be unknown: {}",
                config.geoip_path, e
            ),
        }

        let store = RedisStore::new(&config.redis_url, config.redis_db)?;
        let crawler = ProxyCrawler::with_config(config.crawler.clone())?;

        Ok(Collector::new(
            Validator::with_config(config.validator.clone(), checker),
            dedup,
            default_sources(),
            crawler,
            ProxyFile::new(&config.proxy_file),
            Arc::new(store),
            config.set_key.clone(),
            shutdown,
        )
        .with_discovery_deadline(config.discovery_deadline))
    }
}

/// Owns the state of one collection run
pub struct Collector<P: Probe> {
    validator: Validator<P>,
    dedup: Arc<Deduplicator>,
    sources: Vec<Arc<dyn SourcePlugin>>,
    crawler: ProxyCrawler,
    proxy_file: ProxyFile,
    store: Arc<dyn SetStore>,
    set_key: String,
    verified: ResultSet,
    shutdown: Arc<ShutdownController>,
    discovery_deadline: Duration,
}

impl<P: Probe> Collector<P> {
    /// `dedup` must be the deduplicator the validator's probe claims against
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        validator: Validator<P>,
        dedup: Arc<Deduplicator>,
        sources: Vec<Arc<dyn SourcePlugin>>,
        crawler: ProxyCrawler,
        proxy_file: ProxyFile,
        store: Arc<dyn SetStore>,
        set_key: impl Into<String>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            validator,
            dedup,
            sources,
            crawler,
            proxy_file,
            store,
            set_key: set_key.into(),
            verified: ResultSet::new(),
            shutdown,
            discovery_deadline: Duration::from_secs(DEFAULT_DISCOVERY_DEADLINE_SECS),
        }
    }

    pub fn with_discovery_deadline(mut self, deadline: Duration) -> Self {
        self.discovery_deadline = deadline;
        self
    }

    /// Records verified so far
    pub fn verified(&self) -> &ResultSet {
        &self.verified
    }

    /// Run the pipeline until it completes or the run goes cold
    pub async fn run(&self) -> RunOutcome {
        tokio::select! {
            outcome = self.pipeline() => outcome,
            _ = self.shutdown.cold() => {
                self.persist().await;
                RunOutcome::ColdShutdown
            }
        }
    }

    async fn pipeline(&self) -> RunOutcome {
        let seeds = self.load_input_proxies();
        self.validate_input_proxies(seeds).await;
        if self.shutdown.stop_requested() {
            return self.stop_warm().await;
        }

        let fresh = self.grab_web_proxies().await;
        if self.shutdown.stop_requested() {
            return self.stop_warm().await;
        }

        self.validate_web_proxies(fresh).await;
        self.persist().await;
        RunOutcome::Completed
    }

    async fn stop_warm(&self) -> RunOutcome {
        warn!("[-] Warm shut down, skipping remaining stages");
        self.persist().await;
        RunOutcome::WarmShutdown
    }

    fn load_input_proxies(&self) -> Vec<Candidate> {
        info!("[*] Load input proxies");
        match self.proxy_file.load() {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("[-] Load input proxies error: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn validate_input_proxies(&self, candidates: Vec<Candidate>) {
        info!("[*] Validate input proxies");
        self.validator.validate_into(candidates, &self.verified).await;
        info!(
            "[*] Check {} input proxies, Got {} valid input proxies",
            self.dedup.len(),
            self.verified.len()
        );
    }

    /// Run every source concurrently under the discovery deadline
    async fn grab_web_proxies(&self) -> Vec<Candidate> {
        info!("[*] Grab proxies from {} sources", self.sources.len());
        let relays = self.verified.snapshot();

        // Each source rotates through its own copy of the verified relays
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let crawler = self.crawler.clone().with_relays(relays.clone());
            tasks.spawn(async move {
                let found = source.discover(&crawler).await;
                (source.name().to_string(), found)
            });
        }

        let mut candidates = Vec::new();
        let joined = tokio::time::timeout(self.discovery_deadline, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((name, Ok(found))) => {
                        info!("[*] Source {} found {} proxies", name, found.len());
                        candidates.extend(found);
                    }
                    Ok((name, Err(e))) => warn!("[-] Source {} failed: {:#}", name, e),
                    Err(e) => warn!("[-] Source task failed: {}", e),
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "[-] Discovery deadline reached, abandoning {} sources",
                tasks.len()
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        candidates
    }

    async fn validate_web_proxies(&self, candidates: Vec<Candidate>) {
        info!("[*] Validate web proxies");
        let checked_before = self.dedup.len();

        let added = self.validator.validate_into(candidates, &self.verified).await;

        info!(
            "[*] Check {} output proxies, Got {} valid output proxies",
            self.dedup.len() - checked_before,
            added
        );
        info!(
            "[*] Check {} proxies, Got {} valid proxies",
            self.dedup.len(),
            self.verified.len()
        );
    }

    /// Write the accumulated set to the file and the store
    ///
    /// The two sinks are independent; a failure in one is logged and the other
    /// is still written. An empty set leaves both untouched.
    pub async fn persist(&self) {
        let proxies = self.verified.snapshot();
        if proxies.is_empty() {
            warn!("[-] No valid proxies, keeping previous snapshot");
            return;
        }

        info!("[*] Save {} valid proxies to file", proxies.len());
        if let Err(e) = self.proxy_file.save(&proxies) {
            error!("[-] Save proxies to file error: {:#}", e);
        }

        info!("[*] Save {} valid proxies to store", proxies.len());
        let members: Vec<String> = proxies.iter().map(|p| p.hash.clone()).collect();
        if let Err(e) = self.store.replace_members(&self.set_key, &members).await {
            error!("[-] Save proxies to store error: {:#}", e);
        }
    }
}
