//! Validation engine: fans probes out over a bounded pool and gathers results

use crate::proxy::models::{Candidate, Scheme, VerifiedProxy};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default number of probes allowed in flight at once
const DEFAULT_POOL_CAPACITY: usize = 500;

/// Default wall-clock budget for one validation pass in seconds
const DEFAULT_DEADLINE_SECS: u64 = 300;

/// A single verification attempt against one candidate over one scheme
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn verify(&self, candidate: &Candidate, scheme: Scheme) -> Option<VerifiedProxy>;
}

/// Configuration for the validation engine
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum probes in flight
    pub pool_capacity: usize,
    /// Join deadline for a whole validation pass
    pub deadline: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            deadline: Duration::from_secs(DEFAULT_DEADLINE_SECS),
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Shared accumulator of verified records, appended to by probe tasks
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    inner: Arc<Mutex<Vec<VerifiedProxy>>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<VerifiedProxy>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, record: VerifiedProxy) {
        self.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything accumulated so far
    pub fn snapshot(&self) -> Vec<VerifiedProxy> {
        self.lock().clone()
    }
}

/// Runs probes for every candidate over both schemes
pub struct Validator<P: Probe> {
    config: ValidatorConfig,
    probe: Arc<P>,
}

impl<P: Probe> Validator<P> {
    pub fn new(probe: P) -> Self {
        Self::with_config(ValidatorConfig::default(), probe)
    }

    pub fn with_config(config: ValidatorConfig, probe: P) -> Self {
        Self {
            config,
            probe: Arc::new(probe),
        }
    }

    /// Validate candidates and return the records that passed
    pub async fn validate(&self, candidates: Vec<Candidate>) -> Vec<VerifiedProxy> {
        let results = ResultSet::new();
        self.validate_into(candidates, &results).await;
        results.snapshot()
    }

    /// Validate candidates, appending each verified record to `results` as it
    /// completes. Returns how many records this pass added.
    ///
    /// Probes still pending when the deadline fires are aborted and their
    /// results dropped.
    pub async fn validate_into(&self, candidates: Vec<Candidate>, results: &ResultSet) -> usize {
        if candidates.is_empty() {
            return 0;
        }

        let before = results.len();
        let semaphore = Arc::new(Semaphore::new(self.config.pool_capacity));
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let candidate = Arc::new(candidate);
            for scheme in Scheme::ALL {
                let sem = Arc::clone(&semaphore);
                let probe = Arc::clone(&self.probe);
                let candidate = Arc::clone(&candidate);
                let results = results.clone();
                tasks.spawn(async move {
                    let Ok(_permit) = sem.acquire_owned().await else {
                        return;
                    };
                    if let Some(record) = probe.verify(&candidate, scheme).await {
                        results.push(record);
                    }
                });
            }
        }

        let scheduled = tasks.len();
        let joined = tokio::time::timeout(self.config.deadline, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!("probe task panicked: {}", e);
                    }
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "validation deadline of {:?} reached, abandoning {} of {} probes",
                self.config.deadline,
                tasks.len(),
                scheduled
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let added = results.len().saturating_sub(before);
        debug!("{} probes scheduled, {} verified", scheduled, added);
        added
    }
}
