//! Run-wide record of signatures that have already been probed

use std::collections::HashSet;
use std::sync::Mutex;

/// Gates probe invocations so each signature is attempted once per run
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signature`, returning true only for its first claim
    pub fn claim(&self, signature: &str) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.contains(signature) {
            return false;
        }
        seen.insert(signature.to_string())
    }

    /// Number of distinct signatures claimed so far
    pub fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_claim_once() {
        let dedup = Deduplicator::new();
        assert!(dedup.claim("http://1.2.3.4:8080"));
        assert!(!dedup.claim("http://1.2.3.4:8080"));
        assert!(dedup.claim("https://1.2.3.4:8080"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_empty() {
        let dedup = Deduplicator::new();
        assert!(dedup.is_empty());
        dedup.claim("http://a:1");
        assert!(!dedup.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_win_exactly_once() {
        let dedup = Arc::new(Deduplicator::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let dedup = Arc::clone(&dedup);
            let winners = Arc::clone(&winners);
            handles.push(tokio::spawn(async move {
                if dedup.claim("http://9.9.9.9:3128") {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.len(), 1);
    }
}
