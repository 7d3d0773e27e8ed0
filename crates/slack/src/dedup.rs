use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

/// Process-wide set of recently seen event fingerprints.
///
/// Slack redelivers events on slow acknowledgments, so the gate records every
/// admitted fingerprint and drops repeats. Expiry is a wholesale clear on a
/// timer rather than per-entry timestamps; an entry inserted just before a
/// sweep is therefore retained for less than the full window.
pub struct DedupCache {
    seen: Mutex<HashSet<String>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: Mutex::new(HashSet::new()), ttl }
    }

    /// Atomic check-then-insert. Returns `false` when the fingerprint was
    /// already present, i.e. the event is a duplicate within the window.
    pub fn insert(&self, fingerprint: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.insert(fingerprint.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }

    /// Background task that flushes the set every TTL interval. Runs for the
    /// life of the process; request paths are never blocked by the sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let ttl = cache.ttl;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let swept = cache.len();
                cache.clear();
                debug!(event_name = "slack.dedup.swept", entries = swept, "dedup cache cleared");
            }
        })
    }
}
