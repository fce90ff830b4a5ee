//! View telemetry synchronizer.
//!
//! Fires one remote counter increment per video per session, the first time
//! that video is confirmed actually playing.  The membership check and
//! insert happen synchronously on the coordinator's event loop, before any
//! network I/O, so a second confirmation cannot double-fire while the first
//! increment is still in flight.  The increment itself is a detached task:
//! its failure undercounts, it never blocks or breaks playback.

use signage_proto::catalog::VideoRecord;
use signage_proto::counter::CounterClient;
use std::collections::HashSet;
use tracing::{debug, warn};

pub struct TelemetrySync {
    counter: CounterClient,
}

impl TelemetrySync {
    pub fn new(counter: CounterClient) -> Self {
        Self { counter }
    }

    /// Called by the session coordinator when a queue item is confirmed
    /// playing.  `incremented` is the coordinator-owned per-session set.
    /// Returns true when an increment was actually fired.
    pub fn on_confirmed_playing(
        &self,
        record: &VideoRecord,
        incremented: &mut HashSet<i64>,
    ) -> bool {
        if !incremented.insert(record.id) {
            debug!("video {} already counted this session", record.id);
            return false;
        }

        let counter = self.counter.clone();
        let id = record.id;
        tokio::spawn(async move {
            match counter.increment(id).await {
                Ok(views) => debug!("view counter for video {} now {}", id, views),
                // Dropped, not retried: counters are approximate analytics.
                Err(e) => warn!("view increment dropped for video {}: {}", id, e),
            }
        });
        true
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use signage_proto::catalog::Orientation;
    use signage_proto::counter::CounterMode;

    fn record(id: i64) -> VideoRecord {
        VideoRecord {
            id,
            remote_key: None,
            url: format!("http://x/{}.mp4", id),
            orientation: Orientation::Unspecified,
        }
    }

    fn sync() -> TelemetrySync {
        // Unroutable backend: the spawned increment fails and is swallowed,
        // which is exactly the contract under test.
        TelemetrySync::new(CounterClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            CounterMode::Atomic,
        ))
    }

    #[tokio::test]
    async fn test_same_id_fires_at_most_once() {
        let sync = sync();
        let mut incremented = HashSet::new();

        assert!(sync.on_confirmed_playing(&record(7), &mut incremented));
        assert!(!sync.on_confirmed_playing(&record(7), &mut incremented));
        assert!(incremented.contains(&7));
        assert_eq!(incremented.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_each_fire() {
        let sync = sync();
        let mut incremented = HashSet::new();

        assert!(sync.on_confirmed_playing(&record(1), &mut incremented));
        assert!(sync.on_confirmed_playing(&record(2), &mut incremented));
        assert!(!sync.on_confirmed_playing(&record(1), &mut incremented));
        assert_eq!(incremented.len(), 2);
    }

    #[tokio::test]
    async fn test_id_marked_before_network_resolves() {
        let sync = sync();
        let mut incremented = HashSet::new();

        sync.on_confirmed_playing(&record(3), &mut incremented);
        // The set is updated synchronously, not after the request completes.
        assert!(incremented.contains(&3));
    }
}
