use std::time::{Duration, Instant};

use jobrunner_core::{read_ready_map, HaClient, QueueError, ReadyMap};
use tracing::debug;

/// Process-local view of the aggregator ready map. Reads inside the TTL
/// are free; outside it a fresh read is attempted, but an empty or
/// failed read leaves the old view in place - a stale map costs a
/// no-op dispatch at worst, while a spuriously empty one idles every
/// loop.
pub struct ReadyCache {
    ttl: Duration,
    map: ReadyMap,
    fetched: Option<Instant>,
}

impl ReadyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            map: ReadyMap::default(),
            fetched: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.fetched
            .is_some_and(|at| now.duration_since(at) < self.ttl)
    }

    fn apply(&mut self, result: Result<ReadyMap, QueueError>, now: Instant) {
        match result {
            Ok(map) if !map.is_empty() => {
                self.map = map;
                self.fetched = Some(now);
            }
            Ok(_) => debug!("fresh ready map was empty, keeping the cached one"),
            Err(e) => debug!(error = %e, "ready map read failed, keeping the cached one"),
        }
    }

    /// The current view, refreshed from the aggregators if the TTL has
    /// lapsed. Mutable so the slot pool can drop queues it just saw
    /// drain.
    pub async fn get_mut(&mut self, aggregators: &HaClient) -> &mut ReadyMap {
        let now = Instant::now();
        if !self.is_fresh(now) {
            self.apply(read_ready_map(aggregators).await, now);
        }
        &mut self.map
    }
}
