use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::cache::ReadyCache;
use crate::context::AppContext;
use crate::metrics_constants::*;
use crate::pool::SlotPool;
use crate::priority::PriorityState;

pub struct RunnerDaemon {
    ctx: Arc<AppContext>,
    pool: SlotPool,
    priorities: HashMap<String, PriorityState>,
    cache: ReadyCache,
    base_rss: Option<u64>,
}

impl RunnerDaemon {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let now = Instant::now();
        let mut pool = SlotPool::new();
        let mut priorities = HashMap::new();
        for (loop_id, cfg) in &ctx.settings.loops {
            pool.init_loop(loop_id, cfg.runners);
            priorities.insert(loop_id.clone(), PriorityState::new(now));
        }
        let cache = ReadyCache::new(Duration::from_millis(ctx.config.cache_ttl_ms));

        Self {
            ctx,
            pool,
            priorities,
            cache,
            base_rss: rss_bytes(),
        }
    }

    /// The control loop. Runs until the shutdown flag is raised, then
    /// aborts everything in flight and returns.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let idle = Duration::from_millis(self.ctx.config.idle_sleep_ms);
        let hp_max_delay = Duration::from_secs(self.ctx.settings.hp_max_delay);
        let lp_max_delay = Duration::from_secs(self.ctx.settings.lp_max_delay);

        loop {
            // Signals only take effect here, between iterations, never
            // mid-request.
            if shutdown.load(Ordering::SeqCst) {
                let aborted = self.pool.terminate();
                info!(aborted, "terminated slot pool");
                return;
            }

            let ctx = self.ctx.clone();
            let ready = self.cache.get_mut(&ctx.aggregators).await;
            if ready.is_empty() {
                tokio::time::sleep(idle).await;
                continue;
            }

            let now = Instant::now();
            let mut rng = rand::thread_rng();
            let mut any_started = false;

            let loop_ids: Vec<String> = self.priorities.keys().cloned().collect();
            for loop_id in loop_ids {
                let state = self
                    .priorities
                    .get_mut(&loop_id)
                    .expect("loop ids come from this map");
                let flipped = state.advance(now, hp_max_delay, lp_max_delay);

                let outcome = match self
                    .pool
                    .refill(&ctx, &loop_id, state.priority, ready, &mut rng)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(loop_id = %loop_id, error = %e, "refill failed");
                        continue;
                    }
                };

                // Free slots but nothing dispatchable: this priority
                // class is out of work, so give the other one its turn.
                // At most one flip per loop per iteration.
                let starved = outcome.free > 0 && outcome.started == 0;
                if !flipped && starved {
                    state.flip(now);
                }
                if flipped || starved {
                    metrics::counter!(PRIORITY_FLIPS, &ctx.metrics_labels).increment(1);
                }

                any_started |= outcome.started > 0;
            }

            let cached_queues = ready.len();
            if !any_started {
                tokio::time::sleep(idle).await;
            }
            self.emit_stats(cached_queues);
        }
    }

    fn emit_stats(&self, cached_queues: usize) {
        metrics::gauge!(BUSY_SLOTS, &self.ctx.metrics_labels).set(self.pool.busy() as f64);
        metrics::gauge!(READY_QUEUES_CACHED, &self.ctx.metrics_labels)
            .set(cached_queues as f64);
        if let Some(rss) = rss_bytes() {
            metrics::gauge!(RSS_BYTES, &self.ctx.metrics_labels).set(rss as f64);
            if let Some(base) = self.base_rss {
                metrics::gauge!(RSS_DELTA_BYTES, &self.ctx.metrics_labels)
                    .set(rss as f64 - base as f64);
            }
        }
    }
}

fn rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * 4096)
}
