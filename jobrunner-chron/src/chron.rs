use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use jobrunner_core::{
    publish_ready_map, HaClient, PoolLock, QueueError, QueueId, ReclaimOutcome, ReclaimParams,
    Reclaimer, Settings, QUEUES_WITH_JOBS_KEY,
};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::metrics_constants::*;

/// Slot keys for the chron pool lock live on the aggregators under this
/// name. One slot per partition bounds concurrent reclaimers.
const POOL_LOCK_NAME: &str = "global:jobqueue:chron";

/// Refresh the held lock slot this often (in queues) so a long pass
/// never outlives the lock TTL.
const LOCK_REFRESH_EVERY: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Another chron instance held every lock slot; nothing was done.
    pub raced: bool,
    /// At least one partition or the aggregator publish failed.
    pub failed: bool,
    /// Queues the reclaim script ran against.
    pub queues: u64,
    /// Queues that failed the script and were skipped.
    pub script_errors: u64,
    pub outcome: ReclaimOutcome,
    /// Entries in the published ready map.
    pub ready_queues: usize,
}

pub struct Chron {
    settings: Settings,
    config: AppConfig,
    aggregators: HaClient,
    partitions: HaClient,
    reclaimer: Reclaimer,
    metrics_labels: Vec<(String, String)>,
}

impl Chron {
    pub fn new(settings: Settings, config: AppConfig) -> Result<Self, QueueError> {
        let aggregators = HaClient::new("aggregators", &settings.aggregators)?;
        let partitions = HaClient::new("partitions", &settings.partitions)?;

        let metrics_labels = vec![("chron_id".to_string(), config.chron_id.clone())];

        Ok(Self {
            settings,
            config,
            aggregators,
            partitions,
            reclaimer: Reclaimer::new(),
            metrics_labels,
        })
    }

    pub async fn run_once(&self) -> Result<CycleStats, QueueError> {
        let cycle_timer = std::time::Instant::now();
        metrics::counter!(CYCLE_STARTS, &self.metrics_labels).increment(1);

        let lock = PoolLock::new(
            &self.aggregators,
            POOL_LOCK_NAME,
            self.partitions.len(),
            self.config.lock_ttl_secs,
        );
        let slot = match lock.acquire().await {
            Ok(slot) => slot,
            Err(QueueError::LockUnavailable(_)) => {
                metrics::counter!(CYCLE_RACED, &self.metrics_labels).increment(1);
                return Ok(CycleStats {
                    raced: true,
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut stats = CycleStats::default();
        let mut ready: HashMap<String, i64> = HashMap::new();
        let mut since_refresh = 0u64;

        let mut partition_addrs: Vec<String> =
            self.partitions.addrs().map(str::to_string).collect();
        partition_addrs.shuffle(&mut rand::thread_rng());

        for addr in &partition_addrs {
            let mut members = match self.queues_on(addr).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(partition = %addr, error = %e, "skipping partition");
                    metrics::counter!(PARTITION_ERRORS, &self.metrics_labels).increment(1);
                    stats.failed = true;
                    continue;
                }
            };
            members.shuffle(&mut rand::thread_rng());

            let mut conn = match self.partitions.connection(addr).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(partition = %addr, error = %e, "skipping partition");
                    metrics::counter!(PARTITION_ERRORS, &self.metrics_labels).increment(1);
                    stats.failed = true;
                    continue;
                }
            };
            // One upload per partition round keeps every per-queue call on
            // the EVALSHA fast path.
            if let Err(e) = self.reclaimer.load(&mut conn).await {
                warn!(partition = %addr, error = %e, "script load failed, skipping partition");
                metrics::counter!(PARTITION_ERRORS, &self.metrics_labels).increment(1);
                stats.failed = true;
                continue;
            }

            for params in self.reclaim_params(members) {
                match self.reclaimer.run(&mut conn, &params).await {
                    Ok(outcome) => {
                        stats.outcome.accumulate(outcome);
                        if outcome.ready > 0 {
                            ready.insert(params.queue.encode(), params.now);
                        }
                    }
                    Err(e) => {
                        warn!(queue = %params.queue, error = %e, "reclaim failed for queue");
                        metrics::counter!(SCRIPT_ERRORS, &self.metrics_labels).increment(1);
                        stats.script_errors += 1;
                    }
                }
                stats.queues += 1;
                since_refresh += 1;
                if since_refresh >= LOCK_REFRESH_EVERY {
                    if let Err(e) = lock.refresh(&slot).await {
                        warn!(error = %e, "pool lock refresh failed");
                    }
                    since_refresh = 0;
                }
                tokio::time::sleep(Duration::from_millis(self.config.script_pause_ms)).await;
            }
        }

        stats.ready_queues = ready.len();
        let accepted = publish_ready_map(&self.aggregators, &ready).await;
        if accepted == 0 {
            warn!("no aggregator accepted the ready map");
            stats.failed = true;
        }

        if let Err(e) = lock.release(slot).await {
            warn!(error = %e, "pool lock release failed, slot will expire on its own");
        }

        metrics::counter!(RELEASED_COUNT, &self.metrics_labels)
            .increment(stats.outcome.released);
        metrics::counter!(ABANDONED_COUNT, &self.metrics_labels)
            .increment(stats.outcome.abandoned);
        metrics::counter!(PRUNED_COUNT, &self.metrics_labels).increment(stats.outcome.pruned);
        metrics::counter!(UNDELAYED_COUNT, &self.metrics_labels)
            .increment(stats.outcome.undelayed);
        metrics::counter!(QUEUES_SEEN, &self.metrics_labels).increment(stats.queues);
        metrics::gauge!(READY_QUEUES, &self.metrics_labels).set(stats.ready_queues as f64);
        if stats.failed {
            metrics::counter!(CYCLE_FAILED, &self.metrics_labels).increment(1);
        }
        metrics::histogram!(CYCLE_TIME, &self.metrics_labels)
            .record(cycle_timer.elapsed().as_millis() as f64);
        metrics::counter!(CYCLE_ENDS, &self.metrics_labels).increment(1);

        if stats.outcome.abandoned > 0 {
            warn!("abandoned {} jobs past their attempt limit", stats.outcome.abandoned);
        }
        if stats.outcome.pruned > 0 {
            warn!("pruned {} long-dead jobs", stats.outcome.pruned);
        }
        info!(
            queues = stats.queues,
            released = stats.outcome.released,
            undelayed = stats.outcome.undelayed,
            ready_queues = stats.ready_queues,
            "reclamation cycle complete"
        );

        Ok(stats)
    }

    async fn queues_on(&self, addr: &str) -> Result<Vec<String>, QueueError> {
        let value = self
            .partitions
            .on(addr, redis::cmd("SMEMBERS").arg(QUEUES_WITH_JOBS_KEY))
            .await?;
        Ok(redis::from_redis_value(&value)?)
    }

    /// Per-queue script arguments, produced lazily; a partition with a
    /// huge queue set never has all its parameter records in memory at
    /// once. Undecodable set members are dropped with a warning.
    fn reclaim_params(
        &self,
        members: Vec<String>,
    ) -> impl Iterator<Item = ReclaimParams> + '_ {
        members.into_iter().filter_map(move |name| {
            let queue = match QueueId::decode(&name) {
                Ok(queue) => queue,
                Err(e) => {
                    warn!(member = %name, error = %e, "unparseable entry in queues-with-jobs set");
                    return None;
                }
            };
            let now = Utc::now().timestamp();
            Some(ReclaimParams {
                claim_cutoff: now - self.settings.claim_ttl_for(&queue.job_type) as i64,
                prune_cutoff: now - self.config.prune_ttl_secs,
                attempts_limit: self.settings.attempts_for(&queue.job_type),
                now,
                limit: self.config.reclaim_batch,
                queue,
            })
        })
    }
}
